//! Shared utility functions for the mcwarden core daemon.

use tokio::process::Command;

/// Apply platform-specific flags to hide the console window on Windows, so
/// launching the server does not pop an extra terminal. No-op elsewhere.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}
