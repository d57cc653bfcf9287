use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use mcwarden_core::config::WardenConfig;
use mcwarden_core::netinfo::NetworkInfoProvider;
use mcwarden_core::properties::PropertiesDocument;
use mcwarden_core::supervisor::{ServerState, Supervisor};
use mcwarden_installer_lib::{InstallEvent, InstallWorker, Installer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let verb = args.get(1).map(String::as_str).unwrap_or("help");

    let config_path = std::env::var("MCWARDEN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| WardenConfig::default_path());
    let config = WardenConfig::load(&config_path)?;

    match verb {
        "start" => cmd_start(&config).await,
        "stop" => cmd_stop(&config, has_flag(&args, "--force")).await,
        "status" => cmd_status(&config).await,
        "load-config" => cmd_load_config(&config),
        "save-config" => cmd_save_config(&config, &args[2..]),
        "list-versions" => cmd_list_versions(&config),
        "install" => cmd_install(&config, args.get(2), has_flag(&args, "--force")).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Launch the configured server and supervise it until it exits or the
/// operator interrupts. Ctrl+C runs the graceful stop ladder.
async fn cmd_start(config: &WardenConfig) -> anyhow::Result<()> {
    let supervisor = Arc::new(Supervisor::new(config.supervisor_options()));
    let spec = config.launch_spec();
    let workdir = config.launch.working_dir.clone();

    tracing::info!("mcwarden starting, supervising '{}'", workdir.display());

    match supervisor.start(&spec).await {
        Ok(started) => println!("{}", serde_json::to_string_pretty(&started)?),
        Err(e) => {
            println!("{}", e.to_json());
            std::process::exit(1);
        }
    }

    // 백그라운드 모니터링 태스크 시작
    let monitor = supervisor.clone();
    let poll = Duration::from_secs(config.supervisor.poll_interval_secs.max(1));
    tokio::spawn(async move {
        let mut error_count = 0;
        let max_consecutive_errors = 10;

        loop {
            tokio::time::sleep(poll).await;

            match monitor.reconcile().await {
                Ok(_) => {
                    if error_count > 0 {
                        tracing::info!("Monitor recovered after {} errors", error_count);
                    }
                    error_count = 0;
                }
                Err(e) => {
                    error_count += 1;
                    if error_count <= 3 || error_count % 10 == 0 {
                        // 처음 3번과 이후 10번마다 로깅하여 반복 로그 방지
                        tracing::error!("Monitor error (count: {}): {}", error_count, e);
                    }

                    if error_count >= max_consecutive_errors {
                        tracing::error!(
                            "Monitor has failed {} consecutive times, resetting counter",
                            error_count
                        );
                        error_count = 0;
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping server...");
                for key in supervisor.running_keys().await {
                    tracing::info!("[Shutdown] Server still up at '{}'", key);
                }
                match supervisor.stop(&workdir, false).await {
                    Ok(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                    Err(e) => {
                        println!("{}", e.to_json());
                        std::process::exit(1);
                    }
                }
                break;
            }
            _ = tokio::time::sleep(poll) => {
                let status = supervisor.status(&workdir).await?;
                match status.state {
                    ServerState::Running | ServerState::Starting | ServerState::Stopping => {}
                    ServerState::Failed => {
                        tracing::error!("Server at '{}' died", workdir.display());
                        println!("{}", serde_json::to_string_pretty(&status)?);
                        std::process::exit(1);
                    }
                    ServerState::Stopped => {
                        println!("{}", serde_json::to_string_pretty(&status)?);
                        break;
                    }
                }
            }
        }
    }

    tracing::info!("mcwarden shutting down");
    Ok(())
}

async fn cmd_stop(config: &WardenConfig, force: bool) -> anyhow::Result<()> {
    let supervisor = Supervisor::new(config.supervisor_options());
    match supervisor.stop(&config.launch.working_dir, force).await {
        Ok(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", e.to_json());
            std::process::exit(1);
        }
    }
}

async fn cmd_status(config: &WardenConfig) -> anyhow::Result<()> {
    let supervisor = Supervisor::new(config.supervisor_options());
    let status = supervisor.status(&config.launch.working_dir).await?;

    let provider = NetworkInfoProvider::new(
        config.network.public_ip_endpoint.clone(),
        Duration::from_secs(config.network.timeout_secs),
    )?;
    let address = provider.display_info(&config.properties_path()).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "server": status,
            "address": address,
        }))?
    );
    Ok(())
}

fn cmd_load_config(config: &WardenConfig) -> anyhow::Result<()> {
    let path = config.properties_path();
    let doc = PropertiesDocument::load(&path)?;
    for (key, value) in doc.entries() {
        println!("{}={}", key, value);
    }
    Ok(())
}

fn cmd_save_config(config: &WardenConfig, pairs: &[String]) -> anyhow::Result<()> {
    if pairs.is_empty() {
        anyhow::bail!("save-config needs at least one key=value pair");
    }
    let path = config.properties_path();
    // 편집 세션마다 새로 읽어 이전 세션의 복사본으로 덮어쓰지 않는다
    let mut doc = PropertiesDocument::load(&path)?;
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{}'", pair))?;
        doc.set(key, value);
    }
    doc.save(&path)?;
    tracing::info!("[Config] Updated {} key(s) in {}", pairs.len(), path.display());
    Ok(())
}

fn cmd_list_versions(config: &WardenConfig) -> anyhow::Result<()> {
    let installer = Installer::new(config.installer_config())?;
    let available = installer.list_available_versions();
    let installed = installer.list_installed_versions(&config.artifacts_dir());
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "available": available,
            "installed": installed,
        }))?
    );
    Ok(())
}

/// Run an install through the background worker, relaying its events.
/// Ctrl+C cancels the in-flight transfer; the partial file is removed.
async fn cmd_install(
    config: &WardenConfig,
    version: Option<&String>,
    force: bool,
) -> anyhow::Result<()> {
    let version = match version {
        Some(v) if !v.starts_with("--") => v.clone(),
        _ => anyhow::bail!("usage: mcwarden-core install <version> [--force]"),
    };
    let target_dir = config.artifacts_dir();

    let installer = Arc::new(Installer::new(config.installer_config())?);
    let worker = InstallWorker::spawn(installer);
    let mut events = worker.subscribe();

    worker
        .install(&version, &target_dir, force)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Cancelling install of {}", version);
                worker.cancel(&version).await;
            }
            event = events.recv() => match event {
                Ok(InstallEvent::Progress { downloaded_bytes, total_bytes, .. }) => {
                    match total_bytes {
                        Some(total) if total > 0 => {
                            tracing::info!("[Install] {} / {} bytes", downloaded_bytes, total)
                        }
                        _ => tracing::info!("[Install] {} bytes", downloaded_bytes),
                    }
                }
                Ok(InstallEvent::Completed { outcome, .. }) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                    break;
                }
                Ok(InstallEvent::Failed { error, .. }) => {
                    eprintln!("Install failed: {}", error);
                    std::process::exit(1);
                }
                Ok(InstallEvent::Cancelled { .. }) => {
                    eprintln!("Install cancelled");
                    std::process::exit(1);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => anyhow::bail!("install worker stopped unexpectedly"),
            }
        }
    }

    Ok(())
}

fn print_usage() {
    println!("mcwarden-core - game server lifecycle daemon");
    println!();
    println!("Usage: mcwarden-core <command> [args]");
    println!();
    println!("Commands:");
    println!("  start                        Launch and supervise the configured server");
    println!("  stop [--force]               Stop the supervised server");
    println!("  status                       Report server state and public address");
    println!("  load-config                  Print the parsed server.properties entries");
    println!("  save-config k=v [k=v ...]    Edit server.properties atomically");
    println!("  list-versions                List installable and installed versions");
    println!("  install <version> [--force]  Download and install a server artifact");
}
