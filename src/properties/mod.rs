//! server.properties store - line-preserving load/edit/save
//!
//! The properties format is treated as opaque key-value text: `key=value`
//! entries, `#` comments, blank lines. Parsing keeps every line (including
//! malformed ones) verbatim, so an unmodified load/save round-trip
//! reproduces the file byte for byte (line endings normalized to `\n`).
//! Saves go through a temp file in the same directory followed by an atomic
//! rename, so no reader ever observes a partially written file.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PropertiesError {
    #[error("properties file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read properties file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write properties file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One line of a properties file, stored exactly as read.
///
/// `Entry` keeps the raw text on both sides of the first `=`, so whitespace
/// quirks survive a round-trip; key matching trims before comparing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertiesLine {
    Entry { key: String, value: String },
    Comment(String),
    Blank(String),
    /// Malformed line (no `=`), preserved verbatim rather than dropped
    Raw(String),
}

/// Parsed, order-preserving representation of a properties file.
///
/// Loaded on demand and never cached across edit sessions: every edit is
/// load → set → save against the file as it is on disk.
#[derive(Debug, Clone, Default)]
pub struct PropertiesDocument {
    lines: Vec<PropertiesLine>,
}

impl PropertiesDocument {
    /// Parse properties text. Infallible: every line is representable.
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        for raw in text.split('\n') {
            // normalize CRLF input; output is always LF
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            lines.push(Self::classify(raw));
        }
        // split('\n') on "a=1\n" yields a trailing "" that is an artifact of
        // the final newline, not a blank line of the document
        if let Some(PropertiesLine::Blank(s)) = lines.last() {
            if s.is_empty() {
                lines.pop();
            }
        }
        Self { lines }
    }

    fn classify(raw: &str) -> PropertiesLine {
        if raw.trim().is_empty() {
            PropertiesLine::Blank(raw.to_string())
        } else if raw.trim_start().starts_with('#') {
            PropertiesLine::Comment(raw.to_string())
        } else if let Some(eq) = raw.find('=') {
            PropertiesLine::Entry {
                key: raw[..eq].to_string(),
                value: raw[eq + 1..].to_string(),
            }
        } else {
            PropertiesLine::Raw(raw.to_string())
        }
    }

    /// Load and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self, PropertiesError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PropertiesError::NotFound { path: path.to_path_buf() }
            } else {
                PropertiesError::Read { path: path.to_path_buf(), source: e }
            }
        })?;
        Ok(Self::parse(&text))
    }

    /// Look up a key. Duplicate keys resolve to the last occurrence.
    /// The returned value is trimmed; the stored line is not.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.trim();
        self.lines.iter().rev().find_map(|line| match line {
            PropertiesLine::Entry { key: k, value } if k.trim() == key => Some(value.trim()),
            _ => None,
        })
    }

    /// Set a key. Updates the last occurrence in place; appends a new
    /// `key=value` line when the key is absent. Never deletes lines.
    pub fn set(&mut self, key: &str, value: &str) {
        let needle = key.trim();
        let last = self
            .lines
            .iter()
            .rposition(|line| matches!(line, PropertiesLine::Entry { key: k, .. } if k.trim() == needle));
        match last {
            Some(idx) => {
                if let PropertiesLine::Entry { value: v, .. } = &mut self.lines[idx] {
                    *v = value.to_string();
                }
            }
            None => self.lines.push(PropertiesLine::Entry {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Effective key/value pairs (last occurrence wins), in order of first
    /// appearance. For display; editing goes through `set`.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut ordered: Vec<String> = Vec::new();
        for line in &self.lines {
            if let PropertiesLine::Entry { key, .. } = line {
                let k = key.trim().to_string();
                if !ordered.contains(&k) {
                    ordered.push(k);
                }
            }
        }
        ordered
            .into_iter()
            .filter_map(|k| {
                let value = self.get(&k)?.to_string();
                Some((k, value))
            })
            .collect()
    }

    /// Render the document back to text, one `\n`-terminated line each.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                PropertiesLine::Entry { key, value } => {
                    let _ = writeln!(out, "{}={}", key, value);
                }
                PropertiesLine::Comment(s) | PropertiesLine::Blank(s) | PropertiesLine::Raw(s) => {
                    let _ = writeln!(out, "{}", s);
                }
            }
        }
        out
    }

    /// Atomically write the document to `path`.
    ///
    /// The temp file is created in the target's directory so the final
    /// rename never crosses filesystems. On any failure the original file
    /// is untouched and the temp file is removed on drop.
    pub fn save(&self, path: &Path) -> Result<(), PropertiesError> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let write_err = |e: std::io::Error| PropertiesError::Write {
            path: path.to_path_buf(),
            source: e,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(self.render().as_bytes()).map_err(write_err)?;
        tmp.flush().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        tracing::debug!("Saved properties to {}", path.display());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_byte_identical() {
        let text = "#Minecraft server properties\n#Mon Aug 24 21:00:00 KST 2026\nserver-port=25565\nmotd=A Minecraft Server\n\nwhite-list=false\nbroken line without equals\n  #indented comment\nkey = spaced value \n";
        let doc = PropertiesDocument::parse(text);
        assert_eq!(doc.render(), text);
    }

    #[test]
    fn edit_preserves_comments_and_order() {
        let mut doc = PropertiesDocument::parse("a=1\n#note\nb=2\n");
        doc.set("b", "3");
        assert_eq!(doc.render(), "a=1\n#note\nb=3\n");
    }

    #[test]
    fn last_occurrence_wins() {
        let mut doc = PropertiesDocument::parse("a=1\na=2\n");
        assert_eq!(doc.get("a"), Some("2"));
        doc.set("a", "3");
        assert_eq!(doc.render(), "a=1\na=3\n");
        assert_eq!(doc.get("a"), Some("3"));
    }

    #[test]
    fn unknown_key_is_appended() {
        let mut doc = PropertiesDocument::parse("a=1\n");
        doc.set("b", "2");
        assert_eq!(doc.render(), "a=1\nb=2\n");
    }

    #[test]
    fn set_on_empty_document() {
        let mut doc = PropertiesDocument::default();
        assert!(doc.is_empty());
        doc.set("server-port", "25565");
        assert_eq!(doc.render(), "server-port=25565\n");
    }

    #[test]
    fn malformed_lines_survive() {
        let text = "good=1\nthis is not a property\n";
        let mut doc = PropertiesDocument::parse(text);
        doc.set("good", "2");
        assert_eq!(doc.render(), "good=2\nthis is not a property\n");
        assert_eq!(doc.get("this is not a property"), None);
    }

    #[test]
    fn crlf_input_normalizes_to_lf() {
        let doc = PropertiesDocument::parse("a=1\r\nb=2\r\n");
        assert_eq!(doc.render(), "a=1\nb=2\n");
        assert_eq!(doc.get("a"), Some("1"));
    }

    #[test]
    fn get_trims_but_storage_does_not() {
        let doc = PropertiesDocument::parse("key = spaced \n");
        assert_eq!(doc.get("key"), Some("spaced"));
        assert_eq!(doc.render(), "key = spaced \n");
    }

    #[test]
    fn value_with_equals_sign() {
        // only the first '=' splits; the rest belongs to the value
        let doc = PropertiesDocument::parse("motd=hello=world\n");
        assert_eq!(doc.get("motd"), Some("hello=world"));
    }

    #[test]
    fn entries_resolve_duplicates() {
        let doc = PropertiesDocument::parse("a=1\nb=2\na=3\n");
        assert_eq!(
            doc.entries(),
            vec![("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.properties");
        match PropertiesDocument::load(&path) {
            Err(PropertiesError::NotFound { .. }) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|d| d.render())),
        }
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.properties");
        let mut doc = PropertiesDocument::parse("server-port=25565\nmotd=hi\n");
        doc.set("server-port", "25570");
        doc.save(&path).unwrap();

        let reloaded = PropertiesDocument::load(&path).unwrap();
        assert_eq!(reloaded.get("server-port"), Some("25570"));
        assert_eq!(reloaded.get("motd"), Some("hi"));

        // no temp file left next to the target
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn save_overwrites_existing_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.properties");
        std::fs::write(&path, "old=1\n").unwrap();

        let doc = PropertiesDocument::parse("new=2\n");
        doc.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new=2\n");
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("server.properties");
        let doc = PropertiesDocument::parse("a=1\n");
        match doc.save(&path) {
            Err(PropertiesError::Write { .. }) => {}
            other => panic!("expected Write error, got {:?}", other),
        }
    }
}
