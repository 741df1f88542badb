//! Plain-text credential report built from component metadata.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Local};

use crate::state::StateStore;

const RULE_WIDTH: usize = 60;

/// One titled block of `Key: value` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSection {
    pub title: String,
    pub entries: Vec<(String, String)>,
}

impl CredentialSection {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            entries: Vec::new(),
        }
    }

    fn entry(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.push((key.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialReport {
    pub generated_at: DateTime<Local>,
    pub sections: Vec<CredentialSection>,
}

impl CredentialReport {
    /// Collect a section for every installed component that has credentials.
    pub fn from_state(store: &StateStore) -> Self {
        let mut sections = Vec::new();
        let value = |name: &str, key: &str, fallback: &str| -> String {
            store
                .get(name)
                .and_then(|r| r.get_str(key))
                .unwrap_or(fallback)
                .to_string()
        };

        if store.is_installed("portainer") {
            sections.push(
                CredentialSection::new("Portainer")
                    .entry("URL", value("portainer", "url", "-"))
                    .entry("User", value("portainer", "username", "admin"))
                    .entry("Password", "(the one entered during installation)"),
            );
        }

        if store.is_installed("pgvector") {
            let port = store
                .get("pgvector")
                .and_then(|r| r.get("port"))
                .map(|p| match p.as_str() {
                    Some(s) => s.to_string(),
                    None => p.to_string(),
                })
                .unwrap_or_else(|| "5432".to_string());
            sections.push(
                CredentialSection::new("PostgreSQL")
                    .entry("Host", value("pgvector", "host", "pgvector"))
                    .entry("Port", port)
                    .entry("User", value("pgvector", "user", "postgres"))
                    .entry("Password", value("pgvector", "password", "-")),
            );
        }

        if store.is_installed("evolution") {
            sections.push(
                CredentialSection::new("Evolution API")
                    .entry("URL", value("evolution", "url", "-"))
                    .entry("API Key", value("evolution", "api_key", "-")),
            );
        }

        if store.is_installed("chatwoot") {
            sections.push(
                CredentialSection::new("Chatwoot")
                    .entry("URL", value("chatwoot", "url", "-"))
                    .entry("Company", value("chatwoot", "company", "-")),
            );
        }

        Self {
            generated_at: Local::now(),
            sections,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn render(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "SYSTEM CREDENTIALS");
        let _ = writeln!(
            out,
            "Generated: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "{rule}");

        for section in &self.sections {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}:", section.title);
            for (key, value) in &section.entries {
                let _ = writeln!(out, "  {key}: {value}");
            }
        }
        out
    }

    /// Write the rendered report, creating parent directories.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.render())?;
        restrict_permissions(path)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Metadata;
    use serde_json::json;
    use tempfile::tempdir;

    fn store_with(dir: &Path, entries: &[(&str, &[(&str, serde_json::Value)])]) -> StateStore {
        let mut store = StateStore::open(dir.join("state.json"));
        for (name, pairs) in entries {
            let meta: Metadata = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            store.set(name, meta).unwrap();
        }
        store
    }

    #[test]
    fn test_empty_state_has_no_sections() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json"));
        let report = CredentialReport::from_state(&store);
        assert!(report.is_empty());
        assert!(report.render().contains("SYSTEM CREDENTIALS"));
    }

    #[test]
    fn test_sections_follow_installed_components() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &[
                ("pgvector", &[("password", json!("pgpass")), ("port", json!(5432))]),
                (
                    "chatwoot",
                    &[
                        ("url", json!("https://chat.example.com")),
                        ("company", json!("Acme")),
                    ],
                ),
            ],
        );

        let report = CredentialReport::from_state(&store);
        let titles: Vec<_> = report.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["PostgreSQL", "Chatwoot"]);

        let text = report.render();
        assert!(text.contains("PostgreSQL:\n  Host: pgvector\n  Port: 5432\n  User: postgres\n  Password: pgpass\n"));
        assert!(text.contains("Chatwoot:\n  URL: https://chat.example.com\n  Company: Acme\n"));
    }

    #[test]
    fn test_write_to_creates_file() {
        let dir = tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &[("evolution", &[("api_key", json!("k3y")), ("url", json!("https://evo.example.com"))])],
        );
        let path = dir.path().join("out").join("CREDENTIALS.txt");

        CredentialReport::from_state(&store).write_to(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("  API Key: k3y"));
    }
}
