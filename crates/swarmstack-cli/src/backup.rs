//! Snapshot of the installer state, credentials and configuration checkout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use swarmstack_core::StateStore;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::InstallerConfig;

/// Name of the exported state document inside a backup.
pub const STATE_EXPORT: &str = "installation_state.json";

/// Directory the configuration checkout is copied to inside a backup.
pub const CONFIG_COPY: &str = "docker-config";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub dir: PathBuf,
    pub credentials: bool,
    /// Files copied from the configuration checkout.
    pub config_files: usize,
}

/// Back up into `<backup_root>/backup_swarm_<timestamp>`.
pub fn create_backup(config: &InstallerConfig, store: &StateStore) -> Result<BackupReport> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let dir = config
        .paths
        .backup_root
        .join(format!("backup_swarm_{stamp}"));
    backup_into(config, store, &dir)
}

pub fn backup_into(config: &InstallerConfig, store: &StateStore, dir: &Path) -> Result<BackupReport> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    store
        .export(&dir.join(STATE_EXPORT))
        .context("exporting installation state")?;

    let credentials_src = &config.paths.credentials_file;
    let credentials = match credentials_src.file_name() {
        Some(name) if credentials_src.is_file() => {
            fs::copy(credentials_src, dir.join(name))
                .with_context(|| format!("copying {}", credentials_src.display()))?;
            true
        }
        _ => false,
    };

    let install_dir = &config.paths.install_dir;
    let config_files = if install_dir.is_dir() {
        copy_tree(install_dir, &dir.join(CONFIG_COPY))?
    } else {
        0
    };

    info!(
        dir = %dir.display(),
        credentials,
        config_files,
        "backup created"
    );
    Ok(BackupReport {
        dir: dir.to_path_buf(),
        credentials,
        config_files,
    })
}

/// Recursive copy of regular files and directories; returns the file count.
fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        let kind = entry.file_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating {}", target.display()))?;
        } else if kind.is_file() {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copying {}", entry.path().display()))?;
            copied += 1;
        } else {
            debug!("skipping {}", entry.path().display());
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmstack_core::Metadata;
    use tempfile::tempdir;

    fn config_in(root: &Path) -> InstallerConfig {
        let mut config = InstallerConfig::default();
        config.paths.install_dir = root.join("docker-config");
        config.paths.credentials_file = root.join("docker-config").join("CREDENTIALS.txt");
        config.paths.backup_root = root.join("backups");
        config
    }

    #[test]
    fn test_backup_collects_everything() {
        let root = tempdir().unwrap();
        let config = config_in(root.path());
        let install = &config.paths.install_dir;
        fs::create_dir_all(install.join("traefik")).unwrap();
        fs::write(install.join("traefik").join("docker-compose.yml"), "services: {}\n").unwrap();
        fs::write(&config.paths.credentials_file, "secret\n").unwrap();
        let mut store = StateStore::open(root.path().join("state.json"));
        store.set("prerequisites", Metadata::new()).unwrap();

        let report = create_backup(&config, &store).unwrap();

        assert!(report.dir.starts_with(root.path().join("backups")));
        assert!(report
            .dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("backup_swarm_"));
        assert!(report.credentials);
        assert_eq!(report.config_files, 2);
        assert!(report.dir.join("CREDENTIALS.txt").is_file());
        assert!(report
            .dir
            .join(CONFIG_COPY)
            .join("traefik")
            .join("docker-compose.yml")
            .is_file());

        let exported: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(report.dir.join(STATE_EXPORT)).unwrap())
                .unwrap();
        assert_eq!(exported["components"]["prerequisites"]["installed"], true);
    }

    #[test]
    fn test_backup_without_checkout_or_credentials() {
        let root = tempdir().unwrap();
        let config = config_in(root.path());
        let store = StateStore::open(root.path().join("state.json"));

        let report = backup_into(&config, &store, &root.path().join("b")).unwrap();

        assert!(!report.credentials);
        assert_eq!(report.config_files, 0);
        assert!(root.path().join("b").join(STATE_EXPORT).is_file());
        assert!(!root.path().join("b").join(CONFIG_COPY).exists());
    }
}
