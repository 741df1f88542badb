//! Checkout of the repository holding the compose templates.

use anyhow::{Context, Result};
use tracing::warn;

use crate::host::Host;
use crate::prompt::confirm;
use crate::runner::shell_quote;

/// Clone the configuration repository, or offer to update an existing checkout.
pub fn ensure_repository(host: &mut Host) -> Result<()> {
    let dir = host.config.paths.install_dir.clone();
    let dir_arg = shell_quote(&dir.display().to_string());

    if dir.exists() {
        println!("✓ Configuration repository present at {}", dir.display());
        if confirm(host.prompt(), "Update it from the remote (git pull)?", false)? {
            match host.run(&format!("git -C {dir_arg} pull")) {
                Ok(()) => println!("✓ Repository updated"),
                Err(err) => {
                    warn!("git pull failed: {err}");
                    println!("⚠ Update failed, using the local copy");
                }
            }
        }
        return Ok(());
    }

    ensure_git(host)?;
    if let Some(parent) = dir.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    println!("Cloning {} ...", host.config.repo_url);
    let url = shell_quote(&host.config.repo_url);
    host.run(&format!("git clone {url} {dir_arg}"))
        .context("cloning the configuration repository")?;
    println!("✓ Repository cloned to {}", dir.display());
    Ok(())
}

fn ensure_git(host: &Host) -> Result<()> {
    if host.runner().succeeds("command -v git") {
        return Ok(());
    }
    println!("Installing git...");
    host.run("apt-get update && apt-get install -y git")
        .context("installing git")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallerConfig;
    use crate::test_support::{FakeRunner, ScriptedPrompt};
    use tempfile::tempdir;

    #[test]
    fn test_clones_when_missing() {
        let dir = tempdir().unwrap();
        let mut config = InstallerConfig::default();
        config.paths.install_dir = dir.path().join("docker-config");
        let runner = FakeRunner::new().fail_on("command -v git");
        let mut host = Host::new(config, Box::new(runner.clone()), Box::new(ScriptedPrompt::default()));

        ensure_repository(&mut host).unwrap();

        assert!(runner.ran("apt-get install -y git"));
        let clone = runner.position("git clone").unwrap();
        assert!(clone > runner.position("apt-get").unwrap());
        assert!(runner.commands()[clone].contains("https://github.com/triskeldes-cyber/stackschat"));
    }

    #[test]
    fn test_existing_checkout_pull_is_optional() {
        let dir = tempdir().unwrap();
        let mut config = InstallerConfig::default();
        config.paths.install_dir = dir.path().to_path_buf();
        let runner = FakeRunner::new();
        let prompt = ScriptedPrompt::new(["n", "y"]);
        let mut host = Host::new(config, Box::new(runner.clone()), Box::new(prompt));

        ensure_repository(&mut host).unwrap();
        assert!(runner.commands().is_empty());

        ensure_repository(&mut host).unwrap();
        assert!(runner.ran("pull"));
    }

    #[test]
    fn test_failed_pull_keeps_local_copy() {
        let dir = tempdir().unwrap();
        let mut config = InstallerConfig::default();
        config.paths.install_dir = dir.path().to_path_buf();
        let runner = FakeRunner::new().fail_on("pull");
        let mut host = Host::new(config, Box::new(runner), Box::new(ScriptedPrompt::new(["y"])));
        assert!(ensure_repository(&mut host).is_ok());
    }
}
