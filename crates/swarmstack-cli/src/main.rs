use anyhow::{bail, Context, Result};
use clap::Parser;
use swarmstack_cli::prompt::TerminalPrompt;
use swarmstack_cli::runner::ShellRunner;
use swarmstack_cli::{Cli, Host, Installer, InstallerConfig, Orchestrator};
use swarmstack_core::StateStore;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let mut config = InstallerConfig::load(cli.config.as_deref())?;
    if let Some(state_file) = cli.state_file {
        config.paths.state_file = state_file;
    }

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    if config.require_root && !cli.no_root_check && !is_root() {
        bail!("this installer must run as root (try sudo, or pass --no-root-check)");
    }

    let orch = Orchestrator::builtin();
    orch.registry()
        .validate()
        .context("component registry is inconsistent")?;

    let store = StateStore::open(&config.paths.state_file);
    debug!("state file {}", store.path().display());
    info!(
        installed = store.list_installed().len(),
        "swarmstack {} starting",
        env!("CARGO_PKG_VERSION")
    );

    let host = Host::new(config, Box::new(ShellRunner), Box::new(TerminalPrompt));
    Installer::new(orch, host, store).run()
}
