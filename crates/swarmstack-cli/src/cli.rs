use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Path to the installer configuration (TOML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the installation state file
    #[arg(long, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Skip the root privilege check
    #[arg(long)]
    pub no_root_check: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}
