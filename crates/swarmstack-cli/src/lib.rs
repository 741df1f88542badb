//! # swarmstack
//!
//! Interactive installer for a Docker Swarm stack: Traefik, Portainer,
//! PostgreSQL with pgvector, Evolution API and Chatwoot.
//!
//! The state and dependency model lives in `swarmstack-core`; this crate
//! talks to the host (shell, terminal, Portainer API) and runs the menu.

pub mod backup;
pub mod bulk;
pub mod cli;
pub mod config;
pub mod drivers;
pub mod host;
pub mod menu;
pub mod orchestrator;
pub mod portainer;
pub mod prompt;
pub mod repo;
pub mod runner;
pub mod stack;

#[cfg(test)]
mod test_support;

pub use cli::Cli;
pub use config::InstallerConfig;
pub use host::Host;
pub use menu::Installer;
pub use orchestrator::Orchestrator;
