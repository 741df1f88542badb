//! Per-component install and uninstall procedures.
//!
//! A driver produces the component's metadata; it never writes the state
//! store. The orchestrator records what a successful install returns.

use anyhow::Result;
use serde_json::Value;
use swarmstack_core::{Metadata, StateStore};
use thiserror::Error;

use crate::host::Host;
use crate::prompt::confirm;

pub mod chatwoot;
pub mod evolution;
pub mod pgvector;
pub mod portainer;
pub mod prerequisites;
pub mod traefik;

pub type InstallFn = fn(&mut Host, &StateStore) -> Result<Metadata>;
pub type UninstallFn = fn(&mut Host, &StateStore, Teardown) -> Result<Removal>;
pub type ProbeFn = fn(&Host) -> bool;
pub type PostInstallFn = fn(&mut Host, &mut StateStore) -> Result<()>;

/// Why a component is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Operator asked for removal; ask before destroying anything.
    Uninstall,
    /// First half of a reinstall; already confirmed.
    Reinstall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// The operator backed out; nothing was removed.
    Declined,
}

/// The operator abandoned an install part way through.
#[derive(Debug, Error)]
#[error("cancelled: {0}")]
pub struct Cancelled(pub String);

#[derive(Clone, Copy)]
pub struct Driver {
    pub name: &'static str,
    pub label: &'static str,
    /// Seconds to wait for the stack to report `Running`.
    pub ready_timeout_secs: u64,
    pub install: InstallFn,
    pub uninstall: UninstallFn,
    /// Whether the component is actually running on the host.
    pub probe: ProbeFn,
    pub post_install: Option<PostInstallFn>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver").field("name", &self.name).finish()
    }
}

/// Drivers keyed by component name.
pub struct DriverTable {
    drivers: Vec<Driver>,
}

impl DriverTable {
    pub fn builtin() -> Self {
        Self::new(vec![
            prerequisites::driver(),
            traefik::driver(),
            portainer::driver(),
            pgvector::driver(),
            evolution::driver(),
            chatwoot::driver(),
        ])
    }

    pub fn new(drivers: Vec<Driver>) -> Self {
        Self { drivers }
    }

    pub fn get(&self, name: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.name == name)
    }
}

/// Overlay network recorded by the prerequisites install, else the configured one.
pub(crate) fn network(host: &Host, store: &StateStore) -> String {
    store
        .network_name()
        .map(String::from)
        .unwrap_or_else(|| host.config.network.clone())
}

pub(crate) fn put(meta: &mut Metadata, key: &str, value: impl Into<Value>) {
    meta.insert(key.to_string(), value.into());
}

pub(crate) fn print_header(title: &str) {
    println!("\n{}", "═".repeat(60));
    println!("{title}");
    println!("{}", "═".repeat(60));
}

/// Shared stack teardown: confirm (unless reinstalling), remove the stack,
/// then optionally drop the listed volumes.
pub(crate) fn remove_stack_with_volumes(
    host: &mut Host,
    stack: &str,
    warning: &str,
    teardown: Teardown,
    volumes: &[&str],
) -> Result<Removal> {
    if teardown == Teardown::Uninstall {
        println!("\n⚠ {warning}");
        if !confirm(host.prompt(), "Continue?", false)? {
            return Ok(Removal::Declined);
        }
    }

    host.remove_stack(stack)?;
    println!("✓ Stack {stack} removed");

    if teardown == Teardown::Uninstall
        && !volumes.is_empty()
        && confirm(host.prompt(), "Also remove the data volumes?", false)?
    {
        for volume in volumes {
            if let Err(err) = host.run(&format!("docker volume rm {volume}")) {
                println!("⚠ Could not remove volume {volume}: {err}");
            }
        }
    }
    Ok(Removal::Removed)
}
