//! Drives component lifecycle transitions against the state store.
//!
//! Drivers never touch the store; the orchestrator records what a successful
//! install returns, brackets every transition with a pending marker, and turns
//! driver failures into outcomes instead of errors.

use anyhow::{anyhow, Result};
use swarmstack_core::{Lifecycle, Registry, RegistryError, StateStore, TransitionPhase};
use tracing::{error, info, warn};

use crate::drivers::{Driver, DriverTable, Removal, Teardown};
use crate::host::Host;
use crate::prompt::confirm;
use crate::stack::WaitOutcome;

/// What happened to an install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Recorded as installed; `timed_out` when the stack never reported running.
    Installed { timed_out: bool },
    /// Dependencies missing, in declaration order.
    Refused { missing: Vec<&'static str> },
    /// Already installed and the operator declined a reinstall.
    Skipped,
    Failed,
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallOutcome::Installed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    Removed,
    /// Declined or failed; the record stays.
    Kept,
    NotInstalled,
}

/// Log a persistence failure and carry on.
fn persist<T>(result: Result<T, swarmstack_core::StateError>) {
    if let Err(err) = result {
        warn!("changes not saved: {err}");
    }
}

pub struct Orchestrator {
    registry: Registry,
    drivers: DriverTable,
}

impl Orchestrator {
    pub fn new(registry: Registry, drivers: DriverTable) -> Self {
        Self { registry, drivers }
    }

    pub fn builtin() -> Self {
        Self::new(Registry::builtin(), DriverTable::builtin())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn driver(&self, name: &str) -> Result<&Driver> {
        self.drivers
            .get(name)
            .ok_or_else(|| anyhow!(RegistryError::UnknownComponent(name.to_string())))
    }

    /// Display name of `name`, falling back to the name itself.
    pub fn label<'a>(&'a self, name: &'a str) -> &'a str {
        self.drivers.get(name).map(|d| d.label).unwrap_or(name)
    }

    /// Install `name`, offering a reinstall when it is already installed.
    ///
    /// Errors are reserved for unknown components and closed input; driver
    /// failures come back as [`InstallOutcome::Failed`].
    pub fn install(
        &self,
        host: &mut Host,
        store: &mut StateStore,
        name: &str,
    ) -> Result<InstallOutcome> {
        let spec = *self
            .registry
            .get(name)
            .ok_or_else(|| RegistryError::UnknownComponent(name.to_string()))?;
        let driver = *self.driver(name)?;

        let check = self.registry.check_dependencies(name, store)?;
        if !check.is_satisfied() {
            println!(
                "✗ {} needs these installed first: {}",
                driver.label,
                check.missing.join(", ")
            );
            return Ok(InstallOutcome::Refused {
                missing: check.missing,
            });
        }

        if let Some(op) = store.pending(name) {
            warn!(
                "{name}: previous {:?} started at {} never finished",
                op.phase, op.started_at
            );
        }

        let mut state = if store.is_installed(name) {
            Lifecycle::Installed
        } else {
            Lifecycle::NotInstalled
        };

        if state == Lifecycle::Installed {
            println!("✓ {} is already installed", driver.label);
            if !confirm(host.prompt(), &format!("Reinstall {}?", driver.label), false)? {
                return Ok(InstallOutcome::Skipped);
            }
            state = state.transition(Lifecycle::Reinstalling)?;
            persist(store.begin(name, TransitionPhase::Reinstalling));
            info!("{name}: removing before reinstall");
            if let Err(err) = (driver.uninstall)(host, store, Teardown::Reinstall) {
                error!("{name}: teardown before reinstall failed: {err:#}");
                println!("✗ Could not remove {} for reinstall: {err:#}", driver.label);
                persist(store.finish(name));
                state.transition(Lifecycle::Installed)?;
                return Ok(InstallOutcome::Failed);
            }
        }

        state = state.transition(Lifecycle::Installing)?;
        persist(store.begin(name, TransitionPhase::Installing));
        info!("{name}: installing");

        let metadata = match (driver.install)(host, store) {
            Ok(metadata) => metadata,
            Err(err) => {
                error!("{name}: install failed: {err:#}");
                println!("\n✗ {} installation failed: {err:#}", driver.label);
                // a reinstall already tore the old deployment down
                if store.get(name).is_some() {
                    persist(store.remove(name));
                }
                persist(store.finish(name));
                state.transition(Lifecycle::NotInstalled)?;
                return Ok(InstallOutcome::Failed);
            }
        };

        let mut timed_out = false;
        if let Some(stack) = spec.stack {
            if host.wait_for_stack(stack, driver.ready_timeout_secs) == WaitOutcome::TimedOut {
                timed_out = true;
                warn!("{name}: stack {stack} not running before the timeout");
                println!("⚠ {stack} is not running yet; review it with: docker stack ps {stack}");
            }
        }

        persist(store.set(name, metadata));
        persist(store.finish(name));
        state.transition(Lifecycle::Installed)?;
        println!("✓ {} installed", driver.label);

        if let Some(post_install) = driver.post_install {
            if let Err(err) = post_install(host, store) {
                warn!("{name}: post-install step failed: {err:#}");
            }
        }
        Ok(InstallOutcome::Installed { timed_out })
    }

    /// Tear `name` down and forget it. Installed dependents are only warned about.
    pub fn uninstall(
        &self,
        host: &mut Host,
        store: &mut StateStore,
        name: &str,
    ) -> Result<UninstallOutcome> {
        let driver = *self.driver(name)?;
        if !store.is_installed(name) {
            println!("{} is not installed", driver.label);
            return Ok(UninstallOutcome::NotInstalled);
        }
        let state = Lifecycle::Installed.transition(Lifecycle::Uninstalling)?;

        let dependents: Vec<&str> = self
            .registry
            .dependents(name)
            .into_iter()
            .filter(|d| store.is_installed(d))
            .collect();
        if !dependents.is_empty() {
            println!(
                "⚠ Still installed and depending on {}: {}",
                driver.label,
                dependents.join(", ")
            );
        }

        persist(store.begin(name, TransitionPhase::Uninstalling));
        let outcome = match (driver.uninstall)(host, store, Teardown::Uninstall) {
            Ok(Removal::Removed) => {
                persist(store.remove(name));
                state.transition(Lifecycle::NotInstalled)?;
                info!("{name}: uninstalled");
                UninstallOutcome::Removed
            }
            Ok(Removal::Declined) => {
                println!("Nothing removed");
                state.transition(Lifecycle::Installed)?;
                UninstallOutcome::Kept
            }
            Err(err) => {
                error!("{name}: uninstall failed: {err:#}");
                println!("✗ Could not remove {}: {err:#}", driver.label);
                state.transition(Lifecycle::Installed)?;
                UninstallOutcome::Kept
            }
        };
        persist(store.finish(name));
        Ok(outcome)
    }
}
