//! Whole-stack operations: quick start and full reset.

use std::path::PathBuf;

use anyhow::{Context, Result};
use swarmstack_core::registry::{CHATWOOT, EVOLUTION, PORTAINER};
use swarmstack_core::{CredentialReport, StateStore};
use tracing::{info, warn};

use crate::drivers::print_header;
use crate::host::Host;
use crate::orchestrator::{InstallOutcome, Orchestrator};
use crate::prompt::{confirm, confirm_phrase, pause};
use crate::repo::ensure_repository;

/// Phrase the operator types to confirm a full reset.
pub const RESET_PHRASE: &str = "FULL RESET";

/// Install every component in order.
///
/// Returns one outcome per attempted component; empty if the operator backed out.
pub fn quick_start(
    orch: &Orchestrator,
    host: &mut Host,
    store: &mut StateStore,
) -> Result<Vec<(&'static str, InstallOutcome)>> {
    print_header("QUICK START");
    let order = orch.registry().install_order().to_vec();
    println!("Components, in order:");
    for (i, name) in order.iter().enumerate() {
        let description = orch.registry().get(name).map(|s| s.description).unwrap_or("");
        println!("  {}. {:<14} {description}", i + 1, orch.label(name));
    }
    println!("\nExpect 10 to 20 minutes; some steps ask questions.");
    if !confirm(host.prompt(), "Start the full installation?", true)? {
        println!("Quick start cancelled");
        return Ok(Vec::new());
    }

    ensure_repository(host).context("preparing the configuration repository")?;

    let total = order.len();
    let mut outcomes = Vec::with_capacity(total);
    for (i, name) in order.into_iter().enumerate() {
        print_header(&format!("STEP {}/{total}: {}", i + 1, orch.label(name)));
        let outcome = orch.install(host, store, name)?;
        let failed = matches!(outcome, InstallOutcome::Failed | InstallOutcome::Refused { .. });
        outcomes.push((name, outcome));

        let last = i + 1 == total;
        if failed
            && !last
            && !confirm(host.prompt(), "Continue with the next component?", true)?
        {
            break;
        }
        if !last {
            pause(host.prompt())?;
        }
    }

    info!(
        installed = outcomes.iter().filter(|(_, o)| o.is_installed()).count(),
        attempted = outcomes.len(),
        "quick start finished"
    );
    print_final_summary(store);
    match write_credentials(host, store) {
        Ok(path) => println!("✓ Credentials written to {}", path.display()),
        Err(err) => warn!("could not write credentials: {err:#}"),
    }
    Ok(outcomes)
}

fn print_final_summary(store: &StateStore) {
    println!("\n╔{}╗", "═".repeat(58));
    println!("║{:^58}║", "INSTALLATION FINISHED");
    println!("╚{}╝", "═".repeat(58));

    println!("\nAccess:");
    for (name, label) in [
        (PORTAINER, "Portainer"),
        (EVOLUTION, "Evolution API"),
        (CHATWOOT, "Chatwoot"),
    ] {
        if let Some(url) = store.get(name).and_then(|r| r.get_str("url")) {
            println!("  {label}: {url}");
        }
    }
    println!("\nFull credentials: menu option 9");
    println!("TLS certificates can take a minute or two to be issued.");
}

/// Regenerate the credential report from the state store.
pub fn write_credentials(host: &Host, store: &StateStore) -> Result<PathBuf> {
    let path = host.config.paths.credentials_file.clone();
    CredentialReport::from_state(store)
        .write_to(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("credentials written to {}", path.display());
    Ok(path)
}

/// Remove every installed component in reverse install order, then forget
/// the state file. Returns whether the reset went ahead.
pub fn reset(orch: &Orchestrator, host: &mut Host, store: &mut StateStore) -> Result<bool> {
    print_header("FULL RESET");
    println!("⚠ This removes EVERY installed component:");
    println!("  stacks, data volumes, the Swarm, the overlay network and Docker itself.");
    println!("  It cannot be undone.");

    if !confirm(host.prompt(), "Are you ABSOLUTELY sure?", false)? {
        println!("Reset cancelled");
        return Ok(false);
    }
    if !confirm_phrase(host.prompt(), RESET_PHRASE)? {
        println!("✗ Confirmation did not match, reset cancelled");
        return Ok(false);
    }

    for name in orch.registry().removal_order() {
        if !store.is_installed(name) {
            continue;
        }
        println!("\nRemoving {}...", orch.label(name));
        orch.uninstall(host, store, name)?;
    }

    if let Err(err) = store.clear() {
        warn!("changes not saved: {err}");
    }
    println!("\n✓ Reset finished; the host is ready for a fresh installation");
    Ok(true)
}
