//! Docker engine, Swarm mode, the shared overlay network and base volumes.

use std::net::IpAddr;

use anyhow::{bail, Context, Result};
use swarmstack_core::registry::PREREQUISITES;
use swarmstack_core::validators::{validate_ip, validate_network_name};
use swarmstack_core::{Metadata, StateStore};
use tracing::{debug, warn};

use super::{print_header, put, Cancelled, Driver, Removal, Teardown};
use crate::host::Host;
use crate::prompt::{ask_valid, confirm};
use crate::runner::shell_quote;

/// Volumes the stacks expect to exist as external volumes.
pub const BASE_VOLUMES: &[&str] = &[
    "volume_swarm_certificates",
    "pgvector",
    "portainer_data",
    "evolution_instances",
    "evolution_redis",
    "chatwoot_storage",
    "chatwoot_public",
    "chatwoot_mailer",
    "chatwoot_mailers",
    "chatwoot_redis",
];

const DOCKER_INSTALL_STEPS: &[&str] = &[
    "apt-get update",
    "apt-get install -y ca-certificates curl gnupg apt-transport-https software-properties-common lsb-release apache2-utils",
    "install -m 0755 -d /etc/apt/keyrings",
    "curl -fsSL https://download.docker.com/linux/ubuntu/gpg | gpg --dearmor --yes -o /etc/apt/keyrings/docker.gpg",
    "chmod a+r /etc/apt/keyrings/docker.gpg",
    "echo \"deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable\" > /etc/apt/sources.list.d/docker.list",
    "apt-get update",
    "apt-get install -y docker-ce docker-ce-cli containerd.io docker-compose-plugin",
];

const DOCKER_PURGE_STEPS: &[&str] = &[
    "docker swarm leave --force",
    "systemctl stop docker.socket",
    "systemctl stop docker",
    "apt-get purge -y docker-ce docker-ce-cli containerd.io docker-compose-plugin docker-buildx-plugin",
    "apt-get autoremove -y --purge",
    "rm -rf /var/lib/docker /var/lib/containerd /etc/docker",
];

const PUBLIC_IP_SOURCES: &[&str] = &["https://ifconfig.me", "https://api.ipify.org"];

pub fn driver() -> Driver {
    Driver {
        name: PREREQUISITES,
        label: "Prerequisites",
        ready_timeout_secs: 0,
        install,
        uninstall,
        probe,
        post_install: None,
    }
}

fn install(host: &mut Host, _store: &StateStore) -> Result<Metadata> {
    print_header("PREREQUISITES (Docker + Swarm + network)");
    println!("This will install Docker Engine, initialise Swarm mode,");
    println!("create the overlay network and the base volumes.");

    let network = host.config.network.clone();
    if !validate_network_name(&network) {
        bail!("invalid network name in configuration: {network}");
    }

    if !confirm(host.prompt(), "Continue?", true)? {
        return Err(Cancelled("prerequisites install".into()).into());
    }

    install_docker(host)?;
    let swarm_ip = init_swarm(host)?;
    create_network(host, &network)?;
    create_volumes(host);

    let mut meta = Metadata::new();
    put(&mut meta, "docker_installed", true);
    put(&mut meta, "swarm_initialized", true);
    put(&mut meta, "network", network);
    if let Some(ip) = swarm_ip {
        put(&mut meta, "swarm_ip", ip);
    }
    Ok(meta)
}

fn install_docker(host: &mut Host) -> Result<()> {
    println!("\n[1/4] Docker Engine");
    if host.runner().succeeds("command -v docker") {
        let version = host.capture("docker --version").unwrap_or_default();
        println!("✓ Docker already installed: {version}");
        if !confirm(host.prompt(), "Reinstall Docker?", false)? {
            return Ok(());
        }
    }

    for step in DOCKER_INSTALL_STEPS {
        host.run(step).context("installing Docker")?;
    }
    let version = host.capture("docker --version").unwrap_or_default();
    println!("✓ Docker installed: {version}");
    Ok(())
}

fn swarm_active(host: &Host) -> bool {
    host.capture("docker info --format '{{.Swarm.LocalNodeState}}'")
        .map(|state| state.trim().eq_ignore_ascii_case("active"))
        .unwrap_or(false)
}

/// Returns the advertise address the swarm runs on.
fn init_swarm(host: &mut Host) -> Result<Option<String>> {
    println!("\n[2/4] Docker Swarm");
    if swarm_active(host) {
        println!("✓ Swarm is already active");
        if !confirm(host.prompt(), "Re-initialise Swarm?", false)? {
            let addr = host
                .capture("docker info --format '{{.Swarm.NodeAddr}}'")
                .ok()
                .filter(|a| validate_ip(a));
            return Ok(addr);
        }
        host.run("docker swarm leave --force")?;
    }

    let ip = choose_advertise_ip(host)?;
    host.run(&format!("docker swarm init --advertise-addr {}", shell_quote(&ip)))
        .context("initialising Swarm")?;
    println!("✓ Swarm initialised on {ip}");
    Ok(Some(ip))
}

fn detect_public_ip(host: &Host) -> Option<String> {
    for source in PUBLIC_IP_SOURCES {
        match host.capture(&format!("curl -fsS --max-time 5 {source}")) {
            Ok(ip) if validate_ip(ip.trim()) => return Some(ip.trim().to_string()),
            Ok(other) => debug!("{source} returned {other:?}"),
            Err(err) => debug!("{source} failed: {err}"),
        }
    }
    None
}

fn is_private(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback(),
        Err(_) => false,
    }
}

fn choose_advertise_ip(host: &mut Host) -> Result<String> {
    let attempts = host.max_attempts();
    let mut detected = detect_public_ip(host);

    if let Some(ip) = detected.clone() {
        if is_private(&ip) {
            println!("⚠ Detected a private address: {ip}");
            println!("  Multi-node swarms need an address the other nodes can reach.");
            if !confirm(host.prompt(), "Use it anyway?", false)? {
                detected = None;
            }
        }
    }

    let ip = match detected {
        Some(ip) => {
            println!("Detected IP: {ip}");
            if confirm(host.prompt(), "Is this address correct?", true)? {
                ip
            } else {
                ask_valid(host.prompt(), "Server public IP", None, attempts, validate_ip)?
            }
        }
        None => ask_valid(host.prompt(), "Server public IP", None, attempts, validate_ip)?,
    };
    Ok(ip)
}

fn create_network(host: &Host, network: &str) -> Result<()> {
    println!("\n[3/4] Overlay network {network}");
    let existing = host
        .capture("docker network ls --format '{{.Name}}'")
        .unwrap_or_default();
    if existing.lines().any(|line| line.trim() == network) {
        println!("✓ Network {network} already exists");
        return Ok(());
    }
    host.run(&format!(
        "docker network create --driver overlay --attachable {}",
        shell_quote(network)
    ))
    .with_context(|| format!("creating network {network}"))?;
    println!("✓ Network {network} created");
    Ok(())
}

fn create_volumes(host: &Host) {
    println!("\n[4/4] Base volumes");
    let (mut created, mut existing) = (0, 0);
    for volume in BASE_VOLUMES {
        if host.runner().succeeds(&format!("docker volume inspect {volume}")) {
            existing += 1;
            println!("  ✓ {volume} (exists)");
        } else if host.run(&format!("docker volume create {volume}")).is_ok() {
            created += 1;
            println!("  ✓ {volume} (created)");
        } else {
            warn!("could not create volume {volume}");
            println!("  ✗ {volume} (error)");
        }
    }
    println!("{created} created, {existing} already present");
}

fn uninstall(host: &mut Host, _store: &StateStore, teardown: Teardown) -> Result<Removal> {
    // reinstall reruns the (idempotent) install steps on top of what exists
    if teardown == Teardown::Reinstall {
        return Ok(Removal::Removed);
    }

    println!("\n⚠ This removes Docker, leaves the Swarm and deletes every container and volume.");
    if !confirm(host.prompt(), "Are you SURE?", false)? {
        return Ok(Removal::Declined);
    }

    for step in DOCKER_PURGE_STEPS {
        if let Err(err) = host.run(step) {
            warn!("{err}");
        }
    }
    println!("✓ Docker removed");
    Ok(Removal::Removed)
}

fn probe(host: &Host) -> bool {
    if !host.runner().succeeds("command -v docker") || !swarm_active(host) {
        return false;
    }
    host.capture("docker network ls --format '{{.Name}}'")
        .map(|out| out.lines().any(|l| l.trim() == host.config.network))
        .unwrap_or(false)
}
