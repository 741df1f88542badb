//! Portainer container management UI.

use anyhow::{anyhow, Context, Result};
use swarmstack_core::registry::PORTAINER;
use swarmstack_core::validators::validate_domain;
use swarmstack_core::{Metadata, StateStore, TemplateVars};

use super::{network, print_header, put, remove_stack_with_volumes, Driver, Removal, Teardown};
use crate::host::Host;
use crate::prompt::{ask_secure_password, ask_valid};
use crate::runner::shell_quote;

pub fn driver() -> Driver {
    Driver {
        name: PORTAINER,
        label: "Portainer",
        ready_timeout_secs: 45,
        install,
        uninstall,
        probe,
        post_install: None,
    }
}

/// bcrypt hash of `password` for the `admin` user, `$`-escaped for compose files.
fn password_hash(host: &Host, password: &str) -> Result<String> {
    let line = host
        .capture(&format!("htpasswd -nbB admin {}", shell_quote(password)))
        .context("hashing the admin password (is apache2-utils installed?)")?;
    let (_, hash) = line
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow!("unexpected htpasswd output"))?;
    Ok(escape_dollars(hash))
}

fn escape_dollars(hash: &str) -> String {
    hash.replace('$', "$$")
}

fn install(host: &mut Host, store: &StateStore) -> Result<Metadata> {
    print_header("PORTAINER");
    let network = network(host, store);
    let attempts = host.max_attempts();

    let domain = ask_valid(
        host.prompt(),
        "Portainer domain (e.g. portainer.example.com)",
        Some("portainer.localhost"),
        attempts,
        validate_domain,
    )?;
    let password = ask_secure_password(host.prompt(), "Portainer admin password", attempts)?;
    let hash = password_hash(host, &password)?;

    let mut vars = TemplateVars::new();
    vars.insert("NETWORK".into(), network.clone());
    vars.insert("PORTAINER_DOMAIN".into(), domain.clone());
    vars.insert("PORTAINER_PASSWORD_HASH".into(), hash);

    let template = host.template_path("portainer");
    let rendered = host.deploy_stack(store, "portainer", &template, &vars)?;

    let url = format!("https://{domain}");
    println!("\nURL:      {url}");
    println!("User:     admin");
    println!("Password: (the one you just entered)");

    let mut meta = Metadata::new();
    put(&mut meta, "network", network);
    put(&mut meta, "domain", domain);
    put(&mut meta, "url", url);
    put(&mut meta, "username", "admin");
    put(&mut meta, "version", host.config.images.portainer.clone());
    put(&mut meta, "compose_path", rendered.display().to_string());
    Ok(meta)
}

fn uninstall(host: &mut Host, _store: &StateStore, teardown: Teardown) -> Result<Removal> {
    remove_stack_with_volumes(
        host,
        "portainer",
        "This removes Portainer and its configuration.",
        teardown,
        &["portainer_data"],
    )
}

fn probe(host: &Host) -> bool {
    host.stack_running("portainer")
}
