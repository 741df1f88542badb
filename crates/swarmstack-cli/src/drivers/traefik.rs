//! Traefik reverse proxy with Let's Encrypt certificates.

use anyhow::Result;
use swarmstack_core::registry::TRAEFIK;
use swarmstack_core::validators::validate_email;
use swarmstack_core::{Metadata, StateStore, TemplateVars};

use super::{network, print_header, put, remove_stack_with_volumes, Driver, Removal, Teardown};
use crate::host::Host;
use crate::prompt::ask_valid;

pub fn driver() -> Driver {
    Driver {
        name: TRAEFIK,
        label: "Traefik",
        ready_timeout_secs: 30,
        install,
        uninstall,
        probe,
        post_install: None,
    }
}

fn install(host: &mut Host, store: &StateStore) -> Result<Metadata> {
    print_header("TRAEFIK");
    let network = network(host, store);
    let attempts = host.max_attempts();

    println!("Let's Encrypt needs a valid email address for certificate notices.");
    let email = ask_valid(
        host.prompt(),
        "Email for TLS certificates",
        None,
        attempts,
        validate_email,
    )?;

    let mut vars = TemplateVars::new();
    vars.insert("NETWORK".into(), network.clone());
    vars.insert("EMAIL".into(), email.clone());

    let template = host.template_path("traefik");
    let rendered = host.deploy_stack(store, "traefik", &template, &vars)?;

    println!("\nTLS email: {email}");
    println!("Network:   {network}");
    println!("Certificates can take a minute or two; ports 80 and 443 must be open.");

    let mut meta = Metadata::new();
    put(&mut meta, "network", network);
    put(&mut meta, "email", email);
    put(&mut meta, "version", host.config.images.traefik.clone());
    put(&mut meta, "compose_path", rendered.display().to_string());
    Ok(meta)
}

fn uninstall(host: &mut Host, _store: &StateStore, teardown: Teardown) -> Result<Removal> {
    remove_stack_with_volumes(
        host,
        "traefik",
        "This removes Traefik; every published service loses its route and TLS.",
        teardown,
        &[],
    )
}

fn probe(host: &Host) -> bool {
    host.stack_running("traefik")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::tests::{store_with_base, test_host, write_template};
    use crate::test_support::{FakeRunner, ScriptedPrompt};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_install_renders_and_records_email() {
        let dir = tempdir().unwrap();
        write_template(dir.path(), "traefik", "network: ${NETWORK}\nemail: ${EMAIL}\n");
        let runner = FakeRunner::new();
        let prompt = ScriptedPrompt::new(["not-an-email", "ops@example.com"]);
        let mut host = test_host(dir.path(), runner.clone(), prompt);
        let store = store_with_base(dir.path());

        let meta = install(&mut host, &store).unwrap();

        assert_eq!(meta["email"], "ops@example.com");
        assert_eq!(meta["network"], "EdgeNet");
        let rendered = fs::read_to_string(meta["compose_path"].as_str().unwrap()).unwrap();
        assert_eq!(rendered, "network: EdgeNet\nemail: ops@example.com\n");
        assert!(runner.ran("docker stack deploy"));
    }

    #[test]
    fn test_missing_template_fails_without_deploying() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let mut host = test_host(dir.path(), runner.clone(), ScriptedPrompt::new(["ops@example.com"]));
        let store = store_with_base(dir.path());

        assert!(install(&mut host, &store).is_err());
        assert!(!runner.ran("docker stack deploy"));
    }
}
