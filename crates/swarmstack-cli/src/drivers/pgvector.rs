//! PostgreSQL 16 with the pgvector extension, shared by Evolution API and Chatwoot.

use anyhow::Result;
use swarmstack_core::registry::PGVECTOR;
use swarmstack_core::secrets::{generate_secret, mask, Charset, DEFAULT_SECRET_LEN};
use swarmstack_core::{Metadata, StateStore, TemplateVars};

use super::{network, print_header, put, Driver, Removal, Teardown};
use crate::host::Host;
use crate::prompt::{confirm, confirm_phrase};

/// Phrase the operator must type before the database is destroyed.
pub const DESTROY_PHRASE: &str = "DELETE EVERYTHING";

pub fn driver() -> Driver {
    Driver {
        name: PGVECTOR,
        label: "PostgreSQL",
        ready_timeout_secs: 60,
        install,
        uninstall,
        probe,
        post_install: None,
    }
}

fn install(host: &mut Host, store: &StateStore) -> Result<Metadata> {
    print_header("POSTGRESQL + PGVECTOR");
    let network = network(host, store);

    // the data volume keeps the password it was created with
    let password = match store.postgres_password() {
        Some(existing) => {
            println!("Reusing the database password recorded for the existing volume.");
            existing.to_string()
        }
        None => generate_secret(DEFAULT_SECRET_LEN, Charset::Alphanumeric),
    };
    println!("Database password: {}", mask(&password, 8));

    let mut vars = TemplateVars::new();
    vars.insert("NETWORK".into(), network.clone());
    vars.insert("POSTGRES_PASSWORD".into(), password.clone());

    let template = host.template_path("pgvector");
    let rendered = host.deploy_stack(store, "pgvector", &template, &vars)?;

    println!("\nHost: pgvector:5432  User: postgres");
    println!("Evolution API and Chatwoot create their own databases on first start.");

    let mut meta = Metadata::new();
    put(&mut meta, "network", network);
    put(&mut meta, "password", password);
    put(&mut meta, "host", "pgvector");
    put(&mut meta, "port", 5432);
    put(&mut meta, "user", "postgres");
    put(&mut meta, "version", host.config.images.postgres.clone());
    put(&mut meta, "compose_path", rendered.display().to_string());
    Ok(meta)
}

fn uninstall(host: &mut Host, _store: &StateStore, teardown: Teardown) -> Result<Removal> {
    if teardown == Teardown::Reinstall {
        host.remove_stack("pgvector")?;
        return Ok(Removal::Removed);
    }

    println!("\n⚠ CRITICAL: this removes PostgreSQL and EVERY database on it.");
    println!("  Evolution API and Chatwoot lose all their data. This cannot be undone.");
    if !confirm(host.prompt(), "Are you SURE?", false)? {
        return Ok(Removal::Declined);
    }
    if !confirm_phrase(host.prompt(), DESTROY_PHRASE)? {
        println!("✗ Confirmation did not match, nothing removed");
        return Ok(Removal::Declined);
    }

    host.remove_stack("pgvector")?;
    if confirm(host.prompt(), "Also remove the pgvector data volume?", false)? {
        if let Err(err) = host.run("docker volume rm pgvector") {
            println!("⚠ Could not remove volume pgvector: {err}");
        }
    } else {
        println!("The pgvector volume keeps the current password; a fresh install generates a new one.");
    }
    println!("✓ PostgreSQL removed");
    Ok(Removal::Removed)
}

fn probe(host: &Host) -> bool {
    host.stack_running("pgvector")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::tests::{test_host, write_template};
    use crate::test_support::{FakeRunner, ScriptedPrompt};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_fresh_install_generates_password() {
        let dir = tempdir().unwrap();
        write_template(dir.path(), "pgvector", "pw: ${POSTGRES_PASSWORD}\n");
        let mut host = test_host(dir.path(), FakeRunner::new(), ScriptedPrompt::default());
        let store = StateStore::open(dir.path().join("state.json"));

        let meta = install(&mut host, &store).unwrap();
        let password = meta["password"].as_str().unwrap();
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(meta["port"], 5432);
        assert_eq!(meta["version"], "pgvector/pgvector:pg16");
    }

    #[test]
    fn test_reinstall_keeps_existing_password() {
        let dir = tempdir().unwrap();
        write_template(dir.path(), "pgvector", "pw: ${POSTGRES_PASSWORD}\n");
        let mut host = test_host(dir.path(), FakeRunner::new(), ScriptedPrompt::default());
        let mut store = StateStore::open(dir.path().join("state.json"));
        let mut old = Metadata::new();
        old.insert("password".into(), json!("kept-secret"));
        store.set(PGVECTOR, old).unwrap();

        let meta = install(&mut host, &store).unwrap();
        assert_eq!(meta["password"], "kept-secret");
    }

    #[test]
    fn test_uninstall_requires_typed_phrase() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let mut host = test_host(dir.path(), runner.clone(), ScriptedPrompt::new(["y", "delete"]));
        let store = StateStore::open(dir.path().join("state.json"));

        let removal = uninstall(&mut host, &store, Teardown::Uninstall).unwrap();
        assert_eq!(removal, Removal::Declined);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_uninstall_with_phrase_and_volume() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let prompt = ScriptedPrompt::new(["y", DESTROY_PHRASE, "y"]);
        let mut host = test_host(dir.path(), runner.clone(), prompt);
        let store = StateStore::open(dir.path().join("state.json"));

        let removal = uninstall(&mut host, &store, Teardown::Uninstall).unwrap();
        assert_eq!(removal, Removal::Removed);
        assert_eq!(
            runner.commands(),
            vec!["docker stack rm pgvector", "docker volume rm pgvector"]
        );
    }
}
