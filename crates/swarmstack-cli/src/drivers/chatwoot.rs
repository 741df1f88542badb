//! Chatwoot customer support, plus its database migration step.

use anyhow::{anyhow, Result};
use swarmstack_core::registry::CHATWOOT;
use swarmstack_core::secrets::{mask, secret_key_base};
use swarmstack_core::validators::{validate_domain, validate_email, validate_port};
use swarmstack_core::{Metadata, StateStore, TemplateVars};
use tracing::warn;

use super::{network, print_header, put, remove_stack_with_volumes, Driver, Removal, Teardown};
use crate::host::Host;
use crate::prompt::{ask_valid, ask_with_default, confirm};
use crate::runner::shell_quote;

const MIGRATE_TASK: &str = "bundle exec rails db:chatwoot_prepare";

pub fn driver() -> Driver {
    Driver {
        name: CHATWOOT,
        label: "Chatwoot",
        ready_timeout_secs: 90,
        install,
        uninstall,
        probe,
        post_install: Some(post_install),
    }
}

/// `example.com` for `chat.example.com`.
fn parent_domain(domain: &str) -> &str {
    domain.split_once('.').map(|(_, rest)| rest).unwrap_or("localhost")
}

fn install(host: &mut Host, store: &StateStore) -> Result<Metadata> {
    print_header("CHATWOOT");
    let network = network(host, store);
    let postgres_password = store
        .postgres_password()
        .ok_or_else(|| anyhow!("no PostgreSQL password recorded; reinstall PostgreSQL"))?
        .to_string();
    println!("PostgreSQL password recovered: {}", mask(&postgres_password, 8));
    let attempts = host.max_attempts();

    let company = ask_with_default(host.prompt(), "Company name", "My Company")?;
    let domain = ask_valid(
        host.prompt(),
        "Chatwoot domain (e.g. chat.example.com)",
        Some("chatwoot.localhost"),
        attempts,
        validate_domain,
    )?;

    println!("\nSMTP settings for outgoing mail, for example:");
    println!("  Gmail:    smtp.gmail.com, port 587, SSL off");
    println!("  Outlook:  smtp-mail.outlook.com, port 587, SSL off");
    println!("  SendGrid: smtp.sendgrid.net, port 587, SSL off");
    let email = ask_valid(host.prompt(), "Sender email", None, attempts, validate_email)?;
    let mail_domain = ask_with_default(host.prompt(), "Email domain", parent_domain(&domain))?;
    let smtp_host = ask_with_default(host.prompt(), "SMTP host", "smtp.gmail.com")?;
    let port = ask_valid(host.prompt(), "SMTP port", Some("587"), attempts, validate_port)?;
    let ssl = port == "465" || confirm(host.prompt(), "Use SSL?", false)?;
    let smtp_user = ask_with_default(host.prompt(), "SMTP user", &email)?;
    let smtp_password = host.prompt().secret("SMTP password: ")?;

    let secret = secret_key_base();
    println!("SECRET_KEY_BASE generated: {}", mask(&secret, 16));

    let mut vars = TemplateVars::new();
    for (key, value) in [
        ("NETWORK", network.as_str()),
        ("NOMBRE_EMPRESA", company.as_str()),
        ("URL_CHATWOOT", domain.as_str()),
        ("SECRET_KEY_BASE", secret.as_str()),
        ("EMAIL", email.as_str()),
        ("DOMINIO_EMAIL", mail_domain.as_str()),
        ("SMTP_ADDRESS", smtp_host.as_str()),
        ("PORT", port.as_str()),
        ("SSL", if ssl { "true" } else { "false" }),
        ("USUARIO", smtp_user.as_str()),
        ("SMTP_PASSWORD", smtp_password.as_str()),
        ("POSTGRES_PASSWORD", postgres_password.as_str()),
    ] {
        vars.insert(key.to_string(), value.to_string());
    }

    let template = host.template_path("chatwoot");
    let rendered = host.deploy_stack(store, "chatwoot", &template, &vars)?;

    let url = format!("https://{domain}");
    let mut meta = Metadata::new();
    put(&mut meta, "network", network);
    put(&mut meta, "domain", domain);
    put(&mut meta, "url", url);
    put(&mut meta, "company", company);
    put(&mut meta, "email", email);
    put(&mut meta, "database", "chatwoot");
    put(&mut meta, "secret_key_base", secret);
    put(&mut meta, "version", host.config.images.chatwoot.clone());
    put(&mut meta, "compose_path", rendered.display().to_string());
    Ok(meta)
}

fn post_install(host: &mut Host, store: &mut StateStore) -> Result<()> {
    if let Some(url) = store.get(CHATWOOT).and_then(|r| r.get_str("url")) {
        println!("\n✓ Chatwoot deployed at {url}");
    }
    println!("\nChatwoot must prepare its database before first use (several minutes).");
    if confirm(host.prompt(), "Run the database migrations now?", true)? {
        if run_migrations(host)? {
            record_migrated(store);
        }
    } else {
        print_manual_migration();
    }
    Ok(())
}

/// Mark the Chatwoot database as prepared.
pub fn record_migrated(store: &mut StateStore) {
    if let Err(err) = store.update_field(CHATWOOT, "migrated", true) {
        warn!("changes not saved: {err}");
    }
}

/// Run `db:chatwoot_prepare` inside the running app container.
///
/// Returns whether the migrations ran; on failure the manual steps are printed.
pub fn run_migrations(host: &Host) -> Result<bool> {
    let warmup = host.config.deploy.migration_warmup_secs;
    if warmup > 0 {
        println!("Waiting {warmup}s for Chatwoot to start...");
        host.sleep_secs(warmup);
    }

    let container = host
        .capture("docker ps --filter name=chatwoot_app --format '{{.ID}}'")
        .unwrap_or_default();
    let Some(container) = container.lines().map(str::trim).find(|l| !l.is_empty()) else {
        println!("✗ No running chatwoot_app container found");
        print_manual_migration();
        return Ok(false);
    };

    println!("Running migrations in {container} (this can take 5-10 minutes)...");
    match host.run(&format!("docker exec {} {MIGRATE_TASK}", shell_quote(container))) {
        Ok(()) => {
            println!("✓ Migrations finished, Chatwoot is ready");
            Ok(true)
        }
        Err(err) => {
            warn!("migrations failed: {err}");
            print_manual_migration();
            Ok(false)
        }
    }
}

fn print_manual_migration() {
    println!("\nTo run the migrations by hand:");
    println!("  docker exec -it $(docker ps -q --filter name=chatwoot_app | head -n1) sh");
    println!("  {MIGRATE_TASK}");
    println!("  exit");
}

fn uninstall(host: &mut Host, _store: &StateStore, teardown: Teardown) -> Result<Removal> {
    remove_stack_with_volumes(
        host,
        "chatwoot",
        "This removes Chatwoot with its conversations, contacts and settings.",
        teardown,
        &[
            "chatwoot_storage",
            "chatwoot_public",
            "chatwoot_mailer",
            "chatwoot_mailers",
            "chatwoot_redis",
        ],
    )
}

fn probe(host: &Host) -> bool {
    host.stack_running("chatwoot")
}
