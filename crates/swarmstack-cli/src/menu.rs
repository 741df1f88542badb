//! The numbered interactive menu.

use std::fs;
use std::io::Write;

use anyhow::Result;
use swarmstack_core::registry::{
    CHATWOOT, EVOLUTION, PGVECTOR, PORTAINER, PREREQUISITES, TRAEFIK,
};
use swarmstack_core::{CredentialReport, Lifecycle, StateStore};
use tabwriter::TabWriter;
use tracing::error;

use crate::backup;
use crate::bulk;
use crate::drivers::{chatwoot, print_header};
use crate::host::Host;
use crate::orchestrator::{Orchestrator, UninstallOutcome};
use crate::prompt::{confirm, pause, PromptError};
use crate::repo::ensure_repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    QuickStart,
    Install(&'static str),
    Status,
    Credentials,
    Migrations,
    RemoveStack,
    Backup,
    Reset,
    Exit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        let choice = match input.trim() {
            "0" => MenuChoice::Exit,
            "1" => MenuChoice::QuickStart,
            "2" => MenuChoice::Install(PREREQUISITES),
            "3" => MenuChoice::Install(TRAEFIK),
            "4" => MenuChoice::Install(PORTAINER),
            "5" => MenuChoice::Install(PGVECTOR),
            "6" => MenuChoice::Install(EVOLUTION),
            "7" => MenuChoice::Install(CHATWOOT),
            "8" => MenuChoice::Status,
            "9" => MenuChoice::Credentials,
            "10" => MenuChoice::Migrations,
            "11" => MenuChoice::RemoveStack,
            "12" => MenuChoice::Backup,
            "13" => MenuChoice::Reset,
            _ => return None,
        };
        Some(choice)
    }
}

/// Whether `err` comes from standard input being closed.
fn input_closed(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<PromptError>(), Some(PromptError::Closed)))
}

/// Menu session over one host and one state store.
pub struct Installer {
    orch: Orchestrator,
    host: Host,
    store: StateStore,
}

impl Installer {
    pub fn new(orch: Orchestrator, host: Host, store: StateStore) -> Self {
        Self { orch, host, store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Show the menu until the operator exits or input closes.
    pub fn run(&mut self) -> Result<()> {
        print_banner();
        loop {
            self.print_menu();
            let input = match self.host.prompt().line("\nSelect an option: ") {
                Ok(input) => input,
                Err(PromptError::Closed) => break,
                Err(err) => return Err(err.into()),
            };

            match MenuChoice::parse(&input) {
                Some(MenuChoice::Exit) => break,
                Some(choice) => {
                    if let Err(err) = self.dispatch(choice) {
                        if input_closed(&err) {
                            break;
                        }
                        error!("{err:#}");
                        println!("\n✗ {err:#}");
                    }
                }
                None => println!("\n✗ Invalid option"),
            }

            match pause(self.host.prompt()) {
                Ok(()) => {}
                Err(PromptError::Closed) => break,
                Err(err) => return Err(err.into()),
            }
        }
        println!("\nBye!");
        Ok(())
    }

    fn dispatch(&mut self, choice: MenuChoice) -> Result<()> {
        match choice {
            MenuChoice::QuickStart => {
                bulk::quick_start(&self.orch, &mut self.host, &mut self.store)?;
            }
            MenuChoice::Install(name) => {
                if name != PREREQUISITES {
                    ensure_repository(&mut self.host)?;
                }
                self.orch.install(&mut self.host, &mut self.store, name)?;
            }
            MenuChoice::Status => println!("\n{}", status_table(&self.orch, &self.host, &self.store)?),
            MenuChoice::Credentials => self.show_credentials()?,
            MenuChoice::Migrations => {
                if self.store.is_installed(CHATWOOT) {
                    if chatwoot::run_migrations(&self.host)? {
                        chatwoot::record_migrated(&mut self.store);
                    }
                } else {
                    println!("\n✗ Chatwoot is not installed; install it first (option 7)");
                }
            }
            MenuChoice::RemoveStack => self.remove_stack()?,
            MenuChoice::Backup => {
                print_header("CONFIGURATION BACKUP");
                let report = backup::create_backup(&self.host.config, &self.store)?;
                println!("\n✓ Backup created in {}", report.dir.display());
                println!("  installation state");
                if report.credentials {
                    println!("  credentials");
                }
                if report.config_files > 0 {
                    println!("  configuration files ({})", report.config_files);
                }
            }
            MenuChoice::Reset => {
                bulk::reset(&self.orch, &mut self.host, &mut self.store)?;
            }
            MenuChoice::Exit => {}
        }
        Ok(())
    }

    fn print_menu(&self) {
        let mark = |name: &str| {
            if self.store.is_installed(name) {
                "✓"
            } else {
                "·"
            }
        };
        print_header("MAIN MENU");
        println!("  1. Quick start (install the whole stack)");
        println!("\nInfrastructure:");
        println!("  2. {} Prerequisites (Docker, Swarm, network)", mark(PREREQUISITES));
        println!("  3. {} Traefik (reverse proxy + TLS)", mark(TRAEFIK));
        println!("  4. {} Portainer (container management)", mark(PORTAINER));
        println!("\nApplications:");
        println!("  5. {} PostgreSQL (pgvector)", mark(PGVECTOR));
        println!("  6. {} Evolution API", mark(EVOLUTION));
        println!("  7. {} Chatwoot", mark(CHATWOOT));
        println!("\nInformation:");
        println!("  8. System status");
        println!("  9. Stored credentials");
        println!("\nMaintenance:");
        println!("  10. Run Chatwoot migrations");
        println!("  11. Remove a stack");
        println!("  12. Backup configuration");
        println!("  13. Full reset");
        println!("\n  0. Exit");
    }

    fn show_credentials(&mut self) -> Result<()> {
        let path = self.host.config.paths.credentials_file.clone();
        if !path.is_file() {
            println!("\n⚠ No credentials file at {}", path.display());
            if CredentialReport::from_state(&self.store).is_empty() {
                println!("Nothing with credentials is installed yet");
                return Ok(());
            }
            if !confirm(self.host.prompt(), "Generate it from the installation state?", true)? {
                return Ok(());
            }
            bulk::write_credentials(&self.host, &self.store)?;
            println!("✓ Credentials file generated");
        }
        let text = fs::read_to_string(&path)?;
        println!("\n{text}");
        Ok(())
    }

    fn remove_stack(&mut self) -> Result<()> {
        print_header("REMOVE A STACK");
        let installed = self.store.list_installed();
        if installed.is_empty() {
            println!("\n⚠ Nothing is installed");
            return Ok(());
        }

        println!("\nInstalled components:");
        for (i, name) in installed.iter().enumerate() {
            println!("  {}. {}", i + 1, self.orch.label(name));
        }
        println!("\n  0. Cancel");

        let answer = self.host.prompt().line("\nComponent to remove: ")?;
        let name = match answer.trim().parse::<usize>() {
            Ok(0) => return Ok(()),
            Ok(n) if n <= installed.len() => &installed[n - 1],
            _ => {
                println!("✗ Invalid option");
                return Ok(());
            }
        };
        if self.orch.uninstall(&mut self.host, &mut self.store, name)? == UninstallOutcome::Removed {
            println!("✓ {} removed", self.orch.label(name));
        }
        Ok(())
    }
}

fn print_banner() {
    println!("\n╔{}╗", "═".repeat(58));
    println!("║{:^58}║", "SWARMSTACK INSTALLER");
    println!("║{:^58}║", format!("v{}", env!("CARGO_PKG_VERSION")));
    println!("╚{}╝", "═".repeat(58));
}

/// Component table plus any interrupted transitions.
pub fn status_table(orch: &Orchestrator, host: &Host, store: &StateStore) -> Result<String> {
    let mut writer = TabWriter::new(Vec::new()).padding(2);
    writeln!(writer, "COMPONENT\tSTATE\tRUNNING\tVERSION\tINSTALLED AT")?;
    for &name in orch.registry().install_order() {
        let observed = Lifecycle::observe(store, name);
        let state = if observed.is_transitional() {
            format!("{observed} (interrupted)")
        } else {
            observed.to_string()
        };
        let record = store.get(name);
        let running = match (record.is_some(), orch.driver(name)) {
            (true, Ok(driver)) if (driver.probe)(host) => "yes",
            (true, _) => "no",
            (false, _) => "-",
        };
        let version = record.and_then(|r| r.get_str("version")).unwrap_or("-");
        let installed_at = record
            .and_then(|r| r.installed_at)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(writer, "{name}\t{state}\t{running}\t{version}\t{installed_at}")?;
    }
    writer.flush()?;
    let mut table = String::from_utf8(writer.into_inner()?)?;

    let summary = store.summary();
    table.push_str(&format!(
        "\n{} of {} components installed; state file {}\n",
        summary.installed.len(),
        orch.registry().install_order().len(),
        store.path().display()
    ));
    for (name, op) in &summary.interrupted {
        table.push_str(&format!(
            "⚠ {name}: {} started {} never finished\n",
            Lifecycle::from(op.phase),
            op.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::tests::test_host;
    use crate::orchestrator::tests::{orchestrator, seeded_store};
    use crate::test_support::{FakeRunner, ScriptedPrompt};
    use swarmstack_core::TransitionPhase;
    use tempfile::tempdir;

    #[test]
    fn test_parse_choices() {
        assert_eq!(MenuChoice::parse("0"), Some(MenuChoice::Exit));
        assert_eq!(MenuChoice::parse(" 7 "), Some(MenuChoice::Install(CHATWOOT)));
        assert_eq!(MenuChoice::parse("13"), Some(MenuChoice::Reset));
        assert_eq!(MenuChoice::parse("14"), None);
        assert_eq!(MenuChoice::parse("reset"), None);
    }

    #[test]
    fn test_status_table_lists_every_component() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(vec![]);
        let host = test_host(dir.path(), FakeRunner::new(), ScriptedPrompt::default());
        let mut store = seeded_store(dir.path(), &["prerequisites"]);
        store.begin("traefik", TransitionPhase::Installing).unwrap();

        let table = status_table(&orch, &host, &store).unwrap();

        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("COMPONENT"));
        assert!(lines[1].starts_with("prerequisites"));
        assert!(lines[1].contains("installed"));
        assert!(lines[1].contains("no"));
        assert!(lines[2].starts_with("traefik"));
        assert!(lines[2].contains("installing (interrupted)"));
        assert!(!lines[3].contains("interrupted"));
        assert!(table.contains("1 of 6 components installed"));
        assert!(table.contains("⚠ traefik: installing started"));
    }

    #[test]
    fn test_exit_and_closed_input_end_the_loop() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path(), FakeRunner::new(), ScriptedPrompt::new(["8", "", "0"]));
        let store = seeded_store(dir.path(), &[]);
        let mut installer = Installer::new(orchestrator(vec![]), host, store);
        installer.run().unwrap();

        let host = test_host(dir.path(), FakeRunner::new(), ScriptedPrompt::new(["42"]));
        let store = seeded_store(dir.path(), &[]);
        let mut installer = Installer::new(orchestrator(vec![]), host, store);
        installer.run().unwrap();
    }

    #[test]
    fn test_remove_stack_picker() {
        let dir = tempdir().unwrap();
        let prompt = ScriptedPrompt::new(["11", "2", ""]);
        let host = test_host(dir.path(), FakeRunner::new(), prompt.clone());
        let store = seeded_store(dir.path(), &["prerequisites", "traefik"]);
        let mut installer = Installer::new(orchestrator(vec![]), host, store);

        installer.run().unwrap();

        assert!(prompt.is_exhausted());
        assert_eq!(installer.store().list_installed(), vec!["prerequisites"]);
    }

    #[test]
    fn test_credentials_view_on_empty_state_writes_nothing() {
        let dir = tempdir().unwrap();
        let prompt = ScriptedPrompt::new(["9", "", "0"]);
        let mut host = test_host(dir.path(), FakeRunner::new(), prompt.clone());
        host.config.paths.credentials_file = dir.path().join("CREDENTIALS.txt");
        let store = seeded_store(dir.path(), &[]);
        let mut installer = Installer::new(orchestrator(vec![]), host, store);

        installer.run().unwrap();

        assert!(prompt.is_exhausted());
        assert!(!prompt.shown().iter().any(|p| p.contains("Generate it")));
        assert!(!dir.path().join("CREDENTIALS.txt").exists());
    }

    #[test]
    fn test_install_prerequisites_from_menu() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path(), FakeRunner::new(), ScriptedPrompt::new(["2"]));
        let store = seeded_store(dir.path(), &[]);
        let mut installer = Installer::new(orchestrator(vec![]), host, store);

        installer.run().unwrap();

        assert!(installer.store().is_installed("prerequisites"));
    }

    #[test]
    fn test_migrations_need_chatwoot() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let host = test_host(dir.path(), runner.clone(), ScriptedPrompt::new(["10"]));
        let store = seeded_store(dir.path(), &[]);
        let mut installer = Installer::new(orchestrator(vec![]), host, store);

        installer.run().unwrap();
        assert!(!runner.ran("docker exec"));
    }

    #[test]
    fn test_migrations_are_recorded() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new().respond("docker ps --filter name=chatwoot_app", "c0ffee");
        let host = test_host(dir.path(), runner.clone(), ScriptedPrompt::new(["10"]));
        let store = seeded_store(dir.path(), &["chatwoot"]);
        let mut installer = Installer::new(orchestrator(vec![]), host, store);

        installer.run().unwrap();

        assert!(runner.ran("docker exec c0ffee bundle exec rails db:chatwoot_prepare"));
        let record = installer.store().get("chatwoot").unwrap();
        assert_eq!(record.get("migrated"), Some(&serde_json::Value::Bool(true)));
    }
}
