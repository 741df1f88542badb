//! Everything a driver needs from the outside world.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use swarmstack_core::registry::{PORTAINER, TRAEFIK};
use swarmstack_core::template::TemplateVars;
use swarmstack_core::StateStore;
use tracing::info;

use crate::config::{DeployMethod, InstallerConfig};
use crate::portainer::{ApiError, DeployAction, DeploymentApi, PortainerClient};
use crate::prompt::Prompt;
use crate::runner::{CommandError, CommandRunner};
use crate::stack::{self, WaitOutcome, TEMPLATE_FILE};

/// Lower bound on the readiness poll interval.
const MIN_POLL_SECS: u64 = 1;

/// Shell, terminal, configuration and (optionally) the Portainer API.
pub struct Host {
    pub config: InstallerConfig,
    runner: Box<dyn CommandRunner>,
    prompt: Box<dyn Prompt>,
    api: Option<Box<dyn DeploymentApi>>,
    api_endpoint: Option<u64>,
}

impl Host {
    pub fn new(
        config: InstallerConfig,
        runner: Box<dyn CommandRunner>,
        prompt: Box<dyn Prompt>,
    ) -> Self {
        Self {
            config,
            runner,
            prompt,
            api: None,
            api_endpoint: None,
        }
    }

    /// Use `api` for API deploys instead of building a Portainer client.
    pub fn with_api(mut self, api: Box<dyn DeploymentApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn prompt(&mut self) -> &mut dyn Prompt {
        self.prompt.as_mut()
    }

    pub fn run(&self, command: &str) -> Result<(), CommandError> {
        self.runner.run(command)
    }

    pub fn capture(&self, command: &str) -> Result<String, CommandError> {
        self.runner.capture(command)
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.prompts.max_attempts
    }

    pub fn sleep_secs(&self, secs: u64) {
        if secs > 0 {
            thread::sleep(Duration::from_secs(secs));
        }
    }

    /// `<install_dir>/<dir>/docker-compose.yml`
    pub fn template_path(&self, dir: &str) -> PathBuf {
        self.config.stack_dir(dir).join(TEMPLATE_FILE)
    }

    /// Render the template and deploy it as `stack`.
    ///
    /// Returns the path of the rendered compose file.
    pub fn deploy_stack(
        &mut self,
        store: &StateStore,
        stack: &str,
        template: &Path,
        vars: &TemplateVars,
    ) -> Result<PathBuf> {
        let (rendered_path, rendered) = stack::render_compose(template, vars)?;

        let via_api = self.config.deploy.method == DeployMethod::Api
            && stack != TRAEFIK
            && stack != PORTAINER;

        if via_api {
            let endpoint = self.connect_api(store)?;
            let env: Vec<(String, String)> =
                vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let api = self
                .api
                .as_ref()
                .ok_or_else(|| anyhow!("Portainer API is not connected"))?;
            match api.deploy(endpoint, stack, &rendered, &env)? {
                DeployAction::Created => println!("✓ Stack {stack} created through Portainer"),
                DeployAction::Updated => println!("✓ Stack {stack} updated through Portainer"),
            }
        } else {
            stack::deploy_via_cli(self.runner(), stack, &rendered_path)
                .with_context(|| format!("deploying stack {stack}"))?;
        }
        Ok(rendered_path)
    }

    pub fn remove_stack(&self, stack: &str) -> Result<(), CommandError> {
        stack::remove_stack(self.runner(), stack)
    }

    pub fn stack_running(&self, stack: &str) -> bool {
        stack::stack_running(self.runner(), stack)
    }

    /// Wait for `stack`, bounded by the component timeout or the configured override.
    pub fn wait_for_stack(&self, stack: &str, default_timeout_secs: u64) -> WaitOutcome {
        let timeout = self
            .config
            .deploy
            .ready_timeout_secs
            .unwrap_or(default_timeout_secs);
        println!("⏳ Waiting for {stack} to be ready (up to {timeout}s)...");
        stack::wait_for_stack(
            self.runner(),
            stack,
            Duration::from_secs(timeout),
            Duration::from_secs(self.config.deploy.poll_interval_secs.max(MIN_POLL_SECS)),
        )
    }

    /// Authenticate once per session and pick the first environment.
    fn connect_api(&mut self, store: &StateStore) -> Result<u64> {
        if let (Some(api), Some(endpoint)) = (&self.api, self.api_endpoint) {
            if api.is_authenticated() {
                return Ok(endpoint);
            }
        }

        if self.api.is_none() {
            let url = self
                .config
                .deploy
                .portainer_url
                .clone()
                .or_else(|| {
                    store
                        .get(PORTAINER)
                        .and_then(|r| r.get_str("url"))
                        .map(String::from)
                })
                .ok_or_else(|| anyhow!("API deploys need Portainer installed or deploy.portainer_url set"))?;
            let client = PortainerClient::new(&url);
            client
                .wait_until_ready(Duration::from_secs(60))
                .context("waiting for Portainer")?;
            self.api = Some(Box::new(client));
        }

        let user = self.config.deploy.portainer_user.clone();
        let needs_auth = !self.api.as_ref().is_some_and(|api| api.is_authenticated());
        let password = if needs_auth {
            Some(
                self.prompt
                    .secret(&format!("Portainer password for {user}: "))?,
            )
        } else {
            None
        };

        let api = self
            .api
            .as_mut()
            .ok_or_else(|| anyhow!("Portainer API is not connected"))?;
        if let Some(password) = password {
            api.authenticate(&user, &password)
                .context("authenticating with Portainer")?;
        }
        let endpoint = api
            .endpoints()?
            .first()
            .map(|e| e.id)
            .ok_or(ApiError::NoEndpoint)?;
        info!("using Portainer environment {endpoint}");
        self.api_endpoint = Some(endpoint);
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeApi, FakeRunner, ScriptedPrompt};
    use std::fs;
    use tempfile::tempdir;

    fn host_in(dir: &Path, method: DeployMethod, runner: FakeRunner, prompt: ScriptedPrompt) -> Host {
        let mut config = InstallerConfig::default();
        config.paths.install_dir = dir.to_path_buf();
        config.deploy.method = method;
        Host::new(config, Box::new(runner), Box::new(prompt))
    }

    fn write_template(dir: &Path, stack: &str) -> PathBuf {
        let path = dir.join(stack).join(TEMPLATE_FILE);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "net: ${NETWORK}\n").unwrap();
        path
    }

    #[test]
    fn test_cli_deploy_renders_then_deploys() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let mut host = host_in(dir.path(), DeployMethod::Cli, runner.clone(), ScriptedPrompt::default());
        let store = StateStore::open(dir.path().join("state.json"));
        let template = write_template(dir.path(), "pgvector");

        let mut vars = TemplateVars::new();
        vars.insert("NETWORK".into(), "TriskelNET".into());
        let rendered = host.deploy_stack(&store, "pgvector", &template, &vars).unwrap();

        assert_eq!(fs::read_to_string(&rendered).unwrap(), "net: TriskelNET\n");
        assert!(runner.ran("docker stack deploy"));
    }

    #[test]
    fn test_api_deploy_authenticates_once() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let api = FakeApi::new();
        let prompt = ScriptedPrompt::new(["Portainer!Pass1"]);
        let mut host = host_in(dir.path(), DeployMethod::Api, runner.clone(), prompt.clone())
            .with_api(Box::new(api.clone()));
        let store = StateStore::open(dir.path().join("state.json"));
        let template = write_template(dir.path(), "evolution");

        let vars = TemplateVars::new();
        host.deploy_stack(&store, "evolution", &template, &vars).unwrap();
        host.deploy_stack(&store, "evolution", &template, &vars).unwrap();

        assert_eq!(api.deployed_stacks(), vec!["evolution", "evolution"]);
        assert!(!runner.ran("docker stack deploy"));
        assert!(prompt.is_exhausted());
        assert_eq!(prompt.shown().len(), 1);
    }

    #[test]
    fn test_api_deploy_forwards_variables() {
        let dir = tempdir().unwrap();
        let api = FakeApi::new();
        let mut host = host_in(
            dir.path(),
            DeployMethod::Api,
            FakeRunner::new(),
            ScriptedPrompt::new(["Portainer!Pass1"]),
        )
        .with_api(Box::new(api.clone()));
        let store = StateStore::open(dir.path().join("state.json"));
        let template = write_template(dir.path(), "chatwoot");

        let mut vars = TemplateVars::new();
        vars.insert("NETWORK".into(), "EdgeNet".into());
        host.deploy_stack(&store, "chatwoot", &template, &vars).unwrap();

        assert_eq!(
            api.last_env(),
            vec![("NETWORK".to_string(), "EdgeNet".to_string())]
        );
    }

    #[test]
    fn test_api_mode_still_uses_cli_for_proxy_stacks() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let api = FakeApi::new();
        let mut host = host_in(dir.path(), DeployMethod::Api, runner.clone(), ScriptedPrompt::default())
            .with_api(Box::new(api.clone()));
        let store = StateStore::open(dir.path().join("state.json"));
        let template = write_template(dir.path(), "traefik");

        host.deploy_stack(&store, "traefik", &template, &TemplateVars::new())
            .unwrap();
        assert!(runner.ran("docker stack deploy"));
        assert!(api.deployed_stacks().is_empty());
    }

    #[test]
    fn test_wait_uses_configured_override() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let mut host = host_in(dir.path(), DeployMethod::Cli, runner.clone(), ScriptedPrompt::default());
        host.config.deploy.ready_timeout_secs = Some(0);
        assert_eq!(host.wait_for_stack("chatwoot", 90), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_zero_poll_interval_does_not_spin() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new();
        let mut host = host_in(dir.path(), DeployMethod::Cli, runner.clone(), ScriptedPrompt::default());
        host.config.deploy.ready_timeout_secs = Some(1);
        host.config.deploy.poll_interval_secs = 0;

        assert_eq!(host.wait_for_stack("pgvector", 90), WaitOutcome::TimedOut);
        let polls = runner
            .commands()
            .iter()
            .filter(|c| c.starts_with("docker stack ps"))
            .count();
        assert!(polls <= 3, "polled {polls} times in one second");
    }
}
