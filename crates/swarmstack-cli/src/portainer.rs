//! Portainer REST client used when `deploy.method = "api"`.
//!
//! Creating a stack that already exists returns HTTP 409; the client then
//! looks the stack up and updates it in place, so redeploying is idempotent.

use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Portainer stack type for Swarm stacks.
const SWARM_STACK_TYPE: u8 = 1;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to Portainer failed: {0}")]
    Transport(String),

    #[error("Portainer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected Portainer response: {0}")]
    Decode(#[from] std::io::Error),

    #[error("not authenticated with Portainer")]
    NotAuthenticated,

    #[error("Portainer has no environments (endpoints)")]
    NoEndpoint,

    #[error("stack {0} exists but could not be found in the stack list")]
    StackNotFound(String),

    #[error("Portainer did not become ready within {0}s")]
    NotReady(u64),
}

impl From<ureq::Error> for ApiError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => ApiError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => ApiError::Transport(transport.to_string()),
        }
    }
}

/// A Portainer environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "Id")]
    pub id: u64,
    #[serde(rename = "Name", default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct StackSummary {
    #[serde(rename = "Id")]
    id: u64,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    jwt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployAction {
    Created,
    Updated,
}

/// Remote deployment of compose stacks.
pub trait DeploymentApi {
    fn authenticate(&mut self, user: &str, password: &str) -> Result<(), ApiError>;

    fn is_authenticated(&self) -> bool;

    fn endpoints(&self) -> Result<Vec<Endpoint>, ApiError>;

    /// Create `stack` on `endpoint`, or update it if it already exists.
    fn deploy(
        &self,
        endpoint: u64,
        stack: &str,
        compose: &str,
        env: &[(String, String)],
    ) -> Result<DeployAction, ApiError>;

    /// Block until the API answers, or `timeout` elapses.
    fn wait_until_ready(&self, timeout: Duration) -> Result<(), ApiError>;
}

pub struct PortainerClient {
    base_url: String,
    agent: ureq::Agent,
    token: Option<String>,
    auth_attempts: u32,
    retry_delay: Duration,
}

impl PortainerClient {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            token: None,
            auth_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.token
            .as_ref()
            .map(|jwt| format!("Bearer {jwt}"))
            .ok_or(ApiError::NotAuthenticated)
    }

    /// Swarm cluster id as seen through the endpoint's Docker proxy.
    fn swarm_id(&self, endpoint: u64) -> String {
        let url = self.url(&format!("/api/endpoints/{endpoint}/docker/swarm"));
        let result = self.bearer().and_then(|auth| {
            let value: Value = self
                .agent
                .get(&url)
                .set("Authorization", &auth)
                .call()?
                .into_json()?;
            Ok(value)
        });
        match result {
            Ok(value) => value
                .get("ID")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Err(err) => {
                debug!("could not read swarm id: {err}");
                String::new()
            }
        }
    }

    fn find_stack_id(&self, stack: &str) -> Result<u64, ApiError> {
        let stacks: Vec<StackSummary> = self
            .agent
            .get(&self.url("/api/stacks"))
            .set("Authorization", &self.bearer()?)
            .call()?
            .into_json()?;
        stack_id_by_name(&stacks, stack).ok_or_else(|| ApiError::StackNotFound(stack.to_string()))
    }
}

fn env_list(env: &[(String, String)]) -> Value {
    Value::Array(
        env.iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    )
}

fn create_body(stack: &str, swarm_id: &str, compose: &str, env: &[(String, String)]) -> Value {
    json!({
        "Name": stack,
        "SwarmID": swarm_id,
        "StackFileContent": compose,
        "Env": env_list(env),
    })
}

fn update_body(compose: &str, env: &[(String, String)]) -> Value {
    json!({
        "StackFileContent": compose,
        "Env": env_list(env),
        "Prune": false,
    })
}

fn stack_id_by_name(stacks: &[StackSummary], name: &str) -> Option<u64> {
    stacks.iter().find(|s| s.name == name).map(|s| s.id)
}

impl DeploymentApi for PortainerClient {
    fn authenticate(&mut self, user: &str, password: &str) -> Result<(), ApiError> {
        let url = self.url("/api/auth");
        let mut last_err = ApiError::NotAuthenticated;

        for attempt in 1..=self.auth_attempts {
            let result = self
                .agent
                .post(&url)
                .send_json(json!({ "Username": user, "Password": password }));
            match result {
                Ok(response) => {
                    let auth: AuthResponse = response.into_json()?;
                    self.token = Some(auth.jwt);
                    info!("authenticated with Portainer as {user}");
                    return Ok(());
                }
                Err(err) => {
                    last_err = err.into();
                    warn!(
                        "Portainer authentication attempt {attempt}/{} failed: {last_err}",
                        self.auth_attempts
                    );
                    if attempt < self.auth_attempts {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        Err(last_err)
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn endpoints(&self) -> Result<Vec<Endpoint>, ApiError> {
        let endpoints: Vec<Endpoint> = self
            .agent
            .get(&self.url("/api/endpoints"))
            .set("Authorization", &self.bearer()?)
            .call()?
            .into_json()?;
        Ok(endpoints)
    }

    fn deploy(
        &self,
        endpoint: u64,
        stack: &str,
        compose: &str,
        env: &[(String, String)],
    ) -> Result<DeployAction, ApiError> {
        let auth = self.bearer()?;
        let swarm_id = self.swarm_id(endpoint);
        let create_url = self.url(&format!(
            "/api/stacks?type={SWARM_STACK_TYPE}&method=string&endpointId={endpoint}"
        ));

        let created = self
            .agent
            .post(&create_url)
            .set("Authorization", &auth)
            .send_json(create_body(stack, &swarm_id, compose, env));

        match created {
            Ok(_) => {
                info!("created stack {stack} through Portainer");
                Ok(DeployAction::Created)
            }
            Err(ureq::Error::Status(409, _)) => {
                let id = self.find_stack_id(stack)?;
                let update_url = self.url(&format!("/api/stacks/{id}?endpointId={endpoint}"));
                self.agent
                    .put(&update_url)
                    .set("Authorization", &auth)
                    .send_json(update_body(compose, env))?;
                info!("updated existing stack {stack} (id {id}) through Portainer");
                Ok(DeployAction::Updated)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn wait_until_ready(&self, timeout: Duration) -> Result<(), ApiError> {
        let started = Instant::now();
        let url = self.url("/api/status");
        loop {
            match self.agent.get(&url).call() {
                Ok(_) => return Ok(()),
                Err(err) => debug!("Portainer not ready yet: {err}"),
            }
            if started.elapsed() >= timeout {
                return Err(ApiError::NotReady(timeout.as_secs()));
            }
            thread::sleep(Duration::from_secs(2));
        }
    }
}
