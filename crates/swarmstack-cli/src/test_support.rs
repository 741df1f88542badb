//! In-crate fakes for the shell, the terminal and the Portainer API.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::portainer::{ApiError, DeployAction, DeploymentApi, Endpoint};
use crate::prompt::{Prompt, PromptError};
use crate::runner::{CommandError, CommandRunner};

#[derive(Default)]
struct RunnerState {
    commands: Vec<String>,
    responses: Vec<(String, String)>,
    failures: Vec<String>,
}

/// Records every command; answers from canned responses.
///
/// Clones share state, so a test can keep a handle after boxing one.
#[derive(Clone, Default)]
pub struct FakeRunner(Rc<RefCell<RunnerState>>);

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` print `output`.
    pub fn respond(self, needle: &str, output: &str) -> Self {
        self.0
            .borrow_mut()
            .responses
            .push((needle.to_string(), output.to_string()));
        self
    }

    /// Commands containing `needle` exit non-zero.
    pub fn fail_on(self, needle: &str) -> Self {
        self.0.borrow_mut().failures.push(needle.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.0.borrow().commands.clone()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.0.borrow().commands.iter().any(|c| c.contains(needle))
    }

    /// Position of the first command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.0.borrow().commands.iter().position(|c| c.contains(needle))
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &str) -> Result<(), CommandError> {
        self.capture(command).map(|_| ())
    }

    fn capture(&self, command: &str) -> Result<String, CommandError> {
        let mut state = self.0.borrow_mut();
        state.commands.push(command.to_string());

        if state.failures.iter().any(|f| command.contains(f.as_str())) {
            return Err(CommandError::Failed {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(state
            .responses
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct PromptState {
    answers: VecDeque<String>,
    shown: Vec<String>,
}

/// Answers prompts from a fixed script; end of script reads as closed input.
#[derive(Clone, Default)]
pub struct ScriptedPrompt(Rc<RefCell<PromptState>>);

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = PromptState {
            answers: answers.into_iter().map(Into::into).collect(),
            shown: Vec::new(),
        };
        Self(Rc::new(RefCell::new(state)))
    }

    pub fn is_exhausted(&self) -> bool {
        self.0.borrow().answers.is_empty()
    }

    /// Every prompt message shown so far.
    pub fn shown(&self) -> Vec<String> {
        self.0.borrow().shown.clone()
    }

    fn next(&mut self, message: &str) -> Result<String, PromptError> {
        let mut state = self.0.borrow_mut();
        state.shown.push(message.to_string());
        state.answers.pop_front().ok_or(PromptError::Closed)
    }
}

impl Prompt for ScriptedPrompt {
    fn line(&mut self, message: &str) -> Result<String, PromptError> {
        self.next(message)
    }

    fn secret(&mut self, message: &str) -> Result<String, PromptError> {
        self.next(message)
    }
}

#[derive(Default)]
struct ApiState {
    authenticated: bool,
    deployed: Vec<(u64, String, String, Vec<(String, String)>)>,
}

/// Accepts any credentials and remembers deployed stacks.
#[derive(Clone, Default)]
pub struct FakeApi(Rc<RefCell<ApiState>>);

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deployed_stacks(&self) -> Vec<String> {
        self.0
            .borrow()
            .deployed
            .iter()
            .map(|(_, stack, _, _)| stack.clone())
            .collect()
    }

    pub fn last_env(&self) -> Vec<(String, String)> {
        self.0
            .borrow()
            .deployed
            .last()
            .map(|(_, _, _, env)| env.clone())
            .unwrap_or_default()
    }
}

impl DeploymentApi for FakeApi {
    fn authenticate(&mut self, _user: &str, _password: &str) -> Result<(), ApiError> {
        self.0.borrow_mut().authenticated = true;
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.0.borrow().authenticated
    }

    fn endpoints(&self) -> Result<Vec<Endpoint>, ApiError> {
        Ok(vec![Endpoint {
            id: 1,
            name: "local".to_string(),
        }])
    }

    fn deploy(
        &self,
        endpoint: u64,
        stack: &str,
        compose: &str,
        env: &[(String, String)],
    ) -> Result<DeployAction, ApiError> {
        let mut state = self.0.borrow_mut();
        if !state.authenticated {
            return Err(ApiError::NotAuthenticated);
        }
        let existed = state.deployed.iter().any(|(_, s, _, _)| s == stack);
        state
            .deployed
            .push((endpoint, stack.to_string(), compose.to_string(), env.to_vec()));
        Ok(if existed {
            DeployAction::Updated
        } else {
            DeployAction::Created
        })
    }

    fn wait_until_ready(&self, _timeout: Duration) -> Result<(), ApiError> {
        Ok(())
    }
}
