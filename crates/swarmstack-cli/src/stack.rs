//! Swarm stack operations through the docker CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use swarmstack_core::template::{self, TemplateVars};
use tracing::{info, warn};

use crate::runner::{shell_quote, CommandError, CommandRunner};

/// File name of a compose template inside its stack directory.
pub const TEMPLATE_FILE: &str = "docker-compose.yml";

/// File name the rendered compose file is written to, next to the template.
pub const RENDERED_FILE: &str = "docker-compose.rendered.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

/// Render `template_path` with `vars` into the sibling rendered file.
///
/// Returns the rendered file's path and content. Placeholders that remain
/// unresolved are logged but do not fail the render.
pub fn render_compose(template_path: &Path, vars: &TemplateVars) -> Result<(PathBuf, String)> {
    if !template_path.exists() {
        bail!("compose template not found: {}", template_path.display());
    }
    let source = fs::read_to_string(template_path)
        .with_context(|| format!("reading {}", template_path.display()))?;
    let rendered = template::render(&source, vars).into_owned();

    let leftover = template::unresolved_placeholders(&rendered);
    if !leftover.is_empty() {
        warn!(
            "{} still references unset variables: {}",
            template_path.display(),
            leftover.join(", ")
        );
    }

    let out = template_path.with_file_name(RENDERED_FILE);
    fs::write(&out, &rendered).with_context(|| format!("writing {}", out.display()))?;
    Ok((out, rendered))
}

pub fn deploy_via_cli(
    runner: &dyn CommandRunner,
    stack: &str,
    compose_file: &Path,
) -> Result<(), CommandError> {
    let path = compose_file.display().to_string();
    runner.run(&format!(
        "docker stack deploy --prune --resolve-image always -c {} {}",
        shell_quote(&path),
        shell_quote(stack)
    ))?;
    info!("deployed stack {stack}");
    Ok(())
}

pub fn remove_stack(runner: &dyn CommandRunner, stack: &str) -> Result<(), CommandError> {
    runner.run(&format!("docker stack rm {}", shell_quote(stack)))?;
    info!("removed stack {stack}");
    Ok(())
}

/// Whether any task of `stack` reports a `Running` state.
pub fn stack_running(runner: &dyn CommandRunner, stack: &str) -> bool {
    runner
        .capture(&format!(
            "docker stack ps {} --format '{{{{.CurrentState}}}}'",
            shell_quote(stack)
        ))
        .map(|out| out.contains("Running"))
        .unwrap_or(false)
}

/// Poll until `stack` runs or `timeout` elapses. Always checks at least once.
pub fn wait_for_stack(
    runner: &dyn CommandRunner,
    stack: &str,
    timeout: Duration,
    poll: Duration,
) -> WaitOutcome {
    let started = Instant::now();
    let mut last_report = 0;
    loop {
        if stack_running(runner, stack) {
            println!("✓ {stack} is running");
            return WaitOutcome::Ready;
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return WaitOutcome::TimedOut;
        }
        let secs = elapsed.as_secs();
        if secs >= last_report + 10 {
            last_report = secs;
            println!("  Waiting for {stack}... ({secs}s/{}s)", timeout.as_secs());
        }
        thread::sleep(poll.min(timeout.saturating_sub(elapsed)));
    }
}
