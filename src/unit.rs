//! Execution units.
//!
//! A unit connects to exactly one host and runs the command source against it. In batch mode each
//! unit runs in its own tokio task behind a boundary that turns every failure, panics included,
//! into a failure `ExecutionResult`. Nothing a unit does can take the dispatcher down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::command::{render_line, template_registry, CommandSource};
use crate::error::{DispatchError, Result};
use crate::gate::CompletionGuard;
use crate::host::HostRecord;
use crate::session::{ConnectParams, Connector};
use crate::writer::ReportWriter;

/// Outcome of one unit. Written once and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub host: String,
    /// Concatenated command output on success, error description on failure.
    pub text: String,
    pub success: bool,
}

impl ExecutionResult {
    pub fn success(host: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            text: output.into(),
            success: true,
        }
    }

    pub fn failure(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            text: message.into(),
            success: false,
        }
    }

    /// The attributed report block for this host.
    pub fn report(&self) -> String {
        if self.success {
            format!("Running commands on {}:\n{}", self.host, self.text)
        } else {
            format!("We had the following error on node {}:\n{}", self.host, self.text)
        }
    }
}

/// Everything a unit needs besides its host. Shared read-only between units.
#[derive(Clone)]
pub struct UnitContext {
    pub connector: Arc<dyn Connector>,
    pub params: Arc<ConnectParams>,
    pub commands: Arc<CommandSource>,
    /// Drop blank lines from command output.
    pub terse: bool,
    /// Render `{{field}}` placeholders in command lines. Off unless asked for.
    pub templates: bool,
}

impl UnitContext {
    pub fn new(
        connector: Arc<dyn Connector>,
        params: ConnectParams,
        commands: CommandSource,
        terse: bool,
    ) -> Self {
        Self {
            connector,
            params: Arc::new(params),
            commands: Arc::new(commands),
            terse,
            templates: false,
        }
    }

    pub fn with_templates(mut self, templates: bool) -> Self {
        self.templates = templates;
        self
    }
}

/// Connects to `host` and runs every command line in order over the same session, returning the
/// concatenated output. Errors propagate to the caller.
///
/// Lines are sent exactly as loaded unless templating is enabled on the context.
pub async fn execute(ctx: &UnitContext, host: &HostRecord) -> Result<String> {
    let mut session = ctx.connector.connect(host, &ctx.params).await?;
    let mut registry = ctx.templates.then(template_registry);
    let mut output = String::new();
    let mut failure = None;
    for line in ctx.commands.lines() {
        let line = match registry.as_mut() {
            Some(registry) => match render_line(registry, line, host) {
                Ok(line) => line,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            },
            None => line.clone(),
        };
        tracing::info!(host = %host.name, "running '{}'", line.trim_end());
        match session.cmd(&line).await {
            Ok(text) if ctx.terse => output.push_str(&clean_output(&text)),
            Ok(text) => output.push_str(&text),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    session.close().await;
    match failure {
        Some(e) => Err(e),
        None => Ok(output),
    }
}

/// Runs one unit behind the failure boundary.
pub async fn run_unit(ctx: &UnitContext, host: &HostRecord) -> ExecutionResult {
    match AssertUnwindSafe(execute(ctx, host)).catch_unwind().await {
        Ok(Ok(output)) => ExecutionResult::success(&host.name, output),
        Ok(Err(error)) => {
            tracing::debug!(host = %host.name, "Unit failed: {}", error);
            ExecutionResult::failure(&host.name, error.to_string())
        }
        Err(panic) => {
            let error = DispatchError::Panicked(panic_message(panic.as_ref()));
            tracing::warn!(host = %host.name, "{}", error);
            ExecutionResult::failure(&host.name, error.to_string())
        }
    }
}

/// Spawns a unit for `host`. The report is written as soon as the unit finishes, then `guard`
/// is dropped to signal completion.
pub fn spawn_unit(
    ctx: UnitContext,
    host: HostRecord,
    mut guard: CompletionGuard,
    writer: ReportWriter,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = run_unit(&ctx, &host).await;
        if let Err(e) = writer.report(&result) {
            tracing::error!(host = %host.name, "Failed to write report: {}", e);
        }
        guard.set_success(result.success);
    })
}

/// Removes blank lines from command output.
pub fn clean_output(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        cleaned.push_str(line.trim_end());
        cleaned.push('\n');
    }
    cleaned
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::gate::ConcurrencyGate;
    use crate::session::Session;

    /// Echoes each command back as "<host>: <command>\n".
    struct EchoConnector {
        fail_on: Option<&'static str>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    struct EchoSession {
        host: String,
        fail_on: Option<&'static str>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Session for EchoSession {
        async fn cmd(&mut self, line: &str) -> Result<String> {
            self.sent.lock().unwrap().push(line.to_string());
            if Some(line) == self.fail_on {
                return Err(DispatchError::Command {
                    command: line.to_string(),
                    reason: "% Invalid input".to_string(),
                });
            }
            if line == "panic" {
                panic!("device went away");
            }
            Ok(format!("{}: {}\n", self.host, line))
        }
    }

    #[async_trait]
    impl Connector for EchoConnector {
        async fn connect(
            &self,
            host: &HostRecord,
            _params: &ConnectParams,
        ) -> Result<Box<dyn Session>> {
            Ok(Box::new(EchoSession {
                host: host.name.clone(),
                fail_on: self.fail_on,
                sent: Arc::clone(&self.sent),
            }))
        }
    }

    fn context(
        commands: CommandSource,
        fail_on: Option<&'static str>,
    ) -> (UnitContext, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(vec![]));
        let connector = EchoConnector {
            fail_on,
            sent: Arc::clone(&sent),
        };
        (
            UnitContext::new(Arc::new(connector), ConnectParams::default(), commands, false),
            sent,
        )
    }

    #[tokio::test]
    async fn test_script_runs_lines_in_order_and_concatenates() {
        let (ctx, sent) = context(CommandSource::from_text("show a\nshow b\n", true), None);
        let result = run_unit(&ctx, &HostRecord::new("sw1")).await;
        assert!(result.success);
        assert_eq!(result.text, "sw1: show a\nsw1: show b\n");
        assert_eq!(*sent.lock().unwrap(), vec!["show a", "show b"]);
    }

    #[tokio::test]
    async fn test_command_failure_becomes_failure_result() {
        let (ctx, sent) = context(
            CommandSource::from_text("show a\nbogus\nshow c\n", true),
            Some("bogus"),
        );
        let result = run_unit(&ctx, &HostRecord::new("sw1")).await;
        assert!(!result.success);
        assert!(result.text.contains("% Invalid input"));
        // Nothing is sent after the failing line.
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_failure_result() {
        let (ctx, _) = context(CommandSource::Single("panic".into()), None);
        let result = run_unit(&ctx, &HostRecord::new("sw1")).await;
        assert!(!result.success);
        assert!(result.text.contains("device went away"));
    }

    #[tokio::test]
    async fn test_template_lines_are_rendered_per_host() {
        let (ctx, sent) = context(CommandSource::Single("show run | i {{name}}".into()), None);
        let ctx = ctx.with_templates(true);
        run_unit(&ctx, &HostRecord::new("edge1")).await;
        assert_eq!(*sent.lock().unwrap(), vec!["show run | i edge1"]);
    }

    #[tokio::test]
    async fn test_braces_pass_through_without_templates() {
        let commands = CommandSource::from_text("set banner {{motd}}  \nshow {{#if}}\n", false);
        let (ctx, sent) = context(commands, None);
        let result = run_unit(&ctx, &HostRecord::new("sw1")).await;
        assert!(result.success);
        assert_eq!(
            *sent.lock().unwrap(),
            vec!["set banner {{motd}}  \n", "show {{#if}}\n"]
        );
    }

    #[tokio::test]
    async fn test_spawned_unit_reports_then_signals() {
        let (ctx, _) = context(CommandSource::Single("show ver".into()), None);
        let (writer, captured) = ReportWriter::capture();
        let mut gate = ConcurrencyGate::new(1);
        let guard = gate.reserve("sw1");
        let handle = spawn_unit(ctx, HostRecord::new("sw1"), guard, writer);
        let completions = gate.wait_all().await;
        handle.await.unwrap();
        assert_eq!(completions.len(), 1);
        assert!(completions[0].success);
        assert_eq!(captured.contents(), "Running commands on sw1:\nsw1: show ver\n");
    }

    #[test]
    fn test_clean_output() {
        assert_eq!(clean_output("\nfoo  \n\n  \nbar\n"), "foo\nbar\n");
        assert_eq!(clean_output(""), "");
    }

    #[test]
    fn test_report_format() {
        assert_eq!(
            ExecutionResult::success("a", "out").report(),
            "Running commands on a:\nout"
        );
        assert_eq!(
            ExecutionResult::failure("a", "boom").report(),
            "We had the following error on node a:\nboom"
        );
    }
}
