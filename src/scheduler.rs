//! Dispatch loop.
//!
//! An invocation is validated into a `Plan` before anything runs. A dry run only prints the
//! selected hosts. Single-host mode runs in the caller's own flow and lets errors propagate.
//! Batch mode launches one execution unit per selected host, in inventory order, admitting each
//! launch through the `ConcurrencyGate`, and finally waits for every unit it launched.

use std::sync::Arc;

use futures::future::join_all;

use crate::command::CommandSource;
use crate::config::{Config, Settings, Target};
use crate::error::{DispatchError, Result};
use crate::filter::{select_records, SelectionCriteria};
use crate::gate::{Completion, ConcurrencyGate};
use crate::host::{HostRecord, Inventory};
use crate::session::Connector;
use crate::unit::{execute, spawn_unit, UnitContext};
use crate::writer::ReportWriter;

/// What an invocation is going to do, decided before any unit starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Print these host names and stop.
    DryRun(Vec<String>),
    /// Run synchronously against one explicitly named host.
    SingleHost(HostRecord),
    /// Fan out over these hosts, in order.
    Batch(Vec<HostRecord>),
}

/// Validates an invocation and resolves its hosts.
///
/// Fails with `NothingToDo` when there is no host, no command, or no host matching the criteria.
///
/// The "no hosts matched" check only applies to batch mode. An explicitly named host runs even
/// when it is absent from the inventory, or the inventory is empty, and is dialled by name.
pub fn plan(
    inventory: &dyn Inventory,
    target: &Target,
    criteria: &SelectionCriteria,
    dry_run: bool,
    has_commands: bool,
) -> Result<Plan> {
    if target.host.is_none() && criteria.is_empty() {
        return Err(DispatchError::nothing_to_do("no host given"));
    }
    if dry_run {
        let names = select_records(inventory, criteria)?
            .into_iter()
            .map(|host| host.name.clone())
            .collect();
        return Ok(Plan::DryRun(names));
    }
    if !has_commands {
        return Err(DispatchError::nothing_to_do(
            "nothing to do, give command or -x",
        ));
    }

    match &target.host {
        Some(name) if criteria.is_empty() => {
            let host = inventory
                .find(name)
                .cloned()
                .unwrap_or_else(|| HostRecord::new(name.as_str()));
            Ok(Plan::SingleHost(host))
        }
        _ => {
            let hosts: Vec<HostRecord> = select_records(inventory, criteria)?
                .into_iter()
                .cloned()
                .collect();
            if hosts.is_empty() {
                return Err(DispatchError::nothing_to_do(
                    "nothing to do, no hosts matched",
                ));
            }
            Ok(Plan::Batch(hosts))
        }
    }
}

pub struct Dispatcher {
    ctx: UnitContext,
    writer: ReportWriter,
    threads: usize,
}

impl Dispatcher {
    pub fn new(ctx: UnitContext, writer: ReportWriter, threads: usize) -> Self {
        Self {
            ctx,
            writer,
            threads,
        }
    }

    /// Connects and executes in the caller's flow. Output is written without attribution.
    pub async fn run_single(&self, host: &HostRecord) -> Result<()> {
        let output = execute(&self.ctx, host).await?;
        self.writer.puts(&output)?;
        Ok(())
    }

    /// Launches one unit per host through the gate and waits for all of them.
    ///
    /// Returns the completions in the order units finished. Host failures are reported by the
    /// units themselves and never fail the batch.
    pub async fn run_batch(&self, hosts: Vec<HostRecord>) -> Vec<Completion> {
        let mut gate = ConcurrencyGate::new(self.threads);
        let mut tasks = Vec::with_capacity(hosts.len());
        for host in hosts {
            gate.await_capacity().await;
            let guard = gate.reserve(&host.name);
            tracing::info!("Launching unit for {}", host);
            tasks.push(spawn_unit(
                self.ctx.clone(),
                host,
                guard,
                self.writer.clone(),
            ));
        }

        let completions = gate.wait_all().await;
        // Every unit has signalled; reap the tasks themselves too.
        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                tracing::error!("Unit task did not finish cleanly: {}", e);
            }
        }

        let failed = completions.iter().filter(|c| !c.success).count();
        tracing::info!(hosts = completions.len(), failed, "Batch finished");
        completions
    }
}

/// Runs one invocation of the default connect/execute path.
pub async fn run_invocation(
    config: &Config,
    settings: &Settings,
    inventory: &dyn Inventory,
    connector: Arc<dyn Connector>,
    writer: ReportWriter,
) -> Result<()> {
    let target = config.target();
    let criteria = config.criteria();
    let has_commands = target.command.is_some() || config.commands.is_some();
    let plan = plan(inventory, &target, &criteria, config.dryrun, has_commands)?;

    if let Plan::DryRun(names) = &plan {
        for name in names {
            writer.puts(name)?;
        }
        return Ok(());
    }

    // A commands file takes precedence over an inline command.
    let commands = match (&config.commands, target.command) {
        (Some(path), _) => CommandSource::from_path(path, config.trim())?,
        (None, Some(command)) => CommandSource::Single(command),
        (None, None) => {
            return Err(DispatchError::nothing_to_do(
                "nothing to do, give command or -x",
            ))
        }
    };
    let ctx = UnitContext::new(
        connector,
        config.connect_params(settings),
        commands,
        config.terse,
    )
    .with_templates(config.template);
    let dispatcher = Dispatcher::new(ctx, writer, config.threads(settings));

    match plan {
        Plan::SingleHost(host) => dispatcher.run_single(&host).await,
        Plan::Batch(hosts) => {
            dispatcher.run_batch(hosts).await;
            Ok(())
        }
        Plan::DryRun(_) => Ok(()),
    }
}
