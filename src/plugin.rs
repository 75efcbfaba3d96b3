//! Alternate top-level actions.
//!
//! Each entry in `ALTERNATES` owns a flag. When that flag is given on the command line the entry's
//! `run` takes over the whole invocation instead of the connect/execute path. The first selected
//! entry in table order wins.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};
use itertools::Itertools;

use crate::config::Config;
use crate::error::Result;
use crate::host::{HostRecord, Inventory};
use crate::writer::ReportWriter;

/// What an alternate command gets to work with.
pub struct AltContext<'a> {
    pub config: &'a Config,
    pub matches: &'a ArgMatches,
    pub inventory: &'a dyn Inventory,
    pub out: &'a ReportWriter,
}

/// Descriptor of one alternate command.
pub struct AltCommand {
    /// Flag name, and the argument id the selection is looked up by.
    pub name: &'static str,
    pub description: &'static str,
    /// Registers custom flags. Must register an argument whose id is `name`.
    /// Without a hook, a plain `--<name>` switch is registered.
    pub cmdline: Option<fn(clap::Command) -> clap::Command>,
    /// Runs the command and returns the process exit status.
    pub run: fn(&AltContext) -> Result<i32>,
}

impl AltCommand {
    pub fn register(&self, command: clap::Command) -> clap::Command {
        match self.cmdline {
            Some(hook) => hook(command),
            None => command.arg(
                Arg::new(self.name)
                    .long(self.name)
                    .help(self.description)
                    .action(ArgAction::SetTrue),
            ),
        }
    }

    /// Whether the user asked for this command.
    pub fn is_selected(&self, matches: &ArgMatches) -> bool {
        matches!(matches.value_source(self.name), Some(ValueSource::CommandLine))
    }
}

/// Every alternate command, in lookup order.
pub const ALTERNATES: &[AltCommand] = &[
    AltCommand {
        name: "list-nodes",
        description: "List all hosts in the inventory",
        cmdline: None,
        run: list_nodes,
    },
    AltCommand {
        name: "show-node",
        description: "Show the inventory record of one host",
        cmdline: Some(show_node_cmdline),
        run: show_node,
    },
];

/// Finds the alternate command selected on the command line, if any.
pub fn selected<'a>(alternates: &'a [AltCommand], matches: &ArgMatches) -> Option<&'a AltCommand> {
    alternates.iter().find(|alternate| alternate.is_selected(matches))
}

fn describe(host: &HostRecord) -> String {
    [
        host.name.as_str(),
        host.group.as_deref().unwrap_or("-"),
        if host.model.is_empty() { "-" } else { host.model.as_str() },
    ]
    .iter()
    .join("  ")
}

fn list_nodes(ctx: &AltContext) -> Result<i32> {
    for host in ctx.inventory.all_hosts() {
        ctx.out.puts(&describe(host))?;
    }
    Ok(0)
}

fn show_node_cmdline(command: clap::Command) -> clap::Command {
    command.arg(
        Arg::new("show-node")
            .long("show-node")
            .value_name("NAME")
            .help("Show the inventory record of one host")
            .action(ArgAction::Set),
    )
}

fn show_node(ctx: &AltContext) -> Result<i32> {
    let Some(name) = ctx.matches.get_one::<String>("show-node") else {
        return Ok(1);
    };
    match ctx.inventory.find(name) {
        Some(host) => {
            let lines = [
                format!("name: {}", host.name),
                format!("group: {}", host.group.as_deref().unwrap_or("-")),
                format!("model: {}", ctx.config.model.as_deref().unwrap_or(&host.model)),
                format!("address: {}", host.address()),
            ];
            ctx.out.puts(&lines.join("\n"))?;
            Ok(0)
        }
        None => {
            ctx.out.puts(&format!("No host named '{}' in the inventory.", name))?;
            Ok(1)
        }
    }
}
