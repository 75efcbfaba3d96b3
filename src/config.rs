//! Configuration for Fanout.
//!
//! Holds the clap struct for command line arguments and flags, and the optional YAML settings file
//! whose values act as defaults underneath the flags.

use std::fs::File;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use serde::Deserialize;

use crate::error::{DispatchError, Result};
use crate::filter::SelectionCriteria;
use crate::plugin::AltCommand;
use crate::session::{parse_protocols, ConnectParams};

/// Inventory file used when neither the flag nor the settings file names one.
pub const DEFAULT_HOSTS_FILE: &str = "hosts.yaml";

#[derive(Parser, Debug, Clone, Default)]
#[command(
    version,
    about = "Run ad hoc or scripted commands on network devices from an inventory",
    override_usage = "fanout [OPTIONS] hostname [command]\n       \
                      fanout [OPTIONS] <-g GROUP|-o OSTYPE|--regex REGEX> [command]"
)]
pub struct Config {
    /// Target host followed by the command, or only the command when selecting hosts
    #[arg(value_name = "ARGS")]
    pub args: Vec<String>,

    /// Host model (ios, junos, etc), otherwise taken from the inventory
    #[arg(long, short)]
    pub model: Option<String>,

    /// Run on all hosts whose OS type matches this pattern (case-insensitive)
    #[arg(long, short)]
    pub ostype: Option<String>,

    /// Commands file to be sent, `-` reads from standard input
    #[arg(long, short = 'x')]
    pub commands: Option<String>,

    /// Username to use
    #[arg(long, short)]
    pub username: Option<String>,

    /// Password to use
    #[arg(long, short)]
    pub password: Option<String>,

    /// Timeout value to use, in seconds
    #[arg(long, short)]
    pub timeout: Option<u64>,

    /// Enable password to use
    #[arg(long, short)]
    pub enable: Option<String>,

    /// SNMP community to use for discovery
    #[arg(long, short)]
    pub community: Option<String>,

    /// Run on all hosts in this group, as recorded in the inventory
    #[arg(long, short)]
    pub group: Option<String>,

    /// How many hosts to run on at once when selecting hosts. Defaults to 1
    #[arg(long, short = 'r')]
    pub threads: Option<usize>,

    /// Run on all hosts whose name matches this pattern
    #[arg(long)]
    pub regex: Option<String>,

    /// Only print the hosts that would be targeted
    #[arg(long)]
    pub dryrun: bool,

    /// Protocols to use, default "ssh, telnet"
    #[arg(long)]
    pub protocols: Option<String>,

    /// Don't trim newlines and whitespace when running commands
    #[arg(long = "no-trim")]
    pub no_trim: bool,

    /// Verbose output, e.g. show commands sent
    #[arg(long, short)]
    pub verbose: bool,

    /// Turn on debugging
    #[arg(long, short)]
    pub debug: bool,

    /// Display clean output
    #[arg(long)]
    pub terse: bool,

    /// Fill {{name}}, {{group}}, {{model}} and {{address}} into command lines per host
    #[arg(long)]
    pub template: bool,

    /// Inventory file to use. Defaults to `hosts.yaml`
    #[arg(long)]
    pub hosts_file: Option<String>,

    /// YAML settings file providing defaults for the flags above
    #[arg(long = "config")]
    pub config_file: Option<String>,
}

/// Where the positional arguments point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// Explicit host in single-host mode.
    pub host: Option<String>,
    /// Inline command.
    pub command: Option<String>,
}

impl Config {
    /// Builds the clap command with every alternate command's flags registered on top.
    pub fn command_with(alternates: &[AltCommand]) -> clap::Command {
        alternates
            .iter()
            .fold(Self::command(), |command, alternate| alternate.register(command))
    }

    /// Parses the process arguments. Exits on `--help`, `--version` and usage errors.
    pub fn parse_with(alternates: &[AltCommand]) -> (Self, ArgMatches) {
        let matches = Self::command_with(alternates).get_matches();
        match Self::from_arg_matches(&matches) {
            Ok(config) => (config, matches),
            Err(e) => e.exit(),
        }
    }

    /// Parses an explicit argument list (the first item is the binary name).
    pub fn try_parse_with<I, T>(
        alternates: &[AltCommand],
        args: I,
    ) -> Result<(Self, ArgMatches), clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command_with(alternates).try_get_matches_from(args)?;
        let config = Self::from_arg_matches(&matches)?;
        Ok((config, matches))
    }

    pub fn criteria(&self) -> SelectionCriteria {
        SelectionCriteria {
            group: self.group.clone(),
            ostype: self.ostype.clone(),
            name: self.regex.clone(),
        }
    }

    /// Interprets the positional arguments. When hosts are selected by criteria every positional
    /// is part of the command; otherwise the first one names the host.
    pub fn target(&self) -> Target {
        let join = |args: &[String]| (!args.is_empty()).then(|| args.join(" "));
        if self.criteria().is_empty() {
            match self.args.split_first() {
                Some((host, rest)) => Target {
                    host: Some(host.clone()),
                    command: join(rest),
                },
                None => Target::default(),
            }
        } else {
            Target {
                host: None,
                command: join(&self.args),
            }
        }
    }

    /// Loads the settings file, or returns empty settings when none was given.
    pub fn settings(&self) -> Result<Settings> {
        match &self.config_file {
            Some(path) => Settings::load(path),
            None => Ok(Settings::default()),
        }
    }

    pub fn hosts_file(&self, settings: &Settings) -> String {
        self.hosts_file
            .clone()
            .or_else(|| settings.hosts_file.clone())
            .unwrap_or_else(|| DEFAULT_HOSTS_FILE.to_string())
    }

    pub fn threads(&self, settings: &Settings) -> usize {
        self.threads.or(settings.threads).unwrap_or(1).max(1)
    }

    /// Whether command lines read from a file are right-trimmed.
    pub fn trim(&self) -> bool {
        !self.no_trim
    }

    /// Merges connection flags over the settings file over built-in defaults.
    pub fn connect_params(&self, settings: &Settings) -> ConnectParams {
        let file = &settings.connection;
        let defaults = ConnectParams::default();
        ConnectParams {
            model: self.model.clone().or_else(|| file.model.clone()),
            username: self.username.clone().or_else(|| file.username.clone()),
            password: self.password.clone().or_else(|| file.password.clone()),
            timeout: self.timeout.or(file.timeout),
            enable: self.enable.clone().or_else(|| file.enable.clone()),
            community: self.community.clone().or_else(|| file.community.clone()),
            protocols: self
                .protocols
                .as_deref()
                .or(file.protocols.as_deref())
                .map(parse_protocols)
                .unwrap_or(defaults.protocols),
        }
    }
}

/// Contents of the `--config` YAML file.
///
/// ```yaml
/// hosts_file: /etc/fanout/hosts.yaml
/// threads: 8
/// connection:
///   username: netops
///   timeout: 30
///   protocols: ssh
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub hosts_file: Option<String>,
    pub threads: Option<usize>,
    pub connection: ConnectionSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSettings {
    pub model: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<u64>,
    pub enable: Option<String>,
    pub community: Option<String>,
    pub protocols: Option<String>,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(|source| DispatchError::Settings {
            path: path.to_string(),
            source,
        })
    }
}
