//! Fanout: run ad hoc or scripted commands across network devices.

// Command line arguments and configuration.
pub mod config;
// Host inventory.
pub mod host;
// Host selection.
pub mod filter;
// Admission control for batch mode.
pub mod gate;
// Commands sent to hosts.
pub mod command;
// Connection layer.
pub mod session;
// Per-host execution units.
pub mod unit;
// Report output.
pub mod writer;
// Dispatch loop.
pub mod scheduler;
// Alternate top-level actions.
pub mod plugin;
// Logging setup.
pub mod logging;
// Error handling.
pub mod error;

pub use command::CommandSource;
pub use config::{Config, Settings, Target};
pub use error::DispatchError;
pub use filter::{select_hosts, SelectionCriteria};
pub use gate::{Completion, CompletionGuard, ConcurrencyGate};
pub use host::{HostRecord, Inventory, YamlInventory};
pub use plugin::{AltCommand, AltContext, ALTERNATES};
pub use scheduler::{plan, run_invocation, Dispatcher, Plan};
pub use session::{ConnectParams, Connector, Session, SshConnector};
pub use unit::{run_unit, ExecutionResult, UnitContext};
pub use writer::ReportWriter;
