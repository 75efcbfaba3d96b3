use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// Raised before dispatch when there is no host, no command, or no matching host.
    #[error("{0}")]
    NothingToDo(String),
    #[error("Failed to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: Box<DispatchError>,
    },
    #[error("Command '{command}' failed: {reason}")]
    Command { command: String, reason: String },
    #[error("Failed to connect SSH session or execute SSH command: {0}")]
    Ssh(#[from] openssh::Error),
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse inventory {path}: {source}")]
    Inventory {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Duplicate host '{0}' in inventory")]
    DuplicateHost(String),
    #[error("Failed to parse settings {path}: {source}")]
    Settings {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Failed to render command template: {0}")]
    Template(String),
    #[error("{0}")]
    Unsupported(String),
    /// A unit died without producing a result.
    #[error("unit panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    pub fn nothing_to_do(message: impl Into<String>) -> Self {
        Self::NothingToDo(message.into())
    }

    /// Whether this error is the fatal "nothing to do" validation condition.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, Self::NothingToDo(_))
    }
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
