//! Connection layer.
//!
//! Dispatch only needs "connect to a host" and "run one command line on it". Both sit behind
//! traits so the transport can be swapped (and mocked in tests). `SshConnector` is the transport
//! the binary ships with.

use std::time::Duration;

use async_trait::async_trait;
use openssh::{KnownHosts, Session as SSHSession, SessionBuilder};

use crate::error::{DispatchError, Result};
use crate::host::HostRecord;

/// Protocols tried when none are configured.
pub const DEFAULT_PROTOCOLS: &[&str] = &["ssh", "telnet"];

/// Connection parameters shared read-only by every execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Overrides the inventory model when set.
    pub model: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect timeout in seconds.
    pub timeout: Option<u64>,
    /// Enable secret.
    pub enable: Option<String>,
    /// SNMP community used for discovery.
    pub community: Option<String>,
    /// Protocols in order of preference.
    pub protocols: Vec<String>,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            model: None,
            username: None,
            password: None,
            timeout: None,
            enable: None,
            community: None,
            protocols: DEFAULT_PROTOCOLS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ConnectParams {
    /// The model to use for `host`: the override if given, otherwise the inventory's.
    pub fn model_for<'a>(&'a self, host: &'a HostRecord) -> &'a str {
        self.model.as_deref().unwrap_or(&host.model)
    }
}

/// Parses a protocol list such as `"ssh, telnet"`.
pub fn parse_protocols(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_ascii_lowercase())
        .collect()
}

/// An open connection to one host.
#[async_trait]
pub trait Session: Send {
    /// Runs one command line and returns its output.
    async fn cmd(&mut self, line: &str) -> Result<String>;

    /// Closes the connection. Errors while closing are not interesting to callers.
    async fn close(self: Box<Self>) {}
}

/// Opens sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &HostRecord, params: &ConnectParams) -> Result<Box<dyn Session>>;
}

/// Connects over SSH using the system `ssh` binary in multiplexing mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

impl SshConnector {
    const SUPPORTED: &'static [&'static str] = &["ssh"];

    fn pick_protocol(params: &ConnectParams) -> Result<&str> {
        params
            .protocols
            .iter()
            .map(String::as_str)
            .find(|p| Self::SUPPORTED.contains(p))
            .ok_or_else(|| {
                DispatchError::Unsupported(format!(
                    "None of the protocols [{}] are supported (supported: ssh).",
                    params.protocols.join(", ")
                ))
            })
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, host: &HostRecord, params: &ConnectParams) -> Result<Box<dyn Session>> {
        let protocol = Self::pick_protocol(params)?;
        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(KnownHosts::Add);
        if let Some(username) = &params.username {
            builder.user(username.clone());
        }
        if let Some(timeout) = params.timeout {
            builder.connect_timeout(Duration::from_secs(timeout));
        }
        if params.password.is_some() || params.enable.is_some() || params.community.is_some() {
            tracing::debug!(
                host = %host.name,
                "password, enable secret and community are not used by the {} exec channel",
                protocol
            );
        }
        tracing::debug!(
            host = %host.name,
            address = host.address(),
            model = params.model_for(host),
            protocol,
            "Connecting"
        );

        let session = builder
            .connect_mux(host.address())
            .await
            .map_err(|e| DispatchError::Connect {
                host: host.name.clone(),
                source: Box::new(DispatchError::Ssh(e)),
            })?;
        Ok(Box::new(SshSession {
            host: host.name.clone(),
            session,
        }))
    }
}

struct SshSession {
    host: String,
    session: SSHSession,
}

#[async_trait]
impl Session for SshSession {
    async fn cmd(&mut self, line: &str) -> Result<String> {
        let command = line.trim_end_matches(['\r', '\n']);
        // An empty exec request would open a login shell.
        if command.trim().is_empty() {
            return Ok(String::new());
        }
        tracing::info!(host = %self.host, "sending '{}'", command);
        let output = self.session.raw_command(command).output().await?;
        if !output.status.success() {
            return Err(DispatchError::Command {
                command: command.to_string(),
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim_end()
                ),
            });
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    async fn close(self: Box<Self>) {
        let SshSession { host, session } = *self;
        if let Err(e) = session.close().await {
            tracing::warn!(host = %host, "Error while terminating: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_protocols() {
        assert_eq!(parse_protocols("ssh, telnet"), vec!["ssh", "telnet"]);
        assert_eq!(parse_protocols("Telnet,SSH"), vec!["telnet", "ssh"]);
        assert!(parse_protocols(" , ").is_empty());
    }

    #[test]
    fn test_default_protocols() {
        assert_eq!(ConnectParams::default().protocols, vec!["ssh", "telnet"]);
    }

    #[test]
    fn test_model_override() {
        let host = HostRecord::new("sw1").with_model("ios");
        let mut params = ConnectParams::default();
        assert_eq!(params.model_for(&host), "ios");
        params.model = Some("nxos".into());
        assert_eq!(params.model_for(&host), "nxos");
    }

    #[test]
    fn test_pick_protocol_skips_unsupported() {
        let params = ConnectParams {
            protocols: vec!["telnet".into(), "ssh".into()],
            ..Default::default()
        };
        assert_eq!(SshConnector::pick_protocol(&params).unwrap(), "ssh");
    }

    #[test]
    fn test_pick_protocol_telnet_only_is_unsupported() {
        let params = ConnectParams {
            protocols: vec!["telnet".into()],
            ..Default::default()
        };
        assert!(matches!(
            SshConnector::pick_protocol(&params),
            Err(DispatchError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_without_ssh_protocol_fails_before_dialing() {
        let params = ConnectParams {
            protocols: vec!["telnet".into()],
            ..Default::default()
        };
        let result = SshConnector.connect(&HostRecord::new("sw1"), &params).await;
        assert!(result.is_err());
    }
}
