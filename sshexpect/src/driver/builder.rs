//! Builder for creating SSH shell clients.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::client::SshClient;
use crate::channel::{compile_pattern, ScanMode, DEFAULT_READY_PATTERN};
use crate::error::{DriverError, Result};
use crate::transport::config::{AuthMethod, HostKeyVerification, PtyConfig, SshConfig};
use crate::verbosity::Verbosity;

/// Builder for constructing [`SshClient`]s.
///
/// # Example
///
/// ```rust,no_run
/// use sshexpect::ClientBuilder;
///
/// # fn example() -> Result<(), sshexpect::Error> {
/// let client = ClientBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .pty_default()
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    auth: Option<AuthMethod>,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
    pty: Option<PtyConfig>,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    ready_pattern: String,
    verbosity: Verbosity,
    scan_mode: ScanMode,
}

impl ClientBuilder {
    /// Create a new client builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            auth: None,
            connect_timeout: Duration::from_secs(60),
            command_timeout: None,
            pty: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            ready_pattern: DEFAULT_READY_PATTERN.to_string(),
            verbosity: Verbosity::default(),
            scan_mode: ScanMode::default(),
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = Some(AuthMethod::Password(SecretString::from(password.into())));
        self
    }

    /// Authenticate with the keys held by the SSH agent.
    pub fn agent(mut self) -> Self {
        self.auth = Some(AuthMethod::Agent);
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = Some(AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        });
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = Some(AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        });
        self
    }

    /// Set the authentication method directly.
    pub fn auth(mut self, auth: AuthMethod) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the timeout for connecting, authenticating and the prompt
    /// handshake (default: 60s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound every command by `timeout`. Unset by default, in which case a
    /// command whose patterns never match waits forever.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Request a PTY with the given settings before starting the shell.
    pub fn pty(mut self, pty: PtyConfig) -> Self {
        self.pty = Some(pty);
        self
    }

    /// Request a `vt100` 80x40 PTY with echo on.
    pub fn pty_default(self) -> Self {
        self.pty(PtyConfig::default())
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Accept any host key.
    pub fn danger_disable_host_key_verification(self) -> Self {
        self.host_key_verification(HostKeyVerification::Disabled)
    }

    /// Use a known_hosts file other than `~/.ssh/known_hosts`.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Set the pattern that marks the shell as ready after login.
    pub fn ready_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ready_pattern = pattern.into();
        self
    }

    /// Set the diagnostic verbosity.
    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set how often error patterns are tested.
    pub fn scan_mode(mut self, scan_mode: ScanMode) -> Self {
        self.scan_mode = scan_mode;
        self
    }

    /// Build the client.
    ///
    /// This validates the configuration and compiles the ready pattern but
    /// does not connect. Call `open()` on the returned client.
    pub fn build(self) -> Result<SshClient> {
        let username = self.username.ok_or_else(|| DriverError::InvalidConfig {
            message: "Username is required".to_string(),
        })?;

        let auth = self.auth.ok_or_else(|| DriverError::InvalidConfig {
            message: "An authentication method is required".to_string(),
        })?;

        let ready = compile_pattern("ready", &self.ready_pattern)?;

        let ssh_config = SshConfig {
            host: self.host,
            port: self.port,
            username,
            auth,
            connect_timeout: self.connect_timeout,
            pty: self.pty,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
        };

        Ok(SshClient::new(
            ssh_config,
            ready,
            self.verbosity,
            self.scan_mode,
            self.command_timeout,
        ))
    }
}
