//! Serializable session options, as loaded from a JSON options file.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use super::config::{AuthMethod, HostKeyVerification, PtyConfig};
use crate::channel::{ScanMode, DEFAULT_READY_PATTERN};
use crate::driver::ClientBuilder;
use crate::error::{DriverError, Result, TransportError};
use crate::verbosity::Verbosity;

/// Flat option set describing one session.
///
/// Field names are camelCase in serialized form. Every field has a default,
/// so only what differs needs to be given:
///
/// ```json
/// {
///   "host": "10.0.0.5",
///   "user": "admin",
///   "authMethod": "password",
///   "password": "secret",
///   "usePty": true
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub user: String,

    /// One of `password`, `agent`, `publickey` (or `key`).
    pub auth_method: String,

    #[serde(deserialize_with = "secret")]
    pub password: Option<SecretString>,

    pub private_key: Option<PathBuf>,

    #[serde(deserialize_with = "secret")]
    pub passphrase: Option<SecretString>,

    pub ignore_host_key_verification: bool,
    pub known_hosts: Option<PathBuf>,

    pub use_pty: bool,
    pub terminal_columns: u32,
    pub terminal_rows: u32,
    pub terminal_echo_flag: u32,
    pub terminal_type: String,

    pub ready_pattern: String,

    /// Seconds allowed for connecting, authenticating and the handshake.
    pub connect_timeout: u64,

    /// Seconds allowed per command. Unset means unbounded.
    pub command_timeout: Option<u64>,

    pub verbosity: Verbosity,
    pub scan_mode: ScanMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let pty = PtyConfig::default();
        Self {
            host: String::new(),
            port: 22,
            user: String::new(),
            auth_method: "password".to_string(),
            password: None,
            private_key: None,
            passphrase: None,
            ignore_host_key_verification: false,
            known_hosts: None,
            use_pty: false,
            terminal_columns: pty.columns,
            terminal_rows: pty.rows,
            terminal_echo_flag: pty.echo,
            terminal_type: pty.term,
            ready_pattern: DEFAULT_READY_PATTERN.to_string(),
            connect_timeout: 60,
            command_timeout: None,
            verbosity: Verbosity::default(),
            scan_mode: ScanMode::default(),
        }
    }
}

impl SessionOptions {
    /// Resolve `auth_method` and its credentials.
    pub fn auth(&self) -> Result<AuthMethod> {
        match self.auth_method.as_str() {
            "password" => {
                let password = self.password.clone().ok_or_else(|| DriverError::InvalidConfig {
                    message: "password authentication requires a password".to_string(),
                })?;
                Ok(AuthMethod::Password(password))
            }
            "agent" => Ok(AuthMethod::Agent),
            "publickey" | "key" => {
                let path = self.private_key.clone().ok_or_else(|| DriverError::InvalidConfig {
                    message: "key authentication requires privateKey".to_string(),
                })?;
                Ok(AuthMethod::PrivateKey {
                    path,
                    passphrase: self.passphrase.clone(),
                })
            }
            other => Err(TransportError::UnsupportedAuthMethod {
                method: other.to_string(),
            }
            .into()),
        }
    }

    /// PTY settings, if a PTY was asked for.
    pub fn pty(&self) -> Option<PtyConfig> {
        self.use_pty.then(|| PtyConfig {
            term: self.terminal_type.clone(),
            columns: self.terminal_columns,
            rows: self.terminal_rows,
            echo: self.terminal_echo_flag,
        })
    }

    /// Validate the options into a [`ClientBuilder`].
    pub fn into_builder(self) -> Result<ClientBuilder> {
        let auth = self.auth()?;
        let pty = self.pty();

        let mut builder = ClientBuilder::new(self.host)
            .port(self.port)
            .username(self.user)
            .auth(auth)
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .ready_pattern(self.ready_pattern)
            .verbosity(self.verbosity)
            .scan_mode(self.scan_mode);

        if let Some(pty) = pty {
            builder = builder.pty(pty);
        }
        if let Some(secs) = self.command_timeout {
            builder = builder.command_timeout(Duration::from_secs(secs));
        }
        if self.ignore_host_key_verification {
            builder = builder.host_key_verification(HostKeyVerification::Disabled);
        }
        if let Some(path) = self.known_hosts {
            builder = builder.known_hosts_path(path);
        }

        Ok(builder)
    }
}

fn secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}
