//! SSH shell client: owns the transport and the established shell channel.

use std::time::Duration;

use log::debug;
use regex::bytes::Regex;
use russh::ChannelStream;
use russh::client::Msg;
use tokio::io::{ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use super::Driver;
use crate::channel::{Command, CommandOutput, ReadGuard, ScanMode, ShellChannel};
use crate::error::{DriverError, Result};
use crate::transport::config::SshConfig;
use crate::transport::SshTransport;
use crate::verbosity::Verbosity;

type RemoteShell = ShellChannel<ReadHalf<ChannelStream<Msg>>, WriteHalf<ChannelStream<Msg>>>;

/// An established connection: the transport and its interactive shell.
struct Connection {
    transport: SshTransport,
    shell: RemoteShell,
}

/// Client for one interactive remote shell.
///
/// A client starts unestablished. [`open`](Driver::open) connects,
/// authenticates, starts the shell and waits for the ready pattern;
/// [`close`](Driver::close) tears it down again. Commands run one at a time
/// in the order they are issued.
///
/// Commands are only bounded if a command timeout or cancellation token is
/// configured. Otherwise a command whose valid patterns never match the
/// remote output makes [`run_command`](Driver::run_command) wait forever.
pub struct SshClient {
    /// SSH configuration.
    config: SshConfig,

    /// Pattern that marks the shell as ready after login.
    ready: Regex,

    verbosity: Verbosity,

    scan_mode: ScanMode,

    /// Deadline applied to every command.
    command_timeout: Option<Duration>,

    /// Cancels any handshake or command in progress.
    cancel: Option<CancellationToken>,

    /// Transport and shell (None when disconnected).
    connection: Option<Connection>,
}

impl SshClient {
    pub(crate) fn new(
        config: SshConfig,
        ready: Regex,
        verbosity: Verbosity,
        scan_mode: ScanMode,
        command_timeout: Option<Duration>,
    ) -> Self {
        Self {
            config,
            ready,
            verbosity,
            scan_mode,
            command_timeout,
            cancel: None,
            connection: None,
        }
    }

    /// Get the SSH configuration.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Get the ready pattern.
    pub fn ready_pattern(&self) -> &Regex {
        &self.ready
    }

    /// The deadline applied to every command.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    /// Set or clear the deadline applied to every command.
    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
    }

    /// Abort the handshake or command in progress when `token` is cancelled.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    /// Run a command with an explicit guard instead of the client's
    /// command timeout.
    pub async fn run_command_with(
        &mut self,
        command: &mut Command,
        guard: &ReadGuard,
    ) -> Result<CommandOutput> {
        let connection = self.connection.as_mut().ok_or(DriverError::NotConnected)?;
        connection.shell.run(command, guard).await
    }

    fn guard(&self, timeout: Option<Duration>) -> ReadGuard {
        let guard = ReadGuard::unbounded().timeout(timeout);
        match &self.cancel {
            Some(token) => guard.cancel_on(token.clone()),
            None => guard,
        }
    }

    fn log_options(&self) {
        if !self.verbosity.allows(4) {
            return;
        }
        let config = &self.config;
        debug!("client options:");
        debug!("  address = {}", config.socket_addr());
        debug!("  user = {}", config.username);
        debug!("  auth method = {}", config.auth.name());
        debug!("  host key verification = {:?}", config.host_key_verification);
        debug!("  pty = {:?}", config.pty);
        debug!("  ready pattern = {:?}", self.ready.as_str());
        debug!("  connect timeout = {:?}", config.connect_timeout);
        debug!("  command timeout = {:?}", self.command_timeout);
        debug!("  scan mode = {:?}", self.scan_mode);
        debug!("  verbosity = {}", self.verbosity.level());
    }
}

impl Driver for SshClient {
    async fn open(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Err(DriverError::AlreadyConnected.into());
        }

        self.log_options();

        let transport = SshTransport::connect(&self.config).await?;

        let stream = match transport.open_shell(self.config.pty.as_ref()).await {
            Ok(stream) => stream,
            Err(e) => return Err(e.with_disconnect(transport.disconnect().await)),
        };

        let (reader, writer) = tokio::io::split(stream);
        let mut shell = ShellChannel::new(reader, writer)
            .with_verbosity(self.verbosity)
            .with_scan_mode(self.scan_mode);

        let guard = self.guard(Some(self.config.connect_timeout));
        if let Err(e) = shell.await_ready(&self.ready, &guard).await {
            return Err(e.with_disconnect(transport.disconnect().await));
        }

        debug!("shell ready on {}", self.config.socket_addr());
        self.connection = Some(Connection { transport, shell });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Connection {
            transport,
            mut shell,
        } = self.connection.take().ok_or(DriverError::NotConnected)?;

        let shutdown = shell.shutdown().await;
        transport.close().await?;
        shutdown?;

        debug!("disconnected from {}", self.config.socket_addr());
        Ok(())
    }

    async fn run_command(&mut self, command: &mut Command) -> Result<CommandOutput> {
        let guard = self.guard(self.command_timeout);
        self.run_command_with(command, &guard).await
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn is_alive(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.transport.is_alive())
    }
}
