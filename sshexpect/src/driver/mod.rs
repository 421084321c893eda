//! High-level client for remote shell automation.
//!
//! The driver layer provides the main API: build a client, open the shell,
//! run commands, close.

mod builder;
mod client;

pub use builder::ClientBuilder;
pub use client::SshClient;
pub use crate::channel::{Command, CommandOutput, CompiledPatterns, ErrorRecord};

use std::future::Future;

use crate::error::Result;

/// Trait for shell drivers.
pub trait Driver: Send {
    /// Connect, start the shell and wait for the ready pattern.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the connection. Fails if it was never opened.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send a command and wait for one of its valid patterns.
    fn run_command(
        &mut self,
        command: &mut Command,
    ) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Run several commands sequentially, stopping at the first error.
    fn run_commands(
        &mut self,
        commands: &mut [Command],
    ) -> impl Future<Output = Result<Vec<CommandOutput>>> + Send {
        async move {
            let mut outputs = Vec::with_capacity(commands.len());
            for cmd in commands.iter_mut() {
                outputs.push(self.run_command(cmd).await?);
            }
            Ok(outputs)
        }
    }

    /// Check if the driver is connected.
    fn is_open(&self) -> bool;

    /// Check if the underlying SSH session is still alive.
    fn is_alive(&self) -> bool;
}
