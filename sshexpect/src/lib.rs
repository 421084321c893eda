//! # sshexpect
//!
//! Async expect-style automation of interactive remote shells over SSH.
//!
//! A remote shell stream has no framing. sshexpect writes command text and
//! decides when the command has finished, and whether it failed, purely by
//! matching named regular expressions against everything read since the
//! command was sent.
//!
//! ## Features
//!
//! - Async SSH connections via russh (password, agent or key authentication)
//! - Optional PTY with configurable size, terminal type and echo
//! - Prompt handshake after login
//! - Ordered "valid" and "error" pattern sets per command, compiled once
//! - Completion only when no unread output is buffered
//! - Optional per-command deadline and cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sshexpect::{ClientBuilder, Command, Driver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sshexpect::Error> {
//!     let mut client = ClientBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .pty_default()
//!         .build()?;
//!
//!     client.open().await?;
//!
//!     let mut cmd = Command::new("uname -a\n")
//!         .valid("prompt", r"[$#]\s*$")
//!         .error("missing", "command not found");
//!     let out = client.run_command(&mut cmd).await?;
//!     println!("{}", out.output);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Commands that never finish
//!
//! A command only finishes when one of its valid patterns matches. If the
//! remote output never matches, `run_command` waits forever unless the
//! client has a command timeout ([`ClientBuilder::command_timeout`]) or a
//! cancellation token ([`SshClient::set_cancellation`]).

pub mod channel;
pub mod driver;
pub mod error;
pub mod transport;
pub mod verbosity;

// Re-export main types for convenience
pub use channel::{ReadGuard, ScanMode, ShellChannel};
pub use driver::{ClientBuilder, Command, CommandOutput, Driver, SshClient};
pub use error::Error;
pub use transport::{AuthMethod, PtyConfig, SessionOptions, SshConfig};
pub use verbosity::Verbosity;
