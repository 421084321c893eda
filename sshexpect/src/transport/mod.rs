//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level SSH connection management:
//! connection setup, authentication, PTY requests and shell channels.

pub mod config;
pub mod options;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, PtyConfig, SshConfig};
pub use options::SessionOptions;
pub use ssh::SshTransport;
