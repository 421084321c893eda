//! Run a scripted list of commands from a JSON file.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example run_commands -- session.json
//! ```
//!
//! The file holds the session options and the commands to run:
//!
//! ```json
//! {
//!   "opts": {
//!     "host": "localhost",
//!     "user": "admin",
//!     "authMethod": "password",
//!     "password": "secret",
//!     "usePty": true,
//!     "commandTimeout": 30
//!   },
//!   "commands": [
//!     {
//!       "exec": "ls /root\n",
//!       "validPatterns": { "prompt": "[$#]\\s*$" },
//!       "errorPatterns": { "denied": "Permission denied" }
//!     }
//!   ]
//! }
//! ```

use std::env;
use std::fs;

use serde::Deserialize;
use sshexpect::{Command, Driver, SessionOptions};

#[derive(Deserialize)]
struct Input {
    opts: SessionOptions,
    commands: Vec<Command>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("Please specify an input JSON file.");
        std::process::exit(1);
    };

    let input: Input = serde_json::from_str(&fs::read_to_string(&path)?)?;
    let Input { opts, mut commands } = input;

    let mut client = opts.into_builder()?.build()?;

    println!("Connecting to {}...", client.config().socket_addr());
    client.open().await?;
    println!("Connected");

    for cmd in commands.iter_mut() {
        let out = client.run_command(cmd).await?;
        for message in out.error_messages() {
            eprintln!("command {:?}: {}", out.command, message);
        }
        println!("command output ({:?}):\n{}", out.elapsed, out.output);
    }

    client.close().await?;
    println!("Disconnected");

    Ok(())
}
