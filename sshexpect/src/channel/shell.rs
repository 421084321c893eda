//! Prompt handshake and command execution over a duplex byte stream.
//!
//! There is no framing on an interactive shell stream. The only way to know
//! that the shell is ready, or that a command has finished, is to look for
//! known text in everything read so far. A completion match only counts once
//! the read buffer is empty: if more bytes have already arrived, the remote
//! is still writing and the match may be premature.

use std::time::Instant;

use log::{debug, trace, warn};
use regex::bytes::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::buffer::Accumulator;
use super::command::{Command, CompiledPatterns};
use super::guard::{Interrupt, ReadGuard};
use super::response::{CommandOutput, ErrorRecord};
use crate::error::{ChannelError, Error, Result, TransportError};
use crate::verbosity::Verbosity;

/// How often error patterns are tested while output arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanMode {
    /// After every byte. An error pattern that only matches transiently
    /// (e.g. anchored to the end of output) is still seen.
    #[default]
    PerByte,

    /// Once per buffered chunk. Much cheaper on long outputs, but transient
    /// matches inside a chunk are missed.
    PerChunk,
}

/// An established interactive shell: a buffered read side and a write side.
///
/// The read buffer is shared by the handshake and every command in turn;
/// bytes consumed by one operation are never seen by the next. Operations
/// take `&mut self`, so commands on one channel are always serialized.
pub struct ShellChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
    verbosity: Verbosity,
    scan_mode: ScanMode,
}

impl<R, W> ShellChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap the two halves of a shell stream.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            verbosity: Verbosity::default(),
            scan_mode: ScanMode::default(),
        }
    }

    /// Set the diagnostic verbosity.
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set how often error patterns are tested.
    pub fn with_scan_mode(mut self, scan_mode: ScanMode) -> Self {
        self.scan_mode = scan_mode;
        self
    }

    /// Bytes already read from the stream but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.reader.buffer().len()
    }

    /// Wait until `ready` matches the shell's output.
    ///
    /// Reads until the pattern matches everything received so far. Bytes
    /// that arrived with the prompt are left buffered for the next command,
    /// except for those that extend the prompt match itself (typically its
    /// trailing whitespace).
    ///
    /// Without a deadline or cancellation in `guard` this waits forever if
    /// the prompt never appears.
    pub async fn await_ready(&mut self, ready: &Regex, guard: &ReadGuard) -> Result<()> {
        let mut acc = Accumulator::new();
        let outcome = guard
            .run(read_until_ready(&mut self.reader, &mut acc, ready))
            .await;

        match outcome {
            Ok(result) => result?,
            Err(interrupt) => return Err(interrupted(interrupt, acc)),
        }

        debug!(
            "ready pattern matched after {} bytes, {} left buffered",
            acc.len(),
            self.buffered()
        );
        Ok(())
    }

    /// Run a command and collect its output.
    ///
    /// Writes [`Command::exec`] verbatim, then reads until a valid pattern
    /// matches and no unread bytes remain buffered. Error pattern matches are
    /// collected in [`CommandOutput::errors`]; they do not end the command
    /// unless it is fail-fast.
    ///
    /// **This never returns if no valid pattern ever matches** and `guard`
    /// has neither a deadline nor a cancellation token. Give every command
    /// a pattern for each way it can end, or bound the read.
    pub async fn run(&mut self, command: &mut Command, guard: &ReadGuard) -> Result<CommandOutput> {
        let patterns = command.compile()?;
        command.log_config(self.verbosity);

        if patterns.valid.is_empty() {
            warn!(
                "command {:?} has no valid patterns; it ends only on EOF, timeout or cancellation",
                command.exec()
            );
        }

        let start = Instant::now();
        self.send(command.exec()).await?;

        let mut acc = Accumulator::new();
        let mut errors = ErrorRecord::new();
        let outcome = guard
            .run(read_until_complete(
                &mut self.reader,
                &mut acc,
                &mut errors,
                &patterns,
                command.is_fail_fast(),
                self.scan_mode,
            ))
            .await;

        let matched = match outcome {
            Ok(result) => result?,
            Err(interrupt) => return Err(interrupted(interrupt, acc)),
        };

        let elapsed = start.elapsed();
        debug!(
            "command completed in {:?} on {:?}, {} bytes, {} error(s)",
            elapsed,
            matched,
            acc.len(),
            errors.len()
        );

        Ok(CommandOutput {
            command: command.exec().to_string(),
            output: acc.into_string(),
            errors: errors.into_vec(),
            matched,
            elapsed,
        })
    }

    /// Write raw text to the shell and flush it.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .await
            .map_err(TransportError::Io)?;
        self.writer.flush().await.map_err(TransportError::Io)?;
        Ok(())
    }

    /// Shut down the write side, signalling EOF to the remote shell.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(TransportError::Io)?;
        Ok(())
    }
}

async fn read_until_ready<R>(
    reader: &mut BufReader<R>,
    acc: &mut Accumulator,
    ready: &Regex,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await.map_err(TransportError::Io)?;
        if chunk.is_empty() {
            return Err(ChannelError::Closed.into());
        }

        // Once the prompt has matched, only bytes that extend that same
        // match (its trailing whitespace) are taken. Anything else belongs
        // to the next command.
        let mut prompt_start = None;
        let mut matched_through = None;
        for (i, &byte) in chunk.iter().enumerate() {
            acc.push(byte);
            match (prompt_start, acc.find(ready)) {
                (None, Some(span)) => {
                    prompt_start = Some(span.start);
                    matched_through = Some(i);
                }
                (None, None) => {}
                (Some(start), Some(span)) if span == (start..acc.len()) => {
                    matched_through = Some(i);
                }
                (Some(_), _) => {
                    acc.truncate_tail(1);
                    break;
                }
            }
        }

        let len = chunk.len();
        match matched_through {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => reader.consume(len),
        }
    }
}

async fn read_until_complete<R>(
    reader: &mut BufReader<R>,
    acc: &mut Accumulator,
    errors: &mut ErrorRecord,
    patterns: &CompiledPatterns,
    fail_fast: bool,
    scan_mode: ScanMode,
) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let check_errors = !patterns.error.is_empty();

    loop {
        let chunk = reader.fill_buf().await.map_err(TransportError::Io)?;
        if chunk.is_empty() {
            return Err(ChannelError::Closed.into());
        }

        match scan_mode {
            ScanMode::PerByte => {
                for &byte in chunk {
                    acc.push(byte);
                    if check_errors {
                        record_error(acc, errors, patterns);
                    }
                }
            }
            ScanMode::PerChunk => {
                acc.extend(chunk);
                if check_errors {
                    record_error(acc, errors, patterns);
                }
            }
        }

        let len = chunk.len();
        reader.consume(len);
        trace!("read chunk: {} bytes, accumulated: {} bytes", len, acc.len());

        // Nothing is buffered past this point, so a match here is final.
        if let Some(name) = acc.first_match(&patterns.valid) {
            return Ok(name.to_string());
        }
        if fail_fast {
            if let Some(name) = errors.last() {
                debug!("fail-fast command stopped on error pattern {name:?}");
                return Ok(name.to_string());
            }
        }
    }
}

fn record_error(acc: &Accumulator, errors: &mut ErrorRecord, patterns: &CompiledPatterns) {
    if let Some(name) = acc.first_match(&patterns.error) {
        if errors.record(name) {
            debug!("error pattern {name:?} matched");
        }
    }
}

fn interrupted(interrupt: Interrupt, acc: Accumulator) -> Error {
    if acc.is_empty() {
        debug!("interrupted before any output arrived");
    }
    let partial = acc.into_string();
    match interrupt {
        Interrupt::TimedOut(after) => ChannelError::TimedOut { after, partial }.into(),
        Interrupt::Cancelled => ChannelError::Cancelled { partial }.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio_test::io::{Builder, Mock};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::channel::patterns::{compile_pattern, DEFAULT_READY_PATTERN};

    fn mock_channel(mock: Mock) -> ShellChannel<ReadHalf<Mock>, WriteHalf<Mock>> {
        let (reader, writer) = tokio::io::split(mock);
        ShellChannel::new(reader, writer)
    }

    fn duplex_channel() -> (
        ShellChannel<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>,
        DuplexStream,
    ) {
        let (client, server) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        (ShellChannel::new(reader, writer), server)
    }

    fn ready() -> Regex {
        compile_pattern("ready", DEFAULT_READY_PATTERN).unwrap()
    }

    fn prompt_command(exec: &str) -> Command {
        Command::new(exec).valid("prompt", r"\$\s*$")
    }

    #[tokio::test]
    async fn test_handshake_completes_on_prompt() {
        let mut channel = mock_channel(Builder::new().read(b"Welcome\nuser@host:~$ ").build());
        channel.await_ready(&ready(), &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(channel.buffered(), 0);
    }

    #[tokio::test]
    async fn test_handshake_across_reads() {
        let mut channel = mock_channel(
            Builder::new()
                .read(b"Last login: today\n")
                .read(b"user@ho")
                .read(b"st:~$ ")
                .build(),
        );
        channel.await_ready(&ready(), &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(channel.buffered(), 0);
    }

    #[tokio::test]
    async fn test_handshake_leaves_later_bytes_for_command() {
        let mut channel = mock_channel(
            Builder::new()
                .read(b"motd\n$ early")
                .write(b"true\n")
                .read(b"\r\n$ ")
                .build(),
        );
        channel.await_ready(&ready(), &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(channel.buffered(), "early".len());

        let mut cmd = prompt_command("true\n");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(out.output, "early\r\n$ ");
    }

    #[tokio::test]
    async fn test_handshake_unanchored_pattern_keeps_following_output() {
        let mut channel = mock_channel(Builder::new().read(b"Welcome\n$ early").build());
        let welcome = compile_pattern("ready", "Welcome").unwrap();
        channel.await_ready(&welcome, &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(channel.buffered(), "\n$ early".len());
    }

    #[tokio::test]
    async fn test_handshake_stops_at_first_of_two_prompts() {
        let mut channel = mock_channel(Builder::new().read(b"$ \n$ ").write(b"true\n").build());
        channel.await_ready(&ready(), &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(channel.buffered(), "$ ".len());

        // The second prompt is the first thing the next command sees.
        let mut cmd = prompt_command("true\n");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(out.output, "$ ");
    }

    #[tokio::test]
    async fn test_handshake_eof_is_closed() {
        let mut channel = mock_channel(Builder::new().read(b"no prompt here\n").build());
        let err = channel
            .await_ready(&ready(), &ReadGuard::unbounded())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_handshake_timeout_reports_partial() {
        let (mut channel, mut server) = duplex_channel();
        server.write_all(b"Password expired\n").await.unwrap();

        let guard = ReadGuard::with_timeout(Duration::from_millis(50));
        let err = channel.await_ready(&ready(), &guard).await.unwrap_err();
        match err {
            Error::Channel(ChannelError::TimedOut { partial, .. }) => {
                assert_eq!(partial, "Password expired\n")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_returns_full_output() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"echo hi\n")
                .read(b"echo hi\r\nhi\r\nuser@host:~$ ")
                .build(),
        );
        let mut cmd = prompt_command("echo hi\n");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();

        assert_eq!(out.output, "echo hi\r\nhi\r\nuser@host:~$ ");
        assert_eq!(out.command, "echo hi\n");
        assert_eq!(out.matched, "prompt");
        assert!(out.errors.is_empty());
        assert!(out.is_success());
    }

    #[tokio::test]
    async fn test_run_records_error_pattern() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"sudo x\n")
                .read(b"sudo x\r\nPermission denied\r\nuser@host:~$ ")
                .build(),
        );
        let mut cmd = prompt_command("sudo x\n").error("denied", "Permission denied");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();

        assert_eq!(out.errors, vec!["denied"]);
        assert_eq!(out.output, "sudo x\r\nPermission denied\r\nuser@host:~$ ");
    }

    #[tokio::test]
    async fn test_run_pattern_spans_reads() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"hostname\n")
                .read(b"hostname\r\nbox\r\nuser@ho")
                .read(b"st:~$ ")
                .build(),
        );
        let mut cmd = Command::new("hostname\n").valid("prompt", r"host:~\$\s*$");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(out.output, "hostname\r\nbox\r\nuser@host:~$ ");
    }

    #[tokio::test]
    async fn test_run_drains_buffered_bytes_before_completing() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"build\n")
                .read(b"build\r\ndone\r\nwarning: late\r\n")
                .build(),
        );
        let mut cmd = Command::new("build\n")
            .valid("done", "done")
            .error("late", "late");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();

        assert_eq!(out.output, "build\r\ndone\r\nwarning: late\r\n");
        assert_eq!(out.errors, vec!["late"]);
        assert_eq!(channel.buffered(), 0);
    }

    #[tokio::test]
    async fn test_run_premature_prompt_is_not_final() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"ls\n")
                .read(b"ls\r\n$ not yet\r\nuser@host:~$ ")
                .build(),
        );
        let mut cmd = prompt_command("ls\n");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(out.output, "ls\r\n$ not yet\r\nuser@host:~$ ");
    }

    #[tokio::test]
    async fn test_error_dedup_per_byte() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"x\n")
                .read(b"A A B A\r\n$ ")
                .build(),
        );
        let mut cmd = prompt_command("x\n").error("a", "A$").error("b", "B$");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(out.errors, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_error_first_match_wins() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"x\n")
                .read(b"No such file\r\nPermission denied\r\n$ ")
                .build(),
        );
        let mut cmd = prompt_command("x\n")
            .error("missing", "No such file")
            .error("denied", "Permission denied");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(out.errors, vec!["missing"]);
    }

    #[tokio::test]
    async fn test_per_chunk_scan_misses_transient_errors() {
        let mock = Builder::new()
            .write(b"x\n")
            .read(b"A A B A\r\n")
            .read(b"fatal\r\n$ ")
            .build();
        let (reader, writer) = tokio::io::split(mock);
        let mut channel = ShellChannel::new(reader, writer).with_scan_mode(ScanMode::PerChunk);

        let mut cmd = prompt_command("x\n")
            .error("a", "A$")
            .error("fatal", "fatal");
        let out = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();
        assert_eq!(out.errors, vec!["fatal"]);
    }

    #[tokio::test]
    async fn test_reusing_command_keeps_compiled_patterns() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"date\n")
                .read(b"Mon\r\n$ ")
                .write(b"date\n")
                .read(b"Tue\r\n$ ")
                .build(),
        );
        let mut cmd = prompt_command("date\n");
        let compiled = cmd.compile().unwrap();

        let first = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();
        let second = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();

        assert_eq!(first.output, "Mon\r\n$ ");
        assert_eq!(second.output, "Tue\r\n$ ");
        assert!(Arc::ptr_eq(&compiled, &cmd.compile().unwrap()));
    }

    #[tokio::test]
    async fn test_bad_pattern_fails_before_writing() {
        let mut channel = mock_channel(Builder::new().build());
        let mut cmd = Command::new("ls\n").valid("broken", "(");
        let err = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap_err();
        assert!(matches!(err, Error::Pattern(ref e) if e.name() == "broken"));
    }

    #[tokio::test]
    async fn test_write_failure_is_transport_error() {
        let mut channel = mock_channel(
            Builder::new()
                .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
                .build(),
        );
        let mut cmd = prompt_command("ls\n");
        let err = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_eof_before_completion_is_closed() {
        let mut channel = mock_channel(
            Builder::new()
                .write(b"exit\n")
                .read(b"logout\r\n")
                .build(),
        );
        let mut cmd = prompt_command("exit\n");
        let err = channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_unmatched_command_never_returns() {
        let (mut channel, mut server) = duplex_channel();
        server.write_all(b"echo hi\r\nhi\r\nuser@host:~% ").await.unwrap();

        let mut cmd = prompt_command("echo hi\n");
        let result = tokio::time::timeout(
            Duration::from_millis(200),
            channel.run(&mut cmd, &ReadGuard::unbounded()),
        )
        .await;
        assert!(result.is_err(), "run completed without a matching pattern");
        drop(server);
    }

    #[tokio::test]
    async fn test_unmatched_command_times_out_with_guard() {
        let (mut channel, mut server) = duplex_channel();
        server.write_all(b"echo hi\r\nhi\r\n").await.unwrap();

        let mut cmd = prompt_command("echo hi\n");
        let guard = ReadGuard::with_timeout(Duration::from_millis(50));
        let err = channel.run(&mut cmd, &guard).await.unwrap_err();
        match err {
            Error::Channel(ChannelError::TimedOut { after, partial }) => {
                assert_eq!(after, Duration::from_millis(50));
                assert_eq!(partial, "echo hi\r\nhi\r\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_run() {
        let (mut channel, mut server) = duplex_channel();
        server.write_all(b"tail -f log\r\nline 1\r\n").await.unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let mut cmd = prompt_command("tail -f log\n");
        let guard = ReadGuard::unbounded().cancel_on(token);
        let err = channel.run(&mut cmd, &guard).await.unwrap_err();
        match err {
            Error::Channel(ref e @ ChannelError::Cancelled { .. }) => {
                assert_eq!(e.partial_output(), Some("tail -f log\r\nline 1\r\n"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fail_fast_stops_on_error() {
        let (mut channel, mut server) = duplex_channel();
        server
            .write_all(b"sudo reboot\r\nPermission denied\r\n")
            .await
            .unwrap();

        let mut cmd = prompt_command("sudo reboot\n")
            .error("denied", "Permission denied")
            .fail_fast(true);
        let guard = ReadGuard::with_timeout(Duration::from_secs(5));
        let out = channel.run(&mut cmd, &guard).await.unwrap();

        assert_eq!(out.errors, vec!["denied"]);
        assert_eq!(out.matched, "denied");
        assert!(!out.is_success());
    }

    #[tokio::test]
    async fn test_command_is_written_verbatim() {
        let (mut channel, mut server) = duplex_channel();
        server.write_all(b"$ ").await.unwrap();

        let mut cmd = Command::new("no newline").valid("prompt", r"\$\s*$");
        channel.run(&mut cmd, &ReadGuard::unbounded()).await.unwrap();

        let mut written = vec![0u8; "no newline".len()];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut written)
            .await
            .unwrap();
        assert_eq!(written, b"no newline");
    }
}
