// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sink side of an SCP transfer (`scp -t`).
//!
//! The sink acknowledges readiness, then consumes a stream of `T`, `C`,
//! `D` and `E` records, writing files and directories under its target
//! path. `D`/`E` pairs nest like balanced parentheses; the directory stack
//! lives on the call stack, since each accepted `D` record re-enters the
//! record loop one level deeper.
//!
//! The outer loop is deliberately tolerant of unknown discriminator bytes:
//! peers that emit spurious ACK echoes between records have been relied
//! upon to interoperate, so such bytes are skipped rather than rejected.
//! Inside a directory scope the protocol is strict.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::attrs;
use crate::command::ScpCommand;
use crate::config::ScpConfig;
use crate::error::{Result, ScpError};
use crate::events::{FileOperation, NoopListener, ScpEventListener};
use crate::resolve;
use crate::wire::Wire;

/// Behavior switches for a sink transfer, parsed from the remote command
/// line flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkOptions {
    /// Accept `D`/`E` directory records (-r).
    pub recursive: bool,
    /// Require the target to be an existing directory (-d).
    pub must_be_directory: bool,
    /// Apply received permission bits and buffered times (-p).
    pub preserve: bool,
}

impl From<&ScpCommand> for SinkOptions {
    fn from(cmd: &ScpCommand) -> Self {
        Self {
            recursive: cmd.recursive,
            must_be_directory: cmd.target_is_directory,
            preserve: cmd.preserve,
        }
    }
}

/// A parsed `C` or `D` record header.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub mode: u32,
    pub size: i64,
    pub name: String,
}

/// Parses the body of a `C`/`D` header: 4 octal mode digits, a space, a
/// decimal size, a space, and the leaf name. The leading discriminator has
/// already been validated by the caller.
pub(crate) fn parse_record_header(line: &str) -> Result<RecordHeader> {
    let malformed = |reason: &str| ScpError::MalformedHeader {
        header: line.to_string(),
        reason: reason.to_string(),
    };

    let rest = &line[1..];
    let mode_digits = rest.get(..4).ok_or_else(|| malformed("truncated permission field"))?;
    let mode = attrs::parse_octal_perms(mode_digits)
        .map_err(|_| malformed("invalid octal permission digits"))?;

    let rest = rest
        .get(4..)
        .filter(|r| r.starts_with(' '))
        .ok_or_else(|| malformed("missing space after permissions"))?;
    let rest = &rest[1..];

    let space = rest.find(' ').ok_or_else(|| malformed("missing space after size"))?;
    let size: i64 = rest[..space]
        .parse()
        .map_err(|_| malformed("invalid size digits"))?;

    let name = rest[space + 1..].to_string();
    if name.is_empty() {
        return Err(malformed("empty name"));
    }

    Ok(RecordHeader { mode, size, name })
}

/// Parses a `T<mtime> 0 <atime> 0` record into `(mtime, atime)`.
pub(crate) fn parse_times(line: &str) -> Result<(u64, u64)> {
    let malformed = || ScpError::MalformedHeader {
        header: line.to_string(),
        reason: "invalid time record".to_string(),
    };

    let fields: Vec<&str> = line[1..].split_whitespace().collect();
    if fields.len() < 3 {
        return Err(malformed());
    }
    let mtime: u64 = fields[0].parse().map_err(|_| malformed())?;
    let atime: u64 = fields[2].parse().map_err(|_| malformed())?;
    Ok((mtime, atime))
}

/// Receiver state machine for `scp -t`.
pub struct ScpSink<R, W> {
    wire: Wire<R, W>,
    config: ScpConfig,
    events: Arc<dyn ScpEventListener>,
}

impl<R, W> ScpSink<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        input: R,
        output: W,
        config: ScpConfig,
        events: Option<Arc<dyn ScpEventListener>>,
    ) -> Self {
        let max_line_length = config.max_line_length;
        Self {
            wire: Wire::new(input, output, max_line_length),
            config,
            events: events.unwrap_or_else(|| Arc::new(NoopListener)),
        }
    }

    /// Runs the sink until the peer closes the stream or a failure aborts
    /// the transfer. Local failures are reported to the peer in-band
    /// (`0x02 <message>\n`, best effort) before being returned.
    pub async fn run(&mut self, target: &Path, options: SinkOptions) -> Result<()> {
        tracing::info!(
            target_path = %target.display(),
            recursive = options.recursive,
            preserve = options.preserve,
            "Starting sink transfer"
        );

        match self.receive(target, options).await {
            Ok(()) => {
                tracing::info!(target_path = %target.display(), "Sink transfer completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(target_path = %target.display(), error = %e, "Sink transfer failed");
                let _ = self.wire.send_error(&e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn receive(&mut self, target: &Path, options: SinkOptions) -> Result<()> {
        self.config.check_buffer_size()?;

        if options.must_be_directory {
            match resolve::stat(target).await? {
                None => {
                    return Err(ScpError::NotFound {
                        path: target.to_path_buf(),
                    })
                }
                Some(metadata) if !metadata.is_dir() => {
                    return Err(ScpError::NotADirectory {
                        path: target.to_path_buf(),
                    })
                }
                Some(_) => {}
            }
        }

        self.wire.send_ack().await?;

        let mut times: Option<(u64, u64)> = None;
        loop {
            let discriminator = match self.wire.read_ack(true).await? {
                None => return Ok(()),
                Some(byte) => byte,
            };

            match discriminator {
                b'C' | b'D' => {
                    let line = self.rest_of_header(discriminator).await?;
                    tracing::debug!(header = %line, "Received header");
                    if discriminator == b'D' && options.recursive {
                        self.receive_dir(&line, target, times.take(), options.preserve)
                            .await?;
                    } else {
                        // A D record without -r lands here and fails the
                        // C-record check, surfacing as a protocol error.
                        self.receive_file(&line, target, times.take(), options.preserve)
                            .await?;
                    }
                }
                b'T' => {
                    let line = self.rest_of_header(discriminator).await?;
                    tracing::debug!(header = %line, "Received header");
                    times = Some(parse_times(&line)?);
                    self.wire.send_ack().await?;
                }
                b'E' => {
                    self.rest_of_header(discriminator).await?;
                    self.wire.send_ack().await?;
                    return Ok(());
                }
                _ => {
                    // An ACK echo that has been acted upon already.
                }
            }
        }
    }

    async fn rest_of_header(&mut self, discriminator: u8) -> Result<String> {
        let rest = match self.wire.read_line(false).await? {
            Some(rest) => rest,
            None => {
                return Err(ScpError::UnexpectedEof {
                    context: "awaiting end of header",
                })
            }
        };
        let mut line = String::with_capacity(rest.len() + 1);
        line.push(discriminator as char);
        line.push_str(&rest);
        Ok(line)
    }

    async fn receive_file(
        &mut self,
        header: &str,
        target: &Path,
        times: Option<(u64, u64)>,
        preserve: bool,
    ) -> Result<()> {
        if !header.starts_with('C') {
            return Err(ScpError::ProtocolViolation(format!(
                "expected a C record but got '{header}'"
            )));
        }

        let record = parse_record_header(header)?;
        if record.size < 0 {
            tracing::warn!(header = %header, "Negative size in file header");
        }
        let size = record.size.max(0) as u64;
        if self.config.max_file_size > 0 && size > self.config.max_file_size {
            return Err(ScpError::FileTooLarge {
                size,
                limit: self.config.max_file_size,
            });
        }

        let file = resolve::arbitrate_destination(target, &record.name, true).await?;
        if let Some(metadata) = resolve::stat(&file).await? {
            if metadata.is_dir() {
                return Err(ScpError::IsADirectory { path: file });
            }
            if metadata.permissions().readonly() {
                return Err(ScpError::NotWritable { path: file });
            }
        }

        tracing::debug!(path = %file.display(), size, "Receiving file");

        let mut out = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file)
            .await?;

        self.wire.send_ack().await?;

        self.events
            .start_file(FileOperation::Receive, &file, size, record.mode);
        let copied = self.copy_payload(&mut out, size).await;
        self.events
            .end_file(FileOperation::Receive, &file, size, record.mode, copied.as_ref().err());
        copied?;
        drop(out);

        // The sender's payload terminator; a 0x02 here is a peer abort.
        self.wire.read_ack(false).await?;

        if preserve {
            attrs::apply_perms(&file, record.mode).await?;
            if let Some((mtime, atime)) = times {
                attrs::apply_times(&file, mtime, atime)?;
            }
        }

        self.wire.send_ack().await?;
        Ok(())
    }

    async fn copy_payload(&mut self, out: &mut tokio::fs::File, size: u64) -> Result<()> {
        let buf_size = self.config.copy_buffer_for(size);
        self.wire.copy_in(out, size, buf_size).await?;
        out.flush().await?;
        Ok(())
    }

    async fn receive_dir(
        &mut self,
        header: &str,
        target: &Path,
        times: Option<(u64, u64)>,
        preserve: bool,
    ) -> Result<()> {
        if !header.starts_with('D') {
            return Err(ScpError::ProtocolViolation(format!(
                "expected a D record but got '{header}'"
            )));
        }

        let record = parse_record_header(header)?;
        if record.size != 0 {
            return Err(ScpError::MalformedHeader {
                header: header.to_string(),
                reason: format!("expected 0 size for directory but got {}", record.size),
            });
        }

        let dest = resolve::arbitrate_destination(target, &record.name, false).await?;
        match resolve::stat(&dest).await? {
            Some(metadata) if metadata.is_dir() => {}
            Some(_) => return Err(ScpError::NotADirectory { path: dest }),
            None => tokio::fs::create_dir(&dest).await?,
        }

        tracing::debug!(path = %dest.display(), "Receiving directory");

        if preserve {
            // Legacy behavior: the mode lands on the original target path,
            // not the resolved destination.
            attrs::apply_perms(target, record.mode).await?;
            if let Some((mtime, atime)) = times {
                attrs::apply_times(&dest, mtime, atime)?;
            }
        }

        self.wire.send_ack().await?;

        self.events
            .start_folder(FileOperation::Receive, target, record.mode);
        let result = self.receive_dir_entries(&dest, preserve).await;
        self.events
            .end_folder(FileOperation::Receive, target, record.mode, result.as_ref().err());
        result
    }

    async fn receive_dir_entries(&mut self, dest: &Path, preserve: bool) -> Result<()> {
        let mut times: Option<(u64, u64)> = None;
        loop {
            let line = match self.wire.read_line(false).await? {
                Some(line) => line,
                None => {
                    return Err(ScpError::UnexpectedEof {
                        context: "awaiting record inside directory",
                    })
                }
            };
            tracing::debug!(header = %line, "Received header");

            if line.starts_with('C') {
                self.receive_file(&line, dest, times.take(), preserve).await?;
            } else if line.starts_with('D') {
                Box::pin(self.receive_dir(&line, dest, times.take(), preserve)).await?;
            } else if line == "E" {
                self.wire.send_ack().await?;
                return Ok(());
            } else if line.starts_with('T') {
                times = Some(parse_times(&line)?);
                self.wire.send_ack().await?;
            } else {
                return Err(ScpError::ProtocolViolation(format!(
                    "unexpected message: '{line}'"
                )));
            }
        }
    }
}
