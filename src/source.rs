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

//! Source side of an SCP transfer (`scp -f`).
//!
//! The source waits for the receiver's readiness ACK, then walks its local
//! paths emitting `T`, `C`, `D` and `E` records with their payloads. Every
//! header write is answered by exactly one ACK before the next byte of the
//! dialogue.
//!
//! Glob patterns expand against a scanned base directory. During
//! expansion, entries that cannot be sent (a directory without `-r`, a
//! special file) produce an in-band warning and the transfer continues;
//! for literal paths the same conditions abort the transfer.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::attrs;
use crate::command::ScpCommand;
use crate::config::ScpConfig;
use crate::error::{Result, ScpError};
use crate::events::{FileOperation, NoopListener, ScpEventListener};
use crate::resolve;
use crate::wire::Wire;

/// Behavior switches for a source transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceOptions {
    /// Descend into directories (-r).
    pub recursive: bool,
    /// Emit `T` records and real permission bits (-p).
    pub preserve: bool,
}

impl From<&ScpCommand> for SourceOptions {
    fn from(cmd: &ScpCommand) -> Self {
        Self {
            recursive: cmd.recursive,
            preserve: cmd.preserve,
        }
    }
}

/// Sender state machine for `scp -f`.
pub struct ScpSource<R, W> {
    wire: Wire<R, W>,
    config: ScpConfig,
    events: Arc<dyn ScpEventListener>,
}

impl<R, W> ScpSource<R, W>
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

    /// Sends every pattern in `patterns` to the peer. Local failures are
    /// reported in-band (`0x02 <message>\n`, best effort) before being
    /// returned.
    pub async fn run(&mut self, patterns: &[String], options: SourceOptions) -> Result<()> {
        tracing::info!(
            patterns = ?patterns,
            recursive = options.recursive,
            preserve = options.preserve,
            "Starting source transfer"
        );

        match self.send(patterns, options).await {
            Ok(()) => {
                tracing::info!("Source transfer completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Source transfer failed");
                let _ = self.wire.send_error(&e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn send(&mut self, patterns: &[String], options: SourceOptions) -> Result<()> {
        self.config.check_buffer_size()?;

        // The receiver signals readiness before the first record.
        self.wire.read_ack(false).await?;

        for pattern in patterns {
            let pattern = resolve::to_native(pattern);
            if let Some((basedir, leaf_pattern)) = resolve::split_glob(&pattern) {
                self.send_glob(&basedir, &leaf_pattern, options).await?;
            } else {
                self.send_literal(&pattern, options).await?;
            }
        }
        Ok(())
    }

    async fn send_glob(
        &mut self,
        basedir: &str,
        leaf_pattern: &str,
        options: SourceOptions,
    ) -> Result<()> {
        let matches = resolve::scan_matches(basedir, leaf_pattern).await?;
        for (name, path) in matches {
            match resolve::stat(&path).await? {
                Some(metadata) if metadata.is_file() => {
                    self.send_file(&path, options.preserve).await?;
                }
                Some(metadata) if metadata.is_dir() => {
                    if options.recursive {
                        self.send_dir(&path, options.preserve).await?;
                    } else {
                        self.wire
                            .send_warning(&format!("{name} not a regular file"))
                            .await?;
                    }
                }
                _ => {
                    self.wire
                        .send_warning(&format!("{name} unknown file type"))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn send_literal(&mut self, pattern: &str, options: SourceOptions) -> Result<()> {
        let path = resolve::resolve_local("", pattern);
        match resolve::stat(&path).await? {
            None => Err(ScpError::NotFound { path }),
            Some(metadata) if metadata.is_file() => self.send_file(&path, options.preserve).await,
            Some(metadata) if metadata.is_dir() => {
                if options.recursive {
                    self.send_dir(&path, options.preserve).await
                } else {
                    Err(ScpError::IsADirectory { path })
                }
            }
            Some(_) => Err(ScpError::NotRegularFile { path }),
        }
    }

    async fn send_file(&mut self, path: &Path, preserve: bool) -> Result<()> {
        let metadata = tokio::fs::metadata(path).await?;
        let size = metadata.len();
        let mode = attrs::mode_of(&metadata, 0o644);
        let leaf = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!(path = %path.display(), size, "Sending file");

        if preserve {
            self.send_times(&metadata).await?;
        }

        let perms = if preserve {
            attrs::format_octal_perms(mode)
        } else {
            "0644".to_string()
        };
        self.wire
            .write_header(&format!("C{perms} {size} {leaf}"))
            .await?;
        self.wire.read_ack(false).await?;

        let mut file = tokio::fs::File::open(path).await?;
        self.events
            .start_file(FileOperation::Send, path, size, mode);
        let streamed = self
            .wire
            .copy_out(&mut file, size, self.config.copy_buffer_for(size))
            .await;
        self.events
            .end_file(FileOperation::Send, path, size, mode, streamed.as_ref().err());
        streamed?;
        drop(file);

        // Payload terminator, then the receiver's final ACK.
        self.wire.send_ack().await?;
        self.wire.read_ack(false).await?;
        Ok(())
    }

    async fn send_dir(&mut self, path: &Path, preserve: bool) -> Result<()> {
        let metadata = tokio::fs::metadata(path).await?;
        let mode = attrs::mode_of(&metadata, 0o755);
        let leaf = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!(path = %path.display(), "Sending directory");

        if preserve {
            self.send_times(&metadata).await?;
        }

        let perms = if preserve {
            attrs::format_octal_perms(mode)
        } else {
            "0755".to_string()
        };
        self.wire
            .write_header(&format!("D{perms} 0 {leaf}"))
            .await?;
        self.wire.read_ack(false).await?;

        self.events.start_folder(FileOperation::Send, path, mode);
        let walked = self.send_dir_entries(path, preserve).await;
        self.events
            .end_folder(FileOperation::Send, path, mode, walked.as_ref().err());
        walked?;

        self.wire.write_header("E").await?;
        self.wire.read_ack(false).await?;
        Ok(())
    }

    async fn send_dir_entries(&mut self, path: &Path, preserve: bool) -> Result<()> {
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let child = entry.path();
            match resolve::stat(&child).await? {
                Some(metadata) if metadata.is_file() => {
                    self.send_file(&child, preserve).await?;
                }
                Some(metadata) if metadata.is_dir() => {
                    Box::pin(self.send_dir(&child, preserve)).await?;
                }
                _ => {
                    // Symlinks and special files are not part of the
                    // protocol; skip them.
                    tracing::debug!(path = %child.display(), "Skipping non-regular entry");
                }
            }
        }
        Ok(())
    }

    async fn send_times(&mut self, metadata: &std::fs::Metadata) -> Result<()> {
        let header = format!(
            "T{} 0 {} 0",
            attrs::mtime_secs(metadata),
            attrs::atime_secs(metadata)
        );
        self.wire.write_header(&header).await?;
        self.wire.read_ack(false).await?;
        Ok(())
    }
}
