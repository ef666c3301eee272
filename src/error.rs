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

//! Error types for SCP transfers.
//!
//! Every failure of the engine surfaces as an [`ScpError`]. Protocol-level
//! failures (`MalformedHeader`, `ProtocolViolation`, `PeerRejected`) abort
//! the transfer; filesystem precondition failures carry the offending path
//! so the enclosing server can report it to the peer in-band.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while driving an SCP transfer.
#[derive(Debug, Error)]
pub enum ScpError {
    /// Underlying stream or filesystem I/O error.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// The peer stream ended while more bytes were required.
    #[error("unexpected end of stream while {context}")]
    UnexpectedEof { context: &'static str },

    /// The channel was closed underneath the transfer.
    #[error("channel closed")]
    ChannelClosed,

    /// A control header did not match the protocol grammar.
    #[error("malformed header '{header}': {reason}")]
    MalformedHeader { header: String, reason: String },

    /// A record arrived in a state that forbids it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The peer sent an ERROR (`0x02`) byte with a diagnostic.
    #[error("peer rejected transfer: {0}")]
    PeerRejected(String),

    /// The filesystem could not decide whether a path exists.
    #[error("existence of {} cannot be determined", path.display())]
    AccessIndeterminate { path: PathBuf },

    /// No such file or directory.
    #[error("{}: no such file or directory", path.display())]
    NotFound { path: PathBuf },

    /// The target was required to be a directory but is not.
    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    /// A regular file was required but the path is a directory.
    #[error("{} is a directory", path.display())]
    IsADirectory { path: PathBuf },

    /// The destination cannot be written (missing or non-directory parent).
    #[error("cannot write to {}", path.display())]
    CannotWrite { path: PathBuf },

    /// The destination exists but is not writable.
    #[error("{} is not writable", path.display())]
    NotWritable { path: PathBuf },

    /// The source path is neither a regular file nor a sendable directory.
    #[error("{}: not a regular file", path.display())]
    NotRegularFile { path: PathBuf },

    /// The configured copy buffer is below the protocol minimum.
    #[error("copy buffer size {size} below minimum {min}")]
    InvalidBufferSize { size: usize, min: usize },

    /// A header line exceeded the configured maximum length.
    #[error("header line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// A file record declared a size above the configured maximum.
    #[error("declared file size {size} exceeds limit {limit}")]
    FileTooLarge { size: u64, limit: u64 },
}

impl ScpError {
    /// Maps an I/O error from the channel streams, folding the kinds that
    /// signal a torn-down channel into [`ScpError::ChannelClosed`].
    pub(crate) fn from_channel_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => ScpError::ChannelClosed,
            _ => ScpError::Io(err),
        }
    }
}

/// Result type for SCP operations.
pub type Result<T> = std::result::Result<T, ScpError>;
