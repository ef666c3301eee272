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

//! Embeddable SCP transfer engine.
//!
//! `rscp` implements both sides of the classic OpenSSH rcp/SCP wire
//! protocol over an already-established SSH exec channel. The enclosing
//! server owns the transport and authentication; it parses the remote
//! command with [`ScpCommand`], then drives an [`ScpSink`] (`scp -t`,
//! receiving) or an [`ScpSource`] (`scp -f`, sending) over any
//! `AsyncRead`/`AsyncWrite` pair. For russh-based servers, [`channel`]
//! adapts a session handle and channel data stream into that pair.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use rscp::{ScpCommand, ScpConfig, ScpMode, ScpSink, ScpSource, SinkOptions, SourceOptions};
//!
//! async fn handle_exec(
//!     command: &str,
//!     input: impl tokio::io::AsyncRead + Unpin,
//!     output: impl tokio::io::AsyncWrite + Unpin,
//! ) -> anyhow::Result<()> {
//!     let cmd = ScpCommand::parse(command)?;
//!     match cmd.mode {
//!         ScpMode::Sink => {
//!             let mut sink = ScpSink::new(input, output, ScpConfig::default(), None);
//!             sink.run(Path::new(cmd.target()), SinkOptions::from(&cmd)).await?;
//!         }
//!         ScpMode::Source => {
//!             let mut source = ScpSource::new(input, output, ScpConfig::default(), None);
//!             source.run(&cmd.paths, SourceOptions::from(&cmd)).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod attrs;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod resolve;
pub mod sink;
pub mod source;
pub mod wire;

pub use command::{ScpCommand, ScpMode};
pub use config::ScpConfig;
pub use error::{Result, ScpError};
pub use events::{FileOperation, ScpEventListener};
pub use sink::{ScpSink, SinkOptions};
pub use source::{ScpSource, SourceOptions};
