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

//! Parsing of the remote `scp` command line.
//!
//! When a client runs `scp file user@host:path`, the SSH server receives an
//! exec request for `scp -t <path>` (sink mode) or `scp -f <path>` (source
//! mode). This module turns that command string into an [`ScpCommand`] the
//! transfer engine consumes.

use anyhow::Result;

/// SCP operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScpMode {
    /// Source mode (-f): this side sends files to the peer.
    Source,
    /// Sink mode (-t): this side receives files from the peer.
    Sink,
}

impl std::fmt::Display for ScpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScpMode::Source => write!(f, "source"),
            ScpMode::Sink => write!(f, "sink"),
        }
    }
}

/// Result of parsing an SCP command.
#[derive(Debug, Clone)]
pub struct ScpCommand {
    /// The operation mode (source or sink).
    pub mode: ScpMode,
    /// Target path (sink) or source pattern(s) (source).
    pub paths: Vec<String>,
    /// Whether recursive mode is enabled (-r).
    pub recursive: bool,
    /// Whether to preserve modes and times (-p).
    pub preserve: bool,
    /// Whether the target is expected to be a directory (-d).
    pub target_is_directory: bool,
}

impl ScpCommand {
    /// Parse an SCP command string.
    ///
    /// The command format is: `scp [-r] [-p] [-d] (-t|-f) path...`
    /// Combined flags such as `-rpt` are accepted; unrecognized flags are
    /// ignored for compatibility with newer clients.
    ///
    /// # Example
    ///
    /// ```
    /// use rscp::{ScpCommand, ScpMode};
    ///
    /// let cmd = ScpCommand::parse("scp -t -r /tmp/upload").unwrap();
    /// assert_eq!(cmd.mode, ScpMode::Sink);
    /// assert!(cmd.recursive);
    /// ```
    pub fn parse(command: &str) -> Result<Self> {
        let args: Vec<&str> = command.split_whitespace().collect();

        if args.is_empty() {
            anyhow::bail!("Empty command");
        }
        if args[0] != "scp" {
            anyhow::bail!("Not an SCP command: {}", args[0]);
        }

        let mut mode = None;
        let mut recursive = false;
        let mut preserve = false;
        let mut target_is_directory = false;
        let mut paths = Vec::new();

        for arg in &args[1..] {
            if let Some(flags) = arg.strip_prefix('-') {
                if flags.is_empty() {
                    continue;
                }
                for ch in flags.chars() {
                    match ch {
                        't' => mode = Some(ScpMode::Sink),
                        'f' => mode = Some(ScpMode::Source),
                        'r' => recursive = true,
                        'p' => preserve = true,
                        'd' => target_is_directory = true,
                        // Ignore flags we don't care about.
                        _ => {}
                    }
                }
            } else {
                paths.push((*arg).to_string());
            }
        }

        let mode = mode.ok_or_else(|| anyhow::anyhow!("Missing -t or -f flag"))?;
        if paths.is_empty() {
            anyhow::bail!("Missing path argument");
        }

        Ok(Self {
            mode,
            paths,
            recursive,
            preserve,
            target_is_directory,
        })
    }

    /// Check if a command string is an SCP command without full parsing.
    pub fn is_scp_command(command: &str) -> bool {
        let trimmed = command.trim();
        trimmed.starts_with("scp ") || trimmed == "scp"
    }

    /// The sink-side target path (first trailing argument).
    pub fn target(&self) -> &str {
        &self.paths[0]
    }
}
