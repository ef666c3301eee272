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

//! Transfer configuration.
//!
//! [`ScpConfig`] is supplied by the embedding server when constructing a
//! sink or source. All fields have serde defaults so a config file needs to
//! mention only what it overrides.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScpError};

/// Minimum copy buffer size accepted by the protocol engine.
pub const MIN_BUFFER_SIZE: usize = 127;

/// Configuration for a single SCP transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScpConfig {
    /// Buffer size for payload copies. Clamped per file to the declared
    /// size, never below [`MIN_BUFFER_SIZE`].
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Maximum accepted length of a protocol header line. Prevents
    /// unbounded buffering on a hostile peer.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Maximum accepted declared file size. 0 disables the check.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_buffer_size() -> usize {
    8 * 1024
}

fn default_max_line_length() -> usize {
    64 * 1024
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 * 1024
}

impl Default for ScpConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            max_line_length: default_max_line_length(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl ScpConfig {
    /// Validates the configured buffer size against the protocol minimum.
    pub(crate) fn check_buffer_size(&self) -> Result<()> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(ScpError::InvalidBufferSize {
                size: self.buffer_size,
                min: MIN_BUFFER_SIZE,
            });
        }
        Ok(())
    }

    /// Buffer size for a payload of `length` bytes: no larger than the
    /// payload itself, but a zero-length payload still gets the minimum.
    pub(crate) fn copy_buffer_for(&self, length: u64) -> usize {
        if length == 0 {
            MIN_BUFFER_SIZE
        } else {
            self.buffer_size.min(length.min(usize::MAX as u64) as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScpConfig::default();
        assert_eq!(config.buffer_size, 8 * 1024);
        assert_eq!(config.max_line_length, 64 * 1024);
        assert_eq!(config.max_file_size, 10 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ScpConfig = serde_json::from_str(r#"{"buffer_size": 512}"#).unwrap();
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.max_line_length, 64 * 1024);
    }

    #[test]
    fn test_buffer_size_minimum() {
        let config = ScpConfig {
            buffer_size: 64,
            ..Default::default()
        };
        assert!(matches!(
            config.check_buffer_size(),
            Err(ScpError::InvalidBufferSize { size: 64, min: 127 })
        ));
    }

    #[test]
    fn test_copy_buffer_clamping() {
        let config = ScpConfig::default();
        assert_eq!(config.copy_buffer_for(0), MIN_BUFFER_SIZE);
        assert_eq!(config.copy_buffer_for(100), 100);
        assert_eq!(config.copy_buffer_for(1 << 30), config.buffer_size);
    }
}
