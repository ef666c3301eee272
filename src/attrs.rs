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

//! Permission and timestamp translation.
//!
//! SCP encodes permissions as 4-digit octal strings covering the nine POSIX
//! `rwx` bits and timestamps as whole POSIX epoch seconds. Setuid, setgid
//! and sticky bits are never propagated; sub-second components are emitted
//! as `0` and ignored on input.

use std::fs::Metadata;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use filetime::FileTime;

use crate::error::{Result, ScpError};

/// Mask for the nine POSIX permission bits.
pub const PERM_MASK: u32 = 0o777;

/// Formats permission bits as the 4-digit octal string used on the wire.
pub fn format_octal_perms(mode: u32) -> String {
    format!("{:04o}", mode & PERM_MASK)
}

/// Parses a 4-digit octal permission string, masking to the nine `rwx`
/// bits. Setuid/setgid/sticky digits are accepted but dropped.
pub fn parse_octal_perms(digits: &str) -> Result<u32> {
    let raw = u32::from_str_radix(digits, 8).map_err(|_| ScpError::MalformedHeader {
        header: digits.to_string(),
        reason: "invalid octal permission digits".to_string(),
    })?;
    Ok(raw & PERM_MASK)
}

/// Permission bits of `metadata`, or `fallback` on platforms without POSIX
/// permissions.
#[cfg(unix)]
pub fn mode_of(metadata: &Metadata, _fallback: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & PERM_MASK
}

/// Permission bits of `metadata`, or `fallback` on platforms without POSIX
/// permissions.
#[cfg(not(unix))]
pub fn mode_of(_metadata: &Metadata, fallback: u32) -> u32 {
    fallback
}

/// Modification time of `metadata` in whole epoch seconds (0 if unknown).
pub fn mtime_secs(metadata: &Metadata) -> u64 {
    metadata.modified().map(secs_since_epoch).unwrap_or(0)
}

/// Access time of `metadata` in whole epoch seconds (0 if unknown).
pub fn atime_secs(metadata: &Metadata) -> u64 {
    metadata.accessed().map(secs_since_epoch).unwrap_or(0)
}

fn secs_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Applies permission bits to a path.
pub async fn apply_perms(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & PERM_MASK))
            .await?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Applies a buffered `(mtime, atime)` pair, in whole seconds, to a path.
pub fn apply_times(path: &Path, mtime: u64, atime: u64) -> Result<()> {
    filetime::set_file_times(
        path,
        FileTime::from_unix_time(atime as i64, 0),
        FileTime::from_unix_time(mtime as i64, 0),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_masks_high_bits() {
        assert_eq!(format_octal_perms(0o644), "0644");
        assert_eq!(format_octal_perms(0o7777), "0777");
        assert_eq!(format_octal_perms(0), "0000");
    }

    #[test]
    fn test_parse_round_trip() {
        for mode in [0o000, 0o644, 0o755, 0o640, 0o777] {
            assert_eq!(parse_octal_perms(&format_octal_perms(mode)).unwrap(), mode);
        }
    }

    #[test]
    fn test_parse_drops_setuid_bits() {
        assert_eq!(parse_octal_perms("7777").unwrap(), 0o777);
        assert_eq!(parse_octal_perms("4755").unwrap(), 0o755);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_octal_perms("06x4").is_err());
        assert!(parse_octal_perms("").is_err());
        assert!(parse_octal_perms("0888").is_err());
    }

    #[tokio::test]
    async fn test_apply_times_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stamped");
        tokio::fs::write(&file, b"x").await.unwrap();

        apply_times(&file, 1_000_000_000, 1_000_000_100).unwrap();

        let metadata = std::fs::metadata(&file).unwrap();
        assert_eq!(mtime_secs(&metadata), 1_000_000_000);
        assert_eq!(atime_secs(&metadata), 1_000_000_100);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_perms() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mode");
        tokio::fs::write(&file, b"x").await.unwrap();

        apply_perms(&file, 0o640).await.unwrap();

        let metadata = std::fs::metadata(&file).unwrap();
        assert_eq!(mode_of(&metadata, 0), 0o640);
    }
}
