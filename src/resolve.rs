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

//! Path resolution for SCP transfers.
//!
//! Peer-supplied names are slash-separated regardless of platform; they are
//! translated to the native separator before touching the filesystem. The
//! receiver resolves the ambiguity of its target path (existing directory,
//! existing file, or nonexistent leaf) against live filesystem state; the
//! sender expands `*` patterns against a scanned base directory.
//!
//! Existence checks never follow symlinks. Rooting and symlink policy
//! belong to the embedding server, not to this module.

use std::fs::Metadata;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::error::{Result, ScpError};

/// Translates a slash-separated peer name to the native separator.
pub fn to_native(name: &str) -> String {
    name.replace('/', std::path::MAIN_SEPARATOR_STR)
}

/// Joins an optional base directory and a peer-supplied subpath.
pub fn resolve_local(basedir: &str, subpath: &str) -> PathBuf {
    let sub = to_native(subpath);
    if basedir.is_empty() {
        PathBuf::from(sub)
    } else {
        Path::new(&to_native(basedir)).join(sub)
    }
}

/// Stats a path without following symlinks. `Ok(None)` means the path does
/// not exist; an existence check the filesystem refuses to answer fails
/// with [`ScpError::AccessIndeterminate`].
pub(crate) async fn stat(path: &Path) -> Result<Option<Metadata>> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ScpError::AccessIndeterminate {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolves the actual destination for an incoming record with leaf `name`
/// against the receiver's target path.
///
/// An existing directory target receives the record inside itself; an
/// existing regular file target is overwritten in place (file records
/// only); a nonexistent target is created as-is provided its parent is an
/// existing directory.
pub(crate) async fn arbitrate_destination(
    target: &Path,
    name: &str,
    allow_file_target: bool,
) -> Result<PathBuf> {
    if let Some(metadata) = stat(target).await? {
        if metadata.is_dir() {
            return Ok(target.join(to_native(name)));
        }
        if allow_file_target && metadata.is_file() {
            return Ok(target.to_path_buf());
        }
    } else if let Some(parent) = target.parent() {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Some(parent_meta) = stat(parent).await? {
            if parent_meta.is_dir() {
                return Ok(target.to_path_buf());
            }
        }
    }

    Err(ScpError::CannotWrite {
        path: target.to_path_buf(),
    })
}

/// Splits a pattern containing `*` into `(basedir, leaf-pattern)` at the
/// last separator preceding the first `*`. Returns `None` for literal
/// paths.
pub fn split_glob(pattern: &str) -> Option<(String, String)> {
    let star = pattern.find('*')?;
    match pattern[..star].rfind(MAIN_SEPARATOR) {
        Some(sep) => Some((pattern[..sep].to_string(), pattern[sep + 1..].to_string())),
        None => Some((String::new(), pattern.to_string())),
    }
}

/// Scans `basedir` (non-recursively) for entries whose leaf name matches
/// the glob pattern, in sorted (shell-expansion) order.
pub(crate) async fn scan_matches(basedir: &str, pattern: &str) -> Result<Vec<(String, PathBuf)>> {
    let compiled = glob::Pattern::new(pattern)
        .map_err(|e| ScpError::ProtocolViolation(format!("bad source pattern '{pattern}': {e}")))?;
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let scan_root = if basedir.is_empty() { "." } else { basedir };
    let mut dir = match tokio::fs::read_dir(scan_root).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScpError::NotFound {
                path: PathBuf::from(scan_root),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ScpError::AccessIndeterminate {
                path: PathBuf::from(scan_root),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let mut matches = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if compiled.matches_with(&name, options) {
            matches.push((name, entry.path()));
        }
    }
    matches.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(matches)
}
