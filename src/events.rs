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

//! Transfer event hooks.
//!
//! The embedding server can observe transfer progress by supplying an
//! [`ScpEventListener`]. Events are emitted in program order: `start_*`
//! strictly before any payload I/O, `end_*` strictly after, and folder
//! events strictly bracket the events of their children.
//!
//! Handlers must not panic; errors are propagated to observers only through
//! the `error` parameter of the `end_*` hooks.

use std::path::Path;

use crate::error::ScpError;

/// Direction of the operation an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    /// Local tree is being transmitted to the peer (`scp -f`).
    Send,
    /// Data is being received from the peer (`scp -t`).
    Receive,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Send => write!(f, "send"),
            FileOperation::Receive => write!(f, "receive"),
        }
    }
}

/// Observer for transfer progress and auditing.
///
/// All methods default to no-ops, so an implementation overrides only the
/// hooks it cares about. `perms` carries the nine POSIX permission bits.
#[allow(unused_variables)]
pub trait ScpEventListener: Send + Sync {
    /// Called before any action on a directory.
    fn start_folder(&self, op: FileOperation, path: &Path, perms: u32) {}

    /// Called on normal or error exit from a directory scope.
    fn end_folder(&self, op: FileOperation, path: &Path, perms: u32, error: Option<&ScpError>) {}

    /// Called before streaming a file payload.
    fn start_file(&self, op: FileOperation, path: &Path, size: u64, perms: u32) {}

    /// Called on normal or error exit from a file transfer.
    fn end_file(
        &self,
        op: FileOperation,
        path: &Path,
        size: u64,
        perms: u32,
        error: Option<&ScpError>,
    ) {
    }
}

/// Listener that ignores every event. Used when the caller supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ScpEventListener for NoopListener {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        entries: Mutex<Vec<String>>,
    }

    impl ScpEventListener for Recording {
        fn start_file(&self, op: FileOperation, path: &Path, size: u64, _perms: u32) {
            self.entries
                .lock()
                .unwrap()
                .push(format!("start {} {} {}", op, path.display(), size));
        }

        fn end_file(
            &self,
            op: FileOperation,
            path: &Path,
            _size: u64,
            _perms: u32,
            error: Option<&ScpError>,
        ) {
            self.entries.lock().unwrap().push(format!(
                "end {} {} {}",
                op,
                path.display(),
                error.is_some()
            ));
        }
    }

    #[test]
    fn test_default_methods_are_noops() {
        let listener = NoopListener;
        listener.start_file(FileOperation::Send, Path::new("a"), 1, 0o644);
        listener.end_folder(FileOperation::Receive, Path::new("b"), 0o755, None);
    }

    #[test]
    fn test_partial_override() {
        let listener = Recording::default();
        let path = PathBuf::from("out.txt");
        listener.start_file(FileOperation::Receive, &path, 11, 0o644);
        listener.start_folder(FileOperation::Receive, &path, 0o755);
        listener.end_file(FileOperation::Receive, &path, 11, 0o644, None);

        let entries = listener.entries.lock().unwrap();
        assert_eq!(
            *entries,
            vec!["start receive out.txt 11", "end receive out.txt false"]
        );
    }
}
