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

//! Attribute preservation round trips: a source and a sink wired directly
//! to each other over an in-memory channel.

use std::path::Path;

use filetime::FileTime;
use rscp::{ScpConfig, ScpSink, ScpSource, SinkOptions, SourceOptions};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const T0: i64 = 1_600_000_000;

async fn pipe_transfer(
    patterns: Vec<String>,
    target: &Path,
    source_options: SourceOptions,
    sink_options: SinkOptions,
) {
    let (source_end, sink_end) = tokio::io::duplex(64 * 1024);
    let (source_in, source_out) = tokio::io::split(source_end);
    let (sink_in, sink_out) = tokio::io::split(sink_end);

    let source_task = tokio::spawn(async move {
        let mut source = ScpSource::new(source_in, source_out, ScpConfig::default(), None);
        source.run(&patterns, source_options).await
    });
    let target = target.to_path_buf();
    let sink_task = tokio::spawn(async move {
        let mut sink = ScpSink::new(sink_in, sink_out, ScpConfig::default(), None);
        sink.run(&target, sink_options).await
    });

    source_task.await.unwrap().unwrap();
    sink_task.await.unwrap().unwrap();
}

fn mtime_of(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&std::fs::metadata(path).unwrap()).unix_seconds()
}

#[cfg(unix)]
fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

#[tokio::test]
async fn test_preserve_file_round_trip() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();

    let file = local.path().join("out.txt");
    std::fs::write(&file, b"0123456789\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o640)).unwrap();
    }
    filetime::set_file_times(
        &file,
        FileTime::from_unix_time(T0 + 50, 0),
        FileTime::from_unix_time(T0, 0),
    )
    .unwrap();

    pipe_transfer(
        vec![file.to_string_lossy().into_owned()],
        remote.path(),
        SourceOptions {
            recursive: false,
            preserve: true,
        },
        SinkOptions {
            preserve: true,
            ..Default::default()
        },
    )
    .await;

    let received = remote.path().join("out.txt");
    assert_eq!(std::fs::read(&received).unwrap(), b"0123456789\n");
    assert_eq!(mtime_of(&received), T0);
    #[cfg(unix)]
    assert_eq!(mode_of(&received), 0o640);
}

#[cfg(unix)]
#[tokio::test]
async fn test_preserve_directory_mode_lands_on_target() {
    use std::os::unix::fs::PermissionsExt;

    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();

    let tree = local.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("inner.txt"), b"payload").unwrap();
    std::fs::set_permissions(&tree, std::fs::Permissions::from_mode(0o750)).unwrap();

    pipe_transfer(
        vec![tree.to_string_lossy().into_owned()],
        remote.path(),
        SourceOptions {
            recursive: true,
            preserve: true,
        },
        SinkOptions {
            recursive: true,
            preserve: true,
            ..Default::default()
        },
    )
    .await;

    assert_eq!(
        std::fs::read(remote.path().join("tree").join("inner.txt")).unwrap(),
        b"payload"
    );
    // Directory modes are applied to the original target path, not the
    // created destination; kept for compatibility with the historic
    // implementation.
    assert_eq!(mode_of(remote.path()), 0o750);
}

#[tokio::test]
async fn test_recursive_round_trip_reproduces_contents() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();

    let tree = local.path().join("data");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("a.bin"), vec![0xA5u8; 70_000]).unwrap();
    std::fs::write(tree.join("empty"), b"").unwrap();
    std::fs::create_dir(tree.join("nested")).unwrap();
    std::fs::write(tree.join("nested").join("b.txt"), b"nested contents\n").unwrap();

    pipe_transfer(
        vec![tree.to_string_lossy().into_owned()],
        remote.path(),
        SourceOptions {
            recursive: true,
            preserve: false,
        },
        SinkOptions {
            recursive: true,
            ..Default::default()
        },
    )
    .await;

    let received = remote.path().join("data");
    assert_eq!(
        std::fs::read(received.join("a.bin")).unwrap(),
        vec![0xA5u8; 70_000]
    );
    assert_eq!(std::fs::read(received.join("empty")).unwrap(), b"");
    assert_eq!(
        std::fs::read(received.join("nested").join("b.txt")).unwrap(),
        b"nested contents\n"
    );
}

#[tokio::test]
async fn test_last_time_record_wins() {
    let remote = TempDir::new().unwrap();

    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let (input, output) = tokio::io::split(server);
    let target = remote.path().to_path_buf();
    let task = tokio::spawn(async move {
        let mut sink = ScpSink::new(input, output, ScpConfig::default(), None);
        sink.run(
            &target,
            SinkOptions {
                preserve: true,
                ..Default::default()
            },
        )
        .await
    });

    assert_eq!(client.read_u8().await.unwrap(), 0x00);
    client.write_all(b"T1000000000 0 1000000000 0\n").await.unwrap();
    assert_eq!(client.read_u8().await.unwrap(), 0x00);
    // A second time record before any file record replaces the first.
    client
        .write_all(format!("T{T0} 0 {} 0\n", T0 + 50).as_bytes())
        .await
        .unwrap();
    assert_eq!(client.read_u8().await.unwrap(), 0x00);
    client.write_all(b"C0644 3 f.txt\n").await.unwrap();
    assert_eq!(client.read_u8().await.unwrap(), 0x00);
    client.write_all(b"abc\x00").await.unwrap();
    assert_eq!(client.read_u8().await.unwrap(), 0x00);
    client.shutdown().await.unwrap();

    task.await.unwrap().unwrap();
    assert_eq!(mtime_of(&remote.path().join("f.txt")), T0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_with_preserve_applies_mode() {
    let remote = TempDir::new().unwrap();

    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let (input, output) = tokio::io::split(server);
    let target = remote.path().to_path_buf();
    let task = tokio::spawn(async move {
        let mut sink = ScpSink::new(input, output, ScpConfig::default(), None);
        sink.run(
            &target,
            SinkOptions {
                preserve: true,
                ..Default::default()
            },
        )
        .await
    });

    assert_eq!(client.read_u8().await.unwrap(), 0x00);
    client.write_all(b"C0640 4 mode.txt\n").await.unwrap();
    assert_eq!(client.read_u8().await.unwrap(), 0x00);
    client.write_all(b"data\x00").await.unwrap();
    assert_eq!(client.read_u8().await.unwrap(), 0x00);
    client.shutdown().await.unwrap();

    task.await.unwrap().unwrap();
    assert_eq!(mode_of(&remote.path().join("mode.txt")), 0o640);
}
