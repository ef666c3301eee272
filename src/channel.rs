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

//! russh channel adapters.
//!
//! An SSH server built on russh hands its channel handlers a session
//! [`Handle`], a [`ChannelId`], and an `mpsc` receiver fed with the
//! channel's data frames. These adapters turn that trio into the
//! `AsyncRead`/`AsyncWrite` pair the transfer engine consumes:
//!
//! ```ignore
//! let (input, output) = channel_streams(handle, channel_id, data_rx);
//! let mut sink = ScpSink::new(input, output, ScpConfig::default(), None);
//! sink.run(&target, SinkOptions::from(&cmd)).await?;
//! ```
//!
//! Neither adapter closes the channel: sending the exit status and closing
//! remain the responsibility of the enclosing session handler.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

/// Builds the engine-facing stream pair for one SSH channel.
pub fn channel_streams(
    handle: Handle,
    id: ChannelId,
    data_rx: mpsc::Receiver<Vec<u8>>,
) -> (ChannelDataReader, ChannelDataWriter) {
    (
        ChannelDataReader::new(data_rx),
        ChannelDataWriter::new(handle, id),
    )
}

/// `AsyncRead` over the data frames of an SSH channel.
///
/// Frames arrive in whole `Vec<u8>` chunks; a partially consumed chunk is
/// carried over to the next read. A closed sender is end-of-stream, which
/// the sink's outer loop treats as clean termination.
pub struct ChannelDataReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl ChannelDataReader {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
        }
    }
}

impl AsyncRead for ChannelDataReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if self.offset < self.pending.len() {
                let n = (self.pending.len() - self.offset).min(buf.remaining());
                let start = self.offset;
                buf.put_slice(&self.pending[start..start + n]);
                self.offset += n;
                return Poll::Ready(Ok(()));
            }

            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(data)) => {
                    self.pending = data;
                    self.offset = 0;
                    // Empty frames are legal; keep polling.
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

type SendFuture = Pin<Box<dyn Future<Output = Result<(), CryptoVec>> + Send>>;

/// `AsyncWrite` pushing bytes to the peer through the russh session handle.
pub struct ChannelDataWriter {
    handle: Handle,
    id: ChannelId,
    inflight: Option<(usize, SendFuture)>,
}

impl ChannelDataWriter {
    pub fn new(handle: Handle, id: ChannelId) -> Self {
        Self {
            handle,
            id,
            inflight: None,
        }
    }

    fn poll_inflight(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let Some((len, fut)) = self.inflight.as_mut() else {
            return Poll::Ready(Ok(0));
        };
        let len = *len;
        match fut.as_mut().poll(cx) {
            Poll::Ready(Ok(())) => {
                self.inflight = None;
                Poll::Ready(Ok(len))
            }
            Poll::Ready(Err(_)) => {
                self.inflight = None;
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "channel closed",
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for ChannelDataWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.inflight.is_some() {
            // Finish the send started by a previous call; the caller
            // resubmits the same bytes until it sees Ready.
            return self.poll_inflight(cx);
        }

        let data = CryptoVec::from_slice(buf);
        let handle = self.handle.clone();
        let id = self.id;
        self.inflight = Some((
            buf.len(),
            Box::pin(async move { handle.data(id, data).await }),
        ));
        self.poll_inflight(cx)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.poll_inflight(cx) {
            Poll::Ready(Ok(_)) => Poll::Ready(Ok(())),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // The engine never closes the channel.
        self.poll_flush(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_reader_reassembles_frames() {
        let (tx, rx) = mpsc::channel(8);
        let mut reader = ChannelDataReader::new(rx);

        tx.send(b"C0644 3 f\n".to_vec()).await.unwrap();
        tx.send(Vec::new()).await.unwrap();
        tx.send(b"abc\x00".to_vec()).await.unwrap();
        drop(tx);

        let mut all = Vec::new();
        reader.read_to_end(&mut all).await.unwrap();
        assert_eq!(all, b"C0644 3 f\nabc\x00");
    }

    #[tokio::test]
    async fn test_reader_partial_chunk_carryover() {
        let (tx, rx) = mpsc::channel(8);
        let mut reader = ChannelDataReader::new(rx);

        tx.send(b"0123456789".to_vec()).await.unwrap();
        drop(tx);

        let mut first = [0u8; 4];
        reader.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"0123");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"456789");
    }

    #[tokio::test]
    async fn test_reader_eof_on_closed_sender() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1);
        drop(tx);
        let mut reader = ChannelDataReader::new(rx);
        let mut buf = Vec::new();
        assert_eq!(reader.read_to_end(&mut buf).await.unwrap(), 0);
    }
}
