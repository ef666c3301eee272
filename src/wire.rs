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

//! SCP wire codec.
//!
//! The protocol is a half-duplex interleaving of single status bytes with
//! newline-terminated control headers and length-framed payloads. [`Wire`]
//! is the only component that touches the channel streams: the sink and
//! source state machines drive it strictly sequentially, so there is a
//! total order on every byte exchanged with the peer.
//!
//! Payload copies go through a length-limited view of the channel reader
//! (`AsyncReadExt::take` over `&mut reader`), leaving the trailing status
//! byte in the stream so the ACK discipline resumes after the payload.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Result, ScpError};

/// Status byte: success.
pub const OK: u8 = 0x00;
/// Status byte: advisory warning, followed by a newline-terminated line.
pub const WARNING: u8 = 0x01;
/// Status byte: fatal error, followed by a newline-terminated line.
pub const ERROR: u8 = 0x02;

/// Half-duplex framer over the channel streams of one transfer.
pub struct Wire<R, W> {
    reader: BufReader<R>,
    writer: W,
    max_line_length: usize,
}

impl<R, W> Wire<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W, max_line_length: usize) -> Self {
        Self {
            reader: BufReader::new(input),
            writer: output,
            max_line_length,
        }
    }

    /// Signals success to the peer.
    pub async fn send_ack(&mut self) -> Result<()> {
        self.write_all(&[OK]).await?;
        self.flush().await
    }

    /// Emits an in-band advisory (`0x01 <text>\n`); the transfer continues.
    pub async fn send_warning(&mut self, text: &str) -> Result<()> {
        self.write_all(&[WARNING]).await?;
        self.write_all(text.as_bytes()).await?;
        self.write_all(b"\n").await?;
        self.flush().await
    }

    /// Emits an in-band fatal diagnostic (`0x02 <text>\n`).
    pub async fn send_error(&mut self, text: &str) -> Result<()> {
        self.write_all(&[ERROR]).await?;
        self.write_all(text.as_bytes()).await?;
        self.write_all(b"\n").await?;
        self.flush().await
    }

    /// Writes a control header followed by the terminating newline and
    /// flushes. Never retries; an I/O failure aborts the transfer.
    pub async fn write_header(&mut self, header: &str) -> Result<()> {
        tracing::debug!(header = %header, "Sending header");
        self.write_all(header.as_bytes()).await?;
        self.write_all(b"\n").await?;
        self.flush().await
    }

    /// Reads one status byte.
    ///
    /// `OK` and unknown bytes are handed back to the caller (the sink's
    /// outer loop uses the unknown bytes as record discriminators; a sender
    /// awaiting acknowledgement treats them as success, matching peers that
    /// emit spurious ACK echoes). A `WARNING` consumes and logs the
    /// following diagnostic line and is returned; an `ERROR` consumes the
    /// line and fails with [`ScpError::PeerRejected`]. End-of-stream yields
    /// `None` when `allow_eof` is set and fails otherwise.
    pub async fn read_ack(&mut self, allow_eof: bool) -> Result<Option<u8>> {
        let byte = match self.read_byte().await? {
            Some(byte) => byte,
            None => {
                if allow_eof {
                    return Ok(None);
                }
                return Err(ScpError::UnexpectedEof {
                    context: "awaiting acknowledgement",
                });
            }
        };

        match byte {
            WARNING => {
                let line = self.require_line("reading warning diagnostic").await?;
                tracing::warn!(diagnostic = %line, "Peer warning");
                Ok(Some(byte))
            }
            ERROR => {
                let line = self.require_line("reading error diagnostic").await?;
                Err(ScpError::PeerRejected(line))
            }
            _ => Ok(Some(byte)),
        }
    }

    /// Reads bytes up to the next `\n`, returning the line without the
    /// terminator. End-of-stream before any terminator yields `None` when
    /// `allow_eof` is set and fails otherwise.
    pub async fn read_line(&mut self, allow_eof: bool) -> Result<Option<String>> {
        let mut line = Vec::new();
        loop {
            match self.read_byte().await? {
                Some(b'\n') => {
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                Some(byte) => {
                    if line.len() >= self.max_line_length {
                        return Err(ScpError::LineTooLong {
                            limit: self.max_line_length,
                        });
                    }
                    line.push(byte);
                }
                None => {
                    if allow_eof {
                        return Ok(None);
                    }
                    return Err(ScpError::UnexpectedEof {
                        context: "awaiting end of line",
                    });
                }
            }
        }
    }

    /// Copies exactly `length` bytes from the channel into `dst`.
    ///
    /// Only a length-limited view of the channel reader is exposed to the
    /// copy, so the sender's trailing status byte stays in the stream.
    pub async fn copy_in<D>(&mut self, dst: &mut D, length: u64, buf_size: usize) -> Result<()>
    where
        D: AsyncWrite + Unpin,
    {
        let mut limited = (&mut self.reader).take(length);
        let mut buf = vec![0u8; buf_size];
        let mut copied = 0u64;
        loop {
            let n = limited
                .read(&mut buf)
                .await
                .map_err(ScpError::from_channel_io)?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n]).await?;
            copied += n as u64;
        }
        if copied != length {
            return Err(ScpError::UnexpectedEof {
                context: "copying payload from peer",
            });
        }
        Ok(())
    }

    /// Copies exactly `length` bytes from `src` to the channel. A source
    /// that runs dry before `length` bytes aborts the transfer rather than
    /// corrupting the frame.
    pub async fn copy_out<S>(&mut self, src: &mut S, length: u64, buf_size: usize) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; buf_size];
        let mut remaining = length;
        while remaining > 0 {
            let want = buf.len().min(remaining.min(usize::MAX as u64) as usize);
            let n = src.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(ScpError::UnexpectedEof {
                    context: "reading payload from local file",
                });
            }
            self.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>> {
        match self.reader.read_u8().await {
            Ok(byte) => Ok(Some(byte)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(ScpError::from_channel_io(e)),
        }
    }

    async fn require_line(&mut self, context: &'static str) -> Result<String> {
        match self.read_line(false).await? {
            Some(line) => Ok(line),
            None => Err(ScpError::UnexpectedEof { context }),
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(ScpError::from_channel_io)
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await.map_err(ScpError::from_channel_io)
    }
}
