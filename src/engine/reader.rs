use crate::error::{EnumError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

const CHUNK: usize = 1024;

/// Accumulates bytes from a connection until one complete SMTP reply is
/// buffered. Bytes belonging to the following reply stay queued for the
/// next call.
pub struct ReplyReader {
    max_bytes: usize,
    idle_timeout: Duration,
    buf: Vec<u8>,
    skipping: bool,
    skip_head: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ReadResult {
    pub bytes: Vec<u8>,
    /// The reply hit the size cap; the rest of it was discarded.
    pub truncated: bool,
}

impl ReplyReader {
    pub fn new(max_bytes: usize, idle_timeout: Duration) -> Self {
        Self {
            max_bytes: max_bytes.max(4),
            idle_timeout,
            buf: Vec::new(),
            skipping: false,
            skip_head: Vec::new(),
        }
    }

    pub async fn read<T: AsyncRead + Unpin>(&mut self, stream: &mut T) -> Result<ReadResult> {
        let mut chunk = [0u8; CHUNK];
        loop {
            if self.skipping && self.skip_oversized() {
                self.skipping = false;
            }
            if !self.skipping {
                if let Some(result) = self.take_reply() {
                    return Ok(result);
                }
            }

            let n = match timeout(self.idle_timeout, stream.read(&mut chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(source)) => return Err(EnumError::Read { source }),
                Err(_) => return Err(EnumError::Timeout { op: "read" }),
            };
            if n == 0 {
                return Err(EnumError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_reply(&mut self) -> Option<ReadResult> {
        match find_reply_end(&self.buf) {
            Some(end) if end <= self.max_bytes => {
                let bytes = self.buf.drain(..end).collect();
                Some(ReadResult {
                    bytes,
                    truncated: false,
                })
            }
            Some(_) => Some(self.truncate()),
            None if self.buf.len() >= self.max_bytes => Some(self.truncate()),
            None => None,
        }
    }

    // The buffer still starts at the oversized reply; the remainder is
    // dropped before the next reply is read.
    fn truncate(&mut self) -> ReadResult {
        self.skipping = true;
        ReadResult {
            bytes: self.buf[..self.max_bytes].to_vec(),
            truncated: true,
        }
    }

    /// Drops lines up to and including the final line of the current reply.
    /// Returns false when more input is needed.
    fn skip_oversized(&mut self) -> bool {
        loop {
            match self.buf.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    let mut head = std::mem::take(&mut self.skip_head);
                    let need = 4usize.saturating_sub(head.len()).min(pos + 1);
                    head.extend_from_slice(&self.buf[..need]);
                    self.buf.drain(..=pos);
                    if !is_continuation(&head) {
                        return true;
                    }
                }
                None => {
                    let need = 4usize.saturating_sub(self.skip_head.len()).min(self.buf.len());
                    self.skip_head.extend_from_slice(&self.buf[..need]);
                    self.buf.clear();
                    return false;
                }
            }
        }
    }
}

impl ReadResult {
    /// Printable reply text with line terminators normalised to `\n` and the
    /// trailing terminator removed.
    pub fn text(&self) -> String {
        crate::util::sanitize_text(&self.bytes)
            .lines()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `250-first line` continues a reply; anything else ends it.
fn is_continuation(line: &[u8]) -> bool {
    line.len() >= 4 && line[..3].iter().all(u8::is_ascii_digit) && line[3] == b'-'
}

fn find_reply_end(buf: &[u8]) -> Option<usize> {
    let mut start = 0;
    while let Some(rel) = buf[start..].iter().position(|b| *b == b'\n') {
        let end = start + rel + 1;
        if !is_continuation(&buf[start..end]) {
            return Some(end);
        }
        start = end;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn reader(max: usize) -> ReplyReader {
        ReplyReader::new(max, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn stops_on_single_line_reply() {
        let mut data: &[u8] = b"250 2.1.5 root\r\n550 next\r\n";
        let mut reader = reader(64);
        let res = reader.read(&mut data).await.unwrap();
        assert_eq!(res.bytes, b"250 2.1.5 root\r\n");
        assert!(!res.truncated);
    }

    #[tokio::test]
    async fn keeps_pipelined_bytes_for_next_reply() {
        let mut data: &[u8] = b"220 ready\r\n250 ok\r\n";
        let mut reader = reader(64);
        assert_eq!(reader.read(&mut data).await.unwrap().text(), "220 ready");
        assert_eq!(reader.read(&mut data).await.unwrap().text(), "250 ok");
    }

    #[tokio::test]
    async fn collects_multiline_reply() {
        let mut data: &[u8] = b"250-mx.example\r\n250-SIZE 1000\r\n250 HELP\r\n";
        let mut reader = reader(128);
        let res = reader.read(&mut data).await.unwrap();
        assert_eq!(res.text(), "250-mx.example\n250-SIZE 1000\n250 HELP");
    }

    #[tokio::test]
    async fn assembles_reply_split_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            server.write_all(b"250 2.1.").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"5 root\r\n").await.unwrap();
            server
        });
        let mut reader = reader(64);
        let res = reader.read(&mut client).await.unwrap();
        assert_eq!(res.text(), "250 2.1.5 root");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn truncates_and_resyncs_after_oversized_reply() {
        let mut payload = b"250-".to_vec();
        payload.extend(std::iter::repeat(b'a').take(40));
        payload.extend_from_slice(b"\r\n250 end\r\n550 next\r\n");
        let mut data: &[u8] = &payload;
        let mut reader = reader(16);
        let first = reader.read(&mut data).await.unwrap();
        assert!(first.truncated);
        assert_eq!(first.bytes.len(), 16);
        let second = reader.read(&mut data).await.unwrap();
        assert_eq!(second.text(), "550 next");
    }

    #[tokio::test]
    async fn closed_peer_is_an_error() {
        let mut data: &[u8] = b"250 partial";
        let mut reader = reader(64);
        let err = reader.read(&mut data).await.unwrap_err();
        assert!(matches!(err, EnumError::ConnectionClosed));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (mut client, _server) = tokio::io::duplex(64);
        let mut reader = ReplyReader::new(64, Duration::from_millis(30));
        let err = reader.read(&mut client).await.unwrap_err();
        assert!(matches!(err, EnumError::Timeout { op: "read" }));
    }
}
