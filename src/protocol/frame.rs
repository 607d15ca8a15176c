//! Sentinel-byte framing.
//!
//! A response on the wire is UTF-8 text followed by exactly one `0x00`.
//! The payload never contains `0x00`; [`encode`] strips any stray zero
//! bytes before appending the terminator. Binary-safe payloads are not
//! supported.

use std::collections::VecDeque;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// The byte that terminates every framed response.
pub const SENTINEL: u8 = 0x00;

/// Encode one response as `text` + sentinel.
pub fn encode(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = text.bytes().filter(|b| *b != SENTINEL).collect();
    bytes.push(SENTINEL);
    bytes
}

/// Accumulates inbound chunks and yields complete frames.
///
/// A frame is produced at every sentinel, so several frames coalesced into
/// one read are all recovered, and a frame split across many reads is
/// produced exactly once.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if byte == SENTINEL {
                let payload = std::mem::take(&mut self.buf);
                frames.push(String::from_utf8_lossy(&payload).into_owned());
            } else {
                self.buf.push(byte);
            }
        }
        frames
    }

    /// Bytes received since the last complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

/// Reads sentinel-terminated frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    ready: VecDeque<String>,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            chunk: vec![0u8; 4096],
        }
    }

    /// Wait for the next complete frame.
    ///
    /// Returns `Ok(None)` if the stream ends first; any partial frame is
    /// discarded in that case.
    pub async fn next_frame(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                self.decoder.reset();
                return Ok(None);
            }
            self.ready.extend(self.decoder.push(&self.chunk[..n]));
        }
    }

    /// Bytes read since the last complete frame, for unframed output such
    /// as trace lines.
    pub fn pending(&self) -> &[u8] {
        self.decoder.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_sentinel() {
        assert_eq!(encode("3"), b"3\0".to_vec());
        assert_eq!(encode(""), vec![0u8]);
    }

    #[test]
    fn test_encode_strips_embedded_zero() {
        assert_eq!(encode("a\0b"), b"ab\0".to_vec());
    }

    #[test]
    fn test_decoder_single_chunk() {
        let mut d = FrameDecoder::new();
        assert_eq!(d.push(b"hello\0"), vec!["hello".to_string()]);
        assert!(d.pending().is_empty());
    }

    #[test]
    fn test_decoder_split_chunks() {
        let text = "{ sys: 'repl', echo: true, x: 1 }";
        let bytes = encode(text);

        for split in 1..bytes.len() {
            let mut d = FrameDecoder::new();
            let mut frames = d.push(&bytes[..split]);
            frames.extend(d.push(&bytes[split..]));
            assert_eq!(frames, vec![text.to_string()], "split at {}", split);
        }
    }

    #[test]
    fn test_decoder_byte_at_a_time() {
        let mut d = FrameDecoder::new();
        let mut frames = Vec::new();
        for b in encode("one two") {
            frames.extend(d.push(&[b]));
        }
        assert_eq!(frames, vec!["one two".to_string()]);
    }

    #[test]
    fn test_decoder_coalesced_frames() {
        let mut d = FrameDecoder::new();
        let frames = d.push(b"a\0\0b\0c");
        assert_eq!(frames, vec!["a".to_string(), String::new(), "b".to_string()]);
        assert_eq!(d.pending(), b"c");
    }

    #[tokio::test]
    async fn test_reader_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"OUT 000000: 1\n3")
            .read(b"\0")
            .read(b"done\0")
            .build();
        let mut reader = FrameReader::new(mock);

        assert_eq!(
            reader.next_frame().await.unwrap(),
            Some("OUT 000000: 1\n3".to_string())
        );
        assert_eq!(reader.next_frame().await.unwrap(), Some("done".to_string()));
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_eof_mid_frame() {
        let mock = tokio_test::io::Builder::new().read(b"partial").build();
        let mut reader = FrameReader::new(mock);
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }
}
