use crate::error::TransportError;
use bytes::BytesMut;
use futures::StreamExt;
use std::io;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Decoder, FramedRead};
use tracing::debug;

/// Open a TCP connection to `addr`, giving up after `limit`.
pub async fn connect(
    addr: impl ToSocketAddrs,
    limit: Duration,
) -> Result<(LineReader<OwnedReadHalf>, OwnedWriteHalf), TransportError> {
    let stream = tokio::time::timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::Timeout(limit.as_secs()))??;
    stream.set_nodelay(true)?;
    let (read, write) = stream.into_split();
    Ok((LineReader::new(read), write))
}

/// Longest line accepted from a peer, terminator included.
pub const MAX_LINE_LEN: usize = 512;

/// Newline-terminated lines, decoded lossily.
///
/// Lines longer than `max_len` are dropped whole rather than buffered, so a
/// peer that never sends `\n` cannot grow the read buffer past the limit.
pub struct LineCodec {
    next_index: usize,
    max_len: usize,
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_len {
                    debug!(len = src.len(), "discarding overlong partial line");
                    src.clear();
                    self.discarding = true;
                }
                self.next_index = src.len();
                return Ok(None);
            };
            let raw = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if std::mem::take(&mut self.discarding) || raw.len() > self.max_len {
                debug!(len = raw.len(), "dropped overlong line");
                continue;
            }
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        let line = self.decode(src)?;
        if line.is_none() {
            // An unterminated tail at hangup is not a line.
            src.clear();
            self.next_index = 0;
        }
        Ok(line)
    }
}

/// Reads one line at a time from a byte stream.
pub struct LineReader<R> {
    inner: FramedRead<R, LineCodec>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: FramedRead::new(inner, LineCodec::new(MAX_LINE_LEN)),
        }
    }

    /// Next line without its terminator, or `None` at end of stream.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.inner.next().await.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn lines_split_across_reads_are_joined() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = LineReader::new(rx);

        tx.write_all(b"PING :one\r\nPI").await.unwrap();
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("PING :one"));

        tx.write_all(b"NG :two\r\n\r\n:a B\n").await.unwrap();
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("PING :two"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some(":a B"));

        drop(tx);
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let mut data = b"caf\xe9\r\n".to_vec();
        data.extend(vec![0xffu8; MAX_LINE_LEN + 10]);
        data.extend_from_slice(b"\r\nna\xefve\r\nunterminated");
        let mut reader = LineReader::new(data.as_slice());

        let line = reader.next_line().await.unwrap().unwrap();
        assert!(line.starts_with("caf"));
        let line = reader.next_line().await.unwrap().unwrap();
        assert!(line.starts_with("na"));
        assert!(line.ends_with("ve"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn overlong_lines_are_dropped_and_reading_continues() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = LineReader::new(rx);

        let writer = tokio::spawn(async move {
            tx.write_all(&[b'x'; MAX_LINE_LEN * 4]).await.unwrap();
            tx.write_all(b"\r\nPING :after\r\n").await.unwrap();
            let long = format!(":a PRIVMSG #x :{}\r\n", "y".repeat(MAX_LINE_LEN));
            tx.write_all(long.as_bytes()).await.unwrap();
            tx.write_all(b"PING :last\r\n").await.unwrap();
        });

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("PING :after"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("PING :last"));
        writer.await.unwrap();
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[test]
    fn codec_buffer_stays_bounded() {
        let mut codec = LineCodec::new(16);
        let mut buf = BytesMut::new();
        for _ in 0..10 {
            buf.extend_from_slice(&[b'z'; 10]);
            assert_eq!(codec.decode(&mut buf).unwrap(), None);
            assert!(buf.len() <= 16 + 10);
        }
        buf.extend_from_slice(b"tail\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("ok"));
    }
}
