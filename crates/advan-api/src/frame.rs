// Event-stream frame reader.
//
// The device pushes XML documents over a long-lived TCP socket, each wrapped
// in a small text header:
//
//   ...noise...\r\n
//   ADVANNET/1.0\r\n
//   Content-Length:<n>\r\n
//   Content-Type:text/xml\r\n
//   \r\n
//   <n bytes of UTF-8 XML>
//
// Lines may end in `\n`, `\r\n`, or a lone `\r`. Anything before the marker
// line is discarded.

use bytes::{Buf, BytesMut};
use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::error::FrameError;

/// Substring that identifies the first line of a frame header.
pub const SYNC_MARKER: &str = "ADVANNET";

/// The only body type the device is expected to send.
pub const XML_CONTENT_TYPE: &str = "text/xml";

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete XML payloads from any `AsyncRead` byte stream.
///
/// Handles partial reads internally, so callers always get whole bodies.
/// The reader is single-use: after end-of-stream or the first error it
/// yields nothing further.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_payload: usize,
    eof: bool,
    done: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a frame reader with the default payload limit.
    pub fn new(inner: R) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD)
    }

    /// Create a frame reader with an explicit payload limit.
    pub fn with_max_payload(inner: R, max_payload: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload,
            eof: false,
            done: false,
        }
    }

    /// Read the next payload.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly between
    /// frames. A close anywhere inside a frame is an error.
    pub async fn next_message(&mut self) -> Result<Option<String>, FrameError> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_frame().await;
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    /// Consume the reader into a stream of payloads.
    ///
    /// The stream ends after a clean close, or after yielding the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<String, FrameError>> {
        let mut reader = self;
        async_stream::stream! {
            loop {
                match reader.next_message().await {
                    Ok(Some(payload)) => yield Ok(payload),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Option<String>, FrameError> {
        // ── Sync: skip noise until the marker line ──
        loop {
            match self.read_line().await? {
                None => return Ok(None),
                Some(line) if contains_marker(&line) => break,
                Some(line) => trace!(len = line.len(), "discarding pre-marker line"),
            }
        }

        // ── Header block ──
        let length_line = self.header_line().await?;
        let content_length = parse_content_length(&length_line)?;

        let type_line = self.header_line().await?;
        let content_type = header_value(&type_line, "Content-Type")?;
        if content_type != XML_CONTENT_TYPE {
            return Err(FrameError::UnsupportedContentType(content_type.to_owned()));
        }

        let blank = self.header_line().await?;
        if !blank.trim().is_empty() {
            return Err(FrameError::MalformedHeader { line: blank });
        }

        if content_length > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: content_length,
                max: self.max_payload,
            });
        }

        // ── Body ──
        while self.buf.len() < content_length {
            if !self.fill().await? {
                return Err(FrameError::Truncated {
                    expected: content_length,
                    received: self.buf.len(),
                });
            }
        }
        let body = self.buf.split_to(content_length);
        let payload = String::from_utf8(body.to_vec())?;
        trace!(len = content_length, "frame decoded");
        Ok(Some(payload))
    }

    async fn header_line(&mut self) -> Result<String, FrameError> {
        let line = self.read_line().await?.ok_or(FrameError::IncompleteHeader)?;
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Read one line, without its terminator.
    ///
    /// Returns `Ok(None)` at end-of-stream; an unterminated trailing fragment
    /// is dropped. A lone `\r` ends the line and the byte after it stays
    /// buffered for the next call.
    async fn read_line(&mut self) -> Result<Option<BytesMut>, FrameError> {
        let mut scanned = 0;
        loop {
            let found = self.buf[scanned..]
                .iter()
                .position(|&b| b == b'\r' || b == b'\n')
                .map(|pos| scanned + pos);

            let Some(idx) = found else {
                scanned = self.buf.len();
                if !self.fill().await? {
                    self.buf.clear();
                    return Ok(None);
                }
                continue;
            };

            if self.buf[idx] == b'\r' && idx + 1 == self.buf.len() && self.fill().await? {
                // Need the byte after the CR to know whether it pairs with LF.
                scanned = idx;
                continue;
            }

            let line = self.buf.split_to(idx);
            let terminator = self.buf.get_u8();
            if terminator == b'\r' && self.buf.first() == Some(&b'\n') {
                self.buf.advance(1);
            }
            return Ok(Some(line));
        }
    }

    /// Pull more bytes into the buffer. Returns `false` at end-of-stream.
    async fn fill(&mut self) -> Result<bool, FrameError> {
        if self.eof {
            return Ok(false);
        }
        self.buf.reserve(READ_CHUNK_SIZE);
        let read = self.inner.read_buf(&mut self.buf).await?;
        if read == 0 {
            self.eof = true;
            return Ok(false);
        }
        Ok(true)
    }
}

fn contains_marker(line: &[u8]) -> bool {
    line.windows(SYNC_MARKER.len())
        .any(|w| w == SYNC_MARKER.as_bytes())
}

/// Extract the value of a `Name:value` header line, checking the name.
fn header_value<'a>(line: &'a str, name: &str) -> Result<&'a str, FrameError> {
    match line.split_once(':') {
        Some((key, value)) if key.trim().eq_ignore_ascii_case(name) => Ok(value.trim()),
        _ => Err(FrameError::MalformedHeader {
            line: line.to_owned(),
        }),
    }
}

fn parse_content_length(line: &str) -> Result<usize, FrameError> {
    header_value(line, "Content-Length")?
        .parse()
        .map_err(|_| FrameError::MalformedHeader {
            line: line.to_owned(),
        })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;
    use tokio_test::io::Builder;

    use super::*;

    const BODY: &str = "<inventory><data/></inventory>";

    fn frame(body: &str) -> Vec<u8> {
        format!(
            "ADVANNET/1.0\r\nContent-Length:{}\r\nContent-Type:text/xml\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn reads_single_frame() {
        let wire = frame(BODY);
        let mut reader = FrameReader::new(&wire[..]);

        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some(BODY));
        assert!(reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn any_chunk_boundary_yields_the_same_payload() {
        let wire = frame(BODY);
        for split in 1..wire.len() {
            let mock = Builder::new()
                .read(&wire[..split])
                .read(&wire[split..])
                .build();
            let mut reader = FrameReader::new(mock);
            let payload = reader.next_message().await.unwrap();
            assert_eq!(payload.as_deref(), Some(BODY), "split at {split}");
            assert!(reader.next_message().await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn byte_at_a_time_delivery() {
        let wire = frame(BODY);
        let mut builder = Builder::new();
        for byte in &wire {
            builder.read(std::slice::from_ref(byte));
        }
        let mut reader = FrameReader::new(builder.build());
        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some(BODY));
    }

    #[tokio::test]
    async fn skips_noise_before_marker() {
        let mut wire = b"garbage line\r\nmore noise\n".to_vec();
        wire.extend(frame(BODY));
        let mut reader = FrameReader::new(&wire[..]);
        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some(BODY));
    }

    #[tokio::test]
    async fn reads_back_to_back_frames() {
        let mut wire = frame("<a/>");
        wire.extend(b"\r\n");
        wire.extend(frame("<b/>"));
        let reader = FrameReader::new(&wire[..]);

        let payloads: Vec<_> = reader.into_stream().collect().await;
        let payloads: Vec<String> = payloads.into_iter().map(Result::unwrap).collect();
        assert_eq!(payloads, vec!["<a/>".to_owned(), "<b/>".to_owned()]);
    }

    #[tokio::test]
    async fn lone_carriage_return_keeps_next_byte() {
        // Header lines terminated by a bare CR: the next line's first byte
        // must not be swallowed.
        let wire = format!(
            "ADVANNET\rContent-Length:{}\rContent-Type:text/xml\r\r{BODY}",
            BODY.len()
        );
        let mut reader = FrameReader::new(wire.as_bytes());
        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some(BODY));
    }

    #[tokio::test]
    async fn lone_carriage_return_split_across_reads() {
        let wire = format!(
            "ADVANNET\rContent-Length:{}\rContent-Type:text/xml\r\r{BODY}",
            BODY.len()
        );
        let bytes = wire.as_bytes();
        let cr = bytes.iter().position(|&b| b == b'\r').unwrap();
        let mock = Builder::new()
            .read(&bytes[..=cr])
            .read(&bytes[cr + 1..])
            .build();
        let mut reader = FrameReader::new(mock);
        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some(BODY));
    }

    #[tokio::test]
    async fn clean_close_between_frames_is_end_of_stream() {
        let mut reader = FrameReader::new(&b""[..]);
        assert!(reader.next_message().await.unwrap().is_none());

        let mut reader = FrameReader::new(&b"noise without newline"[..]);
        assert!(reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let mut wire = frame(BODY);
        wire.truncate(wire.len() - 5);
        let mut reader = FrameReader::new(&wire[..]);

        let err = reader.next_message().await.unwrap_err();
        assert!(
            matches!(err, FrameError::Truncated { expected, received } if expected == BODY.len() && received == BODY.len() - 5),
            "unexpected error: {err:?}"
        );
        // Non-restartable: nothing more after a failure.
        assert!(reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_inside_header_is_an_error() {
        let mut reader = FrameReader::new(&b"ADVANNET\r\nContent-Length:12\r\n"[..]);
        let err = reader.next_message().await.unwrap_err();
        assert!(matches!(err, FrameError::IncompleteHeader));
    }

    #[tokio::test]
    async fn wrong_content_type_is_fatal() {
        let wire = b"ADVANNET\r\nContent-Length:2\r\nContent-Type:application/json\r\n\r\n{}";
        let mut reader = FrameReader::new(&wire[..]);
        let err = reader.next_message().await.unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedContentType(ref t) if t == "application/json"));
    }

    #[tokio::test]
    async fn malformed_length_is_fatal() {
        let wire = b"ADVANNET\r\nContent-Length:abc\r\nContent-Type:text/xml\r\n\r\n";
        let mut reader = FrameReader::new(&wire[..]);
        let err = reader.next_message().await.unwrap_err();
        assert!(matches!(err, FrameError::MalformedHeader { .. }));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let wire = frame(BODY);
        let mut reader = FrameReader::with_max_payload(&wire[..], 8);
        let err = reader.next_message().await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size, max: 8 } if size == BODY.len()));
    }

    #[tokio::test]
    async fn multibyte_utf8_body_is_counted_in_bytes() {
        let body = "<tag>ñandú</tag>";
        let wire = frame(body);
        let mut reader = FrameReader::new(&wire[..]);
        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some(body));
    }
}
