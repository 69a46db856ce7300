//! Incremental decoding of concatenated top-level JSON values from a chunked byte stream.
use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use serde_json::Value as JsonValue;

use crate::error::DbProxyError;

/// Pulls one complete JSON value at a time out of a stream of byte chunks.
///
/// Values may be separated by arbitrary whitespace and split across chunk boundaries.
pub(crate) struct JsonValueReader<S> {
    chunks: S,
    buf: Vec<u8>,
    pos: usize,
    exhausted: bool,
}

impl<S, B, E> JsonValueReader<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    pub(crate) fn new(chunks: S) -> Self {
        Self {
            chunks,
            buf: Vec::new(),
            pos: 0,
            exhausted: false,
        }
    }

    /// Next complete value, or `None` once the stream ended cleanly.
    ///
    /// # Errors
    /// `DecodeError` for malformed or truncated JSON, `ConnectionError` when the underlying
    /// stream fails.
    pub(crate) async fn next_value(&mut self) -> Result<Option<JsonValue>, DbProxyError> {
        loop {
            self.skip_whitespace();
            if self.pos < self.buf.len() {
                let mut values =
                    serde_json::Deserializer::from_slice(&self.buf[self.pos..]).into_iter::<JsonValue>();
                match values.next() {
                    Some(Ok(value)) => {
                        self.pos += values.byte_offset();
                        self.compact();
                        return Ok(Some(value));
                    }
                    Some(Err(err)) if err.is_eof() => {}
                    Some(Err(err)) => return Err(DbProxyError::from(err)),
                    None => {}
                }
            }

            if self.exhausted {
                if self.pos < self.buf.len() {
                    return Err(DbProxyError::DecodeError(
                        "response body ended inside a JSON value".into(),
                    ));
                }
                return Ok(None);
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(err)) => {
                    return Err(DbProxyError::ConnectionError(format!(
                        "reading response body: {err}"
                    )));
                }
                None => self.exhausted = true,
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.buf.len() && self.buf[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn compact(&mut self) {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos > 4096 && self.pos * 2 > self.buf.len() {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    fn reader(chunks: Vec<&'static str>) -> JsonValueReader<impl Stream<Item = Result<&'static [u8], String>> + Unpin> {
        JsonValueReader::new(stream::iter(
            chunks.into_iter().map(|c| Ok::<_, String>(c.as_bytes())),
        ))
    }

    #[tokio::test]
    async fn values_split_across_chunks() {
        let mut r = reader(vec![
            "{\"code\":200,\"ms",
            "g\":\"OK\",\"result\":{\"columns\":[\"a\"]}}\n[1]",
            "\n[2]\n  [\"thr",
            "ee\"]\n",
        ]);
        assert_eq!(
            r.next_value().await.unwrap(),
            Some(json!({"code": 200, "msg": "OK", "result": {"columns": ["a"]}}))
        );
        assert_eq!(r.next_value().await.unwrap(), Some(json!([1])));
        assert_eq!(r.next_value().await.unwrap(), Some(json!([2])));
        assert_eq!(r.next_value().await.unwrap(), Some(json!(["three"])));
        assert_eq!(r.next_value().await.unwrap(), None);
        assert_eq!(r.next_value().await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_body_is_decode_error() {
        let mut r = reader(vec!["{\"code\":200}", "[1, 2"]);
        assert!(r.next_value().await.unwrap().is_some());
        assert!(matches!(
            r.next_value().await,
            Err(DbProxyError::DecodeError(_))
        ));
    }

    #[tokio::test]
    async fn garbage_is_decode_error() {
        let mut r = reader(vec!["{\"code\":200} ]oops"]);
        assert!(r.next_value().await.unwrap().is_some());
        assert!(matches!(
            r.next_value().await,
            Err(DbProxyError::DecodeError(_))
        ));
    }

    #[tokio::test]
    async fn stream_failure_is_connection_error() {
        let mut r = JsonValueReader::new(stream::iter(vec![
            Ok::<&[u8], String>(b"[1]".as_slice()),
            Err("reset by peer".to_string()),
        ]));
        assert_eq!(r.next_value().await.unwrap(), Some(json!([1])));
        assert!(matches!(
            r.next_value().await,
            Err(DbProxyError::ConnectionError(_))
        ));
    }
}
