//! Request and response bodies.
//!
//! [`Body`] is what travels through the transport chain: empty, fully
//! buffered, or a stream of chunks. Interceptors that want to look at a body
//! call [`Body::buffer`], which drains a stream *in place* and leaves the body
//! readable again for whoever comes next.
//!
//! [`RequestBody`] is what callers hand to a builder. Each of its four
//! variants has its own encoding rule:
//!
//! | Variant | Wire bytes |
//! |---------|------------|
//! | `Bytes` | unchanged |
//! | `Text`  | UTF-8 bytes of the string, unchanged |
//! | `Stream`| drained to bytes |
//! | `Json`  | `serde_json` encoding, produced at execution time |

use crate::error::{BoxError, Error, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, BoxError>> + Send>>;

/// A message body moving through the transport chain.
#[derive(Default)]
pub struct Body {
    kind: Kind,
}

#[derive(Default)]
pub(crate) enum Kind {
    #[default]
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl Body {
    /// An empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A body backed by a stream of chunks.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            kind: Kind::Stream(Box::pin(stream.map_err(|e| -> BoxError { e.into() }))),
        }
    }

    /// True if the body is known to hold no bytes.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Full(bytes) => bytes.is_empty(),
            Kind::Stream(_) => false,
        }
    }

    /// True if the body is fully in memory and can be replayed.
    pub fn is_buffered(&self) -> bool {
        !matches!(self.kind, Kind::Stream(_))
    }

    /// The buffered bytes, or `None` for an unread stream.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            Kind::Empty => Some(&[]),
            Kind::Full(bytes) => Some(bytes),
            Kind::Stream(_) => None,
        }
    }

    /// Exact length when known without reading.
    pub fn size_hint(&self) -> Option<u64> {
        self.as_bytes().map(|b| b.len() as u64)
    }

    /// Read the whole body, consuming it.
    pub async fn collect(self) -> std::result::Result<Bytes, BoxError> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Full(bytes) => Ok(bytes),
            Kind::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Read the whole body while keeping it readable.
    ///
    /// A stream is drained and replaced by its buffered bytes. If the stream
    /// fails part way, the body is restored as the chunks read so far
    /// followed by the same failure, so the next reader sees what the
    /// original stream would have produced.
    pub async fn buffer(&mut self) -> std::result::Result<Bytes, BoxError> {
        match std::mem::take(&mut self.kind) {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Full(bytes) => {
                self.kind = Kind::Full(bytes.clone());
                Ok(bytes)
            }
            Kind::Stream(mut stream) => {
                let mut chunks = Vec::new();
                while let Some(next) = stream.next().await {
                    match next {
                        Ok(chunk) => chunks.push(chunk),
                        Err(err) => {
                            let message = err.to_string();
                            let replay = chunks
                                .into_iter()
                                .map(Ok)
                                .chain(std::iter::once(Err(err)));
                            self.kind = Kind::Stream(Box::pin(stream::iter(replay)));
                            return Err(message.into());
                        }
                    }
                }
                let bytes = concat(chunks);
                self.kind = Kind::Full(bytes.clone());
                Ok(bytes)
            }
        }
    }

    /// Clone a buffered body. Streams cannot be cloned.
    pub fn try_clone(&self) -> Option<Body> {
        match &self.kind {
            Kind::Empty => Some(Body::empty()),
            Kind::Full(bytes) => Some(Body::from(bytes.clone())),
            Kind::Stream(_) => None,
        }
    }

    pub(crate) fn into_kind(self) -> Kind {
        self.kind
    }
}

fn concat(mut chunks: Vec<Bytes>) -> Bytes {
    if chunks.len() == 1 {
        return chunks.pop().unwrap_or_default();
    }
    let mut buf = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
    for chunk in &chunks {
        buf.extend_from_slice(chunk);
    }
    buf.freeze()
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Kind::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Full(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// Deferred JSON encoding of a caller value.
pub struct JsonBody(Box<dyn FnOnce() -> serde_json::Result<Vec<u8>> + Send>);

impl JsonBody {
    /// Capture `value` for encoding at execution time.
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + 'static,
    {
        JsonBody(Box::new(move || serde_json::to_vec(&value)))
    }

    /// Encode the captured value.
    pub fn encode(self) -> serde_json::Result<Vec<u8>> {
        (self.0)()
    }
}

/// A request body as supplied by the caller.
pub enum RequestBody {
    /// Raw bytes, sent unchanged.
    Bytes(Bytes),
    /// Text, sent unchanged.
    Text(String),
    /// A byte stream, drained before sending.
    Stream(Body),
    /// A structured value, encoded as JSON.
    Json(JsonBody),
}

impl RequestBody {
    /// A structured value to be sent as JSON.
    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + 'static,
    {
        RequestBody::Json(JsonBody::new(value))
    }

    /// Produce the wire bytes.
    pub async fn encode(self) -> Result<Bytes> {
        match self {
            RequestBody::Bytes(bytes) => Ok(bytes),
            RequestBody::Text(text) => Ok(Bytes::from(text)),
            RequestBody::Stream(body) => body
                .collect()
                .await
                .map_err(|e| Error::Serialization(Arc::from(e))),
            RequestBody::Json(json) => json
                .encode()
                .map(Bytes::from)
                .map_err(|e| Error::Serialization(Arc::new(e))),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            RequestBody::Stream(body) => f.debug_tuple("Stream").field(body).finish(),
            RequestBody::Json(_) => f.write_str("Json"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(bytes: &'static [u8]) -> Self {
        RequestBody::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_owned())
    }
}

impl From<Body> for RequestBody {
    fn from(body: Body) -> Self {
        RequestBody::Stream(body)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io;

    fn chunked(parts: &[&'static str]) -> Body {
        let chunks: Vec<std::result::Result<Bytes, io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        Body::from_stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_buffer_keeps_stream_readable() {
        let mut body = chunked(&["hel", "lo ", "world"]);
        assert!(!body.is_buffered());

        let seen = body.buffer().await.unwrap();
        assert_eq!(&seen[..], b"hello world");
        assert!(body.is_buffered());
        assert_eq!(body.size_hint(), Some(11));

        let again = body.collect().await.unwrap();
        assert_eq!(seen, again);
    }

    #[tokio::test]
    async fn test_buffer_replays_stream_failure() {
        let chunks: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"par")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut body = Body::from_stream(stream::iter(chunks));

        let err = body.buffer().await.unwrap_err();
        assert_eq!(err.to_string(), "reset");

        let mut replay = match body.into_kind() {
            Kind::Stream(stream) => stream,
            _ => panic!("expected the failing stream to be restored"),
        };
        assert_eq!(&replay.next().await.unwrap().unwrap()[..], b"par");
        assert_eq!(replay.next().await.unwrap().unwrap_err().to_string(), "reset");
        assert!(replay.next().await.is_none());
    }

    #[tokio::test]
    async fn test_raw_bodies_pass_through() {
        let raw = vec![0u8, 159, 146, 150];
        let bytes = RequestBody::from(raw.clone()).encode().await.unwrap();
        assert_eq!(&bytes[..], &raw[..]);

        let text = RequestBody::from("{not json").encode().await.unwrap();
        assert_eq!(&text[..], b"{not json");

        let drained = RequestBody::from(chunked(&["a", "b"])).encode().await.unwrap();
        assert_eq!(&drained[..], b"ab");
    }

    #[tokio::test]
    async fn test_json_body_matches_serde() {
        #[derive(Serialize)]
        struct Todo {
            title: &'static str,
            done: bool,
        }
        let expected = serde_json::to_vec(&Todo { title: "foo", done: false }).unwrap();
        let encoded = RequestBody::json(Todo { title: "foo", done: false })
            .encode()
            .await
            .unwrap();
        assert_eq!(&encoded[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_json_encode_failure() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], "value");
        let err = RequestBody::json(map).encode().await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_try_clone() {
        assert!(Body::from("abc").try_clone().is_some());
        assert!(chunked(&["abc"]).try_clone().is_none());
        assert!(Body::empty().is_empty());
    }
}
