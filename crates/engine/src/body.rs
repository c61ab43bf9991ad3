use crate::error::{BoxError, EngineError};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body::Body as HttpBody;
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, StreamBody};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;

/// Type-erased inbound request body.
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// A request body that can be consumed at most once.
///
/// The first pipeline stage that reads the stream (file parse or body parse) takes it,
/// later stages observe it as consumed.
#[derive(Clone)]
pub struct OptionReqBody {
    inner: Arc<Mutex<Option<RequestBody>>>,
}

impl std::fmt::Debug for OptionReqBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionReqBody").finish_non_exhaustive()
    }
}

impl OptionReqBody {
    pub fn new<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self::from(body.map_err(Into::<BoxError>::into).boxed_unsync())
    }

    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new())
    }

    pub async fn can_consume(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.is_some()
    }

    /// Takes the raw stream, leaving the body consumed.
    pub async fn take(&self) -> Option<RequestBody> {
        let mut guard = self.inner.lock().await;
        guard.take()
    }

    /// Buffers the whole stream.
    pub async fn collect(&self) -> Result<Bytes, EngineError> {
        let body = self.take().await.ok_or_else(|| EngineError::invalid_body("body has been consumed"))?;
        body.collect().await.map(|c| c.to_bytes()).map_err(EngineError::invalid_body)
    }
}

impl From<RequestBody> for OptionReqBody {
    fn from(body: RequestBody) -> Self {
        OptionReqBody { inner: Arc::new(Mutex::new(Some(body))) }
    }
}

pub struct ResponseBody {
    inner: Kind,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(UnsyncBoxBody<Bytes, io::Error>),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Kind::Once(bytes) => f.debug_tuple("ResponseBody::Once").field(bytes).finish(),
            Kind::Stream(_) => f.write_str("ResponseBody::Stream"),
        }
    }
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self { inner: Kind::Once(Some(bytes)) } }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes, Error = io::Error> + Send + 'static,
    {
        Self { inner: Kind::Stream(UnsyncBoxBody::new(body)) }
    }

    /// Streams an opened file chunk by chunk.
    pub fn file(file: tokio::fs::File) -> Self {
        let stream = ReaderStream::new(file).map_ok(Frame::data);
        Self::stream(StreamBody::new(stream))
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::once(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Bytes> for ResponseBody {
    fn from(value: Bytes) -> Self {
        Self::once(value)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Once(option_bytes) => Poll::Ready(option_bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(box_body) => Pin::new(box_body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(option_bytes) => option_bytes.is_none(),
            Kind::Stream(box_body) => box_body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(box_body) => box_body.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{OptionReqBody, ResponseBody};
    use bytes::Bytes;
    use http_body::Body as HttpBody;
    use http_body_util::{BodyExt, Full};
    use std::io::Write;

    fn check_send<T: Send>() {}
    fn check_sync<T: Sync>() {}

    #[test]
    fn is_send() {
        check_send::<ResponseBody>();
        check_send::<OptionReqBody>();
        check_sync::<OptionReqBody>();
    }

    #[tokio::test]
    async fn string_body() {
        let mut body = ResponseBody::from("Hello world".to_string());

        assert_eq!(body.size_hint().exact(), Some(11));
        assert!(!body.is_end_stream());

        let bytes = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(bytes, Bytes::from("Hello world"));

        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn empty_string_is_empty_body() {
        let mut body = ResponseBody::from("");
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn file_body_streams_content() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"file content").unwrap();

        let file = tokio::fs::File::open(tmp.path()).await.unwrap();
        let body = ResponseBody::file(file);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from("file content"));
    }

    #[tokio::test]
    async fn request_body_is_consumed_once() {
        let body = OptionReqBody::new(Full::new(Bytes::from("abc")));
        assert!(body.can_consume().await);

        let clone = body.clone();
        assert_eq!(clone.collect().await.unwrap(), Bytes::from("abc"));

        assert!(!body.can_consume().await);
        assert!(body.collect().await.is_err());
    }
}
