//! Byte streams for blob content.
//!
//! Blob bodies move through the crate as [`BlobStream`]s. Uploads pass the
//! caller's stream through a [`TeeStream`], which feeds every chunk to a
//! [`Digester`] at the moment it is handed to the HTTP body. The content is
//! therefore hashed in the same single pass that sends it, never buffered or
//! read twice.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::digest::{Digest, Digester};

/// A boxed stream of blob bytes.
pub type BlobStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// Wraps an async reader as a [`BlobStream`].
pub fn from_reader<R>(reader: R) -> BlobStream
where
    R: AsyncRead + Send + 'static,
{
    Box::pin(ReaderStream::new(reader))
}

/// Wraps an in-memory buffer as a single-chunk [`BlobStream`].
pub fn from_bytes(data: impl Into<Bytes>) -> BlobStream {
    let data: Bytes = data.into();
    Box::pin(futures::stream::iter(std::iter::once(Ok(data))))
}

/// Drains a [`BlobStream`] into memory.
///
/// # Errors
///
/// Returns the first error the stream yields.
pub async fn read_to_vec(stream: BlobStream) -> io::Result<Vec<u8>> {
    stream
        .try_fold(Vec::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await
}

#[derive(Debug, Default)]
struct TeeState {
    digester: Option<Digester>,
    bytes: u64,
    error: Option<String>,
    finished: bool,
}

/// Pass-through stream that hashes and counts what it forwards.
pub(crate) struct TeeStream {
    inner: BlobStream,
    state: Arc<Mutex<TeeState>>,
}

/// Read side of a [`TeeStream`], kept by the uploader after the stream
/// itself has been moved into a request body.
#[derive(Debug, Clone)]
pub(crate) struct TeeHandle {
    state: Arc<Mutex<TeeState>>,
}

/// What a [`TeeStream`] saw by the time its handle was finished.
#[derive(Debug)]
pub(crate) struct TeeOutcome {
    /// Digest of every forwarded byte, if hashing was enabled.
    pub digest: Option<Digest>,
    /// Number of bytes forwarded.
    pub bytes: u64,
    /// Error the source yielded, if any.
    pub error: Option<String>,
    /// Whether the source reached its end.
    pub finished: bool,
}

impl TeeStream {
    /// Wraps `inner`. Pass `None` to count bytes without hashing.
    pub(crate) fn new(inner: BlobStream, digester: Option<Digester>) -> (Self, TeeHandle) {
        let state = Arc::new(Mutex::new(TeeState {
            digester,
            ..TeeState::default()
        }));
        let handle = TeeHandle {
            state: Arc::clone(&state),
        };
        (Self { inner, state }, handle)
    }
}

impl Stream for TeeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = ready!(self.inner.as_mut().poll_next(cx));

        let mut state = self.state.lock();
        match &item {
            Some(Ok(chunk)) => {
                if let Some(digester) = state.digester.as_mut() {
                    digester.update(chunk);
                }
                state.bytes += chunk.len() as u64;
            }
            Some(Err(err)) => state.error = Some(err.to_string()),
            None => state.finished = true,
        }
        drop(state);

        Poll::Ready(item)
    }
}

impl TeeHandle {
    /// Takes the accumulated result.
    ///
    /// The digest is only produced once; later calls report `None`.
    pub(crate) fn finish(&self) -> TeeOutcome {
        let mut state = self.state.lock();
        TeeOutcome {
            digest: state.digester.take().map(Digester::finish),
            bytes: state.bytes,
            error: state.error.take(),
            finished: state.finished,
        }
    }
}
