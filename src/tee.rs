//! Optional connection tap: when `MONGOPROXY_TEE=1` at process start, every
//! read and write on wrapped connections is mirrored to the diagnostic log.

use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::middleware::Stream;

fn enabled() -> bool {
    static TEE: OnceLock<bool> = OnceLock::new();
    *TEE.get_or_init(|| std::env::var("MONGOPROXY_TEE").as_deref() == Ok("1"))
}

/// Wrap an accepted socket in the tee when enabled; transparent otherwise.
pub fn maybe_wrap(label: String, stream: TcpStream) -> Box<dyn Stream> {
    if enabled() {
        Box::new(TeeStream::new(label, stream))
    } else {
        Box::new(stream)
    }
}

pub struct TeeStream<S> {
    label: String,
    inner: S,
}

impl<S> TeeStream<S> {
    pub fn new(label: String, inner: S) -> Self {
        Self { label, inner }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TeeStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &poll {
            let chunk = &buf.filled()[before..];
            if !chunk.is_empty() {
                tracing::debug!(
                    target: "tee",
                    label = %this.label,
                    n = chunk.len(),
                    data = ?chunk,
                    "READ",
                );
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TeeStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);

        if let Poll::Ready(Ok(n)) = &poll {
            if *n > 0 {
                tracing::debug!(
                    target: "tee",
                    label = %this.label,
                    n = *n,
                    data = ?&buf[..*n],
                    "WRIT",
                );
            }
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
