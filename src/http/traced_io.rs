use crate::trace::{TraceEvent, TraceHandle, TraceHandler};
use http::HeaderMap;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Connection wrapper that reports request writes and the first response byte.
///
/// The first write carries the serialized request head, so header-field events
/// are emitted right before it and `WroteHeaders` once it completes.
/// `WroteRequest` follows the first successful flush.
pub struct TracedIo<S> {
    inner: S,
    handle: TraceHandle,
    pending_headers: Option<Vec<(String, Vec<String>)>>,
    headers_written: bool,
    request_written: bool,
    first_byte_seen: bool,
}

impl<S> TracedIo<S> {
    pub fn new(inner: S, handle: TraceHandle, headers: &HeaderMap) -> Self {
        let fields = headers
            .keys()
            .map(|name| {
                let values = headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect();
                (name.as_str().to_string(), values)
            })
            .collect();
        Self {
            inner,
            handle,
            pending_headers: Some(fields),
            headers_written: false,
            request_written: false,
            first_byte_seen: false,
        }
    }

    fn before_write(&mut self) {
        if let Some(fields) = self.pending_headers.take() {
            for (name, values) in fields {
                self.handle
                    .on_event(TraceEvent::WroteHeaderField { name, values });
            }
        }
    }

    fn after_write(&mut self, poll: &Poll<io::Result<usize>>) {
        match poll {
            Poll::Ready(Ok(_)) if !self.headers_written => {
                self.headers_written = true;
                self.handle.on_event(TraceEvent::WroteHeaders);
            }
            Poll::Ready(Err(e)) => self.wrote_request(Some(e.to_string())),
            _ => {}
        }
    }

    fn wrote_request(&mut self, error: Option<String>) {
        if !self.request_written {
            self.request_written = true;
            self.handle.on_event(TraceEvent::WroteRequest { error });
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TracedIo<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            if !this.first_byte_seen && buf.filled().len() > before {
                this.first_byte_seen = true;
                this.wrote_request(None);
                this.handle.on_event(TraceEvent::GotFirstResponseByte);
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedIo<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.before_write();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        this.after_write(&poll);
        poll
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.before_write();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        this.after_write(&poll);
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_flush(cx);
        match &poll {
            Poll::Ready(Ok(())) if this.headers_written => this.wrote_request(None),
            Poll::Ready(Err(e)) => this.wrote_request(Some(e.to_string())),
            _ => {}
        }
        poll
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
