use crate::trace::{TraceEvent, TraceHandle, TraceHandler};
use bytes::Bytes;
use hyper::body::{Body, Frame, Incoming, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Response body that fires the terminal `PutIdleConn` event when it is
/// dropped after being read to the end.
///
/// Dropping it early, or after a read error, leaves the trace incomplete.
#[derive(Debug)]
pub struct TracedBody {
    inner: Incoming,
    handle: TraceHandle,
    drained: bool,
    failed: bool,
}

impl TracedBody {
    pub fn new(inner: Incoming, handle: TraceHandle) -> Self {
        Self {
            inner,
            handle,
            drained: false,
            failed: false,
        }
    }
}

impl Body for TracedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        match &poll {
            Poll::Ready(None) => this.drained = true,
            Poll::Ready(Some(Err(e))) => {
                this.failed = true;
                debug!("Response body failed: {}", e);
            }
            _ => {}
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TracedBody {
    fn drop(&mut self) {
        if self.failed {
            debug!("Response body failed, connection not returned");
        } else if self.drained || self.inner.is_end_stream() {
            self.handle.on_event(TraceEvent::PutIdleConn { error: None });
        } else {
            debug!("Response body released before end of stream, trace left incomplete");
        }
    }
}
