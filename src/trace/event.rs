use std::net::SocketAddr;
use std::time::Duration;

/// Lifecycle events delivered by the HTTP driver while it executes one request.
///
/// Errors travel as rendered messages: the driver keeps ownership of the
/// original error and propagates it to the caller itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    GetConn {
        host_port: String,
    },
    DnsStart {
        host: String,
    },
    DnsDone {
        addrs: Vec<SocketAddr>,
        error: Option<String>,
    },
    ConnectStart {
        network: String,
        addr: SocketAddr,
    },
    ConnectDone {
        network: String,
        addr: SocketAddr,
        error: Option<String>,
    },
    TlsHandshakeStart,
    TlsHandshakeDone {
        server_name: Option<String>,
        error: Option<String>,
    },
    GotConn {
        reused: bool,
        was_idle: bool,
        idle_time: Duration,
    },
    WroteHeaderField {
        name: String,
        values: Vec<String>,
    },
    WroteHeaders,
    WroteRequest {
        error: Option<String>,
    },
    GotFirstResponseByte,
    /// Terminal event: the response body was drained and the connection released.
    PutIdleConn {
        error: Option<String>,
    },
}

impl TraceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TraceEvent::GetConn { .. } => "GetConn",
            TraceEvent::DnsStart { .. } => "DNSStart",
            TraceEvent::DnsDone { .. } => "DNSDone",
            TraceEvent::ConnectStart { .. } => "ConnectStart",
            TraceEvent::ConnectDone { .. } => "ConnectDone",
            TraceEvent::TlsHandshakeStart => "TLSHandshakeStart",
            TraceEvent::TlsHandshakeDone { .. } => "TLSHandshakeDone",
            TraceEvent::GotConn { .. } => "GotConn",
            TraceEvent::WroteHeaderField { .. } => "WroteHeaderField",
            TraceEvent::WroteHeaders => "WroteHeaders",
            TraceEvent::WroteRequest { .. } => "WroteRequest",
            TraceEvent::GotFirstResponseByte => "GotFirstResponseByte",
            TraceEvent::PutIdleConn { .. } => "PutIdleConn",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TraceEvent::PutIdleConn { .. })
    }
}

/// Receiver of lifecycle events.
///
/// Called from whichever task drives the connection, so implementations must
/// not block.
pub trait TraceHandler: Send + Sync {
    fn on_event(&self, event: TraceEvent);
}
