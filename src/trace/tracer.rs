use crate::trace::clock::{Clock, SystemClock};
use crate::trace::error::TraceError;
use crate::trace::event::{TraceEvent, TraceHandler};
use crate::trace::phase::{Phase, PhaseTimer};
use crate::trace::result::{ConnInfo, PhaseDurations, PhaseError, TraceResult};
use chrono::{DateTime, Local};
use http::Request;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

#[derive(Debug, Default)]
struct TraceState {
    timers: [PhaseTimer; 7],
    conn: Option<ConnInfo>,
    resolved_addrs: Vec<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    tls_server_name: Option<String>,
    errors: Vec<PhaseError>,
    started_at: Option<DateTime<Local>>,
    complete: bool,
}

impl TraceState {
    fn open(&mut self, phase: Phase, at: std::time::Instant) {
        if !self.timers[phase.index()].open(at) {
            trace!(phase = %phase, "phase already open, keeping first start");
        }
    }

    fn close(&mut self, phase: Phase, at: std::time::Instant) {
        if !self.timers[phase.index()].close(at) {
            trace!(phase = %phase, "done event for a phase that never started");
        }
    }

    fn record_error(&mut self, phase: Phase, error: Option<String>) -> bool {
        match error {
            Some(message) => {
                debug!(phase = %phase, "[TRACE] - {} failed: {}", phase, message);
                self.errors.push(PhaseError { phase, message });
                true
            }
            None => false,
        }
    }
}

struct Shared {
    clock: Arc<dyn Clock>,
    created_at: DateTime<Local>,
    bound: AtomicBool,
    state: Mutex<TraceState>,
    snapshot: OnceLock<TraceResult>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, event: TraceEvent) {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.complete {
            trace!(event = event.name(), "ignoring event after the terminal event");
            return;
        }
        let terminal = event.is_terminal();
        match event {
            TraceEvent::GetConn { host_port } => {
                state.open(Phase::Total, now);
                state.started_at.get_or_insert_with(Local::now);
                debug!("[TRACE] - starting to create conn to {:?}", host_port);
            }
            TraceEvent::DnsStart { host } => {
                state.open(Phase::Dns, now);
                debug!("[TRACE] - querying {:?} to DNS", host);
            }
            TraceEvent::DnsDone { addrs, error } => {
                state.close(Phase::Dns, now);
                if !state.record_error(Phase::Dns, error) {
                    debug!("[TRACE] - ip addresses:");
                    for addr in &addrs {
                        debug!("[TRACE] - - {}", addr.ip());
                    }
                    state.resolved_addrs = addrs;
                }
            }
            TraceEvent::ConnectStart { network, addr } => {
                state.open(Phase::Connect, now);
                debug!("[TRACE] - starting {} connection to {}", network, addr);
            }
            TraceEvent::ConnectDone {
                network,
                addr,
                error,
            } => {
                state.close(Phase::Connect, now);
                if !state.record_error(Phase::Connect, error) {
                    state.remote_addr = Some(addr);
                    debug!("[TRACE] - {} connection created to {}", network, addr);
                }
            }
            TraceEvent::TlsHandshakeStart => {
                state.open(Phase::Tls, now);
                debug!("[TRACE] - starting tls negotiation");
            }
            TraceEvent::TlsHandshakeDone { server_name, error } => {
                state.close(Phase::Tls, now);
                if !state.record_error(Phase::Tls, error) {
                    debug!("[TRACE] - tls negotiated to {:?}", server_name);
                    state.tls_server_name = server_name;
                }
            }
            TraceEvent::GotConn {
                reused,
                was_idle,
                idle_time,
            } => {
                debug!(
                    "[TRACE] - connection established. reused: {} idle: {} idle time: {}ms",
                    reused,
                    was_idle,
                    idle_time.as_millis()
                );
                state.conn = Some(ConnInfo {
                    reused,
                    was_idle,
                    idle_time,
                });
            }
            TraceEvent::WroteHeaderField { name, values } => {
                state.open(Phase::Send, now);
                trace!("[TRACE] - sending header {:?} and value {:?}", name, values);
            }
            TraceEvent::WroteHeaders => {
                state.close(Phase::Send, now);
                debug!("[TRACE] - headers written");
            }
            TraceEvent::WroteRequest { error } => {
                state.open(Phase::Wait, now);
                if !state.record_error(Phase::Send, error) {
                    debug!("[TRACE] - starting to wait for server response");
                }
            }
            TraceEvent::GotFirstResponseByte => {
                state.close(Phase::Wait, now);
                state.open(Phase::Transfer, now);
                debug!("[TRACE] - got first response byte");
            }
            TraceEvent::PutIdleConn { error } => {
                state.close(Phase::Transfer, now);
                state.close(Phase::Total, now);
                if !state.record_error(Phase::Transfer, error) {
                    debug!("[TRACE] - put conn idle");
                }
            }
        }
        state.complete = terminal;
    }
}

/// Times the phases of exactly one HTTP request.
///
/// Events are first-start-wins and last-end-wins per phase: a repeated start
/// keeps the original start instant, a repeated done moves the end forward,
/// so a phase spans every attempt the client made for it. Events after
/// `PutIdleConn` are ignored.
pub struct RequestTracer {
    shared: Arc<Shared>,
}

impl RequestTracer {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                created_at: Local::now(),
                bound: AtomicBool::new(false),
                state: Mutex::new(TraceState::default()),
                snapshot: OnceLock::new(),
            }),
        }
    }

    /// Pairs `request` with this tracer. The request is passed through
    /// untouched; it is only checked for being executable.
    pub fn bind<B>(&self, request: Request<B>) -> Result<TracedRequest<B>, TraceError> {
        validate(&request)?;
        if self.shared.bound.swap(true, Ordering::SeqCst) {
            return Err(TraceError::AlreadyBound);
        }
        Ok(TracedRequest {
            request,
            handle: self.handle(),
        })
    }

    pub fn handle(&self) -> TraceHandle {
        TraceHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.shared.lock().complete
    }

    /// Current state of one phase, usable on error paths where `result()`
    /// is not available.
    pub fn timer(&self, phase: Phase) -> PhaseTimer {
        self.shared.lock().timers[phase.index()]
    }

    pub fn errors(&self) -> Vec<PhaseError> {
        self.shared.lock().errors.clone()
    }

    /// The finished trace. Fails until the terminal event has fired; the
    /// first successful call freezes the snapshot.
    pub fn result(&self) -> Result<TraceResult, TraceError> {
        if let Some(snapshot) = self.shared.snapshot.get() {
            return Ok(snapshot.clone());
        }
        let state = self.shared.lock();
        if !state.complete {
            return Err(TraceError::Incomplete);
        }
        let mut phases = PhaseDurations::default();
        for phase in Phase::ALL {
            phases.set(phase, state.timers[phase.index()].duration());
        }
        let result = TraceResult {
            started_at: state.started_at.unwrap_or(self.shared.created_at),
            phases,
            conn: state.conn,
            resolved_addrs: state.resolved_addrs.clone(),
            remote_addr: state.remote_addr,
            tls_server_name: state.tls_server_name.clone(),
            errors: state.errors.clone(),
        };
        drop(state);
        Ok(self.shared.snapshot.get_or_init(|| result).clone())
    }
}

impl Default for RequestTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceHandler for RequestTracer {
    fn on_event(&self, event: TraceEvent) {
        self.shared.handle(event);
    }
}

/// Cheap cloneable handle the driver uses to deliver events.
#[derive(Clone)]
pub struct TraceHandle {
    shared: Arc<Shared>,
}

impl TraceHandler for TraceHandle {
    fn on_event(&self, event: TraceEvent) {
        self.shared.handle(event);
    }
}

impl std::fmt::Debug for TraceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHandle")
            .field("created_at", &self.shared.created_at)
            .finish()
    }
}

/// A request together with the tracer that times it.
#[derive(Debug)]
pub struct TracedRequest<B> {
    request: Request<B>,
    handle: TraceHandle,
}

impl<B> TracedRequest<B> {
    pub fn request(&self) -> &Request<B> {
        &self.request
    }

    pub fn into_parts(self) -> (Request<B>, TraceHandle) {
        (self.request, self.handle)
    }
}

fn validate<B>(request: &Request<B>) -> Result<(), TraceError> {
    let uri = request.uri();
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => {
            return Err(TraceError::RequestConstruction(format!(
                "unsupported scheme {:?} in {}",
                other, uri
            )))
        }
        None => {
            return Err(TraceError::RequestConstruction(format!(
                "missing scheme in {}",
                uri
            )))
        }
    }
    match uri.host() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(TraceError::RequestConstruction(format!(
            "missing host in {}",
            uri
        ))),
    }
}
