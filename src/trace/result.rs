use crate::trace::phase::Phase;
use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn serialize_millis<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_some(&as_millis_f64(*d)),
        None => s.serialize_none(),
    }
}

fn serialize_idle<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(as_millis_f64(*value))
}

/// Per-phase durations; `None` marks a phase that never started.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseDurations {
    #[serde(serialize_with = "serialize_millis")]
    pub dns: Option<Duration>,
    #[serde(serialize_with = "serialize_millis")]
    pub connect: Option<Duration>,
    #[serde(serialize_with = "serialize_millis")]
    pub tls: Option<Duration>,
    #[serde(serialize_with = "serialize_millis")]
    pub send: Option<Duration>,
    #[serde(serialize_with = "serialize_millis")]
    pub wait: Option<Duration>,
    #[serde(serialize_with = "serialize_millis")]
    pub transfer: Option<Duration>,
    #[serde(serialize_with = "serialize_millis")]
    pub total: Option<Duration>,
}

impl PhaseDurations {
    pub fn get(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Dns => self.dns,
            Phase::Connect => self.connect,
            Phase::Tls => self.tls,
            Phase::Send => self.send,
            Phase::Wait => self.wait,
            Phase::Transfer => self.transfer,
            Phase::Total => self.total,
        }
    }

    pub(crate) fn set(&mut self, phase: Phase, value: Option<Duration>) {
        let slot = match phase {
            Phase::Dns => &mut self.dns,
            Phase::Connect => &mut self.connect,
            Phase::Tls => &mut self.tls,
            Phase::Send => &mut self.send,
            Phase::Wait => &mut self.wait,
            Phase::Transfer => &mut self.transfer,
            Phase::Total => &mut self.total,
        };
        *slot = value;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnInfo {
    pub reused: bool,
    pub was_idle: bool,
    #[serde(serialize_with = "serialize_idle")]
    pub idle_time: Duration,
}

/// A failure reported through a phase's done event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseError {
    pub phase: Phase,
    pub message: String,
}

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.phase, self.message)
    }
}

/// Immutable snapshot of a finished trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceResult {
    pub started_at: DateTime<Local>,
    pub phases: PhaseDurations,
    pub conn: Option<ConnInfo>,
    pub resolved_addrs: Vec<SocketAddr>,
    pub remote_addr: Option<SocketAddr>,
    pub tls_server_name: Option<String>,
    pub errors: Vec<PhaseError>,
}

impl TraceResult {
    pub fn duration(&self, phase: Phase) -> Option<Duration> {
        self.phases.get(phase)
    }

    /// Milliseconds for `phase`, `0.0` when it was not measured.
    pub fn millis(&self, phase: Phase) -> f64 {
        self.duration(phase).map(as_millis_f64).unwrap_or(0.0)
    }

    pub fn breakdown(&self) -> Breakdown<'_> {
        Breakdown(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Two tab-separated lines: phase labels, then milliseconds.
impl fmt::Display for TraceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = Phase::ALL.iter().map(|p| p.label()).collect();
        writeln!(f, "{}", labels.join("\t"))?;
        let values: Vec<String> = Phase::ALL
            .iter()
            .map(|p| format!("{:.3}", self.millis(*p)))
            .collect();
        write!(f, "{}", values.join("\t"))
    }
}

pub struct Breakdown<'a>(&'a TraceResult);

impl fmt::Display for Breakdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        writeln!(f, "\nTime breakdown:")?;
        for phase in Phase::ALL {
            let label = format!("{}:", phase.label());
            match result.duration(phase) {
                Some(d) => writeln!(f, "  {:<10} {:>12.3} ms", label, as_millis_f64(d))?,
                None => writeln!(f, "  {:<10} {:>12}", label, "N/A")?,
            }
        }
        if let Some(conn) = result.conn {
            writeln!(
                f,
                "  Connection: reused={} idle={} idle_time={}ms",
                conn.reused,
                conn.was_idle,
                conn.idle_time.as_millis()
            )?;
        }
        if let Some(addr) = result.remote_addr {
            writeln!(f, "  Remote:     {}", addr)?;
        }
        for error in &result.errors {
            writeln!(f, "  Error:      {}", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TraceResult {
        let mut phases = PhaseDurations::default();
        phases.set(Phase::Dns, Some(Duration::from_micros(269_808)));
        phases.set(Phase::Connect, Some(Duration::from_micros(214_251)));
        phases.set(Phase::Send, Some(Duration::from_micros(5)));
        phases.set(Phase::Total, Some(Duration::from_micros(2_530_235)));
        TraceResult {
            started_at: Local::now(),
            phases,
            conn: None,
            resolved_addrs: Vec::new(),
            remote_addr: None,
            tls_server_name: None,
            errors: Vec::new(),
        }
    }

    #[test]
    fn table_renders_fractional_millis() {
        let text = sample().to_string();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("DNS\tConnect\tTLS\tSend\tWait\tTransfer\tTotal")
        );
        assert_eq!(
            lines.next(),
            Some("269.808\t214.251\t0.000\t0.005\t0.000\t0.000\t2530.235")
        );
    }

    #[test]
    fn breakdown_marks_unmeasured_phases() {
        let text = sample().breakdown().to_string();
        assert!(text.contains("TLS:"));
        assert!(text.lines().any(|l| l.contains("TLS:") && l.contains("N/A")));
        assert!(text.lines().any(|l| l.contains("DNS:") && l.contains("269.808")));
    }

    #[test]
    fn json_uses_null_for_unmeasured_phases() {
        let json: serde_json::Value =
            serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert!(json["phases"]["tls"].is_null());
        assert_eq!(json["phases"]["send"].as_f64(), Some(0.005));
    }
}
