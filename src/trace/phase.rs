use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// A named stage of request execution.
///
/// Phases overlap in time: `Total` spans every other phase, and the others are
/// measured independently rather than as a partition of `Total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Dns,
    Connect,
    Tls,
    Send,
    Wait,
    Transfer,
    Total,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Dns,
        Phase::Connect,
        Phase::Tls,
        Phase::Send,
        Phase::Wait,
        Phase::Transfer,
        Phase::Total,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Phase::Dns => "DNS",
            Phase::Connect => "Connect",
            Phase::Tls => "TLS",
            Phase::Send => "Send",
            Phase::Wait => "Wait",
            Phase::Transfer => "Transfer",
            Phase::Total => "Total",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Start and end instants of a single phase.
///
/// `end` is never set without `start`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimer {
    start: Option<Instant>,
    end: Option<Instant>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<Instant> {
        self.start
    }

    pub fn end(&self) -> Option<Instant> {
        self.end
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.end.is_some()
    }

    /// Opens the phase. Returns `false` if it was already open; the first
    /// start is kept.
    pub fn open(&mut self, at: Instant) -> bool {
        if self.start.is_some() {
            return false;
        }
        self.start = Some(at);
        true
    }

    /// Closes the phase, replacing an earlier end. Returns `false` when the
    /// phase was never opened.
    pub fn close(&mut self, at: Instant) -> bool {
        match self.start {
            Some(start) => {
                self.end = Some(at.max(start));
                true
            }
            None => false,
        }
    }

    /// `None` means the phase was not measured.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end?.duration_since(self.start?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unopened_timer_is_not_measured() {
        let mut timer = PhaseTimer::new();
        assert!(!timer.close(Instant::now()));
        assert_eq!(timer.duration(), None);
        assert!(!timer.is_closed());
    }

    #[test]
    fn zero_length_phase_is_measured() {
        let now = Instant::now();
        let mut timer = PhaseTimer::new();
        timer.open(now);
        timer.close(now);
        assert_eq!(timer.duration(), Some(Duration::ZERO));
    }

    #[test]
    fn first_open_wins_and_last_close_wins() {
        let base = Instant::now();
        let mut timer = PhaseTimer::new();
        assert!(timer.open(base));
        assert!(!timer.open(base + Duration::from_millis(5)));
        timer.close(base + Duration::from_millis(10));
        timer.close(base + Duration::from_millis(25));
        assert_eq!(timer.start(), Some(base));
        assert_eq!(timer.duration(), Some(Duration::from_millis(25)));
    }

    #[test]
    fn phase_labels_follow_report_order() {
        let labels: Vec<_> = Phase::ALL.iter().map(|p| p.label()).collect();
        assert_eq!(
            labels,
            ["DNS", "Connect", "TLS", "Send", "Wait", "Transfer", "Total"]
        );
        assert_eq!(Phase::Total.index(), 6);
    }
}
