use crate::trace::TraceResult;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Tab-separated header and values, in milliseconds.
    Table,
    /// One line per phase, N/A for phases that never ran.
    Breakdown,
    /// The full trace as JSON.
    Json,
}

pub fn render(result: &TraceResult, format: ReportFormat) -> Result<String, anyhow::Error> {
    let text = match format {
        ReportFormat::Table => format!("Statistics in ms\n{}", result),
        ReportFormat::Breakdown => result.breakdown().to_string(),
        ReportFormat::Json => result.to_json()?,
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{ManualClock, RequestTracer, TraceEvent, TraceHandler};
    use std::sync::Arc;
    use std::time::Duration;

    fn finished() -> TraceResult {
        let clock = Arc::new(ManualClock::new());
        let tracer = RequestTracer::with_clock(clock.clone());
        tracer.on_event(TraceEvent::GetConn {
            host_port: "127.0.0.1:80".into(),
        });
        tracer.on_event(TraceEvent::GotFirstResponseByte);
        clock.advance(Duration::from_millis(3));
        tracer.on_event(TraceEvent::PutIdleConn { error: None });
        tracer.result().unwrap()
    }

    #[test]
    fn table_has_title_and_two_rows() {
        let text = render(&finished(), ReportFormat::Table).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Statistics in ms");
        assert!(lines[1].starts_with("DNS\t"));
        assert!(lines[2].ends_with("\t3.000"));
    }

    #[test]
    fn json_is_parseable() {
        let text = render(&finished(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["phases"]["total"].as_f64(), Some(3.0));
        assert!(value["phases"]["dns"].is_null());
    }
}
