use crate::cli::app_config::Cli;
use crate::http::TracingClient;
use crate::response::body::{download_file_with_progress, drain};
use crate::response::render;
use crate::trace::{Phase, RequestTracer, TraceResult};
use bytes::Bytes;
use clap::Parser;
use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use http_body_util::Full;
use hyper::Request;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

pub async fn main_with_error() -> Result<TraceResult, anyhow::Error> {
    let cli: Cli = Cli::parse();
    init_logging(cli.verbosity)?;

    do_request(cli).await
}

fn init_logging(verbosity: u8) -> Result<(), anyhow::Error> {
    let log_level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy()
        .add_directive("hyper=off".parse()?)
        .add_directive("hyper_util=off".parse()?)
        .add_directive("rustls=warn".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}

/// Runs one traced request, drains the body and prints the report.
pub async fn do_request(cli: Cli) -> Result<TraceResult, anyhow::Error> {
    let request = build_request(&cli)?;
    let tracer = RequestTracer::new();
    let traced = tracer.bind(request)?;
    let client = TracingClient::new(cli.client_config()?)?;

    let res = match client.execute(traced).await {
        Ok(res) => res,
        Err(e) => {
            log_partial_timings(&tracer);
            return Err(e);
        }
    };

    let (parts, body) = res.into_parts();
    info!("{:?} {}", parts.version, parts.status);
    let content_length = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let read = match cli.file_path_option.as_ref() {
        Some(file_path) => download_file_with_progress(file_path, content_length, body).await,
        None => drain(body).await,
    };
    let read = match read {
        Ok(read) => read,
        Err(e) => {
            log_partial_timings(&tracer);
            return Err(e);
        }
    };
    debug!("Read {} bytes of response body", read);

    let result = tracer.result()?;
    println!("{}", render(&result, cli.format)?);
    Ok(result)
}

fn log_partial_timings(tracer: &RequestTracer) {
    for phase in Phase::ALL {
        if let Some(d) = tracer.timer(phase).duration() {
            info!("{} took {:.3} ms before the failure", phase, d.as_secs_f64() * 1000.0);
        }
    }
    for error in tracer.errors() {
        info!("{}", error);
    }
}

fn build_request(cli: &Cli) -> Result<Request<Full<Bytes>>, anyhow::Error> {
    let mut method = String::from("GET");
    let mut request_builder = Request::builder().uri(cli.url.as_str());

    if cli.body_option.is_some() {
        method = String::from("POST");
        request_builder = request_builder.header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
    }
    if let Some(method_userdefined) = cli.method_option.as_ref() {
        method = method_userdefined.clone();
    }

    request_builder = request_builder
        .method(method.as_str())
        .header(ACCEPT, HeaderValue::from_static("*/*"));
    let user_agent = cli
        .user_agent_option
        .as_deref()
        .unwrap_or(concat!("httptrace/", env!("CARGO_PKG_VERSION")));
    request_builder = request_builder.header(USER_AGENT, HeaderValue::from_str(user_agent)?);

    for x in cli.headers.iter() {
        let split: Vec<&str> = x.splitn(2, ':').collect();
        ensure!(split.len() == 2, "header error: '{}'", x);
        request_builder = request_builder.header(
            HeaderName::from_str(split[0].trim())?,
            HeaderValue::from_str(split[1].trim_start())?,
        );
    }

    let body = cli
        .body_option
        .clone()
        .map_or(Full::new(Bytes::new()), |v| Full::new(Bytes::from(v)));
    let request = request_builder.body(body)?;

    debug!(
        "> {} {} {:?}",
        request.method(),
        request.uri(),
        request.version()
    );
    for (key, value) in request.headers().iter() {
        debug!("> {}: {}", key, value.to_str()?);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["httptrace"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn data_switches_to_form_post() {
        let request = build_request(&cli(&["-d", "a=1", "http://example.com/"])).unwrap();
        assert_eq!(request.method(), http::Method::POST);
        assert_eq!(
            request.headers()[CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn explicit_method_and_headers_win() {
        let request = build_request(&cli(&[
            "-X",
            "DELETE",
            "-H",
            "X-Trace: on",
            "-A",
            "probe/1",
            "http://example.com/item/1",
        ]))
        .unwrap();
        assert_eq!(request.method(), http::Method::DELETE);
        assert_eq!(request.headers()["x-trace"], "on");
        assert_eq!(request.headers()[USER_AGENT], "probe/1");
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(build_request(&cli(&["-H", "no-colon", "http://example.com/"])).is_err());
    }

    #[test]
    fn malformed_method_is_rejected() {
        assert!(build_request(&cli(&["-X", "BAD METHOD", "http://example.com/"])).is_err());
    }
}
