use crate::http::config::ClientConfig;
use crate::http::resolver::resolve;
use crate::http::traced_body::TracedBody;
use crate::http::traced_io::TracedIo;
use crate::tls::build_tls_config;
use crate::trace::{TraceEvent, TraceHandle, TraceHandler, TracedRequest};
use anyhow::Context;
use http::header::{HeaderValue, HOST};
use hyper::body::Body;
use hyper::client::conn::http1;
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::Instrument;

/// Executes one traced request over a fresh connection.
///
/// Resolution, connect, TLS and HTTP/1.1 framing are delegated to tokio,
/// tokio-rustls and hyper; this type only sequences them and reports each
/// step to the request's tracer. Connections are never pooled.
pub struct TracingClient {
    config: ClientConfig,
    tls_config: Arc<rustls::ClientConfig>,
}

impl TracingClient {
    pub fn new(config: ClientConfig) -> Result<Self, anyhow::Error> {
        let tls_config = build_tls_config(config.ca_path.as_deref(), config.insecure)?;
        Ok(Self { config, tls_config })
    }

    pub async fn execute<B>(
        &self,
        traced: TracedRequest<B>,
    ) -> Result<Response<TracedBody>, anyhow::Error>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let uri = traced.request().uri().clone();
        let (mut request, handle) = traced.into_parts();
        let https = uri.scheme_str() == Some("https");
        let host = uri
            .host()
            .ok_or(anyhow!("no host in {}", uri))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        to_origin_form(&mut request, &uri)?;

        let fut = async {
            handle.on_event(TraceEvent::GetConn {
                host_port: format!("{}:{}", host, port),
            });
            let addrs = resolve(&host, port, &handle).await?;
            let stream = connect(&addrs, &handle).await?;
            let local_addr = stream.local_addr()?;
            let remote_addr = stream.peer_addr()?;

            if https {
                let tls_stream = self.tls_handshake(&host, stream, &handle).await?;
                got_conn(&handle);
                send_on(tls_stream, request, handle.clone(), local_addr, remote_addr).await
            } else {
                got_conn(&handle);
                send_on(stream, request, handle.clone(), local_addr, remote_addr).await
            }
        };

        let res = timeout(self.config.timeout, fut)
            .await
            .with_context(|| {
                format!(
                    "Request timed out after {} seconds",
                    self.config.timeout.as_secs_f64()
                )
            })?
            .context("Failed to execute request")?;

        debug!("< {:?} {}", res.version(), res.status());
        for (key, value) in res.headers().iter() {
            debug!("< {}: {}", key, value.to_str().unwrap_or("<binary>"));
        }
        Ok(res)
    }

    async fn tls_handshake(
        &self,
        host: &str,
        stream: TcpStream,
        handle: &TraceHandle,
    ) -> Result<TlsStream<TcpStream>, anyhow::Error> {
        let domain = pki_types::ServerName::try_from(host)
            .map_err(|e| anyhow!("{}", e))?
            .to_owned();

        handle.on_event(TraceEvent::TlsHandshakeStart);
        let connector = TlsConnector::from(self.tls_config.clone());
        match connector.connect(domain, stream).await {
            Ok(tls_stream) => {
                let (_, session) = tls_stream.get_ref();
                debug!(
                    "TLS established: version={:?} cipher={:?}",
                    session.protocol_version(),
                    session.negotiated_cipher_suite().map(|s| s.suite())
                );
                handle.on_event(TraceEvent::TlsHandshakeDone {
                    server_name: Some(host.to_string()),
                    error: None,
                });
                Ok(tls_stream)
            }
            Err(e) => {
                handle.on_event(TraceEvent::TlsHandshakeDone {
                    server_name: None,
                    error: Some(e.to_string()),
                });
                Err(anyhow::Error::new(e).context(format!("TLS handshake with {} failed", host)))
            }
        }
    }
}

async fn connect(addrs: &[SocketAddr], handle: &TraceHandle) -> Result<TcpStream, anyhow::Error> {
    let mut last_error = None;
    for addr in addrs {
        handle.on_event(TraceEvent::ConnectStart {
            network: "tcp".to_string(),
            addr: *addr,
        });
        match TcpStream::connect(*addr).await {
            Ok(stream) => {
                handle.on_event(TraceEvent::ConnectDone {
                    network: "tcp".to_string(),
                    addr: *addr,
                    error: None,
                });
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                handle.on_event(TraceEvent::ConnectDone {
                    network: "tcp".to_string(),
                    addr: *addr,
                    error: Some(e.to_string()),
                });
                last_error = Some((*addr, e));
            }
        }
    }
    match last_error {
        Some((addr, e)) => {
            Err(anyhow::Error::new(e).context(format!("Failed to connect to {}", addr)))
        }
        None => Err(anyhow!("No addresses to connect to")),
    }
}

fn got_conn(handle: &TraceHandle) {
    handle.on_event(TraceEvent::GotConn {
        reused: false,
        was_idle: false,
        idle_time: Duration::ZERO,
    });
}

async fn send_on<S, B>(
    stream: S,
    request: Request<B>,
    handle: TraceHandle,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
) -> Result<Response<TracedBody>, anyhow::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let io = TokioIo::new(TracedIo::new(stream, handle.clone(), request.headers()));
    let (mut sender, conn) = http1::handshake(io)
        .instrument(info_span!("Http Handshake"))
        .await?;
    tokio::task::spawn(
        async move {
            if let Err(err) = conn.await {
                debug!("Connection failed: {:?}", err);
            }
        }
        .instrument(info_span!(
            "httptrace",
            localAddr = %local_addr,
            remoteAddr = %remote_addr,
        )),
    );

    trace!("Start request");
    let response = sender.send_request(request).await?;
    Ok(response.map(|body| TracedBody::new(body, handle)))
}

/// Rewrites an absolute request URI to origin-form, moving the authority into
/// a `Host` header unless the caller already set one.
fn to_origin_form<B>(request: &mut Request<B>, uri: &Uri) -> Result<(), anyhow::Error> {
    if !request.headers().contains_key(HOST) {
        let host = uri.host().ok_or(anyhow!("no host in {}", uri))?;
        let value = match uri.port_u16() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        request.headers_mut().insert(HOST, HeaderValue::from_str(&value)?);
    }
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    *request.uri_mut() = path.parse()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_form_moves_authority_into_host() {
        let uri: Uri = "http://user:pw@example.com:8080/a/b?c=d".parse().unwrap();
        let mut request = Request::builder().uri(uri.clone()).body(()).unwrap();
        to_origin_form(&mut request, &uri).unwrap();
        assert_eq!(request.uri(), "/a/b?c=d");
        assert_eq!(request.headers()[HOST], "example.com:8080");
    }

    #[test]
    fn origin_form_keeps_explicit_host() {
        let uri: Uri = "https://example.com".parse().unwrap();
        let mut request = Request::builder()
            .uri(uri.clone())
            .header(HOST, "virtual.test")
            .body(())
            .unwrap();
        to_origin_form(&mut request, &uri).unwrap();
        assert_eq!(request.uri(), "/");
        assert_eq!(request.headers()[HOST], "virtual.test");
    }

    #[tokio::test]
    async fn refused_connection_is_timed_and_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let tracer = crate::trace::RequestTracer::new();
        let err = connect(&[addr], &tracer.handle()).await.unwrap_err();
        assert!(err.to_string().contains(&addr.to_string()));
        assert!(tracer
            .timer(crate::trace::Phase::Connect)
            .duration()
            .is_some());
        assert_eq!(tracer.errors()[0].phase, crate::trace::Phase::Connect);
    }
}
