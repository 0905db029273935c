use crate::trace::{TraceEvent, TraceHandle, TraceHandler};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// Resolves `host` with the system resolver, reporting the lookup to `handle`.
///
/// IP literals are returned as-is and produce no DNS events.
pub async fn resolve(
    host: &str,
    port: u16,
    handle: &TraceHandle,
) -> Result<Vec<SocketAddr>, anyhow::Error> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        trace!("{} is an IP literal, skipping DNS", host);
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    handle.on_event(TraceEvent::DnsStart {
        host: host.to_string(),
    });
    debug!("Resolving DNS for: {}", host);

    let owned = host.to_string();
    let lookup = tokio::task::spawn_blocking(move || {
        (owned, port)
            .to_socket_addrs()
            .map(|addrs| addrs.collect::<Vec<_>>())
    })
    .await;

    let result = match lookup {
        Ok(Ok(addrs)) if addrs.is_empty() => {
            Err(anyhow!("No IP addresses found for host {}", host))
        }
        Ok(Ok(addrs)) => Ok(addrs),
        Ok(Err(e)) => {
            Err(anyhow::Error::new(e).context(format!("DNS lookup for {} failed", host)))
        }
        Err(e) => Err(anyhow::Error::new(e).context("DNS lookup task failed")),
    };

    match &result {
        Ok(addrs) => {
            info!("Resolved DNS for {}: {:?}", host, addrs);
            handle.on_event(TraceEvent::DnsDone {
                addrs: addrs.clone(),
                error: None,
            });
        }
        Err(e) => {
            error!("DNS resolution for {} failed: {:#}", host, e);
            handle.on_event(TraceEvent::DnsDone {
                addrs: Vec::new(),
                error: Some(format!("{:#}", e)),
            });
        }
    }
    result
}
