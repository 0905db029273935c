use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`TracingClient`](crate::http::handler::TracingClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound from `GetConn` to the response head.
    pub timeout: Duration,
    /// Accept any server certificate.
    pub insecure: bool,
    /// PEM bundle replacing the built-in webpki roots.
    pub ca_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            insecure: false,
            ca_path: None,
        }
    }
}
