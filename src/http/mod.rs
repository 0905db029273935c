pub mod config;
pub mod handler;
pub mod resolver;
pub mod traced_body;
pub mod traced_io;

pub use config::ClientConfig;
pub use handler::TracingClient;
pub use traced_body::TracedBody;
