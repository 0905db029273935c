use crate::http::ClientConfig;
use crate::response::ReportFormat;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// The request url,like https://www.google.com
    pub url: String,
    ///  Specify request method to use
    #[arg(short = 'X', long = "request", value_name = "method")]
    pub method_option: Option<String>,
    /// HTTP POST data.
    #[arg(short = 'd', long = "data", value_name = "data")]
    pub body_option: Option<String>,
    /// The http headers.
    #[arg(short = 'H', long = "header", value_name = "name: value")]
    pub headers: Vec<String>,
    ///  Send User-Agent <name> to server
    #[arg(short = 'A', long = "user-agent", value_name = "name")]
    pub user_agent_option: Option<String>,
    /// CA certificate bundle (PEM) to verify the server against.
    #[arg(long = "cacert", value_name = "file")]
    pub certificate_path_option: Option<PathBuf>,
    /// Allow insecure server connections
    #[arg(short = 'k', long = "insecure")]
    pub skip_certificate_validate: bool,
    ///  Write the response body to file instead of discarding it.
    #[arg(short = 'o', long = "output", value_name = "file")]
    pub file_path_option: Option<PathBuf>,
    /// How to print the timing report.
    #[arg(long = "format", value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
    /// Maximum time allowed until the response head arrives.
    #[arg(short = 'm', long = "max-time", value_name = "seconds", default_value_t = 30.0)]
    pub max_time: f64,
    ///  Make the operation more talkative
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbosity: u8,
}

impl Cli {
    pub fn client_config(&self) -> Result<ClientConfig, anyhow::Error> {
        ensure!(
            self.max_time > 0.0,
            "--max-time must be positive, got {}",
            self.max_time
        );
        let timeout = Duration::try_from_secs_f64(self.max_time)
            .map_err(|e| anyhow!("invalid --max-time {}: {}", self.max_time, e))?;
        Ok(ClientConfig {
            timeout,
            insecure: self.skip_certificate_validate,
            ca_path: self.certificate_path_option.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_to_client_config() {
        let cli = Cli::try_parse_from(["httptrace", "https://example.com"]).unwrap();
        assert_eq!(cli.format, ReportFormat::Table);
        assert_eq!(cli.verbosity, 0);
        let config = cli.client_config().unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.insecure);
        assert!(config.ca_path.is_none());
    }

    #[test]
    fn flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "httptrace",
            "-vv",
            "-k",
            "-X",
            "PUT",
            "-H",
            "x-a: 1",
            "-H",
            "x-b: 2",
            "--format",
            "json",
            "-m",
            "2.5",
            "http://localhost/",
        ])
        .unwrap();
        assert_eq!(cli.verbosity, 2);
        assert_eq!(cli.method_option.as_deref(), Some("PUT"));
        assert_eq!(cli.headers.len(), 2);
        assert_eq!(cli.format, ReportFormat::Json);
        let config = cli.client_config().unwrap();
        assert!(config.insecure);
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn non_positive_max_time_is_rejected() {
        let cli = Cli::try_parse_from(["httptrace", "-m", "0", "http://localhost/"]).unwrap();
        assert!(cli.client_config().is_err());
    }
}
