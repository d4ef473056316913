//! Advisory HTTP reachability probe

use std::time::Duration;

use tracing::debug;

use crate::error::{StewardError, StewardResult};

/// Checks that the application answers over HTTP
pub trait HealthProbe {
    fn check(&self, url: &str) -> StewardResult<()>;
}

/// Blocking HTTP GET; any non-5xx response counts as reachable
#[derive(Debug, Clone)]
pub struct HttpProbe {
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl HealthProbe for HttpProbe {
    fn check(&self, url: &str) -> StewardResult<()> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| StewardError::Config(format!("HTTP client: {}", e)))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| StewardError::Io(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        debug!(url, %status, "probe answered");
        if status.is_server_error() {
            return Err(StewardError::Io(format!("GET {} returned {}", url, status)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_target_is_error() {
        let probe = HttpProbe::new(Duration::from_millis(500));
        // Port 9 on loopback (discard) is essentially never listening
        assert!(probe.check("http://127.0.0.1:9/").is_err());
    }
}
