use std::time::Duration;

/// Endpoints and credentials for the external services.
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// Base URL of the browser-automation service.
    pub automation_url: String,
    /// Base URL of the scoring service.
    pub scoring_url: String,
    /// Bearer token sent to the scoring service, if any.
    pub scoring_api_key: Option<String>,
    /// Per-request timeout for both services.
    pub http_timeout: Duration,
}

impl AutomationConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                        | Default                  |
    /// |--------------------------------|--------------------------|
    /// | `AUTOMATION_URL`               | `http://localhost:4000`  |
    /// | `SCORING_URL`                  | `http://localhost:4100`  |
    /// | `SCORING_API_KEY`              | unset                    |
    /// | `AUTOMATION_HTTP_TIMEOUT_SECS` | `60`                     |
    pub fn from_env() -> Self {
        let automation_url = std::env::var("AUTOMATION_URL")
            .unwrap_or_else(|_| "http://localhost:4000".into());
        let scoring_url =
            std::env::var("SCORING_URL").unwrap_or_else(|_| "http://localhost:4100".into());
        let scoring_api_key = std::env::var("SCORING_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        let http_timeout_secs: u64 = std::env::var("AUTOMATION_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .unwrap_or(60);

        Self {
            automation_url: trim_base(automation_url),
            scoring_url: trim_base(scoring_url),
            scoring_api_key,
            http_timeout: Duration::from_secs(http_timeout_secs),
        }
    }

    /// Build the shared HTTP client used by both services.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
