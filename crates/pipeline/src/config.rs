use std::time::Duration;

use pinrelay_core::retry::RetryPolicy;

/// Tuning for the stage-tasks.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Items scoring at or above this value are approved.
    pub min_score: f64,
    /// Upper bound on scoring one item, retries included.
    pub score_timeout: Duration,
    /// Maximum concurrent scoring calls per stage run.
    pub scoring_concurrency: usize,
    pub scorer_retry: RetryPolicy,
    pub automation_retry: RetryPolicy,
    pub publish_timeout: Duration,
    /// Base URL relative item links are joined to.
    pub item_base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            score_timeout: Duration::from_secs(30),
            scoring_concurrency: 4,
            scorer_retry: RetryPolicy {
                max_attempts: 3,
                ..RetryPolicy::default()
            },
            automation_retry: RetryPolicy::fixed(2, Duration::from_millis(1000)),
            publish_timeout: Duration::from_millis(2000),
            item_base_url: "https://www.pinterest.com".into(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                     | Default                     |
    /// |-----------------------------|-----------------------------|
    /// | `MIN_SCORE`                 | `0.5`                       |
    /// | `SCORE_TIMEOUT_SECS`        | `30`                        |
    /// | `SCORING_CONCURRENCY`       | `4`                         |
    /// | `SCORER_MAX_ATTEMPTS`       | `3`                         |
    /// | `AUTOMATION_MAX_ATTEMPTS`   | `2`                         |
    /// | `AUTOMATION_RETRY_DELAY_MS` | `1000`                      |
    /// | `PUBLISH_TIMEOUT_MS`        | `2000`                      |
    /// | `ITEM_BASE_URL`             | `https://www.pinterest.com` |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let min_score = parse_min_score(std::env::var("MIN_SCORE").ok().as_deref(), defaults.min_score);
        let score_timeout = Duration::from_secs(env_parse("SCORE_TIMEOUT_SECS", 30));
        let scoring_concurrency = env_parse("SCORING_CONCURRENCY", 4usize).max(1);
        let scorer_attempts = env_parse("SCORER_MAX_ATTEMPTS", 3u32);
        let automation_attempts = env_parse("AUTOMATION_MAX_ATTEMPTS", 2u32);
        let automation_delay = Duration::from_millis(env_parse("AUTOMATION_RETRY_DELAY_MS", 1000));
        let publish_timeout = Duration::from_millis(env_parse("PUBLISH_TIMEOUT_MS", 2000));
        let item_base_url = std::env::var("ITEM_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.item_base_url);

        Self {
            min_score,
            score_timeout,
            scoring_concurrency,
            scorer_retry: RetryPolicy {
                max_attempts: scorer_attempts,
                ..defaults.scorer_retry
            },
            automation_retry: RetryPolicy::fixed(automation_attempts, automation_delay),
            publish_timeout,
            item_base_url,
        }
    }
}

/// Approval threshold from `raw`, clamped into `[0, 1]`. Unparsable and
/// non-finite values fall back to `default`.
fn parse_min_score(raw: Option<&str>, default: f64) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
