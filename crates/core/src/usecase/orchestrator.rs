use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::error::AnalysisError;
use crate::domain::settings::AppSettings;
use crate::infra::metrics::Metrics;

/// リトライ方針（総試行回数と初回バックオフ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }

    /// `attempt` 回目の失敗後、次の試行までの待機（initial * 2^(attempt-1)）
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exp)
    }
}

/// プロバイダ呼び出しをリトライ付きで1件ずつ実行する
pub struct RequestOrchestrator {
    policy: RetryPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl RequestOrchestrator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// `operation` を実行し、レート制限・過負荷のみバックオフ後に再試行する。
    /// それ以外は即座に返す。試行を使い切った場合は最後のエラー。
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, AnalysisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let wait = self.policy.backoff_for(attempt);
                    log::warn!(
                        "{label}: 一時的な失敗 (attempt {attempt}/{max_attempts}), {}ms 後に再試行: {e}",
                        wait.as_millis()
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_retries();
                    }
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("{label}: 失敗 (attempt {attempt}/{max_attempts}): {e}");
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RequestOrchestrator {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
