use serde::{Deserialize, Serialize};

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 解析に使うモデル
    pub model: String,
    /// プロバイダ API のベースURL
    pub api_base_url: String,
    /// 1リクエストのタイムアウト（秒）
    pub request_timeout_secs: u64,
    /// 総試行回数（初回 + リトライ）
    pub max_attempts: u32,
    /// 初回リトライ前の待機（ms）。以降は倍々。
    pub initial_backoff_ms: u64,
    /// スナップショット書き込みのデバウンス幅（ms）
    pub snapshot_debounce_ms: u64,
    /// 変更が続いてもこの時間内には必ず書き込む（ms）
    pub snapshot_max_wait_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_secs: 60,
            max_attempts: 3,
            initial_backoff_ms: 2000,
            snapshot_debounce_ms: 1000,
            snapshot_max_wait_ms: 5000,
        }
    }
}
