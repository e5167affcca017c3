mod app_state;
mod credentials;
mod memory;
mod sqlite;

pub use app_state::AppStateStore;
pub use credentials::{CredentialStore, API_KEY_ENV};
pub use memory::MemoryStore;
pub use sqlite::{default_db_path, SqliteStore};

use crate::domain::error::AppError;
use crate::domain::settings::AppSettings;

/// 永続化キー
pub mod keys {
    pub const HISTORY: &str = "grammarguard_history";
    pub const APP_STATE: &str = "grammarguard_app_state";
    pub const API_KEY: &str = "grammarguard_api_key";
    pub const VERSION: &str = "grammarguard_version";
    pub const SETTINGS: &str = "grammarguard_settings";
}

/// スナップショット形式のバージョン。不一致ならスナップショットを破棄する。
pub const SCHEMA_VERSION: &str = "1.0.3";

/// 文字列キー・文字列値のストレージポート
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// 設定を読み込む。未保存・破損時はデフォルト。
pub fn load_settings(store: &dyn KeyValueStore) -> Result<AppSettings, AppError> {
    let Some(raw) = store.get(keys::SETTINGS)? else {
        return Ok(AppSettings::default());
    };
    match serde_json::from_str(&raw) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            log::warn!("設定の読み込みに失敗、デフォルトを使用: {e}");
            Ok(AppSettings::default())
        }
    }
}

pub fn save_settings(store: &dyn KeyValueStore, settings: &AppSettings) -> Result<(), AppError> {
    let json = serde_json::to_string(settings)
        .map_err(|e| AppError::internal(format!("settings serialize: {e}")))?;
    store.set(keys::SETTINGS, &json)
}
