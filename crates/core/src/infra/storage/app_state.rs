use std::sync::Arc;

use super::{keys, KeyValueStore, SCHEMA_VERSION};
use crate::domain::error::AppError;
use crate::domain::types::PersistedAppState;
use crate::infra::writer::SnapshotSink;

/// 作業状態スナップショット（入力・結果・カラー）の保存先
#[derive(Clone)]
pub struct AppStateStore {
    store: Arc<dyn KeyValueStore>,
}

impl AppStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// スナップショットを読み込む
    ///
    /// バージョンマーカーが現行と異なる（または無い）場合はスナップショットを
    /// 破棄してマーカーを書き込み、`None` を返す。履歴と API キーには触れない。
    pub fn load(&self) -> Result<Option<PersistedAppState>, AppError> {
        let stored = self.store.get(keys::VERSION)?;
        if stored.as_deref() != Some(SCHEMA_VERSION) {
            log::info!(
                "スナップショット形式の更新: {} -> {SCHEMA_VERSION}",
                stored.as_deref().unwrap_or("(none)")
            );
            self.clear()?;
            self.store.set(keys::VERSION, SCHEMA_VERSION)?;
            return Ok(None);
        }

        let Some(raw) = self.store.get(keys::APP_STATE)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                log::warn!("スナップショットが破損しているため無視: {e}");
                Ok(None)
            }
        }
    }

    pub fn save(&self, state: &PersistedAppState) -> Result<(), AppError> {
        let json = serde_json::to_string(state)
            .map_err(|e| AppError::internal(format!("snapshot serialize: {e}")))?;
        self.store.set(keys::APP_STATE, &json)
    }

    /// スナップショットのみ削除する（マーカーは残す）
    pub fn clear(&self) -> Result<(), AppError> {
        self.store.remove(keys::APP_STATE)
    }
}

impl SnapshotSink<PersistedAppState> for AppStateStore {
    fn write(&self, value: &PersistedAppState) -> Result<(), AppError> {
        self.save(value)
    }
}
