use std::sync::Arc;

use super::{keys, KeyValueStore};
use crate::domain::error::AppError;

/// 保存済みキーが無い場合に参照する環境変数
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// プロバイダ用 API キーの保管
///
/// 値はログに出さない。保存済みキーが優先で、無ければ起動時に
/// 取り込んだフォールバック値を使う。
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    fallback: Option<String>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            fallback: None,
        }
    }

    /// 環境変数 `GEMINI_API_KEY` をフォールバックに設定
    pub fn from_env(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store).with_fallback(std::env::var(API_KEY_ENV).ok())
    }

    pub fn with_fallback(mut self, key: Option<String>) -> Self {
        self.fallback = key.filter(|k| !k.trim().is_empty());
        self
    }

    /// キーを保存する。空文字は削除として扱う。
    pub fn save_api_key(&self, key: &str) -> Result<(), AppError> {
        let key = key.trim();
        if key.is_empty() {
            return self.remove_api_key();
        }
        self.store.set(keys::API_KEY, key)?;
        log::info!("API キーを保存");
        Ok(())
    }

    /// 保存済みキー（フォールバックは含まない）
    pub fn api_key(&self) -> Result<Option<String>, AppError> {
        Ok(self
            .store
            .get(keys::API_KEY)?
            .filter(|k| !k.trim().is_empty()))
    }

    pub fn remove_api_key(&self) -> Result<(), AppError> {
        self.store.remove(keys::API_KEY)?;
        log::info!("API キーを削除");
        Ok(())
    }

    /// 実際に使うキー。ストレージ読み込みに失敗した場合もフォールバックを試す。
    pub fn resolve(&self) -> Option<String> {
        match self.api_key() {
            Ok(Some(key)) => Some(key),
            Ok(None) => self.fallback.clone(),
            Err(e) => {
                log::warn!("API キーの読み込みに失敗: {e}");
                self.fallback.clone()
            }
        }
    }

    pub fn has_credential(&self) -> bool {
        self.resolve().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_save_and_read_key() {
        let creds = CredentialStore::new(store());
        assert!(!creds.has_credential());

        creds.save_api_key("  secret-key  ").unwrap();
        assert_eq!(creds.api_key().unwrap().as_deref(), Some("secret-key"));
        assert_eq!(creds.resolve().as_deref(), Some("secret-key"));
    }

    #[test]
    fn test_empty_key_removes() {
        let creds = CredentialStore::new(store());
        creds.save_api_key("secret").unwrap();
        creds.save_api_key("   ").unwrap();
        assert!(creds.api_key().unwrap().is_none());
        assert!(!creds.has_credential());
    }

    #[test]
    fn test_fallback_used_only_without_saved_key() {
        let creds =
            CredentialStore::new(store()).with_fallback(Some("env-key".to_string()));
        assert_eq!(creds.resolve().as_deref(), Some("env-key"));
        assert!(creds.api_key().unwrap().is_none());

        creds.save_api_key("saved").unwrap();
        assert_eq!(creds.resolve().as_deref(), Some("saved"));

        creds.remove_api_key().unwrap();
        assert_eq!(creds.resolve().as_deref(), Some("env-key"));
    }

    #[test]
    fn test_blank_fallback_ignored() {
        let creds = CredentialStore::new(store()).with_fallback(Some(String::new()));
        assert!(!creds.has_credential());
    }

    #[test]
    fn test_clones_share_storage() {
        let creds = CredentialStore::new(store());
        let other = creds.clone();
        creds.save_api_key("shared").unwrap();
        assert_eq!(other.resolve().as_deref(), Some("shared"));
    }
}
