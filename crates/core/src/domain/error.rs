use serde::Serialize;

/// ユーザー向けの汎用失敗メッセージ
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// APIキー未設定時のメッセージ
pub const MISSING_CREDENTIAL_MESSAGE: &str = "API key not set. Open settings to add your API key.";

/// 解析プロバイダ呼び出しのエラー分類
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Missing API credential")]
    MissingCredential,
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Service overloaded: {0}")]
    ServiceOverloaded(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Network failure: {0}")]
    NetworkFailure(String),
}

/// レート制限を示すマーカー
const RATE_LIMIT_MARKERS: &[&str] = &["429", "RESOURCE_EXHAUSTED", "quota"];

/// 一時的な過負荷を示すマーカー
const OVERLOAD_MARKERS: &[&str] = &["503", "overloaded", "UNAVAILABLE"];

impl AnalysisError {
    /// リトライ対象か（レート制限・過負荷のみ）
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::ServiceOverloaded(_))
    }

    /// プロバイダの失敗ペイロードを分類する。
    /// 既知のマーカーを含まないものは致命的な `NetworkFailure` とする。
    pub fn classify(payload: &str) -> Self {
        let lowered = payload.to_lowercase();
        let has = |markers: &[&str]| {
            markers
                .iter()
                .any(|m| lowered.contains(&m.to_lowercase()))
        };

        if has(RATE_LIMIT_MARKERS) {
            Self::RateLimited(payload.to_string())
        } else if has(OVERLOAD_MARKERS) {
            Self::ServiceOverloaded(payload.to_string())
        } else {
            Self::NetworkFailure(payload.to_string())
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingCredential => ErrorCode::MissingCredential,
            _ => ErrorCode::Provider,
        }
    }
}

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_MISSING_CREDENTIAL")]
    MissingCredential,
    #[serde(rename = "E_PROVIDER")]
    Provider,
    #[serde(rename = "E_INVALID_STATE")]
    InvalidState,
    #[serde(rename = "E_STORAGE")]
    Storage,
    #[serde(rename = "E_IMPORT")]
    Import,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "E_MISSING_CREDENTIAL",
            Self::Provider => "E_PROVIDER",
            Self::InvalidState => "E_INVALID_STATE",
            Self::Storage => "E_STORAGE",
            Self::Import => "E_IMPORT",
            Self::Internal => "E_INTERNAL",
        }
    }
}

/// アプリケーションエラー（UI へ返すペイロード兼用）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidState,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Storage,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn import(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Import,
            message: msg.into(),
            recoverable: true,
        }
    }

    /// APIキー入力へ誘導すべきエラーか
    pub fn needs_credential(&self) -> bool {
        self.code == ErrorCode::MissingCredential
    }
}

/// プロバイダ失敗はユーザーには一律の汎用メッセージで返す（APIキー未設定のみ別扱い）
impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        let message = match err {
            AnalysisError::MissingCredential => MISSING_CREDENTIAL_MESSAGE,
            _ => GENERIC_FAILURE_MESSAGE,
        };
        Self {
            code: err.code(),
            message: message.to_string(),
            recoverable: true,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
