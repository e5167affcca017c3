pub mod gemini;
mod noop;
pub mod prompts;

pub use gemini::GeminiProvider;
pub use noop::NoopProvider;

use async_trait::async_trait;

use crate::domain::error::AnalysisError;
use crate::domain::types::{GrammarAnalysis, RewriteOutput, RewriteStyle};

/// 外部テキスト解析サービス trait（コアは呼び出すだけで実装しない）
///
/// どちらの呼び出しも資格情報が無ければ通信前に
/// [`AnalysisError::MissingCredential`] を返す。
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// 原文を正確に再構成するセグメント列で文法解析を返す
    async fn analyze_grammar(&self, text: &str) -> Result<GrammarAnalysis, AnalysisError>;

    async fn rewrite(
        &self,
        text: &str,
        style: RewriteStyle,
    ) -> Result<RewriteOutput, AnalysisError>;

    fn name(&self) -> &str;
}
