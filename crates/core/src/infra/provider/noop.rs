use async_trait::async_trait;

use super::AnalysisProvider;
use crate::domain::error::AnalysisError;
use crate::domain::types::{Explanation, GrammarAnalysis, RewriteOutput, RewriteStyle, Segment};

/// NoopProvider: 指摘なしの解析と接頭辞付きの原文を返すオフライン実装。
pub struct NoopProvider;

#[async_trait]
impl AnalysisProvider for NoopProvider {
    async fn analyze_grammar(&self, text: &str) -> Result<GrammarAnalysis, AnalysisError> {
        Ok(GrammarAnalysis {
            segments: vec![Segment::clean(text)],
            corrected_sentence: text.to_string(),
            explanation: Explanation {
                overview: "No issues found.".to_string(),
                improvements: vec![],
            },
        })
    }

    async fn rewrite(
        &self,
        text: &str,
        style: RewriteStyle,
    ) -> Result<RewriteOutput, AnalysisError> {
        Ok(RewriteOutput {
            rewritten_text: format!("[{style}] {text}"),
            explanation: Explanation::default(),
        })
    }

    fn name(&self) -> &str {
        "noop"
    }
}
