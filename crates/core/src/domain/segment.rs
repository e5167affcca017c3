//! セグメントモデル: 解析結果が原文の正確な分割になっているかの検証と正確度スコア。

use super::error::AnalysisError;
use super::types::{GrammarAnalysis, Segment, Severity};

/// 提案（Suggestion）の重み。Critical は 1.0。
const SUGGESTION_WEIGHT: f64 = 0.5;

/// セグメントを順に連結して原文を再構成する
pub fn reconstruct(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// 連結結果が原文とバイト単位で一致するか
pub fn validate(original: &str, segments: &[Segment]) -> bool {
    let mut rest = original;
    for segment in segments {
        match rest.strip_prefix(segment.text.as_str()) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }
    rest.is_empty()
}

/// 検証に失敗した解析結果は修復せず MalformedResponse として拒否する
pub fn ensure_valid(original: &str, analysis: &GrammarAnalysis) -> Result<(), AnalysisError> {
    if validate(original, &analysis.segments) {
        return Ok(());
    }
    let rebuilt = reconstruct(&analysis.segments);
    Err(AnalysisError::MalformedResponse(format!(
        "segments do not reconstruct the input (expected {} bytes, got {})",
        original.len(),
        rebuilt.len()
    )))
}

/// 長さ加重の正確度スコア（0〜100）。テキスト内容は参照しない。
///
/// 長さは UTF-16 コード単位で数える（BMP 外の文字は 2）。
pub fn accuracy_score(segments: &[Segment]) -> u32 {
    let mut total_length = 0.0_f64;
    let mut error_weighted_length = 0.0_f64;

    for segment in segments {
        let len = segment.text.encode_utf16().count() as f64;
        total_length += len;
        if let Some(severity) = segment.effective_severity() {
            let weight = match severity {
                Severity::Suggestion => SUGGESTION_WEIGHT,
                Severity::Critical => 1.0,
            };
            error_weighted_length += len * weight;
        }
    }

    if total_length == 0.0 {
        return 100;
    }

    let ratio = ((total_length - error_weighted_length) / total_length).max(0.0);
    (ratio * 100.0).round() as u32
}

/// スコア帯（UI の色分け用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    High,
    Medium,
    Low,
}

impl ScoreBand {
    pub fn of(score: u32) -> Self {
        match score {
            90.. => Self::High,
            70..=89 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// 指摘件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueCounts {
    pub errors: u32,
    pub suggestions: u32,
}

impl IssueCounts {
    pub fn is_perfect(&self) -> bool {
        self.errors == 0 && self.suggestions == 0
    }
}

/// severity 未指定の指摘はエラーとして数える
pub fn count_issues(segments: &[Segment]) -> IssueCounts {
    let mut counts = IssueCounts::default();
    for severity in segments.iter().filter_map(Segment::effective_severity) {
        match severity {
            Severity::Critical => counts.errors += 1,
            Severity::Suggestion => counts.suggestions += 1,
        }
    }
    counts
}
