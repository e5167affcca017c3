use serde::{Deserialize, Serialize};

/// 指摘の重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// 文法・綴りの誤り
    Critical,
    /// 文法的には正しいが表現上の改善提案
    Suggestion,
}

/// 解析セグメント（原文の連続した一部分）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub text: String,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Segment {
    /// 指摘なしのセグメント
    pub fn clean(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
            severity: None,
            correction: None,
            reason: None,
        }
    }

    /// 指摘ありのセグメント
    pub fn flagged(
        text: impl Into<String>,
        severity: Option<Severity>,
        correction: Option<String>,
    ) -> Self {
        Self {
            text: text.into(),
            is_error: true,
            severity,
            correction,
            reason: None,
        }
    }

    /// 実効重要度。severity 未指定の指摘は Critical として扱う。
    pub fn effective_severity(&self) -> Option<Severity> {
        if !self.is_error {
            return None;
        }
        Some(self.severity.unwrap_or(Severity::Critical))
    }
}

/// 解析・リライトの説明
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub overview: String,
    pub improvements: Vec<String>,
}

/// 文法解析結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarAnalysis {
    pub segments: Vec<Segment>,
    pub corrected_sentence: String,
    pub explanation: Explanation,
}

/// リライトスタイル（10種固定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RewriteStyle {
    Professional,
    Casual,
    Academic,
    Creative,
    Formal,
    Informal,
    Analytical,
    Narrative,
    Persuasive,
    Descriptive,
}

impl RewriteStyle {
    pub const ALL: [RewriteStyle; 10] = [
        Self::Professional,
        Self::Casual,
        Self::Academic,
        Self::Creative,
        Self::Formal,
        Self::Informal,
        Self::Analytical,
        Self::Narrative,
        Self::Persuasive,
        Self::Descriptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "Professional",
            Self::Casual => "Casual",
            Self::Academic => "Academic",
            Self::Creative => "Creative",
            Self::Formal => "Formal",
            Self::Informal => "Informal",
            Self::Analytical => "Analytical",
            Self::Narrative => "Narrative",
            Self::Persuasive => "Persuasive",
            Self::Descriptive => "Descriptive",
        }
    }
}

impl std::fmt::Display for RewriteStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// プロバイダから返るリライト本体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteOutput {
    pub rewritten_text: String,
    pub explanation: Explanation,
}

/// リライト結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteAnalysis {
    pub original_text: String,
    pub rewritten_text: String,
    pub style: RewriteStyle,
    pub explanation: Explanation,
}

impl RewriteAnalysis {
    pub fn from_output(original_text: &str, style: RewriteStyle, output: RewriteOutput) -> Self {
        Self {
            original_text: original_text.to_string(),
            rewritten_text: output.rewritten_text,
            style,
            explanation: output.explanation,
        }
    }
}

/// 履歴エントリ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Grammar,
    Rewrite,
}

/// 履歴エントリ（作成後は不変）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// 欠落した id は空文字列として読み込み、インポート時に除外する
    #[serde(default)]
    pub id: String,
    /// epoch ミリ秒
    pub timestamp: i64,
    pub text_snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    pub error_count: u32,
    pub suggestion_count: u32,
    pub is_perfect: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<EntryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_style: Option<String>,
}

impl HistoryEntry {
    /// type 未設定の旧エントリは grammar とみなす
    pub fn is_grammar(&self) -> bool {
        matches!(self.entry_type, None | Some(EntryType::Grammar))
    }
}

/// 履歴から導出される統計（保存しない）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_checks: u32,
    pub total_errors: u32,
    /// 完全一致（指摘ゼロ）の割合 %
    pub accuracy_rate: u32,
    pub perfect_runs: u32,
}

/// テーマカラー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppColor {
    #[default]
    Blue,
    Orange,
    Green,
    Indigo,
    Rose,
    Red,
}

/// クラッシュ・リロード復帰用のスナップショット
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAppState {
    pub input_text: String,
    pub grammar_result: Option<GrammarAnalysis>,
    pub rewrite_result: Option<RewriteAnalysis>,
    #[serde(default)]
    pub color_scheme: AppColor,
}
