//! プロバイダ向けプロンプトと応答スキーマ

use serde_json::{json, Value};

use crate::domain::types::RewriteStyle;

/// 文法解析プロンプト
const GRAMMAR_INSTRUCTIONS: &str = "\
Analyze the following text for grammar, spelling, punctuation, and style improvements.

Return a JSON object with:
1. 'segments': An array representing the ORIGINAL text reconstructed exactly, but split into parts.
   - Mark parts with strict grammar/spelling errors as 'isError': true and 'severity': 'critical'.
   - Mark parts that are grammatically correct but have stylistic suggestions as 'isError': true and 'severity': 'suggestion'.
2. 'correctedSentence': The fully corrected version of the text (MUST be in the same language as the input text).
3. 'explanation': An object with a professional 'overview' and a list of specific 'improvements' (in English).

Important: When the 'text' properties of all segments are concatenated in order, the result MUST equal the \
exact original input text, including all whitespace and punctuation.";

/// 解析対象テキストを含むユーザープロンプトを構築する
pub fn grammar_prompt(text: &str) -> String {
    format!("{GRAMMAR_INSTRUCTIONS}\n\nInput Text:\n\"{text}\"")
}

/// スタイル指定のリライトプロンプトを構築する
pub fn rewrite_prompt(text: &str, style: RewriteStyle) -> String {
    format!(
        "Rewrite the following text in a \"{style}\" style.\n\n\
         Return a JSON object with:\n\
         1. 'rewrittenText': The text rewritten in the requested style (MUST be in the same language as the input text).\n\
         2. 'explanation': An object with an 'overview' of the style changes and a list of specific 'improvements' \
         describing the techniques used to match the '{style}' tone (in English).\n\n\
         Input Text:\n\"{text}\""
    )
}

fn explanation_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "overview": { "type": "STRING" },
            "improvements": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["overview", "improvements"]
    })
}

/// 文法解析の応答スキーマ
pub fn grammar_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "segments": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "text": { "type": "STRING", "description": "A portion of the original text, including its spaces and punctuation." },
                        "isError": { "type": "BOOLEAN" },
                        "severity": { "type": "STRING", "enum": ["critical", "suggestion"] },
                        "correction": { "type": "STRING" },
                        "reason": { "type": "STRING" }
                    },
                    "required": ["text", "isError"]
                }
            },
            "correctedSentence": { "type": "STRING" },
            "explanation": explanation_schema()
        },
        "required": ["segments", "correctedSentence", "explanation"]
    })
}

/// リライトの応答スキーマ
pub fn rewrite_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "rewrittenText": { "type": "STRING" },
            "explanation": explanation_schema()
        },
        "required": ["rewrittenText", "explanation"]
    })
}
