use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::domain::error::AppError;
use crate::domain::segment;
use crate::domain::types::{EntryType, GrammarAnalysis, HistoryEntry, RewriteAnalysis, UserStats};
use crate::infra::storage::{keys, KeyValueStore};

/// スニペットの最大文字数
const SNIPPET_CHARS: usize = 60;

/// 先頭 60 文字 + "..."（60 文字以下ならそのまま）
pub fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// エクスポートファイル名（`grammarguard_backup_YYYY-MM-DD.json`）
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("grammarguard_backup_{}.json", date.format("%Y-%m-%d"))
}

/// 解析・リライト履歴（新しい順）。追加とインポートはこのストアを通してのみ行う。
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryStore {
    /// 永続化済みの履歴を読み込む。破損している場合は空で始める。
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self, AppError> {
        let entries: Vec<HistoryEntry> = match store.get(keys::HISTORY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("履歴が破損しているため空で開始: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        log::info!("履歴を読み込み: {} 件", entries.len());
        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, entries: &[HistoryEntry]) -> Result<(), AppError> {
        let json = serde_json::to_string(entries)
            .map_err(|e| AppError::internal(format!("history serialize: {e}")))?;
        self.store.set(keys::HISTORY, &json)
    }

    /// 先頭に追加して即座に保存する。保存に失敗したら追加を取り消す。
    pub fn append(&self, entry: HistoryEntry) -> Result<(), AppError> {
        let mut entries = self.lock();
        entries.insert(0, entry);
        if let Err(e) = self.persist(&entries) {
            entries.remove(0);
            return Err(e);
        }
        Ok(())
    }

    /// 文法解析の結果を履歴に記録する
    pub fn record_grammar(
        &self,
        input: &str,
        analysis: &GrammarAnalysis,
        timestamp: i64,
    ) -> Result<HistoryEntry, AppError> {
        let text = if analysis.corrected_sentence.is_empty() {
            input
        } else {
            analysis.corrected_sentence.as_str()
        };
        let counts = segment::count_issues(&analysis.segments);
        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            text_snippet: snippet(text),
            full_text: Some(text.to_string()),
            error_count: counts.errors,
            suggestion_count: counts.suggestions,
            is_perfect: counts.is_perfect(),
            entry_type: Some(EntryType::Grammar),
            rewrite_style: None,
        };
        self.append(entry.clone())?;
        Ok(entry)
    }

    /// リライト結果を履歴に記録する（指摘件数は常に 0）
    pub fn record_rewrite(
        &self,
        analysis: &RewriteAnalysis,
        timestamp: i64,
    ) -> Result<HistoryEntry, AppError> {
        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            text_snippet: snippet(&analysis.rewritten_text),
            full_text: Some(analysis.rewritten_text.clone()),
            error_count: 0,
            suggestion_count: 0,
            is_perfect: true,
            entry_type: Some(EntryType::Rewrite),
            rewrite_style: Some(analysis.style.as_str().to_string()),
        };
        self.append(entry.clone())?;
        Ok(entry)
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// grammar（および type 未設定）エントリから統計を導出する
    pub fn compute_stats(&self) -> UserStats {
        let entries = self.lock();
        let mut stats = UserStats::default();
        for entry in entries.iter().filter(|e| e.is_grammar()) {
            stats.total_checks += 1;
            stats.total_errors += entry.error_count;
            if entry.is_perfect {
                stats.perfect_runs += 1;
            }
        }
        if stats.total_checks > 0 {
            stats.accuracy_rate = (f64::from(stats.perfect_runs) / f64::from(stats.total_checks)
                * 100.0)
                .round() as u32;
        }
        stats
    }

    /// 履歴全体をそのまま JSON 配列として書き出す
    pub fn export_snapshot(&self) -> Result<String, AppError> {
        serde_json::to_string_pretty(&*self.lock())
            .map_err(|e| AppError::internal(format!("history export: {e}")))
    }

    /// JSON 配列をマージする。既存の id と空 id は無視し、追加のみ行う。
    ///
    /// 形式が不正なら一切変更せず `false`。マージ後は timestamp 降順に並べ直す。
    pub fn import_merge(&self, json: &str) -> bool {
        let candidates: Vec<HistoryEntry> = match serde_json::from_str(json) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("インポート失敗（形式不正）: {e}");
                return false;
            }
        };

        let mut entries = self.lock();
        let mut seen: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        let mut merged: Vec<HistoryEntry> = candidates
            .into_iter()
            .filter(|c| !c.id.is_empty() && seen.insert(c.id.clone()))
            .collect();
        let added = merged.len();
        // 同一 timestamp ではインポート側が先（安定ソート）
        merged.extend(entries.iter().cloned());
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Err(e) = self.persist(&merged) {
            log::warn!("インポート結果の保存に失敗: {e}");
            return false;
        }
        *entries = merged;
        log::info!("インポート完了: {added} 件追加（合計 {} 件）", entries.len());
        true
    }

    pub fn clear(&self) -> Result<(), AppError> {
        let mut entries = self.lock();
        self.store.remove(keys::HISTORY)?;
        entries.clear();
        Ok(())
    }
}
