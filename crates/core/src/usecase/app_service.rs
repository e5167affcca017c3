use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::domain::activity::{self, ActivityGrid};
use crate::domain::error::{AnalysisError, AppError};
use crate::domain::segment::{self, ScoreBand};
use crate::domain::session::{
    PendingRequest, QuickRewriteState, RequestTicket, SessionManager, SessionState,
    StateTransition,
};
use crate::domain::settings::AppSettings;
use crate::domain::types::{
    AppColor, GrammarAnalysis, HistoryEntry, PersistedAppState, RewriteAnalysis, RewriteStyle,
    UserStats,
};
use crate::infra::metrics::{phase, Metrics, MetricsSummary};
use crate::infra::provider::{AnalysisProvider, GeminiProvider, NoopProvider};
use crate::infra::sampler::StyleSampler;
use crate::infra::storage::{
    self, AppStateStore, CredentialStore, KeyValueStore, SqliteStore,
};
use crate::infra::writer::CoalescingWriter;
use crate::usecase::history::{self, HistoryStore};
use crate::usecase::orchestrator::{RequestOrchestrator, RetryPolicy};

/// アプリケーションサービス（ホスト UI から1インスタンスで使う）
///
/// セッション状態のロックは await をまたいで保持しない。
/// 進行中のリクエストの結果は世代トークンで照合し、古いものは破棄する。
pub struct AppService {
    session_mgr: Mutex<SessionManager>,
    provider: Arc<dyn AnalysisProvider>,
    orchestrator: RequestOrchestrator,
    history: HistoryStore,
    credentials: CredentialStore,
    state_writer: CoalescingWriter<PersistedAppState>,
    sampler: Mutex<StyleSampler>,
    metrics: Arc<Metrics>,
    store: Arc<dyn KeyValueStore>,
    settings: AppSettings,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl AppService {
    /// 各コンポーネントを組み立て、保存済みスナップショットがあれば復元する
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn AnalysisProvider>,
        credentials: CredentialStore,
        sampler: StyleSampler,
    ) -> Result<Self, AppError> {
        let settings = storage::load_settings(&*store)?;
        let metrics = Arc::new(Metrics::new());
        let orchestrator = RequestOrchestrator::new(RetryPolicy::from_settings(&settings))
            .with_metrics(metrics.clone());
        let history = HistoryStore::open(store.clone())?;
        let app_state = AppStateStore::new(store.clone());
        let restored = app_state.load()?;
        let state_writer = CoalescingWriter::from_settings(Arc::new(app_state), &settings);

        let service = Self {
            session_mgr: Mutex::new(SessionManager::new()),
            provider,
            orchestrator,
            history,
            credentials,
            state_writer,
            sampler: Mutex::new(sampler),
            metrics,
            store,
            settings,
        };

        if let Some(snapshot) = restored {
            let styles = service.sample_styles();
            service.lock_session().restore(snapshot, styles);
            log::info!("前回の作業状態を復元");
        }

        log::info!("AppService 初期化完了 (provider: {})", service.provider.name());
        Ok(service)
    }

    /// SQLite ファイルを開き、Gemini プロバイダで組み立てる
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(db_path)?);
        let settings = storage::load_settings(&*store)?;
        let credentials = CredentialStore::from_env(store.clone());
        let provider = Arc::new(GeminiProvider::new(credentials.clone(), &settings)?);
        Self::new(store, provider, credentials, StyleSampler::random())
    }

    /// 通信しない NoopProvider で組み立てる（オフライン・動作確認用）
    pub fn open_offline(db_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(db_path)?);
        let credentials = CredentialStore::new(store.clone());
        Self::new(store, Arc::new(NoopProvider), credentials, StyleSampler::random())
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionManager> {
        self.session_mgr.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sample_styles(&self) -> Vec<RewriteStyle> {
        self.sampler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sample()
    }

    fn schedule_snapshot(&self) {
        let snapshot = self.lock_session().snapshot();
        self.state_writer.schedule(snapshot);
    }

    // ==================== Input ====================

    pub fn set_input(&self, text: impl Into<String>) {
        self.lock_session().set_input(text);
        self.schedule_snapshot();
    }

    pub fn set_color_scheme(&self, color: AppColor) {
        self.lock_session().set_color_scheme(color);
        self.schedule_snapshot();
    }

    // ==================== Analysis / Rewrite ====================

    /// 入力テキストを文法解析する。
    ///
    /// 新しいリクエストに追い越された、または停止された場合は `Ok(None)`。
    pub async fn check_grammar(&self) -> Result<Option<GrammarAnalysis>, AppError> {
        let ticket = self.begin("check_grammar", |mgr| mgr.start_analysis())?;
        match ticket.request {
            PendingRequest::Analysis { text } => self.run_analysis(ticket.generation, text).await,
            PendingRequest::Rewrite { .. } => Err(AppError::internal("解析チケットの種別が不正")),
        }
    }

    /// 入力テキストを指定スタイルでリライトする
    pub async fn rewrite(&self, style: RewriteStyle) -> Result<Option<RewriteAnalysis>, AppError> {
        let ticket = self.begin("rewrite", |mgr| mgr.start_rewrite(style))?;
        self.dispatch_rewrite(ticket).await
    }

    /// 直前のリライトを同じスタイルで再実行する
    pub async fn retry_rewrite(&self) -> Result<Option<RewriteAnalysis>, AppError> {
        let ticket = self.begin("retry_rewrite", |mgr| mgr.retry_rewrite())?;
        self.dispatch_rewrite(ticket).await
    }

    fn begin(
        &self,
        action: &str,
        start: impl FnOnce(&mut SessionManager) -> Result<(RequestTicket, StateTransition), AppError>,
    ) -> Result<RequestTicket, AppError> {
        let (ticket, transition) = {
            let mut mgr = self.lock_session();
            start(&mut mgr)?
        };
        log::info!(
            "{action}: {} -> {} (gen {})",
            transition.prev_state,
            transition.new_state.as_str(),
            transition.generation
        );
        self.schedule_snapshot();
        Ok(ticket)
    }

    async fn dispatch_rewrite(
        &self,
        ticket: RequestTicket,
    ) -> Result<Option<RewriteAnalysis>, AppError> {
        match ticket.request {
            PendingRequest::Rewrite { text, style } => {
                self.run_rewrite(ticket.generation, text, style).await
            }
            PendingRequest::Analysis { .. } => {
                Err(AppError::internal("リライトチケットの種別が不正"))
            }
        }
    }

    async fn run_analysis(
        &self,
        generation: u64,
        text: String,
    ) -> Result<Option<GrammarAnalysis>, AppError> {
        self.metrics.inc_checks_started();
        let started = Instant::now();

        let provider = &self.provider;
        let input = text.as_str();
        let result = self
            .orchestrator
            .execute("analyze", || async move {
                let analysis = provider.analyze_grammar(input).await?;
                segment::ensure_valid(input, &analysis)?;
                Ok(analysis)
            })
            .await;
        self.metrics
            .record_latency(phase::ANALYZE, started.elapsed().as_millis() as u64);

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(e) => return self.fail(generation, e).map(|()| None),
        };

        let styles = self.sample_styles();
        let applied = self
            .lock_session()
            .on_analysis_done(generation, analysis.clone(), styles);
        if applied.is_none() {
            log::debug!("古い解析結果を破棄 (gen {generation})");
            return Ok(None);
        }

        self.metrics.inc_succeeded();
        if let Err(e) = self.history.record_grammar(&text, &analysis, now_ms()) {
            log::warn!("履歴の保存に失敗: {e}");
        }
        self.schedule_snapshot();
        log::info!(
            "解析完了: score={} (gen {generation})",
            segment::accuracy_score(&analysis.segments)
        );
        Ok(Some(analysis))
    }

    async fn run_rewrite(
        &self,
        generation: u64,
        text: String,
        style: RewriteStyle,
    ) -> Result<Option<RewriteAnalysis>, AppError> {
        self.metrics.inc_rewrites_started();
        let started = Instant::now();

        let provider = &self.provider;
        let input = text.as_str();
        let result = self
            .orchestrator
            .execute("rewrite", || async move { provider.rewrite(input, style).await })
            .await;
        self.metrics
            .record_latency(phase::REWRITE, started.elapsed().as_millis() as u64);

        let output = match result {
            Ok(output) => output,
            Err(e) => return self.fail(generation, e).map(|()| None),
        };

        let analysis = RewriteAnalysis::from_output(&text, style, output);
        let applied = self
            .lock_session()
            .on_rewrite_done(generation, analysis.clone());
        if applied.is_none() {
            log::debug!("古いリライト結果を破棄 (gen {generation})");
            return Ok(None);
        }

        self.metrics.inc_succeeded();
        if let Err(e) = self.history.record_rewrite(&analysis, now_ms()) {
            log::warn!("履歴の保存に失敗: {e}");
        }
        self.schedule_snapshot();
        Ok(Some(analysis))
    }

    /// 失敗を Error 状態に反映する。古い世代の失敗は黙って捨てる。
    fn fail(&self, generation: u64, source: AnalysisError) -> Result<(), AppError> {
        let err = AppError::from(source);
        if self
            .lock_session()
            .on_request_failed(generation, &err)
            .is_none()
        {
            log::debug!("古いリクエストの失敗を破棄 (gen {generation})");
            return Ok(());
        }
        self.metrics.inc_error(err.code);
        Err(err)
    }

    /// 進行中のリクエストを停止: Loading → Idle
    pub fn stop(&self) -> Result<StateTransition, AppError> {
        let transition = self.lock_session().stop()?;
        log::info!("停止: {} -> idle", transition.prev_state);
        Ok(transition)
    }

    /// 結果と入力を破棄: * → Idle
    pub fn clear(&self) -> StateTransition {
        let transition = self.lock_session().clear();
        self.schedule_snapshot();
        transition
    }

    pub fn dismiss_error(&self) -> Result<StateTransition, AppError> {
        self.lock_session().recover_from_error()
    }

    // ==================== Quick Rewrite ====================

    /// 提示中のスタイルで修正済み文をリライトする。
    ///
    /// 選択できない状態（確定済み・読み込み中・提示外）や失敗・停止時は `None`。
    /// 失敗は表示せず、選択前の状態に戻るだけ。
    pub async fn quick_rewrite(&self, style: RewriteStyle) -> Option<String> {
        let ticket = self.lock_session().select_quick_style(style)?;
        self.metrics.inc_quick_rewrites_started();
        let started = Instant::now();

        let provider = &self.provider;
        let input = ticket.text.as_str();
        let result = self
            .orchestrator
            .execute("quick_rewrite", || async move { provider.rewrite(input, style).await })
            .await;
        self.metrics
            .record_latency(phase::QUICK_REWRITE, started.elapsed().as_millis() as u64);

        match result {
            Ok(output) => {
                let text = output.rewritten_text;
                if self.lock_session().on_quick_rewrite_done(&ticket, text.clone()) {
                    self.metrics.inc_succeeded();
                    Some(text)
                } else {
                    None
                }
            }
            Err(e) => {
                log::warn!("クイックリライト失敗 ({style}): {e}");
                self.lock_session().on_quick_rewrite_failed(&ticket);
                None
            }
        }
    }

    pub fn stop_quick_rewrite(&self) -> bool {
        self.lock_session().stop_quick_rewrite()
    }

    // ==================== History ====================

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.entries()
    }

    pub fn stats(&self) -> UserStats {
        self.history.compute_stats()
    }

    pub fn activity_grid(&self) -> ActivityGrid {
        activity::build_local(&self.history.entries())
    }

    /// エクスポート用の (ファイル名, JSON)
    pub fn export_history(&self) -> Result<(String, String), AppError> {
        let json = self.history.export_snapshot()?;
        let file_name = history::backup_file_name(chrono::Local::now().date_naive());
        Ok((file_name, json))
    }

    pub fn import_history(&self, json: &str) -> bool {
        self.history.import_merge(json)
    }

    pub fn clear_history(&self) -> Result<(), AppError> {
        self.history.clear()?;
        log::info!("履歴を削除");
        Ok(())
    }

    // ==================== Credentials ====================

    pub fn save_api_key(&self, key: &str) -> Result<(), AppError> {
        self.credentials.save_api_key(key)
    }

    pub fn remove_api_key(&self) -> Result<(), AppError> {
        self.credentials.remove_api_key()
    }

    pub fn has_api_key(&self) -> bool {
        self.credentials.has_credential()
    }

    // ==================== Settings ====================

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// 設定を保存する。反映は次回起動時。
    pub fn update_settings(&self, settings: &AppSettings) -> Result<(), AppError> {
        storage::save_settings(&*self.store, settings)
    }

    // ==================== Metrics ====================

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    // ==================== State Accessors ====================

    pub fn state(&self) -> SessionState {
        self.lock_session().state().clone()
    }

    pub fn input_text(&self) -> String {
        self.lock_session().input_text().to_string()
    }

    pub fn color_scheme(&self) -> AppColor {
        self.lock_session().color_scheme()
    }

    pub fn grammar_result(&self) -> Option<GrammarAnalysis> {
        self.lock_session().grammar_result().cloned()
    }

    pub fn rewrite_result(&self) -> Option<RewriteAnalysis> {
        self.lock_session().rewrite_result().cloned()
    }

    pub fn quick_rewrite_state(&self) -> QuickRewriteState {
        self.lock_session().quick_rewrite().clone()
    }

    /// 現在の文法解析のスコアと色帯
    pub fn accuracy_score(&self) -> Option<(u32, ScoreBand)> {
        let mgr = self.lock_session();
        let analysis = mgr.grammar_result()?;
        let score = segment::accuracy_score(&analysis.segments);
        Some((score, ScoreBand::of(score)))
    }

    // ==================== Lifecycle ====================

    /// 未書き込みのスナップショットを直ちに保存する（終了時に呼ぶ）
    pub fn shutdown(&self) -> Result<(), AppError> {
        self.state_writer.flush()?;
        log::info!("AppService 終了");
        Ok(())
    }
}

impl Drop for AppService {
    fn drop(&mut self) {
        if let Err(e) = self.state_writer.flush() {
            log::warn!("終了時のスナップショット保存に失敗: {e}");
        }
    }
}
