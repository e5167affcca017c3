use serde::Serialize;

use super::error::AppError;
use super::types::{AppColor, GrammarAnalysis, PersistedAppState, RewriteAnalysis, RewriteStyle};

/// セッション状態
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Success,
    Error {
        code: String,
        message: String,
        recoverable: bool,
    },
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error { .. } => "error",
        }
    }
}

/// 発行するプロバイダリクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRequest {
    Analysis { text: String },
    Rewrite { text: String, style: RewriteStyle },
}

/// 世代トークン付きリクエスト。完了時に世代が古ければ結果を破棄する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub generation: u64,
    pub request: PendingRequest,
}

/// クイックリライトの状態（現在の文法解析にのみ紐づく）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickRewriteState {
    pub styles: Vec<RewriteStyle>,
    pub selected_style: Option<RewriteStyle>,
    pub result: Option<String>,
    pub is_loading: bool,
}

/// クイックリライトのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickRewritePhase {
    /// 文法解析が無い
    Inactive,
    Offered,
    Loading(RewriteStyle),
    /// 最初に選ばれたスタイルで確定（以降の選択は無効）
    Locked(RewriteStyle),
}

impl QuickRewriteState {
    fn offered(styles: Vec<RewriteStyle>) -> Self {
        Self {
            styles,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> QuickRewritePhase {
        match (self.selected_style, self.is_loading, &self.result) {
            _ if self.styles.is_empty() => QuickRewritePhase::Inactive,
            (Some(style), _, Some(_)) => QuickRewritePhase::Locked(style),
            (Some(style), true, None) => QuickRewritePhase::Loading(style),
            _ => QuickRewritePhase::Offered,
        }
    }

    /// ボタンが押せるか
    pub fn is_enabled(&self, style: RewriteStyle) -> bool {
        self.phase() == QuickRewritePhase::Offered && self.styles.contains(&style)
    }
}

/// クイックリライトの発行チケット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickRewriteTicket {
    pub generation: u64,
    pub token: u64,
    pub style: RewriteStyle,
    /// 解析の修正済み文
    pub text: String,
}

/// 状態遷移イベントペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub generation: u64,
    pub prev_state: String,
    pub new_state: SessionState,
}

/// 単一セッションの状態機械（Idle → Loading → Success | Error）
#[derive(Debug, Default)]
pub struct SessionManager {
    state: SessionState,
    input_text: String,
    color_scheme: AppColor,
    grammar_result: Option<GrammarAnalysis>,
    rewrite_result: Option<RewriteAnalysis>,
    quick: QuickRewriteState,
    generation: u64,
    quick_token: u64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Accessors ---

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    pub fn color_scheme(&self) -> AppColor {
        self.color_scheme
    }

    pub fn grammar_result(&self) -> Option<&GrammarAnalysis> {
        self.grammar_result.as_ref()
    }

    pub fn rewrite_result(&self) -> Option<&RewriteAnalysis> {
        self.rewrite_result.as_ref()
    }

    pub fn quick_rewrite(&self) -> &QuickRewriteState {
        &self.quick
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.state == SessionState::Loading
    }

    // --- Input ---

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input_text = text.into();
    }

    pub fn set_color_scheme(&mut self, color: AppColor) {
        self.color_scheme = color;
    }

    // --- Top-level transitions ---

    /// 文法解析を開始: * → Loading（進行中のリクエストは世代更新で無効化）
    pub fn start_analysis(&mut self) -> Result<(RequestTicket, StateTransition), AppError> {
        let text = self.require_input()?;
        Ok(self.begin(PendingRequest::Analysis { text }))
    }

    /// リライトを開始: * → Loading
    pub fn start_rewrite(
        &mut self,
        style: RewriteStyle,
    ) -> Result<(RequestTicket, StateTransition), AppError> {
        let text = self.require_input()?;
        Ok(self.begin(PendingRequest::Rewrite { text, style }))
    }

    /// 直前のリライトを同じスタイルで再発行: Success → Loading
    pub fn retry_rewrite(&mut self) -> Result<(RequestTicket, StateTransition), AppError> {
        let last = match (&self.state, &self.rewrite_result) {
            (SessionState::Success, Some(last)) => last,
            (state, _) => {
                return Err(AppError::invalid_state(format!(
                    "retry_rewrite は {} 状態では実行できません",
                    state.as_str()
                )))
            }
        };
        let request = PendingRequest::Rewrite {
            text: last.original_text.clone(),
            style: last.style,
        };
        Ok(self.begin(request))
    }

    fn require_input(&self) -> Result<String, AppError> {
        if self.input_text.trim().is_empty() {
            return Err(AppError::invalid_state("入力テキストが空です"));
        }
        Ok(self.input_text.clone())
    }

    fn begin(&mut self, request: PendingRequest) -> (RequestTicket, StateTransition) {
        self.grammar_result = None;
        self.rewrite_result = None;
        self.reset_quick();
        self.generation += 1;
        let transition = self.transition_to(SessionState::Loading);
        (
            RequestTicket {
                generation: self.generation,
                request,
            },
            transition,
        )
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state == SessionState::Loading
    }

    /// 文法解析完了: Loading → Success。古い世代なら None（破棄）。
    pub fn on_analysis_done(
        &mut self,
        generation: u64,
        analysis: GrammarAnalysis,
        styles: Vec<RewriteStyle>,
    ) -> Option<StateTransition> {
        if !self.is_current(generation) {
            return None;
        }
        self.grammar_result = Some(analysis);
        self.quick = QuickRewriteState::offered(styles);
        Some(self.transition_to(SessionState::Success))
    }

    /// リライト完了: Loading → Success
    pub fn on_rewrite_done(
        &mut self,
        generation: u64,
        analysis: RewriteAnalysis,
    ) -> Option<StateTransition> {
        if !self.is_current(generation) {
            return None;
        }
        self.rewrite_result = Some(analysis);
        Some(self.transition_to(SessionState::Success))
    }

    /// リクエスト失敗: Loading → Error（再試行可能）
    pub fn on_request_failed(
        &mut self,
        generation: u64,
        error: &AppError,
    ) -> Option<StateTransition> {
        if !self.is_current(generation) {
            return None;
        }
        Some(self.transition_to(SessionState::Error {
            code: error.code.as_str().to_string(),
            message: error.message.clone(),
            recoverable: true,
        }))
    }

    /// 停止: Loading → Idle。進行中の結果は到着時に破棄される。
    pub fn stop(&mut self) -> Result<StateTransition, AppError> {
        if self.state != SessionState::Loading {
            return Err(AppError::invalid_state(format!(
                "stop は {} 状態では実行できません",
                self.state.as_str()
            )));
        }
        self.generation += 1;
        Ok(self.transition_to(SessionState::Idle))
    }

    /// クリア: * → Idle。結果と入力を破棄する。
    pub fn clear(&mut self) -> StateTransition {
        self.input_text.clear();
        self.grammar_result = None;
        self.rewrite_result = None;
        self.reset_quick();
        self.generation += 1;
        self.transition_to(SessionState::Idle)
    }

    /// エラーからの復帰: Error → Idle
    pub fn recover_from_error(&mut self) -> Result<StateTransition, AppError> {
        match &self.state {
            SessionState::Error { recoverable, .. } if *recoverable => {
                Ok(self.transition_to(SessionState::Idle))
            }
            SessionState::Error { .. } => Err(AppError::invalid_state("回復不可能なエラーです")),
            other => Err(AppError::invalid_state(format!(
                "recover_from_error は {} 状態では実行できません",
                other.as_str()
            ))),
        }
    }

    fn transition_to(&mut self, new_state: SessionState) -> StateTransition {
        let prev = self.state.as_str().to_string();
        self.state = new_state;
        StateTransition {
            generation: self.generation,
            prev_state: prev,
            new_state: self.state.clone(),
        }
    }

    // --- Quick rewrite ---

    fn reset_quick(&mut self) {
        self.quick = QuickRewriteState::default();
        self.quick_token += 1;
    }

    /// スタイル選択: Offered → Loading(style)。ロック済み・読み込み中・対象外は no-op。
    pub fn select_quick_style(&mut self, style: RewriteStyle) -> Option<QuickRewriteTicket> {
        if self.state != SessionState::Success || !self.quick.is_enabled(style) {
            return None;
        }
        let analysis = self.grammar_result.as_ref()?;
        let text = analysis.corrected_sentence.clone();

        self.quick.selected_style = Some(style);
        self.quick.is_loading = true;
        self.quick_token += 1;

        Some(QuickRewriteTicket {
            generation: self.generation,
            token: self.quick_token,
            style,
            text,
        })
    }

    fn is_current_quick(&self, ticket: &QuickRewriteTicket) -> bool {
        ticket.generation == self.generation
            && ticket.token == self.quick_token
            && self.quick.phase() == QuickRewritePhase::Loading(ticket.style)
    }

    /// 成功: Loading(style) → Locked(style, result)
    pub fn on_quick_rewrite_done(&mut self, ticket: &QuickRewriteTicket, result: String) -> bool {
        if !self.is_current_quick(ticket) {
            return false;
        }
        self.quick.result = Some(result);
        self.quick.is_loading = false;
        true
    }

    /// 失敗: Loading(style) → Offered（エラーは表示しない）
    pub fn on_quick_rewrite_failed(&mut self, ticket: &QuickRewriteTicket) -> bool {
        if !self.is_current_quick(ticket) {
            return false;
        }
        self.quick.selected_style = None;
        self.quick.is_loading = false;
        true
    }

    /// 読み込み中のクイックリライトを中断: Loading(style) → Offered
    pub fn stop_quick_rewrite(&mut self) -> bool {
        if !matches!(self.quick.phase(), QuickRewritePhase::Loading(_)) {
            return false;
        }
        self.quick.selected_style = None;
        self.quick.is_loading = false;
        self.quick_token += 1;
        true
    }

    // --- Snapshot ---

    pub fn snapshot(&self) -> PersistedAppState {
        PersistedAppState {
            input_text: self.input_text.clone(),
            grammar_result: self.grammar_result.clone(),
            rewrite_result: self.rewrite_result.clone(),
            color_scheme: self.color_scheme,
        }
    }

    /// スナップショットから復元。結果があれば Success、文法解析ならクイックリライトを再提示する。
    pub fn restore(&mut self, snapshot: PersistedAppState, styles: Vec<RewriteStyle>) {
        self.input_text = snapshot.input_text;
        self.color_scheme = snapshot.color_scheme;
        self.grammar_result = snapshot.grammar_result;
        self.rewrite_result = snapshot.rewrite_result;
        self.reset_quick();
        if self.grammar_result.is_some() {
            self.quick = QuickRewriteState::offered(styles);
        }
        self.state = if self.grammar_result.is_some() || self.rewrite_result.is_some() {
            SessionState::Success
        } else {
            SessionState::Idle
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AnalysisError;
    use crate::domain::types::{Explanation, Segment};

    fn analysis() -> GrammarAnalysis {
        GrammarAnalysis {
            segments: vec![Segment::clean("He goes.")],
            corrected_sentence: "He goes.".into(),
            explanation: Explanation::default(),
        }
    }

    fn rewrite(style: RewriteStyle) -> RewriteAnalysis {
        RewriteAnalysis {
            original_text: "hey there".into(),
            rewritten_text: "Good afternoon.".into(),
            style,
            explanation: Explanation::default(),
        }
    }

    fn styles() -> Vec<RewriteStyle> {
        vec![
            RewriteStyle::Casual,
            RewriteStyle::Formal,
            RewriteStyle::Narrative,
            RewriteStyle::Academic,
        ]
    }

    fn analysed_manager() -> SessionManager {
        let mut mgr = SessionManager::new();
        mgr.set_input("He goes.");
        let (ticket, _) = mgr.start_analysis().unwrap();
        mgr.on_analysis_done(ticket.generation, analysis(), styles())
            .unwrap();
        mgr
    }

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
        assert_eq!(*SessionManager::new().state(), SessionState::Idle);
    }

    #[test]
    fn test_idle_to_loading() {
        let mut mgr = SessionManager::new();
        mgr.set_input("text");
        let (ticket, t) = mgr.start_analysis().unwrap();
        assert_eq!(t.prev_state, "idle");
        assert_eq!(t.new_state, SessionState::Loading);
        assert_eq!(
            ticket.request,
            PendingRequest::Analysis {
                text: "text".into()
            }
        );
    }

    #[test]
    fn test_empty_input_does_not_start() {
        let mut mgr = SessionManager::new();
        mgr.set_input("   \n");
        assert!(mgr.start_analysis().is_err());
        assert!(mgr.start_rewrite(RewriteStyle::Casual).is_err());
        assert_eq!(*mgr.state(), SessionState::Idle);
    }

    #[test]
    fn test_analysis_success_offers_quick_rewrite() {
        let mgr = analysed_manager();
        assert_eq!(*mgr.state(), SessionState::Success);
        assert!(mgr.grammar_result().is_some());
        assert_eq!(mgr.quick_rewrite().styles.len(), 4);
        assert_eq!(mgr.quick_rewrite().phase(), QuickRewritePhase::Offered);
    }

    #[test]
    fn test_rewrite_success_has_no_quick_rewrite() {
        let mut mgr = SessionManager::new();
        mgr.set_input("hey there");
        let (ticket, _) = mgr.start_rewrite(RewriteStyle::Formal).unwrap();
        mgr.on_rewrite_done(ticket.generation, rewrite(RewriteStyle::Formal))
            .unwrap();
        assert_eq!(*mgr.state(), SessionState::Success);
        assert_eq!(mgr.quick_rewrite().phase(), QuickRewritePhase::Inactive);
    }

    #[test]
    fn test_new_request_clears_previous_results() {
        let mut mgr = analysed_manager();
        mgr.start_rewrite(RewriteStyle::Casual).unwrap();
        assert!(mgr.grammar_result().is_none());
        assert!(mgr.rewrite_result().is_none());
        assert_eq!(*mgr.quick_rewrite(), QuickRewriteState::default());
    }

    #[test]
    fn test_stale_result_discarded() {
        let mut mgr = SessionManager::new();
        mgr.set_input("first");
        let (old, _) = mgr.start_analysis().unwrap();
        mgr.set_input("second");
        let (new, _) = mgr.start_analysis().unwrap();

        assert!(mgr.on_analysis_done(old.generation, analysis(), styles()).is_none());
        assert_eq!(*mgr.state(), SessionState::Loading);
        assert!(mgr.on_analysis_done(new.generation, analysis(), styles()).is_some());
    }

    #[test]
    fn test_stop_discards_in_flight_result() {
        let mut mgr = SessionManager::new();
        mgr.set_input("text");
        let (ticket, _) = mgr.start_analysis().unwrap();
        let t = mgr.stop().unwrap();
        assert_eq!(t.new_state, SessionState::Idle);
        assert!(mgr.on_analysis_done(ticket.generation, analysis(), styles()).is_none());
        assert_eq!(*mgr.state(), SessionState::Idle);
        assert!(mgr.stop().is_err());
    }

    #[test]
    fn test_failure_then_retry() {
        let mut mgr = SessionManager::new();
        mgr.set_input("text");
        let (ticket, _) = mgr.start_analysis().unwrap();
        let err: AppError = AnalysisError::NetworkFailure("reset".into()).into();
        let t = mgr.on_request_failed(ticket.generation, &err).unwrap();
        assert_eq!(t.new_state.as_str(), "error");
        assert!(mgr.grammar_result().is_none());

        // 再試行可能
        let (ticket, t) = mgr.start_analysis().unwrap();
        assert_eq!(t.prev_state, "error");
        assert!(mgr.on_analysis_done(ticket.generation, analysis(), styles()).is_some());
    }

    #[test]
    fn test_error_recovery() {
        let mut mgr = SessionManager::new();
        mgr.set_input("text");
        let (ticket, _) = mgr.start_analysis().unwrap();
        mgr.on_request_failed(ticket.generation, &AppError::invalid_state("x"));
        let t = mgr.recover_from_error().unwrap();
        assert_eq!(t.new_state, SessionState::Idle);
        assert!(mgr.recover_from_error().is_err());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut mgr = analysed_manager();
        let t = mgr.clear();
        assert_eq!(t.new_state, SessionState::Idle);
        assert_eq!(mgr.input_text(), "");
        assert!(mgr.grammar_result().is_none());
        assert_eq!(mgr.quick_rewrite().phase(), QuickRewritePhase::Inactive);
    }

    #[test]
    fn test_retry_rewrite_reuses_style_and_text() {
        let mut mgr = SessionManager::new();
        mgr.set_input("hey there");
        let (ticket, _) = mgr.start_rewrite(RewriteStyle::Persuasive).unwrap();
        mgr.on_rewrite_done(ticket.generation, rewrite(RewriteStyle::Persuasive));
        mgr.set_input("edited afterwards");

        let (retry, t) = mgr.retry_rewrite().unwrap();
        assert_eq!(t.prev_state, "success");
        assert_eq!(
            retry.request,
            PendingRequest::Rewrite {
                text: "hey there".into(),
                style: RewriteStyle::Persuasive
            }
        );
    }

    #[test]
    fn test_retry_rewrite_requires_rewrite_result() {
        let mut mgr = analysed_manager();
        assert!(mgr.retry_rewrite().is_err());
        assert_eq!(*mgr.state(), SessionState::Success);
    }

    #[test]
    fn test_quick_rewrite_locks_first_choice() {
        let mut mgr = analysed_manager();
        let ticket = mgr.select_quick_style(RewriteStyle::Casual).unwrap();
        assert_eq!(ticket.text, "He goes.");
        assert_eq!(
            mgr.quick_rewrite().phase(),
            QuickRewritePhase::Loading(RewriteStyle::Casual)
        );

        assert!(mgr.on_quick_rewrite_done(&ticket, "He's going.".into()));
        assert_eq!(
            mgr.quick_rewrite().phase(),
            QuickRewritePhase::Locked(RewriteStyle::Casual)
        );

        let before = mgr.quick_rewrite().clone();
        assert!(mgr.select_quick_style(RewriteStyle::Formal).is_none());
        assert!(mgr.select_quick_style(RewriteStyle::Casual).is_none());
        assert_eq!(*mgr.quick_rewrite(), before);
    }

    #[test]
    fn test_quick_rewrite_unlocks_on_new_analysis() {
        let mut mgr = analysed_manager();
        let ticket = mgr.select_quick_style(RewriteStyle::Casual).unwrap();
        mgr.on_quick_rewrite_done(&ticket, "done".into());

        let (next, _) = mgr.start_analysis().unwrap();
        mgr.on_analysis_done(next.generation, analysis(), styles());
        assert_eq!(mgr.quick_rewrite().phase(), QuickRewritePhase::Offered);
        assert!(mgr.select_quick_style(RewriteStyle::Formal).is_some());
    }

    #[test]
    fn test_quick_rewrite_failure_returns_to_offered() {
        let mut mgr = analysed_manager();
        let ticket = mgr.select_quick_style(RewriteStyle::Formal).unwrap();
        assert!(mgr.on_quick_rewrite_failed(&ticket));
        assert_eq!(mgr.quick_rewrite().phase(), QuickRewritePhase::Offered);
        assert_eq!(*mgr.state(), SessionState::Success);
        assert!(mgr.select_quick_style(RewriteStyle::Narrative).is_some());
    }

    #[test]
    fn test_quick_rewrite_ignores_selection_while_loading() {
        let mut mgr = analysed_manager();
        mgr.select_quick_style(RewriteStyle::Formal).unwrap();
        assert!(mgr.select_quick_style(RewriteStyle::Casual).is_none());
    }

    #[test]
    fn test_quick_rewrite_rejects_unoffered_style() {
        let mut mgr = analysed_manager();
        assert!(mgr.select_quick_style(RewriteStyle::Creative).is_none());
    }

    #[test]
    fn test_stop_quick_rewrite_discards_late_result() {
        let mut mgr = analysed_manager();
        let ticket = mgr.select_quick_style(RewriteStyle::Academic).unwrap();
        assert!(mgr.stop_quick_rewrite());
        assert_eq!(mgr.quick_rewrite().phase(), QuickRewritePhase::Offered);

        assert!(!mgr.on_quick_rewrite_done(&ticket, "late".into()));
        assert!(mgr.quick_rewrite().result.is_none());
        assert!(!mgr.stop_quick_rewrite());
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut mgr = analysed_manager();
        mgr.set_color_scheme(AppColor::Rose);
        let snapshot = mgr.snapshot();
        assert_eq!(snapshot.input_text, "He goes.");
        assert_eq!(snapshot.color_scheme, AppColor::Rose);

        let mut restored = SessionManager::new();
        restored.restore(snapshot, styles());
        assert_eq!(*restored.state(), SessionState::Success);
        assert_eq!(restored.grammar_result(), mgr.grammar_result());
        assert_eq!(restored.quick_rewrite().phase(), QuickRewritePhase::Offered);

        let mut empty = SessionManager::new();
        empty.restore(PersistedAppState::default(), styles());
        assert_eq!(*empty.state(), SessionState::Idle);
        assert_eq!(empty.quick_rewrite().phase(), QuickRewritePhase::Inactive);
    }
}
