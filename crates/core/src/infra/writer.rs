use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::error::AppError;
use crate::domain::settings::AppSettings;

/// スナップショットの書き込み先
pub trait SnapshotSink<T>: Send + Sync {
    fn write(&self, value: &T) -> Result<(), AppError>;
}

/// 書き込みを合流させるデバウンスライター（trailing-edge）
///
/// `window` 内に続いた変更は最後の値1回の書き込みにまとまる。
/// 変更が続いても最初の変更から `max_wait` 経過で必ず書き込む。
/// Tokio ランタイム外から呼ばれた場合は即時に書き込む。
pub struct CoalescingWriter<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    sink: Arc<dyn SnapshotSink<T>>,
    window: Duration,
    max_wait: Duration,
    state: Mutex<Pending<T>>,
    wake: Notify,
}

struct Pending<T> {
    value: Option<T>,
    first_at: Option<Instant>,
    deadline: Option<Instant>,
    worker_running: bool,
}

impl<T: Send + 'static> CoalescingWriter<T> {
    pub fn new(sink: Arc<dyn SnapshotSink<T>>, window: Duration, max_wait: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                window,
                max_wait: max_wait.max(window),
                state: Mutex::new(Pending {
                    value: None,
                    first_at: None,
                    deadline: None,
                    worker_running: false,
                }),
                wake: Notify::new(),
            }),
        }
    }

    pub fn from_settings(sink: Arc<dyn SnapshotSink<T>>, settings: &AppSettings) -> Self {
        Self::new(
            sink,
            Duration::from_millis(settings.snapshot_debounce_ms),
            Duration::from_millis(settings.snapshot_max_wait_ms),
        )
    }

    /// 値を書き込み予約する。未書き込みの古い値は置き換えられる。
    pub fn schedule(&self, value: T) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.write_now(value);
            return;
        };

        let spawn_worker = {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let first_at = *state.first_at.get_or_insert(now);
            state.deadline = Some((now + self.shared.window).min(first_at + self.shared.max_wait));
            state.value = Some(value);
            if state.worker_running {
                false
            } else {
                state.worker_running = true;
                true
            }
        };

        if spawn_worker {
            handle.spawn(run_worker(self.shared.clone()));
        } else {
            self.shared.wake.notify_one();
        }
    }

    /// 予約中の値を直ちに書き込む
    pub fn flush(&self) -> Result<(), AppError> {
        let value = {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.first_at = None;
            state.deadline = None;
            state.value.take()
        };
        self.shared.wake.notify_one();
        match value {
            Some(value) => self.shared.sink.write(&value),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .value
            .is_some()
    }

    fn write_now(&self, value: T) {
        if let Err(e) = self.shared.sink.write(&value) {
            log::warn!("スナップショット書き込み失敗: {e}");
        }
    }
}

async fn run_worker<T: Send + 'static>(shared: Arc<Shared<T>>) {
    loop {
        let deadline = {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.deadline {
                Some(d) => d,
                None => {
                    state.worker_running = false;
                    return;
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = shared.wake.notified() => continue,
        }

        let due = {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.deadline {
                Some(d) if d <= Instant::now() => {
                    state.first_at = None;
                    state.deadline = None;
                    state.value.take()
                }
                _ => None,
            }
        };

        if let Some(value) = due {
            if let Err(e) = shared.sink.write(&value) {
                log::warn!("スナップショット書き込み失敗: {e}");
            }
        }
    }
}
