use std::future::Future;

use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::shutdown::Tracker;

/// 呼び出し元のリクエストとは独立して動くバックグラウンドタスクの実行役
///
/// タスクのエラーやパニックはログに記録するだけで、呼び出し元には伝播しない。
/// 実行中のタスクは `Tracker` で数え、シャットダウン時のドレイン対象にする。
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: Tracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }

    /// タスクを切り離して実行
    ///
    /// 返り値の `JoinHandle` は待たなくてよい（主にテスト用）
    pub fn spawn<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let guard = self.tracker.enter();

        tokio::spawn(async move {
            let _guard = guard;

            // 内側のタスクでパニックしても外側で捕捉できるよう二段で spawn する
            match tokio::spawn(task).await {
                Ok(Ok(())) => {
                    tracing::debug!(task = name, "バックグラウンドタスク完了");
                }
                Ok(Err(e)) => {
                    tracing::error!(task = name, error = ?e, "バックグラウンドタスクが失敗");
                }
                Err(e) if e.is_panic() => {
                    tracing::error!(task = name, "バックグラウンドタスクがパニック");
                }
                Err(e) => {
                    tracing::error!(task = name, error = %e, "バックグラウンドタスクが中断");
                }
            }
        })
    }
}
