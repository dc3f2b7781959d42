//! Graceful shutdown の調停
//!
//! 状態遷移:
//!
//! ```text
//! Running ──signal──▶ ShutdownRequested ──▶ Draining ──▶ Stopped
//!    │
//!    └──accept ループ異常終了──▶ FailedImmediate
//! ```
//!
//! シグナル待機はリクエスト処理と並行して動き、ドレイン結果は
//! 一度だけ書き込まれる oneshot チャネルでメイン経路へ渡される。
//!
//! ドレインの完了は accept ループ自身の終了で判定する。axum の graceful
//! shutdown は全接続がレスポンスを書き終えて閉じるまで戻らないため、
//! ハンドラーが返っただけの段階では完了扱いにならない。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShutdownRequested,
    Draining,
    Stopped,
    FailedImmediate,
}

/// 進行中の処理数を数える
///
/// `enter()` が返すガードを drop すると減算される。
#[derive(Clone, Debug)]
pub struct Tracker {
    count: Arc<watch::Sender<usize>>,
}

impl Default for Tracker {
    fn default() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> TrackerGuard {
        self.count.send_modify(|n| *n += 1);
        TrackerGuard {
            count: self.count.clone(),
        }
    }

    pub fn active(&self) -> usize {
        *self.count.borrow()
    }

    /// 進行中の処理が0件になるまで待つ
    pub async fn idle(&self) {
        let mut rx = self.count.subscribe();
        // Sender は self が保持しているので Err にはならない
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[must_use]
pub struct TrackerGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n -= 1);
    }
}

/// 処理中リクエストを数えるミドルウェア
///
/// ログ出力用。ドレインの完了判定には使わない。
pub async fn track_in_flight(
    State(requests): State<Tracker>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = requests.enter();
    next.run(request).await
}

/// シャットダウン調停役
#[derive(Clone)]
pub struct ShutdownCoordinator {
    state: Arc<watch::Sender<ShutdownState>>,
    requests: Tracker,
    background: Tracker,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// # Arguments
    /// * `drain_timeout` - 既存接続とバックグラウンドタスクの完了を待つ上限
    /// * `background` - ドレイン時に合わせて完了を待つバックグラウンドタスク
    pub fn new(drain_timeout: Duration, background: Tracker) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state: Arc::new(state),
            requests: Tracker::new(),
            background,
            drain_timeout,
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// リクエスト数のトラッカー（`track_in_flight` の State に渡す）
    pub fn requests(&self) -> Tracker {
        self.requests.clone()
    }

    /// 新規接続の受け付けを止めるべき時点で完了する
    ///
    /// axum の `with_graceful_shutdown` に渡す。
    pub async fn stop_accepting(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| {
                matches!(state, ShutdownState::Draining | ShutdownState::Stopped)
            })
            .await;
    }

    /// `from` の状態にある場合のみ `to` へ遷移する
    fn advance(&self, from: ShutdownState, to: ShutdownState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// accept ループとシグナル待機を並行に走らせ、プロセスを終了してよい時点で返る
    ///
    /// - accept ループが停止要求なしに終了した場合はドレインを待たず即座にエラーを返す
    /// - 停止要求による終了の場合は、ドレイン結果がチャネルに届くまで待つ
    pub async fn run<A, S>(&self, accept_loop: A, signal: S) -> Result<(), AppError>
    where
        A: Future<Output = Result<(), AppError>> + Send + 'static,
        S: Future<Output = &'static str> + Send + 'static,
    {
        let accept = tokio::spawn(accept_loop);
        let (exited_tx, exited_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        tokio::spawn(self.clone().drain_on_signal(
            signal,
            accept.abort_handle(),
            exited_rx,
            outcome_tx,
        ));

        let exited = accept.await;

        if self.advance(ShutdownState::Running, ShutdownState::FailedImmediate) {
            let err = match exited {
                Ok(Err(e)) => e,
                Ok(Ok(())) => AppError::Internal(anyhow::anyhow!(
                    "accept loop exited without a shutdown request"
                )),
                Err(e) => AppError::Internal(anyhow::anyhow!("accept loop task failed: {e}")),
            };
            tracing::error!(error = ?err, "accept ループが異常終了");
            return Err(err);
        }

        match &exited {
            Ok(Err(e)) => tracing::error!(error = ?e, "ドレイン中に accept ループがエラー終了"),
            Err(e) if e.is_panic() => tracing::error!("ドレイン中に accept ループがパニック"),
            _ => {}
        }
        // 停止要求後の終了はドレイン側へ伝え、結果はそちらに任せる
        let _ = exited_tx.send(true);

        match outcome_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::Internal(anyhow::anyhow!(
                "shutdown outcome was never published"
            ))),
        }
    }

    /// シグナル受信後のドレイン
    ///
    /// accept ループは `stop_accepting` を受けて新規接続を止め、既存の接続が
    /// すべて閉じた時点で終了する。その終了とバックグラウンドタスクの完了を
    /// `drain_timeout` まで待ち、超過した場合のみ accept ループを打ち切る。
    async fn drain_on_signal<S>(
        self,
        signal: S,
        accept_loop: AbortHandle,
        mut accept_exited: watch::Receiver<bool>,
        outcome: oneshot::Sender<Result<(), AppError>>,
    ) where
        S: Future<Output = &'static str>,
    {
        let signal = signal.await;

        // 既に FailedImmediate ならメイン経路はチャネルを待っていない
        if !self.advance(ShutdownState::Running, ShutdownState::ShutdownRequested) {
            return;
        }
        tracing::info!(signal, "シャットダウンシグナルを受信");

        self.advance(ShutdownState::ShutdownRequested, ShutdownState::Draining);
        tracing::info!(
            in_flight = self.requests.active(),
            background = self.background.active(),
            drain_timeout = ?self.drain_timeout,
            "新規受付を停止し、接続の終了を待機"
        );

        let drained = async {
            // Sender が drop された場合も終了済みとみなす
            let _ = accept_exited.wait_for(|exited| *exited).await;
            self.background.idle().await;
        };

        let result = match tokio::time::timeout(self.drain_timeout, drained).await {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::error!(
                    in_flight = self.requests.active(),
                    background = self.background.active(),
                    "ドレインがタイムアウト"
                );
                // 残った接続ごと打ち切る
                accept_loop.abort();
                Err(AppError::Timeout("drain"))
            }
        };

        self.advance(ShutdownState::Draining, ShutdownState::Stopped);

        let _ = outcome.send(result);
    }
}

/// SIGINT / SIGTERM を待機し、受信したシグナル名を返す
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
