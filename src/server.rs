use std::future::Future;
use std::net::SocketAddr;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::handlers;
use crate::shutdown::{ShutdownCoordinator, Tracker, shutdown_signal, track_in_flight};
use crate::state::AppState;

/// Router の構築
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        // ユーザー管理
        .route("/api/users", post(handlers::register))
        .route("/api/users/activated", put(handlers::activate))
        .route("/api/users/me", get(handlers::current_user))
        .route("/api/users/password", put(handlers::reset_password))
        // トークン
        .route(
            "/api/tokens/authentication",
            post(handlers::create_authentication_token)
                .delete(handlers::revoke_authentication_tokens),
        )
        .route(
            "/api/tokens/password-reset",
            post(handlers::request_password_reset),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 処理中リクエストの計数を Router に組み込む
pub fn with_request_tracking(router: Router, requests: Tracker) -> Router {
    router.layer(middleware::from_fn_with_state(requests, track_in_flight))
}

/// バインド済みのリスナーで accept ループを回す
///
/// `coordinator` が停止を指示すると新規接続の受け付けを止める。
pub async fn serve_listener(
    listener: TcpListener,
    app: Router,
    coordinator: ShutdownCoordinator,
) -> Result<(), AppError> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { coordinator.stop_accepting().await })
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "サーバーエラー");
            AppError::Internal(anyhow::anyhow!("Server error: {}", e))
        })
}

/// バインドから始まる accept ループ
///
/// バインド失敗もこのループの異常終了として扱う。
pub fn accept_loop(
    addr: SocketAddr,
    app: Router,
    coordinator: ShutdownCoordinator,
) -> impl Future<Output = Result<(), AppError>> + Send + 'static {
    async move {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
            AppError::Internal(anyhow::anyhow!("Failed to bind to {}: {}", addr, e))
        })?;

        serve_listener(listener, app, coordinator).await
    }
}

/// サーバーを起動し、シャットダウン完了まで待つ
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), AppError> {
    let coordinator =
        ShutdownCoordinator::new(state.config.drain_timeout(), state.background.tracker());
    let environment = state.config.environment.clone();
    let app = with_request_tracking(create_router(state), coordinator.requests());

    tracing::info!(addr = %addr, env = %environment, "サーバー起動");

    coordinator
        .run(
            accept_loop(addr, app, coordinator.clone()),
            shutdown_signal(),
        )
        .await?;

    tracing::info!(addr = %addr, "サーバー停止");

    Ok(())
}
