use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::User;
use crate::models::token::Scope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub user: User,
}

/// アカウント有効化ハンドラー
///
/// PUT /api/users/activated
///
/// 処理フロー:
/// 1. トークン形式チェック（DB問い合わせ前）
/// 2. 有効化トークンから所有者を特定
/// 3. ユーザーを有効化
/// 4. そのユーザーの有効化トークンをすべて削除
pub async fn activate(
    State(state): State<AppState>,
    Json(request): Json<ActivateRequest>,
) -> Result<Json<ActivateResponse>, AppError> {
    let user_id = state
        .tokens
        .authenticate(Scope::Activation, &request.token)
        .await
        .map_err(|e| match e {
            AppError::TokenNotFound => {
                AppError::Validation("無効または期限切れの有効化トークンです".to_string())
            }
            other => other,
        })?;

    let user = state.user_repo.activate(user_id).await?;

    state.tokens.revoke_all(Scope::Activation, user_id).await?;

    tracing::info!(user_id, "アカウント有効化完了");

    Ok(Json(ActivateResponse { user }))
}
