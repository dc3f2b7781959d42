use axum::{Json, extract::State};
use serde::Serialize;

use crate::error::AppError;
use crate::handlers::authenticated::Authenticated;
use crate::models::User;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user: User,
}

/// 認証済みユーザー情報ハンドラー
///
/// GET /api/users/me
///
/// 有効化済みのユーザーのみアクセス可能。
pub async fn current_user(
    State(state): State<AppState>,
    caller: Authenticated,
) -> Result<Json<CurrentUserResponse>, AppError> {
    let user = state
        .user_repo
        .find_by_id(caller.user_id)
        .await?
        // トークンは残っているがユーザーが削除されている
        .ok_or(AppError::InvalidAuthenticationToken)?;

    if !user.activated {
        return Err(AppError::InactiveAccount);
    }

    Ok(Json(CurrentUserResponse { user }))
}
