use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::authenticated::Authenticated;
use crate::models::token::{Scope, Token};
use crate::state::AppState;

/// 認証トークン発行リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub authentication_token: Token,
}

#[derive(Debug, Serialize)]
pub struct RevokeTokensResponse {
    pub message: String,
}

/// 認証トークン発行ハンドラー
///
/// POST /api/tokens/authentication
///
/// 返却されるトークン平文はこのレスポンスでのみ渡される。
pub async fn create_authentication_token(
    State(state): State<AppState>,
    Json(request): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<CreateTokenResponse>), AppError> {
    validate_create_token_request(&request)?;

    let user = state
        .auth_service()
        .authenticate(&request.email, &request.password)
        .await?;

    let token = state
        .tokens
        .issue(
            user.id,
            state.config.authentication_token_ttl(),
            Scope::Authentication,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            authentication_token: token,
        }),
    ))
}

/// ログアウトハンドラー
///
/// DELETE /api/tokens/authentication
///
/// 呼び出し元の認証トークンをすべて失効させる。
pub async fn revoke_authentication_tokens(
    State(state): State<AppState>,
    caller: Authenticated,
) -> Result<Json<RevokeTokensResponse>, AppError> {
    state
        .tokens
        .revoke_all(Scope::Authentication, caller.user_id)
        .await?;

    tracing::info!(user_id = caller.user_id, "ログアウト完了");

    Ok(Json(RevokeTokensResponse {
        message: "ログアウトしました".to_string(),
    }))
}

/// 認証トークン発行リクエストのバリデーション
fn validate_create_token_request(request: &CreateTokenRequest) -> Result<(), AppError> {
    if request.email.trim().is_empty() || !request.email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    if request.password.is_empty() {
        return Err(AppError::Validation("パスワードは必須です".to_string()));
    }
    Ok(())
}
