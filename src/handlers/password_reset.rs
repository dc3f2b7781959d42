use axum::{Json, extract::State, http::StatusCode};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// === リセットリクエスト ===

#[derive(Debug, Deserialize, Validate)]
pub struct ResetRequestRequest {
    #[garde(email)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ResetRequestResponse {
    pub message: String,
}

/// POST /api/tokens/password-reset
///
/// # Security
/// 常に202を返す（ユーザー存在有無を漏洩しない）
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequestRequest>,
) -> Result<(StatusCode, Json<ResetRequestResponse>), AppError> {
    request
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;

    // リセット処理（ユーザー不在でもエラーにしない）
    state
        .password_reset_service()
        .request_reset(&request.email)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ResetRequestResponse {
            message: "パスワードリセット手順をメールで送信しました".to_string(),
        }),
    ))
}

// === パスワードリセット実行 ===

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    // 形式チェックは TokenService 側で行う
    #[garde(skip)]
    pub token: String,
    #[garde(length(min = 8, max = 72))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub message: String,
}

/// PUT /api/users/password
///
/// # Security
/// - token, password はログに出力しない
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    request
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;

    state
        .password_reset_service()
        .reset_password(&request.token, &request.password)
        .await?;

    Ok(Json(ResetPasswordResponse {
        message: "パスワードが更新されました".to_string(),
    }))
}
