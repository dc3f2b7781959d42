use axum::{Json, extract::State, http::StatusCode};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::User;
use crate::models::token::Scope;
use crate::services::auth::hash_password;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(length(min = 1, max = 500))]
    pub name: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 8, max = 72))]
    pub password: String, // SecretBox不要（Deserialize後すぐハッシュ化）
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
}

/// ユーザー登録ハンドラー
///
/// POST /api/users
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. ユーザー作成（未有効化）
/// 3. 有効化トークン発行
/// 4. 有効化メールをバックグラウンドで送信
///
/// # Security
/// - パスワードはログに出力しない
/// - パスワードは即座にハッシュ化
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    // 1. リクエストバリデーション
    request
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;

    let password_hash = hash_password(&request.password)?;

    // 2. ユーザー作成
    let user = state
        .user_repo
        .create_user(&request.name, &request.email, &password_hash)
        .await
        .map_err(|e| {
            // UNIQUE制約違反チェック
            if let AppError::Database(sqlx::Error::Database(db_err)) = &e
                && db_err.constraint() == Some("users_email_key")
            {
                return AppError::EmailAlreadyExists;
            }
            e
        })?;

    tracing::info!(user_id = user.id, "ユーザー登録成功");

    // 3. 有効化トークン発行
    let token = state
        .tokens
        .issue(user.id, state.config.activation_token_ttl(), Scope::Activation)
        .await?;

    // 4. メール送信はレスポンスを待たせない
    let email_service = state.email_service.clone();
    let (to, name) = (user.email.clone(), user.name.clone());
    state.background.spawn("welcome_email", async move {
        email_service
            .send_welcome_email(&to, &name, &token.plaintext)
            .await
    });

    Ok((StatusCode::ACCEPTED, Json(RegisterResponse { user })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validate_empty_name() {
        assert!(request("", "test@example.com", "password123").validate().is_err());
    }

    #[test]
    fn test_validate_invalid_email() {
        assert!(request("Alice", "invalid-email", "password123").validate().is_err());
    }

    #[test]
    fn test_validate_short_password() {
        assert!(request("Alice", "test@example.com", "short").validate().is_err());
    }

    #[test]
    fn test_validate_valid_request() {
        assert!(request("Alice", "test@example.com", "password123").validate().is_ok());
    }
}
