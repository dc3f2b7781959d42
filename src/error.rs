use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("認証エラー: {0}")]
    Authentication(String),

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("タイムアウト: {0}")]
    Timeout(&'static str),

    #[error("乱数源からエントロピーを取得できません")]
    RandomSource(#[from] rand::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    /// 未知・期限切れ・スコープ違いのトークンをすべてこのエラーで表す
    #[error("トークンが見つかりません")]
    TokenNotFound,

    #[error("認証トークンが無効です")]
    InvalidAuthenticationToken,

    #[error("アカウントが有効化されていません")]
    InactiveAccount,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "メールアドレスまたはパスワードが正しくありません".to_string(),
            ),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Timeout(operation) => {
                tracing::error!(operation = %operation, "ストレージ操作がタイムアウト");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "一時的に処理できません。しばらくしてから再試行してください".to_string(),
                )
            }
            Self::RandomSource(e) => {
                tracing::error!(error = %e, "乱数生成エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::EmailAlreadyExists => (
                StatusCode::CONFLICT,
                "このメールアドレスは既に使用されています".to_string(),
            ),
            Self::TokenNotFound => (
                StatusCode::BAD_REQUEST,
                "無効なリクエストです".to_string(), // 存在有無の漏洩防止
            ),
            Self::InvalidAuthenticationToken => {
                let body = Json(ErrorResponse {
                    error: "認証トークンが無効または期限切れです".to_string(),
                });
                let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            Self::InactiveAccount => (
                StatusCode::FORBIDDEN,
                "このリソースにアクセスするにはアカウントの有効化が必要です".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_authentication_token_sets_www_authenticate() {
        let response = AppError::InvalidAuthenticationToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_timeout_maps_to_service_unavailable() {
        let response = AppError::Timeout("tokens.insert").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_token_not_found_does_not_leak_reason() {
        let response = AppError::TokenNotFound.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
