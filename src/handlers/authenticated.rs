use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};

use crate::error::AppError;
use crate::models::token::Scope;
use crate::state::AppState;

/// `Authorization: Bearer <token>` で認証された呼び出し元
///
/// ヘッダーなし・形式不正・未知・期限切れ・スコープ違いはすべて 401 になる。
#[derive(Debug, Clone, Copy)]
pub struct Authenticated {
    pub user_id: i64,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(&parts.headers).ok_or(AppError::InvalidAuthenticationToken)?;

        let user_id = state
            .tokens
            .authenticate(Scope::Authentication, token)
            .await
            .map_err(|e| match e {
                AppError::TokenNotFound | AppError::Validation(_) => {
                    AppError::InvalidAuthenticationToken
                }
                other => other,
            })?;

        Ok(Self { user_id })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}
