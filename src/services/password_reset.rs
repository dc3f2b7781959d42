use std::sync::Arc;

use crate::background::BackgroundTasks;
use crate::config::Config;
use crate::error::AppError;
use crate::models::token::Scope;
use crate::repositories::UserRepository;
use crate::services::{EmailService, TokenService, auth::hash_password};

/// パスワードリセットサービス
#[derive(Clone)]
pub struct PasswordResetService {
    user_repo: UserRepository,
    tokens: TokenService,
    email_service: EmailService,
    background: BackgroundTasks,
    config: Arc<Config>,
}

impl PasswordResetService {
    /// 新しい PasswordResetService を作成
    pub fn new(
        user_repo: UserRepository,
        tokens: TokenService,
        email_service: EmailService,
        background: BackgroundTasks,
        config: Arc<Config>,
    ) -> Self {
        Self {
            user_repo,
            tokens,
            email_service,
            background,
            config,
        }
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない・未有効化の場合も常に成功を返す（情報漏洩防止）
    /// - トークン（平文）はログに出力しない
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let user = match self.user_repo.find_by_email(email).await? {
            Some(u) if u.activated => u,
            Some(u) => {
                tracing::info!(user_id = u.id, "パスワードリセット: 未有効化ユーザー（成功レスポンス返却）");
                return Ok(());
            }
            None => {
                tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
                return Ok(());
            }
        };

        let token = self
            .tokens
            .issue(
                user.id,
                self.config.password_reset_token_ttl(),
                Scope::PasswordReset,
            )
            .await?;

        // メール送信はリクエストから切り離す
        let email_service = self.email_service.clone();
        let to = user.email;
        self.background.spawn("password_reset_email", async move {
            email_service
                .send_password_reset_email(&to, &token.plaintext)
                .await
        });

        Ok(())
    }

    /// パスワードをリセット
    ///
    /// 成功後、リセット用と認証用のトークンをすべて失効させる。
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let user_id = self
            .tokens
            .authenticate(Scope::PasswordReset, token)
            .await
            .map_err(|e| match e {
                AppError::TokenNotFound => AppError::Validation(
                    "無効または期限切れのパスワードリセットトークンです".to_string(),
                ),
                other => other,
            })?;

        let password_hash = hash_password(new_password)?;
        self.user_repo
            .update_password(user_id, &password_hash)
            .await?;

        self.tokens.revoke_all(Scope::PasswordReset, user_id).await?;
        self.tokens
            .revoke_all(Scope::Authentication, user_id)
            .await?;

        tracing::info!(user_id, "パスワードリセット完了");

        Ok(())
    }
}
