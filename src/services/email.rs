use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;

/// メール送信サービス
///
/// `email` フィーチャー有効かつSMTP設定済みの場合のみ実際に送信する。
/// それ以外は宛先のみログに出力する（本文に含まれるトークン平文は出力しない）。
#[derive(Clone)]
pub struct EmailService {
    config: Arc<Config>,
}

impl EmailService {
    /// 新しい EmailService を作成
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// 登録完了・アカウント有効化メールを送信
    pub async fn send_welcome_email(
        &self,
        to: &str,
        name: &str,
        activation_token: &str,
    ) -> Result<(), AppError> {
        let body = format!(
            "{name} さん\n\n\
             ご登録ありがとうございます。\n\
             以下のトークンを PUT /api/users/activated に送信してアカウントを有効化してください。\n\n\
             {{\"token\": \"{activation_token}\"}}\n\n\
             このトークンは一度きりの利用で、期限が過ぎると無効になります。\n"
        );
        self.deliver(to, "アカウント有効化のお知らせ", body).await
    }

    /// パスワードリセットメールを送信
    pub async fn send_password_reset_email(
        &self,
        to: &str,
        reset_token: &str,
    ) -> Result<(), AppError> {
        let body = format!(
            "パスワードリセットのリクエストを受け付けました。\n\
             以下のトークンと新しいパスワードを PUT /api/users/password に送信してください。\n\n\
             {{\"token\": \"{reset_token}\", \"password\": \"新しいパスワード\"}}\n\n\
             心当たりがない場合はこのメールを破棄してください。\n"
        );
        self.deliver(to, "パスワードリセットのご案内", body).await
    }

    fn smtp_configured(&self) -> bool {
        self.config.smtp_host.is_some()
            && self.config.smtp_username.is_some()
            && self.config.smtp_password.is_some()
            && self.config.smtp_from_address.is_some()
    }

    #[cfg(not(feature = "email"))]
    async fn deliver(&self, to: &str, subject: &str, _body: String) -> Result<(), AppError> {
        // 開発モード: メール送信せずログ出力のみ
        tracing::info!(
            to = %to,
            subject = %subject,
            smtp_configured = self.smtp_configured(),
            "メール送信（開発モード）"
        );
        Ok(())
    }

    #[cfg(feature = "email")]
    async fn deliver(&self, to: &str, subject: &str, body: String) -> Result<(), AppError> {
        use anyhow::Context;
        use lettre::message::header::ContentType;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
        use secrecy::ExposeSecret;

        if !self.smtp_configured() {
            tracing::info!(to = %to, subject = %subject, "SMTP未設定のため送信をスキップ");
            return Ok(());
        }

        let (Some(host), Some(username), Some(password), Some(from)) = (
            &self.config.smtp_host,
            &self.config.smtp_username,
            &self.config.smtp_password,
            &self.config.smtp_from_address,
        ) else {
            return Ok(());
        };

        let message = Message::builder()
            .from(from.parse().context("invalid sender address")?)
            .to(to.parse().context("invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .context("failed to build email")?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .context("failed to configure SMTP relay")?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            ))
            .build();

        mailer.send(message).await.context("SMTP send failed")?;

        tracing::info!(to = %to, subject = %subject, "メール送信完了");
        Ok(())
    }
}
