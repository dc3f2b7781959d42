use std::sync::Arc;

use sqlx::PgPool;

use crate::background::BackgroundTasks;
use crate::config::Config;
use crate::repositories::{TokenRepository, TokenStore, UserRepository};
use crate::services::{AuthService, EmailService, PasswordResetService, TokenService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// ユーザーリポジトリ
    pub user_repo: UserRepository,
    /// トークンの発行・照合
    pub tokens: TokenService,
    /// メールサービス
    pub email_service: EmailService,
    /// 切り離して実行するタスク（メール送信など）
    pub background: BackgroundTasks,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Self {
        let token_store = Arc::new(TokenRepository::new(
            db_pool.clone(),
            config.store_timeout(),
        ));
        Self::with_token_store(db_pool, config, token_store)
    }

    /// トークンストアを差し替えて AppState を作成
    pub fn with_token_store(
        db_pool: PgPool,
        config: Config,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let config = Arc::new(config);
        let user_repo = UserRepository::new(db_pool, config.store_timeout());
        let tokens = TokenService::new(token_store);
        let email_service = EmailService::new(config.clone());

        Self {
            config,
            user_repo,
            tokens,
            email_service,
            background: BackgroundTasks::new(),
        }
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.user_repo.clone())
    }

    pub fn password_reset_service(&self) -> PasswordResetService {
        PasswordResetService::new(
            self.user_repo.clone(),
            self.tokens.clone(),
            self.email_service.clone(),
            self.background.clone(),
            self.config.clone(),
        )
    }
}
