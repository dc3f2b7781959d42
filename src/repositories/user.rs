use std::time::Duration;

use sqlx::PgPool;

use crate::error::AppError;
use crate::models::User;
use crate::repositories::with_deadline;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
    timeout: Duration,
}

impl UserRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// メールアドレスでユーザーを検索
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, activated, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool);

        with_deadline(self.timeout, "users.find_by_email", query).await
    }

    /// ユーザーIDでユーザーを検索
    pub async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let query = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, activated, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool);

        with_deadline(self.timeout, "users.find_by_id", query).await
    }

    /// 新しいユーザーを作成（未有効化状態）
    ///
    /// # Errors
    /// - UNIQUE制約違反時: `AppError::Database` (constraint = "users_email_key")
    ///   呼び出し側で `AppError::EmailAlreadyExists` に変換すること
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let query = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, FALSE)
            RETURNING id, name, email, password_hash, activated, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool);

        with_deadline(self.timeout, "users.create_user", query).await
    }

    /// ユーザーを有効化
    pub async fn activate(&self, user_id: i64) -> Result<User, AppError> {
        let query = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET activated = TRUE
            WHERE id = $1
            RETURNING id, name, email, password_hash, activated, created_at
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool);

        with_deadline(self.timeout, "users.activate", query).await
    }

    /// ユーザーのパスワードを更新
    ///
    /// # Note
    /// password_hash はログに出力しないこと
    pub async fn update_password(
        &self,
        user_id: i64,
        new_password_hash: &str,
    ) -> Result<(), AppError> {
        let query = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&self.pool);

        with_deadline(self.timeout, "users.update_password", query).await?;
        Ok(())
    }
}
