use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::token::{Scope, Token, digest};
use crate::repositories::with_deadline;

/// トークンの永続化インターフェース
///
/// 保存されるのはダイジェストのみで、平文は受け取った時点でハッシュ化する。
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// `(hash, owner_id, expiry, scope)` を保存
    ///
    /// 重複チェックは行わない（ハッシュ衝突はバックエンド側の異常として扱う）
    async fn insert(&self, token: &Token) -> Result<(), AppError>;

    /// スコープと所有者が一致するトークンをすべて削除
    ///
    /// 該当行が0件でも成功とする
    async fn delete_all_for_scope(&self, scope: Scope, owner_id: i64) -> Result<(), AppError>;

    /// 平文トークンから所有者IDを引く
    ///
    /// # Errors
    /// 未知・期限切れ・スコープ違いはすべて `AppError::TokenNotFound`
    async fn get_owner_for_token(&self, scope: Scope, plaintext: &str) -> Result<i64, AppError>;

    /// 期限切れトークンを削除
    ///
    /// # Returns
    /// 削除された行数
    async fn delete_expired(&self) -> Result<u64, AppError>;
}

/// PostgreSQL の `tokens` テーブルに対する実装
#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
    timeout: Duration,
}

impl TokenRepository {
    /// `timeout` は各クエリに適用される期限
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl TokenStore for TokenRepository {
    async fn insert(&self, token: &Token) -> Result<(), AppError> {
        let query = sqlx::query(
            r#"
            INSERT INTO tokens (hash, owner_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(token.hash.as_slice())
        .bind(token.owner_id)
        .bind(token.expiry)
        .bind(token.scope.as_str())
        .execute(&self.pool);

        with_deadline(self.timeout, "tokens.insert", query).await?;
        Ok(())
    }

    async fn delete_all_for_scope(&self, scope: Scope, owner_id: i64) -> Result<(), AppError> {
        let query = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE scope = $1 AND owner_id = $2
            "#,
        )
        .bind(scope.as_str())
        .bind(owner_id)
        .execute(&self.pool);

        let result = with_deadline(self.timeout, "tokens.delete_all_for_scope", query).await?;
        tracing::debug!(
            scope = %scope,
            owner_id,
            rows = result.rows_affected(),
            "トークン一括削除"
        );
        Ok(())
    }

    async fn get_owner_for_token(&self, scope: Scope, plaintext: &str) -> Result<i64, AppError> {
        let hash = digest(plaintext);

        let query = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT owner_id
            FROM tokens
            WHERE hash = $1
            AND scope = $2
            AND expiry > $3
            "#,
        )
        .bind(hash.as_slice())
        .bind(scope.as_str())
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.pool);

        with_deadline(self.timeout, "tokens.get_owner_for_token", query)
            .await?
            .ok_or(AppError::TokenNotFound)
    }

    async fn delete_expired(&self) -> Result<u64, AppError> {
        let query = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE expiry <= NOW()
            "#,
        )
        .execute(&self.pool);

        let result = with_deadline(self.timeout, "tokens.delete_expired", query).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::collections::hash_map::Entry;
    use std::sync::Mutex;

    use super::*;
    use crate::models::token::TokenHash;

    struct Row {
        owner_id: i64,
        expiry: OffsetDateTime,
        scope: Scope,
    }

    impl Row {
        // SQL の `expiry > $now` と同じ判定（expiry ちょうどは無効）
        fn is_live_at(&self, now: OffsetDateTime) -> bool {
            self.expiry > now
        }
    }

    /// テスト用のインメモリ実装（`tokens` テーブルと同じ述語・制約で動く）
    #[derive(Default)]
    pub(crate) struct MemoryTokenStore {
        rows: Mutex<HashMap<TokenHash, Row>>,
        frozen_now: Option<OffsetDateTime>,
    }

    impl MemoryTokenStore {
        /// 現在時刻を `now` に固定したストア
        pub(crate) fn frozen_at(now: OffsetDateTime) -> Self {
            Self {
                rows: Mutex::default(),
                frozen_now: Some(now),
            }
        }

        pub(crate) fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub(crate) fn contains(&self, hash: &TokenHash) -> bool {
            self.rows.lock().unwrap().contains_key(hash)
        }

        fn now(&self) -> OffsetDateTime {
            self.frozen_now.unwrap_or_else(OffsetDateTime::now_utc)
        }
    }

    #[async_trait]
    impl TokenStore for MemoryTokenStore {
        async fn insert(&self, token: &Token) -> Result<(), AppError> {
            match self.rows.lock().unwrap().entry(token.hash) {
                // 主キー違反と同じく上書きせずにエラーにする
                Entry::Occupied(_) => Err(AppError::Database(sqlx::Error::Protocol(
                    "duplicate key value violates unique constraint \"tokens_pkey\"".to_string(),
                ))),
                Entry::Vacant(slot) => {
                    slot.insert(Row {
                        owner_id: token.owner_id,
                        expiry: token.expiry,
                        scope: token.scope,
                    });
                    Ok(())
                }
            }
        }

        async fn delete_all_for_scope(
            &self,
            scope: Scope,
            owner_id: i64,
        ) -> Result<(), AppError> {
            self.rows
                .lock()
                .unwrap()
                .retain(|_, row| !(row.scope == scope && row.owner_id == owner_id));
            Ok(())
        }

        async fn get_owner_for_token(
            &self,
            scope: Scope,
            plaintext: &str,
        ) -> Result<i64, AppError> {
            let now = self.now();
            self.rows
                .lock()
                .unwrap()
                .get(&digest(plaintext))
                .filter(|row| row.scope == scope && row.is_live_at(now))
                .map(|row| row.owner_id)
                .ok_or(AppError::TokenNotFound)
        }

        async fn delete_expired(&self) -> Result<u64, AppError> {
            let now = self.now();
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, row| row.is_live_at(now));
            Ok((before - rows.len()) as u64)
        }
    }

    mod tests {
        use time::Duration;

        use super::*;
        use crate::models::token::digest;

        fn token_expiring_at(plaintext: &str, expiry: OffsetDateTime) -> Token {
            Token {
                plaintext: plaintext.to_string(),
                hash: digest(plaintext),
                owner_id: 42,
                expiry,
                scope: Scope::Authentication,
            }
        }

        #[tokio::test]
        async fn test_expiry_equal_to_now_is_not_found() {
            let now = OffsetDateTime::UNIX_EPOCH + Duration::days(20_000);
            let store = MemoryTokenStore::frozen_at(now);

            let at_now = token_expiring_at("AAAAAAAAAAAAAAAAAAAAAAAAAA", now);
            let just_after = token_expiring_at(
                "BBBBBBBBBBBBBBBBBBBBBBBBBB",
                now + Duration::nanoseconds(1),
            );
            store.insert(&at_now).await.unwrap();
            store.insert(&just_after).await.unwrap();

            let result = store
                .get_owner_for_token(Scope::Authentication, &at_now.plaintext)
                .await;
            assert!(matches!(result, Err(AppError::TokenNotFound)));

            let owner = store
                .get_owner_for_token(Scope::Authentication, &just_after.plaintext)
                .await
                .unwrap();
            assert_eq!(owner, 42);

            // 照合で無効なものだけが削除対象になる
            assert_eq!(store.delete_expired().await.unwrap(), 1);
            assert!(!store.contains(&at_now.hash));
            assert!(store.contains(&just_after.hash));
        }

        #[tokio::test]
        async fn test_duplicate_hash_is_rejected() {
            let store = MemoryTokenStore::default();
            let expiry = OffsetDateTime::now_utc() + Duration::hours(1);
            let first = token_expiring_at("CCCCCCCCCCCCCCCCCCCCCCCCCC", expiry);
            let mut second = first.clone();
            second.owner_id = 7;

            store.insert(&first).await.unwrap();
            let result = store.insert(&second).await;

            assert!(matches!(result, Err(AppError::Database(_))));
            assert_eq!(store.len(), 1);
            let owner = store
                .get_owner_for_token(Scope::Authentication, &first.plaintext)
                .await
                .unwrap();
            assert_eq!(owner, 42);
        }
    }
}
