use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use time::{Duration, OffsetDateTime};

use crate::error::AppError;
use crate::models::token::{Scope, Token, digest};
use crate::repositories::TokenStore;

/// 乱数バイト数（Base32 パディングなしで26文字になる）
const TOKEN_ENTROPY_BYTES: usize = 16;

/// 平文トークンのバイト長（Base32 は ASCII なので文字数と一致する）
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

/// トークン生成器
///
/// 乱数源は clone 間で共有され、呼び出しごとに状態が進む。
#[derive(Debug)]
pub struct TokenGenerator<R = OsRng> {
    rng: Arc<Mutex<R>>,
}

impl<R> Clone for TokenGenerator<R> {
    fn clone(&self) -> Self {
        Self {
            rng: self.rng.clone(),
        }
    }
}

impl Default for TokenGenerator<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator<OsRng> {
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }
}

impl<R> TokenGenerator<R>
where
    R: RngCore + CryptoRng + Send,
{
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// 新しいトークンを生成（保存はしない）
    ///
    /// # Errors
    /// 乱数源がエントロピーを供給できない場合は `AppError::RandomSource`（リトライしない）
    pub fn generate(&self, owner_id: i64, ttl: Duration, scope: Scope) -> Result<Token, AppError> {
        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_fill_bytes(&mut bytes)
            .map_err(|e| {
                tracing::error!(error = %e, "トークン用乱数の取得に失敗");
                AppError::RandomSource(e)
            })?;

        let plaintext = BASE32_NOPAD.encode(&bytes);
        let hash = digest(&plaintext);

        Ok(Token {
            plaintext,
            hash,
            owner_id,
            expiry: OffsetDateTime::now_utc() + ttl,
            scope,
        })
    }
}

/// 入力検証の違反内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub message: &'static str,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// 平文トークンの形式チェック
///
/// DBに問い合わせる前に不正な入力を弾く。長さはバイト数で判定する。
/// フィールドごとに最初の違反のみを返す。
pub fn validate_plaintext(candidate: &str) -> Vec<Violation> {
    let mut violations = Vec::new();
    if candidate.is_empty() {
        violations.push(Violation {
            field: "token",
            message: "トークンは必須です",
        });
    } else if candidate.len() != TOKEN_PLAINTEXT_LEN {
        violations.push(Violation {
            field: "token",
            message: "トークンは26バイトである必要があります",
        });
    }
    violations
}

/// トークンの発行・照合・失効をまとめたサービス
#[derive(Clone)]
pub struct TokenService {
    generator: TokenGenerator,
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            generator: TokenGenerator::new(),
            store,
        }
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        self.store.clone()
    }

    /// トークンを生成して保存
    ///
    /// # Security
    /// 返却されたトークンの平文はログに出力しないこと
    pub async fn issue(
        &self,
        owner_id: i64,
        ttl: Duration,
        scope: Scope,
    ) -> Result<Token, AppError> {
        let token = self.generator.generate(owner_id, ttl, scope)?;
        self.store.insert(&token).await?;

        tracing::info!(owner_id, scope = %scope, expiry = %token.expiry, "トークン発行");

        Ok(token)
    }

    /// 平文トークンを検証し、所有者IDを返す
    pub async fn authenticate(&self, scope: Scope, plaintext: &str) -> Result<i64, AppError> {
        let violations = validate_plaintext(plaintext);
        if !violations.is_empty() {
            let message = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AppError::Validation(message));
        }

        self.store.get_owner_for_token(scope, plaintext).await
    }

    /// 指定スコープの所有者のトークンをすべて失効
    pub async fn revoke_all(&self, scope: Scope, owner_id: i64) -> Result<(), AppError> {
        self.store.delete_all_for_scope(scope, owner_id).await
    }
}
