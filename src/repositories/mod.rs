pub mod token;
pub mod user;

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

pub use token::{TokenRepository, TokenStore};
pub use user::UserRepository;

/// クエリに期限を設ける
///
/// 期限を超えた場合は `AppError::Timeout` を返し、劣化したDBに呼び出し側が
/// 無期限にブロックされないようにする。
pub(crate) async fn with_deadline<T, F>(
    deadline: Duration,
    operation: &'static str,
    query: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(deadline, query).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => {
            tracing::warn!(operation, deadline = ?deadline, "ストレージ操作が期限を超過");
            Err(AppError::Timeout(operation))
        }
    }
}
