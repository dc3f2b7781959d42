//! 期限切れトークンの定期削除
//!
//! 有効性は照合時の `expiry > now` で判定しているため、このジョブは
//! ストレージの掃除のみを担い、照合結果には影響しない。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::repositories::TokenStore;

/// 削除ジョブを起動（起動時に一度だけ呼ぶ）
pub fn spawn(tokens: Arc<dyn TokenStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match tokens.delete_expired().await {
                Ok(0) => {}
                Ok(rows) => tracing::info!(rows, "期限切れトークンを削除"),
                Err(e) => tracing::error!(error = ?e, "期限切れトークンの削除に失敗"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use ::time::Duration as TtlDuration;

    use super::*;
    use crate::models::token::Scope;
    use crate::repositories::token::memory::MemoryTokenStore;
    use crate::services::TokenGenerator;

    #[tokio::test(start_paused = true)]
    async fn test_removes_only_expired_tokens() {
        let store = Arc::new(MemoryTokenStore::default());
        let generator = TokenGenerator::new();

        let expired = generator
            .generate(1, TtlDuration::seconds(-60), Scope::Authentication)
            .unwrap();
        let live = generator
            .generate(1, TtlDuration::hours(1), Scope::Authentication)
            .unwrap();
        store.insert(&expired).await.unwrap();
        store.insert(&live).await.unwrap();

        let job = spawn(store.clone(), Duration::from_secs(60));
        // 初回 tick は即時に発火する
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!store.contains(&expired.hash));
        assert!(store.contains(&live.hash));
        assert_eq!(store.len(), 1);

        job.abort();
    }
}
