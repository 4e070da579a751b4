/// Background task implementations
use crate::{context::AppContext, error::ApiResult};

/// Delete session tokens that are both revoked and expired
pub async fn purge_expired_tokens(ctx: &AppContext) -> ApiResult<u64> {
    ctx.account_manager.tokens().purge_expired().await
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> ApiResult<()> {
    crate::db::test_connection(&ctx.db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{account::TokenStore, test_support::test_context};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_purge_removes_only_revoked_expired() {
        let ctx = test_context().await;
        let mut conn = ctx.db.acquire().await.unwrap();
        sqlx::query("INSERT INTO account (name, created_at, updated_at) VALUES ('ana', ?1, ?1)")
            .bind(Utc::now())
            .execute(&mut *conn)
            .await
            .unwrap();
        let past = Some(Utc::now() - Duration::hours(1));
        TokenStore::create(&mut conn, 1, "old-revoked", past).await.unwrap();
        TokenStore::create(&mut conn, 1, "old-active", past).await.unwrap();
        drop(conn);

        ctx.account_manager.tokens().revoke_by_token("old-revoked").await.unwrap();

        assert_eq!(purge_expired_tokens(&ctx).await.unwrap(), 1);
        assert_eq!(purge_expired_tokens(&ctx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_health_check_passes() {
        let ctx = test_context().await;
        assert!(health_check(&ctx).await.is_ok());
    }
}
