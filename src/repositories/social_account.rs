use sqlx::PgPool;
use uuid::Uuid;

use crate::models::SocialAccount;
use crate::repositories::SocialAccountStore;

#[derive(Clone)]
pub struct SocialAccountRepository {
    pool: PgPool,
}

impl SocialAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SocialAccountStore for SocialAccountRepository {
    async fn find_by_provider(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<SocialAccount>, sqlx::Error> {
        sqlx::query_as::<_, SocialAccount>(
            r#"
            SELECT id, user_id, provider, provider_user_id, created_at
            FROM social_accounts
            WHERE provider = $1 AND provider_user_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn link(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<SocialAccount, sqlx::Error> {
        sqlx::query_as::<_, SocialAccount>(
            r#"
            INSERT INTO social_accounts (user_id, provider, provider_user_id)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, provider, provider_user_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_user_id)
        .fetch_one(&self.pool)
        .await
    }
}
