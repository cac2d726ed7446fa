use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewSession, Session};
use crate::repositories::SessionStore;

const COLUMNS: &str = "id, user_id, token_hash, browser, os, device_type, ip_address, \
                       created_at, expires_at, last_used_at, revoked_at, revoked_reason";

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SessionStore for SessionRepository {
    async fn create(&self, input: NewSession) -> Result<Session, sqlx::Error> {
        let query = format!(
            "INSERT INTO sessions
                 (user_id, token_hash, browser, os, device_type, ip_address, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(input.user_id)
            .bind(&input.token_hash)
            .bind(&input.device.browser)
            .bind(&input.device.os)
            .bind(&input.device.device_type)
            .bind(&input.device.ip_address)
            .bind(input.expires_at)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE token_hash = $1");
        sqlx::query_as::<_, Session>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE id = $1");
        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_active_by_user(&self, user_id: Uuid) -> Result<Vec<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE user_id = $1
               AND revoked_at IS NULL
               AND expires_at > NOW()
             ORDER BY last_used_at DESC"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    /// 未失効の場合のみ失効させる
    ///
    /// 条件付き1行更新なので、並行リクエストで成功するのは一方だけ
    async fn revoke(&self, id: Uuid, reason: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = NOW(), revoked_reason = $2
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_by_token_hash(
        &self,
        token_hash: &str,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = NOW(), revoked_reason = $2
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token_hash)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, reason: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = NOW(), revoked_reason = $2
            WHERE user_id = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// ローテーション: 旧レコードの失効と新レコードの作成を1トランザクションで実行
    ///
    /// 旧レコードの失効が条件付き更新で空振りした場合（= 別のリクエストが
    /// 先にローテーション済み）は何も作成せず None
    async fn rotate(&self, old_id: Uuid, new: NewSession) -> Result<Option<Session>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = NOW(), revoked_reason = 'rotated'
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(old_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let query = format!(
            "INSERT INTO sessions
                 (user_id, token_hash, browser, os, device_type, ip_address, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(new.user_id)
            .bind(&new.token_hash)
            .bind(&new.device.browser)
            .bind(&new.device.os)
            .bind(&new.device.device_type)
            .bind(&new.device.ip_address)
            .bind(new.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(session))
    }

    /// 期限切れ・失効済みレコードを削除
    ///
    /// # Returns
    /// 削除された行数
    async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW() OR revoked_at IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
