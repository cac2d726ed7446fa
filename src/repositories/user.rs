use sqlx::PgPool;
use uuid::Uuid;

use crate::models::User;
use crate::repositories::UserStore;

const COLUMNS: &str = "id, email, name, password_hash, totp_secret_encrypted, totp_enabled, \
                       totp_last_used_step, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserStore for UserRepository {
    /// メールアドレスでユーザーを検索
    ///
    /// # Note
    /// メールアドレスは保存前に小文字へ正規化されるため、完全一致で検索する
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// 新しいユーザーを作成
    ///
    /// # Errors
    /// - UNIQUE制約違反時: `sqlx::Error::Database` (constraint = "users_email_key")
    ///   呼び出し側で `AppError::EmailTaken` に変換すること
    async fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, name, password_hash)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .bind(name)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await
    }

    async fn create_social_user(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, name, password_hash)
             VALUES ($1, $2, NULL)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .bind(name)
            .fetch_one(&self.pool)
            .await
    }

    async fn set_totp_secret(
        &self,
        user_id: Uuid,
        secret_encrypted: &[u8],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET totp_secret_encrypted = $2, totp_enabled = false,
                totp_last_used_step = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(secret_encrypted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn enable_totp(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET totp_enabled = true, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_totp(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET totp_secret_encrypted = NULL, totp_enabled = false,
                totp_last_used_step = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 前回受理したステップより新しい場合のみ記録する
    ///
    /// 条件付き1行更新なので、同一コードの並行提示で成功するのは一方だけ
    async fn consume_totp_step(&self, user_id: Uuid, step: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET totp_last_used_step = $2, updated_at = NOW()
            WHERE id = $1
              AND (totp_last_used_step IS NULL OR totp_last_used_step < $2)
            "#,
        )
        .bind(user_id)
        .bind(step)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
