use sqlx::PgPool;
use uuid::Uuid;

use crate::models::BackupCode;
use crate::repositories::BackupCodeStore;

#[derive(Clone)]
pub struct BackupCodeRepository {
    pool: PgPool,
}

impl BackupCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl BackupCodeStore for BackupCodeRepository {
    /// 既存コードの破棄と新バッチの登録を1トランザクションで実行
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        code_hashes: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for code_hash in code_hashes {
            sqlx::query(
                r#"
                INSERT INTO backup_codes (user_id, code_hash)
                VALUES ($1, $2)
                "#,
            )
            .bind(user_id)
            .bind(code_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// 未使用の場合のみ使用済みにする
    ///
    /// 条件付き1行更新。同一コードを2つのリクエストが同時に提示しても
    /// 消費に成功するのは一方だけ
    async fn consume(&self, user_id: Uuid, code_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE backup_codes
            SET used_at = NOW()
            WHERE user_id = $1 AND code_hash = $2 AND used_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(code_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<BackupCode>, sqlx::Error> {
        sqlx::query_as::<_, BackupCode>(
            r#"
            SELECT id, user_id, code_hash, used_at, created_at
            FROM backup_codes
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
