use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// 2FA バックアップコード（ハッシュのみ保存）
///
/// used_at が設定されたコードは再利用不可
#[derive(Debug, Clone, FromRow)]
pub struct BackupCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}
