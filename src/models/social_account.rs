use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ソーシャルログイン連携（プロバイダー + 外部ID でユーザーに紐付く）
#[derive(Debug, Clone, FromRow)]
pub struct SocialAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_user_id: String,
    pub created_at: OffsetDateTime,
}
