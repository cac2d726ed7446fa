use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    /// ソーシャルログインのみのユーザーは NULL
    #[serde(skip)]
    pub password_hash: Option<String>,
    /// AES-256-GCM で暗号化された TOTP シークレット（未設定なら NULL）
    #[serde(skip)]
    pub totp_secret_encrypted: Option<Vec<u8>>,
    pub totp_enabled: bool,
    /// ログインで最後に受理したTOTPタイムステップ（リプレイ防止）
    #[serde(skip)]
    pub totp_last_used_step: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
