use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// セッション作成時に記録するデバイス情報
///
/// User-Agent からのベストエフォート推定で、表示専用のメタデータ。
/// 認可判断には一切使用しないこと。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
}

/// リフレッシュトークンに対応するセッションレコード
///
/// トークン平文は保存せず SHA-256 ハッシュのみ保持する。
/// revoked_at が設定されたレコードは終端状態で、再有効化されない。
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub last_used_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
    pub revoked_reason: Option<String>,
}

impl Session {
    /// 失効済みでなく、有効期限内かどうか
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            browser: self.browser.clone(),
            os: self.os.clone(),
            device_type: self.device_type.clone(),
            ip_address: self.ip_address.clone(),
        }
    }
}

/// セッション作成の入力
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub device: DeviceInfo,
    pub expires_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn test_session(
        revoked_at: Option<OffsetDateTime>,
        expires_at: OffsetDateTime,
    ) -> Session {
        let now = OffsetDateTime::now_utc();
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "hash".to_string(),
            browser: None,
            os: None,
            device_type: None,
            ip_address: None,
            created_at: now,
            expires_at,
            last_used_at: now,
            revoked_at,
            revoked_reason: revoked_at.map(|_| "logout".to_string()),
        }
    }

    #[test]
    fn test_active_session() {
        let now = OffsetDateTime::now_utc();
        let session = test_session(None, now + Duration::days(7));
        assert!(session.is_active(now));
    }

    #[test]
    fn test_expired_session_is_not_active() {
        let now = OffsetDateTime::now_utc();
        let session = test_session(None, now - Duration::seconds(1));
        assert!(!session.is_active(now));
    }

    #[test]
    fn test_revoked_session_is_not_active() {
        // 有効期限内でも失効済みなら非アクティブ（終端状態）
        let now = OffsetDateTime::now_utc();
        let session = test_session(Some(now), now + Duration::days(7));
        assert!(!session.is_active(now));
    }
}
