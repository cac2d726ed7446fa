use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

/// アクセストークンの purpose クレーム
const PURPOSE_ACCESS: &str = "access";
/// 2FAチャレンジトークンの purpose クレーム
///
/// アクセストークンと区別するための必須マーカー。2FA完了エンドポイント
/// 以外でチャレンジトークンを受理してはならない（逆も同様）
const PURPOSE_TWO_FACTOR: &str = "2fa";

/// ステートレストークンのクレーム
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// ユーザーID
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// トークン種別（access / 2fa）
    pub purpose: String,
    /// 「ログイン状態を保持」フラグ（2FAチャレンジトークンのみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
}

/// トークンコーデック
///
/// アクセストークンと2FAチャレンジトークンの発行・検証を行う。
/// 完全にステートレスで、検証は署名と有効期限のチェックのみ。
/// DB には一切アクセスしない。
///
/// # Security
/// - アクセストークンは失効不可のため有効期間は分単位に抑える
/// - トークン平文はログに出力しない
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    temp_ttl_secs: i64,
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl_secs: i64, temp_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs,
            temp_ttl_secs,
        }
    }

    /// アクセストークンを発行
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue(user_id, PURPOSE_ACCESS, self.access_ttl_secs, None)
    }

    /// 2FAチャレンジトークンを発行
    ///
    /// 第一要素成功から2FA完了までの橋渡しにのみ使う短命トークン
    pub fn issue_temp_token(&self, user_id: Uuid, remember: bool) -> Result<String, AppError> {
        self.issue(
            user_id,
            PURPOSE_TWO_FACTOR,
            self.temp_ttl_secs,
            Some(remember),
        )
    }

    /// アクセストークンを検証し、ユーザーIDを返す
    ///
    /// purpose が access でないトークン（2FAチャレンジトークン等）は拒否
    pub fn validate_access_token(&self, token: &str) -> Result<Uuid, AppError> {
        let claims = self.decode(token).map_err(|_| AppError::Unauthorized)?;

        if claims.purpose != PURPOSE_ACCESS {
            tracing::warn!("アクセストークン検証失敗: purpose 不一致");
            return Err(AppError::Unauthorized);
        }

        Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)
    }

    /// 2FAチャレンジトークンを検証し、(ユーザーID, rememberフラグ) を返す
    ///
    /// 署名・期限・purpose のいずれかが不正なら一律 `InvalidCredentials`
    /// （アクセストークンやリフレッシュシークレットの誤提示を含む）
    pub fn validate_temp_token(&self, token: &str) -> Result<(Uuid, bool), AppError> {
        let claims = self
            .decode(token)
            .map_err(|_| AppError::InvalidCredentials)?;

        if claims.purpose != PURPOSE_TWO_FACTOR {
            tracing::warn!("2FAチャレンジトークン検証失敗: purpose 不一致");
            return Err(AppError::InvalidCredentials);
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidCredentials)?;

        Ok((user_id, claims.remember.unwrap_or(false)))
    }

    fn issue(
        &self,
        user_id: Uuid,
        purpose: &str,
        ttl_secs: i64,
        remember: Option<bool>,
    ) -> Result<String, AppError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + ttl_secs,
            purpose: purpose.to_string(),
            remember,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(
            |e| {
                tracing::error!(error = ?e, "トークン発行エラー");
                AppError::Internal(anyhow::anyhow!("token encode error"))
            },
        )
    }

    fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
    }
}

/// 32バイトのリフレッシュシークレットを生成（Base64 URL-safe、パディングなし）
pub fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// リフレッシュシークレットのSHA-256ハッシュ（16進文字列）
///
/// DB に保存するのはこの値のみで、平文は保存しない
pub fn hash_refresh_secret(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> TokenService {
        TokenService::new(b"test-signing-secret", 900, 300)
    }

    #[test]
    fn test_access_token_roundtrip() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        let token = service.issue_access_token(user_id).unwrap();
        let validated = service.validate_access_token(&token).unwrap();

        assert_eq!(validated, user_id);
    }

    #[test]
    fn test_temp_token_roundtrip_carries_remember() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        let token = service.issue_temp_token(user_id, true).unwrap();
        let (validated, remember) = service.validate_temp_token(&token).unwrap();

        assert_eq!(validated, user_id);
        assert!(remember);

        let token = service.issue_temp_token(user_id, false).unwrap();
        let (_, remember) = service.validate_temp_token(&token).unwrap();
        assert!(!remember);
    }

    #[test]
    fn test_temp_token_rejected_as_access_token() {
        // 2FAチャレンジトークンをアクセストークンとして提示しても拒否される
        let service = test_service();
        let token = service.issue_temp_token(Uuid::new_v4(), false).unwrap();

        assert!(matches!(
            service.validate_access_token(&token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_access_token_rejected_as_temp_token() {
        let service = test_service();
        let token = service.issue_access_token(Uuid::new_v4()).unwrap();

        assert!(matches!(
            service.validate_temp_token(&token),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        // TTL が負 = 発行時点で期限切れ
        let service = TokenService::new(b"test-signing-secret", -10, -10);
        let user_id = Uuid::new_v4();

        let access = service.issue_access_token(user_id).unwrap();
        assert!(service.validate_access_token(&access).is_err());

        let temp = service.issue_temp_token(user_id, false).unwrap();
        assert!(matches!(
            service.validate_temp_token(&temp),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_token_signed_with_other_secret_rejected() {
        let service = test_service();
        let other = TokenService::new(b"other-secret", 900, 300);

        let token = other.issue_access_token(Uuid::new_v4()).unwrap();
        assert!(service.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let service = test_service();
        assert!(service.validate_access_token("not-a-jwt").is_err());
        assert!(service.validate_temp_token("not-a-jwt").is_err());
    }

    #[test]
    fn test_refresh_secret_is_url_safe() {
        let secret = generate_refresh_secret();
        // 32バイト → Base64 URL-safe 43文字
        assert_eq!(secret.len(), 43);
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_refresh_secret_hash_is_deterministic() {
        let secret = generate_refresh_secret();
        assert_eq!(hash_refresh_secret(&secret), hash_refresh_secret(&secret));
        assert_ne!(
            hash_refresh_secret(&secret),
            hash_refresh_secret("other-secret")
        );
    }
}
