use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::Deserialize;

use crate::error::AppError;

/// Google OAuth URLs
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

pub const PROVIDER_GOOGLE: &str = "google";

/// OAuth プロバイダーから取得した検証済みユーザー情報
#[derive(Debug, Clone)]
pub struct OAuthUserInfo {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfoResponse {
    id: String,
    email: String,
    name: Option<String>,
}

/// Google OAuth サービス
///
/// # Security
/// - client_secret はログに出力しない
/// - state パラメータは AES-256-GCM で暗号化したランダムnonce
///   （復号成功 = 自サーバー発行の state であることの検証、CSRF 対策）
#[derive(Clone)]
pub struct GoogleOAuthService {
    client_id: String,
    /// クライアントシークレット（機密情報 - ログ出力禁止）
    client_secret: std::sync::Arc<String>,
    redirect_uri: String,
    state_encryption_key: [u8; 32],
    http_client: reqwest::Client,
}

impl GoogleOAuthService {
    /// # Arguments
    /// * `state_secret_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        state_secret_base64: &str,
    ) -> Result<Self, AppError> {
        let key_bytes = URL_SAFE_NO_PAD
            .decode(state_secret_base64)
            .or_else(|_| {
                // URL_SAFE でデコード失敗した場合、STANDARD を試す
                base64::engine::general_purpose::STANDARD.decode(state_secret_base64)
            })
            .map_err(|e| {
                tracing::error!(error = ?e, "OAuth state暗号化キーのBase64デコードエラー");
                AppError::Internal(anyhow::anyhow!("invalid state encryption key format"))
            })?;

        if key_bytes.len() != 32 {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "OAuth state暗号化キーの長さが不正"
            );
            return Err(AppError::Internal(anyhow::anyhow!(
                "state encryption key must be 32 bytes"
            )));
        }

        let mut state_encryption_key = [0u8; 32];
        state_encryption_key.copy_from_slice(&key_bytes);

        Ok(Self {
            client_id,
            client_secret: std::sync::Arc::new(client_secret),
            redirect_uri,
            state_encryption_key,
            http_client: reqwest::Client::new(),
        })
    }

    /// Google OAuth 認可 URL を生成
    ///
    /// state にはランダムnonceを暗号化して埋め込む
    pub fn generate_auth_url(&self) -> Result<String, AppError> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let state = self.encrypt_state(&hex::encode(nonce))?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", &state),
            ("access_type", "online"),
            ("prompt", "select_account"),
        ];

        let url = reqwest::Url::parse_with_params(GOOGLE_AUTH_URL, &params).map_err(|e| {
            tracing::error!(error = ?e, "OAuth認可URL生成エラー");
            AppError::Internal(anyhow::anyhow!("failed to generate auth url"))
        })?;

        Ok(url.to_string())
    }

    /// コールバックの state パラメータを検証
    ///
    /// 復号に失敗する state は自サーバー発行ではない
    pub fn verify_state(&self, state: &str) -> Result<(), AppError> {
        self.decrypt_state(state).map(|_| ())
    }

    /// 認可コードを検証済みユーザー情報に交換
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthUserInfo, AppError> {
        let access_token = self.fetch_access_token(code).await?;
        self.fetch_user_info(&access_token).await
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String, AppError> {
        // application/x-www-form-urlencoded 形式で body を構築
        let body = format!(
            "client_id={}&client_secret={}&code={}&grant_type=authorization_code&redirect_uri={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(self.client_secret.as_str()),
            urlencoding::encode(code),
            urlencoding::encode(&self.redirect_uri),
        );

        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Googleトークンエンドポイント通信エラー");
                AppError::OAuthProviderError
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "Googleトークン交換エラー");
            return Err(AppError::OAuthError(format!(
                "token exchange failed: {}",
                status
            )));
        }

        let token_response: GoogleTokenResponse = response.json().await.map_err(|e| {
            tracing::error!(error = ?e, "Googleトークンレスポンスのパースエラー");
            AppError::OAuthError("invalid token response".to_string())
        })?;

        Ok(token_response.access_token)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<OAuthUserInfo, AppError> {
        let response = self
            .http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Google userinfo API通信エラー");
                AppError::OAuthProviderError
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "Google userinfo取得エラー");
            return Err(AppError::OAuthError(format!(
                "userinfo request failed: {}",
                status
            )));
        }

        let user_info: GoogleUserInfoResponse = response.json().await.map_err(|e| {
            tracing::error!(error = ?e, "Google userinfoレスポンスのパースエラー");
            AppError::OAuthError("invalid userinfo response".to_string())
        })?;

        Ok(OAuthUserInfo {
            id: user_info.id,
            email: user_info.email,
            name: user_info.name,
        })
    }

    /// 値を AES-256-GCM で暗号化し、Base64 URL-safe エンコード
    fn encrypt_state(&self, value: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.state_encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        // 96ビット (12バイト) のランダム nonce 生成
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, value.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "state暗号化エラー");
            AppError::Internal(anyhow::anyhow!("state encryption error"))
        })?;

        let mut result = Vec::with_capacity(12 + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(result))
    }

    fn decrypt_state(&self, state: &str) -> Result<String, AppError> {
        let data = URL_SAFE_NO_PAD
            .decode(state)
            .map_err(|_| AppError::OAuthStateInvalid)?;

        if data.len() < 12 {
            return Err(AppError::OAuthStateInvalid);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.state_encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let (nonce_bytes, ciphertext) = data.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::OAuthStateInvalid)?;

        String::from_utf8(plaintext).map_err(|_| AppError::OAuthStateInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn create_test_service() -> GoogleOAuthService {
        let key_base64 = STANDARD.encode([0u8; 32]);
        GoogleOAuthService::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            "http://localhost:3000/auth/oauth/google/callback".to_string(),
            &key_base64,
        )
        .unwrap()
    }

    #[test]
    fn test_generate_auth_url() {
        let service = create_test_service();
        let url = service.generate_auth_url().unwrap();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("state="));
    }

    #[test]
    fn test_state_roundtrip() {
        let service = create_test_service();
        let state = service.encrypt_state("nonce-value").unwrap();

        assert!(service.verify_state(&state).is_ok());
        assert_eq!(service.decrypt_state(&state).unwrap(), "nonce-value");
    }

    #[test]
    fn test_tampered_state_rejected() {
        let service = create_test_service();
        let state = service.encrypt_state("nonce-value").unwrap();

        // 末尾1文字改変で認証タグ検証に失敗する
        let mut tampered = state[..state.len() - 1].to_string();
        tampered.push(if state.ends_with('A') { 'B' } else { 'A' });

        assert!(matches!(
            service.verify_state(&tampered),
            Err(AppError::OAuthStateInvalid)
        ));
    }

    #[test]
    fn test_garbage_state_rejected() {
        let service = create_test_service();
        assert!(service.verify_state("not-base64!!!").is_err());
        assert!(service.verify_state("c2hvcnQ").is_err()); // 12バイト未満
    }

    #[test]
    fn test_new_with_invalid_key_length() {
        let short_key = STANDARD.encode([0u8; 16]);
        let result = GoogleOAuthService::new(
            "id".to_string(),
            "secret".to_string(),
            "http://localhost".to_string(),
            &short_key,
        );
        assert!(result.is_err());
    }
}
