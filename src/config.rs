use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;

/// Cookie の SameSite 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// 実行環境（development / production）
    /// production では Cookie の Secure がデフォルトで有効になる
    #[serde(default = "default_environment")]
    pub environment: String,

    // トークン設定
    /// アクセストークン・2FAチャレンジトークンの署名シークレット
    pub token_secret: SecretBox<String>,
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: i64,
    /// 2FAチャレンジトークンの有効期間（分単位のオーダー、時間単位にしないこと）
    #[serde(default = "default_temp_token_ttl_secs")]
    pub temp_token_ttl_secs: i64,
    #[serde(default = "default_refresh_token_ttl_days")]
    pub refresh_token_ttl_days: i64,
    /// 「ログイン状態を保持」選択時のリフレッシュトークン有効期間
    #[serde(default = "default_refresh_token_remember_ttl_days")]
    pub refresh_token_remember_ttl_days: i64,

    // Cookie 設定
    #[serde(default)]
    pub cookie_domain: Option<String>,
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
    /// 未指定時は environment=production でのみ有効
    #[serde(default)]
    pub cookie_secure: Option<bool>,
    #[serde(default = "default_cookie_same_site")]
    pub cookie_same_site: String,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    pub totp_issuer: String,
    /// AES-256暗号化キー（Base64エンコード、32バイト）
    pub encryption_key: SecretBox<String>,

    // Google OAuth設定（オプション）
    #[serde(default)]
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<SecretBox<String>>,
    #[serde(default)]
    pub google_redirect_uri: Option<String>,
    /// OAuthステート暗号化用シークレット（Google 設定時は必須、32バイト）
    pub oauth_state_secret: Option<SecretBox<String>>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 900;
const DEFAULT_TEMP_TOKEN_TTL_SECS: i64 = 300;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_REFRESH_TOKEN_REMEMBER_TTL_DAYS: i64 = 30;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_access_token_ttl_secs() -> i64 {
    DEFAULT_ACCESS_TOKEN_TTL_SECS
}

fn default_temp_token_ttl_secs() -> i64 {
    DEFAULT_TEMP_TOKEN_TTL_SECS
}

fn default_refresh_token_ttl_days() -> i64 {
    DEFAULT_REFRESH_TOKEN_TTL_DAYS
}

fn default_refresh_token_remember_ttl_days() -> i64 {
    DEFAULT_REFRESH_TOKEN_REMEMBER_TTL_DAYS
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_cookie_same_site() -> String {
    "lax".to_string()
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        let config: Self = envy::from_env()?;

        // SameSite は strict / lax / none のいずれか
        if config.same_site().is_none() {
            return Err(envy::Error::Custom(format!(
                "COOKIE_SAME_SITE must be one of strict/lax/none, got '{}'",
                config.cookie_same_site
            )));
        }

        // SameSite=None は Secure 必須（ブラウザ仕様）
        if config.same_site() == Some(SameSite::None) && !config.cookie_secure() {
            return Err(envy::Error::Custom(
                "COOKIE_SAME_SITE=none requires COOKIE_SECURE=true".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Cookie の Secure 属性（未指定時は production でのみ有効）
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure.unwrap_or_else(|| self.is_production())
    }

    pub fn same_site(&self) -> Option<SameSite> {
        match self.cookie_same_site.to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }

    /// リフレッシュトークンの有効期間（秒）
    pub fn refresh_token_ttl_secs(&self, remember: bool) -> i64 {
        let days = if remember {
            self.refresh_token_remember_ttl_days
        } else {
            self.refresh_token_ttl_days
        };
        days * 24 * 60 * 60
    }

    pub fn token_secret_bytes(&self) -> &[u8] {
        self.token_secret.expose_secret().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(environment: &str, cookie_secure: Option<bool>, same_site: &str) -> Config {
        Config {
            database_url: SecretBox::new(Box::new("postgres://localhost/test".to_string())),
            host: default_host(),
            port: default_port(),
            environment: environment.to_string(),
            token_secret: SecretBox::new(Box::new("test-secret".to_string())),
            access_token_ttl_secs: default_access_token_ttl_secs(),
            temp_token_ttl_secs: default_temp_token_ttl_secs(),
            refresh_token_ttl_days: default_refresh_token_ttl_days(),
            refresh_token_remember_ttl_days: default_refresh_token_remember_ttl_days(),
            cookie_domain: None,
            cookie_path: default_cookie_path(),
            cookie_secure,
            cookie_same_site: same_site.to_string(),
            totp_issuer: "kakeibo".to_string(),
            encryption_key: SecretBox::new(Box::new(String::new())),
            google_client_id: None,
            google_client_secret: None,
            google_redirect_uri: None,
            oauth_state_secret: None,
        }
    }

    #[test]
    fn test_cookie_secure_defaults_by_environment() {
        // development ではデフォルト無効
        assert!(!test_config("development", None, "lax").cookie_secure());
        // production ではデフォルト有効
        assert!(test_config("production", None, "lax").cookie_secure());
        // 明示指定があれば環境に関係なくそれに従う
        assert!(test_config("development", Some(true), "lax").cookie_secure());
        assert!(!test_config("production", Some(false), "lax").cookie_secure());
    }

    #[test]
    fn test_same_site_parsing() {
        assert_eq!(
            test_config("development", None, "Strict").same_site(),
            Some(SameSite::Strict)
        );
        assert_eq!(
            test_config("development", None, "lax").same_site(),
            Some(SameSite::Lax)
        );
        assert_eq!(
            test_config("development", None, "none").same_site(),
            Some(SameSite::None)
        );
        assert_eq!(test_config("development", None, "invalid").same_site(), None);
    }

    #[test]
    fn test_refresh_token_ttl() {
        let config = test_config("development", None, "lax");
        assert_eq!(config.refresh_token_ttl_secs(false), 7 * 24 * 60 * 60);
        assert_eq!(config.refresh_token_ttl_secs(true), 30 * 24 * 60 * 60);
    }
}
