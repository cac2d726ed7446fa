//! リフレッシュトークン Cookie の構築・解析
//!
//! リフレッシュシークレットの平文が往復するのはこの Cookie だけで、
//! JSONボディには一切含めない。

use axum::http::{HeaderMap, HeaderValue, header};

use crate::config::Config;
use crate::error::AppError;

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// 設定由来の共通属性（Path / HttpOnly / Domain / Secure / SameSite）
fn cookie_attributes(config: &Config) -> String {
    let mut attrs = format!("; Path={}; HttpOnly", config.cookie_path);

    if let Some(domain) = &config.cookie_domain {
        attrs.push_str("; Domain=");
        attrs.push_str(domain);
    }

    if config.cookie_secure() {
        attrs.push_str("; Secure");
    }

    if let Some(same_site) = config.same_site() {
        attrs.push_str("; SameSite=");
        attrs.push_str(same_site.as_str());
    }

    attrs
}

/// リフレッシュシークレットを載せた Set-Cookie 値を構築
pub fn build_refresh_cookie(
    config: &Config,
    secret: &str,
    max_age_secs: i64,
) -> Result<HeaderValue, AppError> {
    let value = format!(
        "{REFRESH_COOKIE_NAME}={secret}; Max-Age={max_age_secs}{}",
        cookie_attributes(config)
    );

    HeaderValue::from_str(&value).map_err(|e| {
        tracing::error!(error = ?e, "Cookie値の構築エラー");
        AppError::Internal(anyhow::anyhow!("cookie header error"))
    })
}

/// Cookie を削除する Set-Cookie 値を構築
///
/// Max-Age=0 に加えて epoch の Expires も付ける（古いクライアント対応）
pub fn clear_refresh_cookie(config: &Config) -> Result<HeaderValue, AppError> {
    let value = format!(
        "{REFRESH_COOKIE_NAME}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT{}",
        cookie_attributes(config)
    );

    HeaderValue::from_str(&value).map_err(|e| {
        tracing::error!(error = ?e, "Cookie値の構築エラー");
        AppError::Internal(anyhow::anyhow!("cookie header error"))
    })
}

/// リクエストの Cookie ヘッダーからリフレッシュシークレットを取り出す
pub fn refresh_cookie_value(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;

    raw.split(';').map(str::trim).find_map(|pair| {
        pair.strip_prefix(REFRESH_COOKIE_NAME)?
            .strip_prefix('=')
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretBox;

    fn test_config(environment: &str, same_site: &str, domain: Option<&str>) -> Config {
        Config {
            database_url: SecretBox::new(Box::new("postgres://localhost/test".to_string())),
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: environment.to_string(),
            token_secret: SecretBox::new(Box::new("test-secret".to_string())),
            access_token_ttl_secs: 900,
            temp_token_ttl_secs: 300,
            refresh_token_ttl_days: 7,
            refresh_token_remember_ttl_days: 30,
            cookie_domain: domain.map(str::to_string),
            cookie_path: "/".to_string(),
            cookie_secure: None,
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
    fn test_build_cookie_development() {
        let config = test_config("development", "lax", None);
        let cookie = build_refresh_cookie(&config, "secret-value", 604800).unwrap();
        let value = cookie.to_str().unwrap();

        assert!(value.starts_with("refresh_token=secret-value"));
        assert!(value.contains("Max-Age=604800"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        // development ではデフォルトで Secure なし
        assert!(!value.contains("Secure"));
        assert!(!value.contains("Domain"));
    }

    #[test]
    fn test_build_cookie_production_has_secure() {
        let config = test_config("production", "strict", Some("example.com"));
        let cookie = build_refresh_cookie(&config, "s", 2592000).unwrap();
        let value = cookie.to_str().unwrap();

        assert!(value.contains("Secure"));
        assert!(value.contains("Domain=example.com"));
        assert!(value.contains("SameSite=Strict"));
    }

    #[test]
    fn test_clear_cookie() {
        let config = test_config("development", "lax", None);
        let cookie = clear_refresh_cookie(&config).unwrap();
        let value = cookie.to_str().unwrap();

        assert!(value.starts_with("refresh_token=;"));
        assert!(value.contains("Max-Age=0"));
        assert!(value.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(value.contains("HttpOnly"));
    }

    #[test]
    fn test_refresh_cookie_value_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc123; lang=ja"),
        );
        assert_eq!(refresh_cookie_value(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn test_refresh_cookie_value_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(refresh_cookie_value(&headers), None);

        let empty = HeaderMap::new();
        assert_eq!(refresh_cookie_value(&empty), None);
    }

    #[test]
    fn test_refresh_cookie_empty_value_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("refresh_token=; theme=dark"),
        );
        assert_eq!(refresh_cookie_value(&headers), None);
    }

    #[test]
    fn test_prefix_name_not_confused() {
        // refresh_token_old のような前方一致の別Cookieを拾わないこと
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("refresh_token_old=xyz"),
        );
        assert_eq!(refresh_cookie_value(&headers), None);
    }
}
