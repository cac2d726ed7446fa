use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::Config;
use crate::error::AppError;
use crate::handlers::cookie::build_refresh_cookie;
use crate::models::User;
use crate::services::LoginOutcome;
use crate::services::device::device_info_from_headers;
use crate::services::session::IssuedSession;
use crate::state::AppState;

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// ログイン状態を保持（リフレッシュトークンが30日に延長）
    #[serde(default)]
    pub remember: bool,
}

/// 認証成功レスポンスのユーザー情報
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: uuid::Uuid,
    pub email: String,
    pub name: Option<String>,
    pub totp_enabled: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            totp_enabled: user.totp_enabled,
        }
    }
}

/// 認証成功レスポンス
///
/// リフレッシュシークレットはここには含めない（Cookie 経由のみ）
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// アクセストークンの有効期間（秒）
    pub expires_in: i64,
    pub user: UserResponse,
}

/// 2FAチャレンジレスポンス
///
/// セッションは未発行。temp_token を /auth/login/2fa か
/// /auth/login/2fa/backup に提示してログインを完了する
#[derive(Debug, Serialize)]
pub struct TwoFactorChallengeResponse {
    pub requires_2fa: bool,
    pub temp_token: String,
}

/// 認証成功の共通レスポンス構築
///
/// アクセストークンをJSONで、リフレッシュシークレットを
/// HttpOnly Cookie で返す
pub(crate) fn auth_success_response(
    status: StatusCode,
    config: &Config,
    user: &User,
    issued: &IssuedSession,
) -> Result<Response, AppError> {
    // Cookie の Max-Age はセッションレコードの残り有効期間に揃える
    let max_age = (issued.session.expires_at - OffsetDateTime::now_utc()).whole_seconds();
    let cookie = build_refresh_cookie(config, &issued.refresh_secret, max_age)?;

    let body = AuthResponse {
        access_token: issued.access_token.clone(),
        token_type: "Bearer",
        expires_in: issued.expires_in,
        user: UserResponse::from(user),
    };

    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// ログインハンドラー（第一要素）
///
/// POST /auth/login
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. ユーザー認証（DB照合）
/// 3. 2FA無効ユーザー → セッション発行
/// 4. 2FA有効ユーザー → チャレンジトークンのみ返却
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    validate_login_request(&request)?;

    let device = device_info_from_headers(&headers);

    match state
        .auth_service
        .login(&request.email, &request.password, request.remember, device)
        .await?
    {
        LoginOutcome::Authenticated { user, issued } => {
            auth_success_response(StatusCode::OK, &state.config, &user, &issued)
        }
        LoginOutcome::SecondFactorRequired { temp_token } => Ok(Json(TwoFactorChallengeResponse {
            requires_2fa: true,
            temp_token,
        })
        .into_response()),
    }
}

/// TOTPコードによるログイン完了リクエスト
#[derive(Debug, Deserialize)]
pub struct Login2faRequest {
    pub temp_token: String,
    pub code: String,
}

/// 2FAログイン完了ハンドラー（TOTPコード）
///
/// POST /auth/login/2fa
pub async fn login_2fa(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<Login2faRequest>,
) -> Result<Response, AppError> {
    if request.temp_token.trim().is_empty() {
        return Err(AppError::Validation("temp_token は必須です".to_string()));
    }
    validate_totp_code(&request.code)?;

    let device = device_info_from_headers(&headers);

    let (user, issued) = state
        .auth_service
        .login_with_totp(&request.temp_token, &request.code, device)
        .await?;

    auth_success_response(StatusCode::OK, &state.config, &user, &issued)
}

/// バックアップコードによるログイン完了リクエスト
#[derive(Debug, Deserialize)]
pub struct Login2faBackupRequest {
    pub temp_token: String,
    pub backup_code: String,
}

/// 2FAログイン完了ハンドラー（バックアップコード）
///
/// POST /auth/login/2fa/backup
pub async fn login_2fa_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<Login2faBackupRequest>,
) -> Result<Response, AppError> {
    if request.temp_token.trim().is_empty() {
        return Err(AppError::Validation("temp_token は必須です".to_string()));
    }
    if request.backup_code.trim().is_empty() {
        return Err(AppError::Validation(
            "バックアップコードは必須です".to_string(),
        ));
    }

    let device = device_info_from_headers(&headers);

    let (user, issued) = state
        .auth_service
        .login_with_backup_code(&request.temp_token, &request.backup_code, device)
        .await?;

    auth_success_response(StatusCode::OK, &state.config, &user, &issued)
}

/// TOTPコードバリデーション
pub(crate) fn validate_totp_code(code: &str) -> Result<(), AppError> {
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "認証コードは6桁の数字で入力してください".to_string(),
        ));
    }
    Ok(())
}

/// ログインリクエストのバリデーション
fn validate_login_request(request: &LoginRequest) -> Result<(), AppError> {
    // email: 必須、メール形式
    if request.email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }

    // 簡易的なメール形式チェック（@ が含まれているか）
    if !request.email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }

    // password: 必須（長さの検査は登録時のみ。既存パスワードを弾かないため）
    if request.password.is_empty() {
        return Err(AppError::Validation("パスワードは必須です".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            remember: false,
        }
    }

    #[test]
    fn test_validate_empty_email() {
        assert!(validate_login_request(&request("", "password123")).is_err());
    }

    #[test]
    fn test_validate_invalid_email() {
        assert!(validate_login_request(&request("invalid-email", "password123")).is_err());
    }

    #[test]
    fn test_validate_empty_password() {
        assert!(validate_login_request(&request("test@example.com", "")).is_err());
    }

    #[test]
    fn test_validate_valid_request() {
        assert!(validate_login_request(&request("test@example.com", "password123")).is_ok());
    }

    #[test]
    fn test_validate_totp_code() {
        assert!(validate_totp_code("123456").is_ok());
        assert!(validate_totp_code("12345").is_err());
        assert!(validate_totp_code("1234567").is_err());
        assert!(validate_totp_code("12345a").is_err());
        assert!(validate_totp_code("").is_err());
    }
}
