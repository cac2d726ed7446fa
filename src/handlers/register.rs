use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::login::auth_success_response;
use crate::services::device::device_info_from_headers;
use crate::state::AppState;

/// ユーザー登録リクエスト
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    /// 表示名（オプション）
    pub name: Option<String>,
}

/// ユーザー登録ハンドラー
///
/// POST /auth/register
///
/// 登録成功時はそのままセッションを発行する（201 Created）。
/// メールアドレス重複は 409 Conflict。
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    validate_register_request(&request)?;

    let device = device_info_from_headers(&headers);

    let (user, issued) = state
        .auth_service
        .register(
            &request.email,
            &request.password,
            request.name.as_deref(),
            device,
        )
        .await?;

    auth_success_response(StatusCode::CREATED, &state.config, &user, &issued)
}

/// 登録リクエストのバリデーション
fn validate_register_request(request: &RegisterRequest) -> Result<(), AppError> {
    // email: 必須、メール形式
    if request.email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }

    if !request.email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }

    // password: 必須、8文字以上
    if request.password.len() < 8 {
        return Err(AppError::Validation(
            "パスワードは8文字以上で入力してください".to_string(),
        ));
    }

    // name: 指定する場合は空文字不可
    if let Some(name) = &request.name
        && name.trim().is_empty()
    {
        return Err(AppError::Validation(
            "表示名が空です。省略するか文字を入力してください".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, name: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_empty_email() {
        assert!(validate_register_request(&request("", "password123", None)).is_err());
    }

    #[test]
    fn test_validate_invalid_email() {
        assert!(validate_register_request(&request("no-at-sign", "password123", None)).is_err());
    }

    #[test]
    fn test_validate_short_password() {
        assert!(validate_register_request(&request("a@b.com", "short", None)).is_err());
    }

    #[test]
    fn test_validate_blank_name() {
        assert!(validate_register_request(&request("a@b.com", "password123", Some("  "))).is_err());
    }

    #[test]
    fn test_validate_valid_request() {
        assert!(
            validate_register_request(&request("a@b.com", "password123", Some("太郎"))).is_ok()
        );
        assert!(validate_register_request(&request("a@b.com", "password123", None)).is_ok());
    }
}
