use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::auth_user::AuthUser;
use crate::handlers::login::validate_totp_code;
use crate::state::AppState;

/// 2FA設定開始レスポンス
///
/// シークレットの平文を返すのはこの応答だけ
#[derive(Debug, Serialize)]
pub struct Setup2faResponse {
    /// Base32エンコードされたシークレット
    pub secret: String,
    /// 認証アプリ登録用 otpauth URI
    pub otpauth_uri: String,
    /// QRコード（PNG、Base64エンコード）
    pub qr_code: String,
    /// 手入力用のシークレット表示（4文字区切り）
    pub manual_entry_key: String,
}

/// 2FA設定開始ハンドラー
///
/// POST /auth/2fa/setup
///
/// シークレットを生成・保存する（まだ有効化はしない）。
/// /auth/2fa/verify で初回コードを検証して初めて有効になる。
pub async fn setup_2fa(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Setup2faResponse>, AppError> {
    let output = state.two_factor_service.setup(auth.user_id).await?;

    Ok(Json(Setup2faResponse {
        secret: output.secret,
        otpauth_uri: output.otpauth_uri,
        qr_code: output.qr_code,
        manual_entry_key: output.manual_entry_key,
    }))
}

/// コード1つだけを受けるリクエスト（verify / disable / backup-codes 共通）
#[derive(Debug, Deserialize)]
pub struct TotpCodeRequest {
    pub code: String,
}

/// 2FA有効化レスポンス
#[derive(Debug, Serialize)]
pub struct Verify2faResponse {
    pub enabled: bool,
    /// バックアップコードの平文。この応答限りで、再取得はできない
    pub backup_codes: Vec<String>,
}

/// 2FA有効化ハンドラー
///
/// POST /auth/2fa/verify
///
/// 初回TOTPコードの検証に成功すると有効化し、バックアップコード
/// 8個を生成して平文を一度だけ返す。
pub async fn verify_2fa(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<TotpCodeRequest>,
) -> Result<Json<Verify2faResponse>, AppError> {
    validate_totp_code(&request.code)?;

    let backup_codes = state
        .two_factor_service
        .verify(auth.user_id, &request.code)
        .await?;

    Ok(Json(Verify2faResponse {
        enabled: true,
        backup_codes,
    }))
}

#[derive(Debug, Serialize)]
pub struct Disable2faResponse {
    pub disabled: bool,
}

/// 2FA無効化ハンドラー
///
/// POST /auth/2fa/disable
///
/// 有効なTOTPコードの提示が必須。コード不正時は状態を一切変えない。
pub async fn disable_2fa(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<TotpCodeRequest>,
) -> Result<Json<Disable2faResponse>, AppError> {
    validate_totp_code(&request.code)?;

    state
        .two_factor_service
        .disable(auth.user_id, &request.code)
        .await?;

    Ok(Json(Disable2faResponse { disabled: true }))
}

/// バックアップコード再生成レスポンス
#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    /// 新しいバックアップコードの平文（旧バッチは全て無効）
    pub backup_codes: Vec<String>,
}

/// バックアップコード再生成ハンドラー
///
/// POST /auth/2fa/backup-codes
pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<TotpCodeRequest>,
) -> Result<Json<BackupCodesResponse>, AppError> {
    validate_totp_code(&request.code)?;

    let backup_codes = state
        .two_factor_service
        .regenerate_backup_codes(auth.user_id, &request.code)
        .await?;

    Ok(Json(BackupCodesResponse { backup_codes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_disable_response_is_200() {
        let response = Json(Disable2faResponse { disabled: true }).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
