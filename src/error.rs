use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 認証失敗（ユーザー不在とパスワード不一致を区別しない）
    #[error("メールアドレスまたはパスワードが正しくありません")]
    InvalidCredentials,

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("このメールアドレスは既に使用されています")]
    EmailTaken,

    #[error("アクセストークンが無効です")]
    Unauthorized,

    #[error("リフレッシュトークンが無効です")]
    RefreshTokenInvalid,

    #[error("リフレッシュトークンの有効期限が切れています")]
    RefreshTokenExpired,

    #[error("リフレッシュトークンは失効済みです")]
    RefreshTokenRevoked,

    #[error("セッションが見つかりません")]
    NotFound,

    #[error("認証コードが無効です")]
    TotpInvalid,

    #[error("二要素認証は既に有効です")]
    TotpAlreadyEnabled,

    #[error("二要素認証が設定されていません")]
    TotpNotSetup,

    #[error("二要素認証が有効化されていません")]
    TotpNotEnabled,

    #[error("OAuth認証エラー: {0}")]
    OAuthError(String),

    #[error("無効なstateパラメータ")]
    OAuthStateInvalid,

    #[error("OAuthプロバイダーエラー")]
    OAuthProviderError,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    /// リフレッシュトークン起因の失敗かどうか
    ///
    /// これらの失敗時はクライアント側の Cookie も無効化する
    pub fn invalidates_refresh_cookie(&self) -> bool {
        matches!(
            self,
            Self::RefreshTokenInvalid | Self::RefreshTokenExpired | Self::RefreshTokenRevoked
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RefreshTokenInvalid | Self::RefreshTokenExpired | Self::RefreshTokenRevoked => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TotpInvalid
            | Self::TotpAlreadyEnabled
            | Self::TotpNotSetup
            | Self::TotpNotEnabled => StatusCode::BAD_REQUEST,
            Self::OAuthError(_) => StatusCode::UNAUTHORIZED,
            Self::OAuthStateInvalid => StatusCode::BAD_REQUEST,
            Self::OAuthProviderError => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 内部詳細（SQLエラー等）はクライアントに返さない
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                "内部エラーが発生しました".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                "内部エラーが発生しました".to_string()
            }
            Self::OAuthError(e) => {
                tracing::error!(error = %e, "OAuth認証エラー");
                "認証に失敗しました".to_string()
            }
            Self::OAuthStateInvalid => {
                tracing::warn!("無効なOAuth stateパラメータ（CSRF攻撃の可能性）");
                "無効なリクエストです".to_string()
            }
            Self::OAuthProviderError => "外部認証サービスとの通信に失敗しました".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_api_contract() {
        assert_eq!(
            AppError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::EmailTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::RefreshTokenExpired.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::RefreshTokenRevoked.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::TotpAlreadyEnabled.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::TotpNotSetup.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_refresh_errors_invalidate_cookie() {
        assert!(AppError::RefreshTokenInvalid.invalidates_refresh_cookie());
        assert!(AppError::RefreshTokenExpired.invalidates_refresh_cookie());
        assert!(AppError::RefreshTokenRevoked.invalidates_refresh_cookie());
        assert!(!AppError::InvalidCredentials.invalidates_refresh_cookie());
        assert!(!AppError::NotFound.invalidates_refresh_cookie());
    }
}
