use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// 認証済みユーザーのエクストラクタ
///
/// `Authorization: Bearer <アクセストークン>` を検証し、ユーザーIDを
/// ハンドラー引数として渡す。ヘッダー欠落・形式不正・トークン無効は
/// いずれも 401。
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized)?;

        let user_id = state.token_service.validate_access_token(token)?;

        Ok(AuthUser { user_id })
    }
}
