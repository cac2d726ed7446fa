use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::handlers::cookie::{build_refresh_cookie, clear_refresh_cookie, refresh_cookie_value};
use crate::services::device::device_info_from_headers;
use crate::state::AppState;

/// リフレッシュレスポンス
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// リフレッシュハンドラー
///
/// POST /auth/refresh
///
/// Cookie のリフレッシュシークレットをローテーションし、新しい
/// アクセストークンを返す。旧シークレットは失効し、以後使用不能。
///
/// トークン起因の失敗（無効・期限切れ・失効済み）時は 401 に加えて
/// Cookie を削除し、クライアントが無効なシークレットを再送し続けない
/// ようにする
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let device = device_info_from_headers(&headers);

    let result = match refresh_cookie_value(&headers) {
        Some(secret) => state.session_service.refresh(&secret, device).await,
        None => Err(AppError::RefreshTokenInvalid),
    };

    match result {
        Ok(issued) => {
            let max_age = (issued.session.expires_at - OffsetDateTime::now_utc()).whole_seconds();
            let cookie = build_refresh_cookie(&state.config, &issued.refresh_secret, max_age)?;

            let body = RefreshResponse {
                access_token: issued.access_token,
                token_type: "Bearer",
                expires_in: issued.expires_in,
            };

            Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
        }
        Err(e) if e.invalidates_refresh_cookie() => {
            let cookie = clear_refresh_cookie(&state.config)?;
            let mut response = e.into_response();
            response.headers_mut().append(header::SET_COOKIE, cookie);
            Ok(response)
        }
        Err(e) => Err(e),
    }
}
