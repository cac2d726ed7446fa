use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::AppError;
use crate::handlers::cookie::{clear_refresh_cookie, refresh_cookie_value};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

/// ログアウトハンドラー
///
/// POST /auth/logout
///
/// 冪等: Cookie がない・既に無効なシークレットでも 200 を返す。
/// どちらにせよ「使用可能なセッションがない」状態は達成されている。
/// 応答では必ず Cookie を削除する。
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(secret) = refresh_cookie_value(&headers) {
        state.session_service.logout(&secret).await?;
    }

    let cookie = clear_refresh_cookie(&state.config)?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LogoutResponse { logged_out: true }),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    #[test]
    fn test_logout_response_is_200_with_cookie_removal() {
        let cookie = HeaderValue::from_static("refresh_token=; Max-Age=0");
        let response = (
            [(header::SET_COOKIE, cookie)],
            Json(LogoutResponse { logged_out: true }),
        )
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }
}
