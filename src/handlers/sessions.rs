use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::auth_user::AuthUser;
use crate::handlers::cookie::{clear_refresh_cookie, refresh_cookie_value};
use crate::models::Session;
use crate::services::session::revoke_reason;
use crate::state::AppState;

/// セッション一覧の1エントリ
///
/// token_hash は含めない（ハッシュでも外部に出さない）
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_used_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    /// このリクエストを行ったデバイス自身のセッションかどうか
    pub is_current: bool,
}

impl SessionResponse {
    fn from_session(session: &Session, is_current: bool) -> Self {
        let device = session.device_info();
        Self {
            id: session.id,
            browser: device.browser,
            os: device.os,
            device_type: device.device_type,
            ip_address: device.ip_address,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            expires_at: session.expires_at,
            is_current,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
}

/// アクティブセッション一覧ハンドラー
///
/// GET /auth/sessions
///
/// 「このデバイス」フラグは Cookie のリフレッシュシークレットから
/// 判定する。Cookie なしのクライアント（アクセストークンのみ）では
/// 全エントリ is_current=false になる
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state.session_service.list_active(auth.user_id).await?;

    let current_id = match refresh_cookie_value(&headers) {
        Some(secret) => state
            .session_service
            .current_session(&secret)
            .await?
            // 他ユーザーの Cookie が紛れても自分のセッションにしか印を付けない
            .filter(|s| s.user_id == auth.user_id)
            .map(|s| s.id),
        None => None,
    };

    let sessions = sessions
        .iter()
        .map(|s| SessionResponse::from_session(s, current_id == Some(s.id)))
        .collect();

    Ok(Json(SessionListResponse { sessions }))
}

#[derive(Debug, Serialize)]
pub struct RevokeSessionResponse {
    pub revoked: bool,
}

/// 個別セッション失効ハンドラー
///
/// DELETE /auth/sessions/{id}
///
/// 自デバイスの現在のセッションは対象外（400、ログアウトを使う）。
/// 他ユーザーのセッション・存在しないIDはいずれも 404。
pub async fn revoke_session(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<RevokeSessionResponse>, AppError> {
    if let Some(secret) = refresh_cookie_value(&headers)
        && let Some(current) = state.session_service.current_session(&secret).await?
        && current.id == session_id
    {
        return Err(AppError::Validation(
            "現在のセッションはここでは失効できません。ログアウトを使用してください".to_string(),
        ));
    }

    state
        .session_service
        .revoke_session(auth.user_id, session_id, revoke_reason::USER_REVOKED)
        .await?;

    Ok(Json(RevokeSessionResponse { revoked: true }))
}

#[derive(Debug, Serialize)]
pub struct RevokeAllResponse {
    /// 失効させたセッション数
    pub revoked_count: u64,
}

/// 全セッション失効（全デバイスからサインアウト）ハンドラー
///
/// DELETE /auth/sessions
///
/// 現在のセッションも対象になるため、応答で Cookie も削除する
pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, AppError> {
    let revoked_count = state
        .session_service
        .revoke_all(auth.user_id, revoke_reason::SIGN_OUT_EVERYWHERE)
        .await?;

    let cookie = clear_refresh_cookie(&state.config)?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(RevokeAllResponse { revoked_count }),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_revoke_session_response_is_200() {
        let response = Json(RevokeSessionResponse { revoked: true }).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_session_response_carries_device_fields() {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "hash".to_string(),
            browser: Some("Firefox".to_string()),
            os: Some("Linux".to_string()),
            device_type: Some("desktop".to_string()),
            ip_address: Some("192.0.2.1".to_string()),
            created_at: now,
            expires_at: now + time::Duration::days(7),
            last_used_at: now,
            revoked_at: None,
            revoked_reason: None,
        };

        let response = SessionResponse::from_session(&session, true);
        assert_eq!(response.browser.as_deref(), Some("Firefox"));
        assert_eq!(response.os.as_deref(), Some("Linux"));
        assert_eq!(response.device_type.as_deref(), Some("desktop"));
        assert_eq!(response.ip_address.as_deref(), Some("192.0.2.1"));
        assert!(response.is_current);
    }
}
