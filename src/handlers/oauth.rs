use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::login::auth_success_response;
use crate::models::User;
use crate::repositories::{SocialAccountStore, UserStore};
use crate::services::auth::normalize_email;
use crate::services::device::device_info_from_headers;
use crate::services::oauth::PROVIDER_GOOGLE;
use crate::state::AppState;

/// OAuth コールバックのクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

/// Google OAuth 認証開始ハンドラー
///
/// GET /auth/oauth/google
///
/// Google の認可画面にリダイレクトする
pub async fn google_auth(State(state): State<AppState>) -> Result<Response, AppError> {
    let service = state
        .google_oauth_service
        .as_ref()
        .ok_or_else(|| AppError::OAuthError("Google OAuth が設定されていません".to_string()))?;

    let auth_url = service.generate_auth_url()?;

    Ok(Redirect::temporary(&auth_url).into_response())
}

/// Google OAuth コールバックハンドラー
///
/// GET /auth/oauth/google/callback
///
/// 処理フロー:
/// 1. state パラメータ検証（CSRF対策）
/// 2. 認可コードをユーザー情報に交換
/// 3. 連携済みアカウント検索 → なければメール照合 or 新規作成して連携
/// 4. セッション発行
///
/// プロバイダー認証済みのログインとして2FAチャレンジは要求しない
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Response, AppError> {
    let service = state
        .google_oauth_service
        .as_ref()
        .ok_or_else(|| AppError::OAuthError("Google OAuth が設定されていません".to_string()))?;

    // 1. state 検証
    service.verify_state(&query.state)?;

    // 2. コード交換 → 検証済みユーザー情報
    let user_info = service.exchange_code(&query.code).await?;

    // 3. ユーザー解決
    let user = resolve_user(&state, &user_info.id, &user_info.email, user_info.name).await?;

    // 4. セッション発行（remember なし）
    let device = device_info_from_headers(&headers);
    let issued = state.session_service.issue(user.id, device, false).await?;

    tracing::info!(user_id = %user.id, provider = PROVIDER_GOOGLE, "ソーシャルログイン成功");

    auth_success_response(StatusCode::OK, &state.config, &user, &issued)
}

/// プロバイダーのユーザーIDからローカルユーザーを解決
///
/// 優先順: 既存の連携 → メールアドレス一致（連携を追加） →
/// 新規作成（パスワードなしユーザー）
async fn resolve_user(
    state: &AppState,
    provider_user_id: &str,
    email: &str,
    name: Option<String>,
) -> Result<User, AppError> {
    if let Some(link) = state
        .social_account_repo
        .find_by_provider(PROVIDER_GOOGLE, provider_user_id)
        .await?
    {
        return state
            .user_repo
            .find_by_id(link.user_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(user_id = %link.user_id, "連携先ユーザーが存在しない");
                AppError::Internal(anyhow::anyhow!("dangling social account link"))
            });
    }

    let email = normalize_email(email);

    let user = match state.user_repo.find_by_email(&email).await? {
        Some(user) => user,
        None => {
            let user = state
                .user_repo
                .create_social_user(&email, name.as_deref())
                .await?;
            tracing::info!(user_id = %user.id, "ソーシャルログインでユーザー作成");
            user
        }
    };

    state
        .social_account_repo
        .link(user.id, PROVIDER_GOOGLE, provider_user_id)
        .await?;

    Ok(user)
}
