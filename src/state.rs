use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{
    BackupCodeRepository, SessionRepository, SocialAccountRepository, UserRepository,
};
use crate::services::{
    AuthService, GoogleOAuthService, SessionService, TokenService, TotpService, TwoFactorService,
};

/// Postgres リポジトリで具象化したサービス型
pub type PgSessionService = SessionService<SessionRepository>;
pub type PgAuthService = AuthService<UserRepository, SessionRepository, BackupCodeRepository>;
pub type PgTwoFactorService = TwoFactorService<UserRepository, BackupCodeRepository>;

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// トークンコーデック（AuthUser エクストラクタが直接使用）
    pub token_service: TokenService,
    /// セッションライフサイクルサービス
    pub session_service: PgSessionService,
    /// 認証オーケストレーター
    pub auth_service: PgAuthService,
    /// 2要素認証エンジン
    pub two_factor_service: PgTwoFactorService,
    /// ユーザーリポジトリ（OAuthハンドラーが直接使用）
    pub user_repo: UserRepository,
    /// ソーシャルアカウントリポジトリ
    pub social_account_repo: SocialAccountRepository,
    /// Google OAuth サービス（設定されている場合のみ）
    pub google_oauth_service: Option<GoogleOAuthService>,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);

        let user_repo = UserRepository::new(db_pool.clone());
        let session_repo = SessionRepository::new(db_pool.clone());
        let backup_code_repo = BackupCodeRepository::new(db_pool.clone());
        let social_account_repo = SocialAccountRepository::new(db_pool.clone());

        let token_service = TokenService::new(
            config.token_secret_bytes(),
            config.access_token_ttl_secs,
            config.temp_token_ttl_secs,
        );

        let totp_service = TotpService::new(
            config.totp_issuer.clone(),
            config.encryption_key.expose_secret(),
        )?;

        let session_service = SessionService::new(
            session_repo,
            token_service.clone(),
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs(false),
            config.refresh_token_ttl_secs(true),
        );

        let auth_service = AuthService::new(
            user_repo.clone(),
            backup_code_repo.clone(),
            session_service.clone(),
            token_service.clone(),
            totp_service.clone(),
        );

        let two_factor_service =
            TwoFactorService::new(user_repo.clone(), backup_code_repo, totp_service);

        // Google OAuth サービス（設定されている場合のみ初期化）
        let google_oauth_service = match (
            &config.google_client_id,
            &config.google_client_secret,
            &config.google_redirect_uri,
            &config.oauth_state_secret,
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri), Some(state_secret)) => {
                tracing::info!("Google OAuth サービスを初期化");
                Some(GoogleOAuthService::new(
                    client_id.clone(),
                    client_secret.expose_secret().clone(),
                    redirect_uri.clone(),
                    state_secret.expose_secret(),
                )?)
            }
            (None, None, None, _) => {
                tracing::info!("Google OAuth 未設定（スキップ）");
                None
            }
            _ => {
                // 一部だけ設定されているのは設定ミスの可能性が高いので起動を止める
                return Err(AppError::Internal(anyhow::anyhow!(
                    "incomplete Google OAuth configuration"
                )));
            }
        };

        Ok(Self {
            db_pool,
            config,
            token_service,
            session_service,
            auth_service,
            two_factor_service,
            user_repo,
            social_account_repo,
            google_oauth_service,
        })
    }
}
