use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{DeviceInfo, NewSession, Session};
use crate::repositories::SessionStore;
use crate::services::token::{TokenService, generate_refresh_secret, hash_refresh_secret};

/// 失効理由
pub mod revoke_reason {
    pub const LOGOUT: &str = "logout";
    pub const ROTATED: &str = "rotated";
    pub const USER_REVOKED: &str = "user-revoked";
    pub const SIGN_OUT_EVERYWHERE: &str = "sign-out-everywhere";
}

/// セッション発行の結果
///
/// refresh_secret の平文がプロセス外に出るのはこの構造体経由の一度だけ。
/// ハンドラーは Cookie にのみ載せ、JSONボディには含めない
#[derive(Debug)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_secret: String,
    pub session: Session,
    /// アクセストークンの有効期間（秒）
    pub expires_in: i64,
}

/// セッションライフサイクルサービス
///
/// リフレッシュトークンの発行・ローテーション・失効・一覧を担当する。
/// リクエスト間で共有する可変状態は持たず、正しさはストアの
/// 条件付き更新の原子性にのみ依存する
#[derive(Clone)]
pub struct SessionService<S: SessionStore> {
    store: S,
    token_service: TokenService,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    refresh_remember_ttl_secs: i64,
}

impl<S: SessionStore> SessionService<S> {
    pub fn new(
        store: S,
        token_service: TokenService,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
        refresh_remember_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            token_service,
            access_ttl_secs,
            refresh_ttl_secs,
            refresh_remember_ttl_secs,
        }
    }

    /// 新しいセッションを発行
    ///
    /// アクセストークンと高エントロピーのリフレッシュシークレットを生成し、
    /// シークレットのハッシュのみをセッションレコードとして永続化する
    pub async fn issue(
        &self,
        user_id: Uuid,
        device: DeviceInfo,
        remember: bool,
    ) -> Result<IssuedSession, AppError> {
        let ttl_secs = if remember {
            self.refresh_remember_ttl_secs
        } else {
            self.refresh_ttl_secs
        };

        let refresh_secret = generate_refresh_secret();
        let token_hash = hash_refresh_secret(&refresh_secret);
        let expires_at = OffsetDateTime::now_utc() + Duration::seconds(ttl_secs);

        let session = self
            .store
            .create(NewSession {
                user_id,
                token_hash,
                device,
                expires_at,
            })
            .await?;

        let access_token = self.token_service.issue_access_token(user_id)?;

        tracing::info!(user_id = %user_id, session_id = %session.id, "セッション発行");

        Ok(IssuedSession {
            access_token,
            refresh_secret,
            session,
            expires_in: self.access_ttl_secs,
        })
    }

    /// リフレッシュトークンのローテーション
    ///
    /// 提示されたシークレットに対応するレコードを失効させ、新しい
    /// レコードとアクセストークンを発行する。旧シークレットは以後
    /// 恒久的に使用不能。ローテーション済みシークレットの再提示は
    /// `RefreshTokenRevoked` として検出される
    pub async fn refresh(
        &self,
        presented_secret: &str,
        device: DeviceInfo,
    ) -> Result<IssuedSession, AppError> {
        let token_hash = hash_refresh_secret(presented_secret);

        let old = self
            .store
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or(AppError::RefreshTokenInvalid)?;

        if old.revoked_at.is_some() {
            tracing::warn!(
                session_id = %old.id,
                user_id = %old.user_id,
                "失効済みリフレッシュトークンの提示"
            );
            return Err(AppError::RefreshTokenRevoked);
        }

        let now = OffsetDateTime::now_utc();
        if now >= old.expires_at {
            return Err(AppError::RefreshTokenExpired);
        }

        // 付与済みの有効期間を維持してローテーション
        // （remember-me の30日セッションはローテーション後も30日セッション）
        let granted = old.expires_at - old.created_at;
        let refresh_secret = generate_refresh_secret();
        let new = NewSession {
            user_id: old.user_id,
            token_hash: hash_refresh_secret(&refresh_secret),
            device,
            expires_at: now + granted,
        };

        // 旧レコードの失効と新レコードの作成は不可分。並行リフレッシュでは
        // 片方だけが成功し、もう一方はここで None を受け取る
        let session = self
            .store
            .rotate(old.id, new)
            .await?
            .ok_or(AppError::RefreshTokenRevoked)?;

        let access_token = self.token_service.issue_access_token(old.user_id)?;

        tracing::info!(
            user_id = %old.user_id,
            old_session_id = %old.id,
            new_session_id = %session.id,
            "リフレッシュトークンをローテーション"
        );

        Ok(IssuedSession {
            access_token,
            refresh_secret,
            session,
            expires_in: self.access_ttl_secs,
        })
    }

    /// ログアウト（冪等）
    ///
    /// トークンが存在しない・失効済みでもエラーにしない。どちらにせよ
    /// 「使用可能なセッションがない」という結果は達成されている
    pub async fn logout(&self, presented_secret: &str) -> Result<(), AppError> {
        let token_hash = hash_refresh_secret(presented_secret);
        let revoked = self
            .store
            .revoke_by_token_hash(&token_hash, revoke_reason::LOGOUT)
            .await?;

        if revoked {
            tracing::info!("ログアウトによりセッションを失効");
        }

        Ok(())
    }

    /// 提示されたシークレットに対応するアクティブなセッションを返す
    ///
    /// 「このデバイス」フラグ付けと自セッション失効ガードに使用
    pub async fn current_session(
        &self,
        presented_secret: &str,
    ) -> Result<Option<Session>, AppError> {
        let token_hash = hash_refresh_secret(presented_secret);
        let session = self.store.find_by_token_hash(&token_hash).await?;

        Ok(session.filter(|s| s.is_active(OffsetDateTime::now_utc())))
    }

    /// 指定セッションを失効させる
    ///
    /// # Security
    /// 所有者不一致は存在しない場合と同じ `NotFound` を返す。
    /// 他ユーザーのセッションIDの存在有無を漏らさないため
    pub async fn revoke_session(
        &self,
        owner: Uuid,
        session_id: Uuid,
        reason: &str,
    ) -> Result<(), AppError> {
        let session = self
            .store
            .find_by_id(session_id)
            .await?
            .filter(|s| s.user_id == owner)
            .ok_or(AppError::NotFound)?;

        // 既に終端状態なら何もしない（結果は同じ）
        self.store.revoke(session.id, reason).await?;

        tracing::info!(user_id = %owner, session_id = %session_id, "セッションを失効");

        Ok(())
    }

    /// ユーザーの全アクティブセッションを失効させ、件数を返す
    pub async fn revoke_all(&self, owner: Uuid, reason: &str) -> Result<u64, AppError> {
        let count = self.store.revoke_all_for_user(owner, reason).await?;

        tracing::info!(user_id = %owner, count = count, "全セッションを失効");

        Ok(count)
    }

    /// アクティブなセッションの一覧
    pub async fn list_active(&self, owner: Uuid) -> Result<Vec<Session>, AppError> {
        Ok(self.store.list_active_by_user(owner).await?)
    }

    /// 期限切れ・失効済みレコードの削除
    ///
    /// ストレージ回収のみが目的で、遅延・スキップしても正確性に影響しない
    pub async fn cleanup_expired(&self) -> Result<u64, AppError> {
        Ok(self.store.delete_expired().await?)
    }
}
