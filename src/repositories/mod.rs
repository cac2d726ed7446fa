//! データアクセス層
//!
//! サービス層はここで定義するトレイト経由でストアにアクセスする。
//! 本番実装は PostgreSQL（sqlx）、テストではインメモリ実装に差し替える。

use uuid::Uuid;

use crate::models::{BackupCode, NewSession, Session, SocialAccount, User};

pub mod backup_code;
pub mod session;
pub mod social_account;
pub mod user;

pub use backup_code::BackupCodeRepository;
pub use session::SessionRepository;
pub use social_account::SocialAccountRepository;
pub use user::UserRepository;

/// ユーザー認証情報ストア
pub trait UserStore: Clone + Send + Sync {
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>, sqlx::Error>> + Send;

    fn find_by_id(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Option<User>, sqlx::Error>> + Send;

    fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> impl Future<Output = Result<User, sqlx::Error>> + Send;

    /// ソーシャルログイン用ユーザーを作成（パスワードなし）
    fn create_social_user(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> impl Future<Output = Result<User, sqlx::Error>> + Send;

    /// TOTP シークレットを保存（enabled は false のまま）
    fn set_totp_secret(
        &self,
        user_id: Uuid,
        secret_encrypted: &[u8],
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn enable_totp(&self, user_id: Uuid) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// TOTPタイムステップの消費を記録する。記録できたとき true
    ///
    /// 前回受理したステップ以下は拒否する条件付き更新。同一コードを
    /// 2つのリクエストが同時に提示しても受理されるのは一方だけ
    fn consume_totp_step(
        &self,
        user_id: Uuid,
        step: i64,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// シークレットを破棄して 2FA を無効化
    fn clear_totp(&self, user_id: Uuid) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// セッション（リフレッシュトークン）レジストリ
///
/// 失効操作は「未失効の場合のみ」の条件付き更新。並行リクエストが
/// 同一レコードを同時に失効させようとしても、成功するのは一方だけ。
pub trait SessionStore: Clone + Send + Sync {
    fn create(
        &self,
        input: NewSession,
    ) -> impl Future<Output = Result<Session, sqlx::Error>> + Send;

    /// 状態を問わずトークンハッシュで検索（失効済み・期限切れも返す）
    ///
    /// 無効・期限切れ・失効済みをエラーとして区別するのは呼び出し側
    fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = Result<Option<Session>, sqlx::Error>> + Send;

    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Session>, sqlx::Error>> + Send;

    fn list_active_by_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Session>, sqlx::Error>> + Send;

    /// 未失効の場合のみ失効させる。更新できたとき true
    fn revoke(
        &self,
        id: Uuid,
        reason: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    fn revoke_by_token_hash(
        &self,
        token_hash: &str,
        reason: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// ユーザーの全アクティブセッションを失効。失効させた件数を返す
    fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: &str,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    /// ローテーション: 旧レコードの失効と新レコードの作成を不可分に実行
    ///
    /// 旧レコードが既に失効済みの場合は何も作成せず None を返す。
    /// 同一シークレットの並行リフレッシュで新セッションが2つできることはない。
    fn rotate(
        &self,
        old_id: Uuid,
        new: NewSession,
    ) -> impl Future<Output = Result<Option<Session>, sqlx::Error>> + Send;

    /// 期限切れ・失効済みレコードの削除（ストレージ回収のみ、正確性に影響なし）
    fn delete_expired(&self) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

/// バックアップコードストア
pub trait BackupCodeStore: Clone + Send + Sync {
    /// 既存のコードを全破棄して新しいバッチに置き換える
    fn replace_for_user(
        &self,
        user_id: Uuid,
        code_hashes: &[String],
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// 未使用の場合のみ使用済みにする（原子的消費）。消費できたとき true
    ///
    /// 同一コードの並行使用で両方成功することはない
    fn consume(
        &self,
        user_id: Uuid,
        code_hash: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    fn delete_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<BackupCode>, sqlx::Error>> + Send;
}

/// ソーシャルログイン連携ストア
pub trait SocialAccountStore: Clone + Send + Sync {
    fn find_by_provider(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> impl Future<Output = Result<Option<SocialAccount>, sqlx::Error>> + Send;

    fn link(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
    ) -> impl Future<Output = Result<SocialAccount, sqlx::Error>> + Send;
}
