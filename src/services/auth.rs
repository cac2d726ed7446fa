use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{DeviceInfo, User};
use crate::repositories::{BackupCodeStore, SessionStore, UserStore};
use crate::services::session::{IssuedSession, SessionService};
use crate::services::token::TokenService;
use crate::services::totp::{TotpService, hash_backup_code};

/// タイミング攻撃対策用のダミーハッシュ
///
/// ユーザー不在・パスワード未設定の場合もこのハッシュで検証を実行し、
/// 応答時間からユーザーの存在有無を推測できなくする
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$RWh6";

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// パスワードを検証
fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
        AppError::Internal(anyhow::anyhow!("password hash parse error"))
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// メールアドレスの正規化（前後空白除去 + 小文字化）
///
/// 保存・検索の双方で適用するため、大文字小文字のみ異なるアドレスは
/// 同一アカウントとして扱われる
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// ログイン第一要素の結果
#[derive(Debug)]
pub enum LoginOutcome {
    /// 2FA無効ユーザー: そのままセッション発行
    Authenticated {
        user: User,
        issued: IssuedSession,
    },
    /// 2FA有効ユーザー: チャレンジトークンのみ返し、セッションは発行しない
    SecondFactorRequired { temp_token: String },
}

/// 認証オーケストレーター
///
/// 登録・ログイン・2FA完了の各フローを
/// 資格情報ストア / トークンコーデック / セッションレジストリ /
/// 2要素エンジンの組み合わせで実現する
#[derive(Clone)]
pub struct AuthService<U, S, B>
where
    U: UserStore,
    S: SessionStore,
    B: BackupCodeStore,
{
    users: U,
    backup_codes: B,
    sessions: SessionService<S>,
    token_service: TokenService,
    totp_service: TotpService,
}

impl<U, S, B> AuthService<U, S, B>
where
    U: UserStore,
    S: SessionStore,
    B: BackupCodeStore,
{
    pub fn new(
        users: U,
        backup_codes: B,
        sessions: SessionService<S>,
        token_service: TokenService,
        totp_service: TotpService,
    ) -> Self {
        Self {
            users,
            backup_codes,
            sessions,
            token_service,
            totp_service,
        }
    }

    /// ユーザー登録とセッション発行
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        device: DeviceInfo,
    ) -> Result<(User, IssuedSession), AppError> {
        let email = normalize_email(email);

        // 事前チェック（競合時の最終防衛はDBのUNIQUE制約）
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::EmailTaken);
        }

        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create_user(&email, name, &password_hash)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e
                    && db_err.constraint() == Some("users_email_key")
                {
                    return AppError::EmailTaken;
                }
                AppError::Database(e)
            })?;

        tracing::info!(user_id = %user.id, "ユーザー登録成功");

        let issued = self.sessions.issue(user.id, device, false).await?;

        Ok((user, issued))
    }

    /// 第一要素（パスワード）ログイン
    ///
    /// # Security
    /// ユーザー不在・パスワード不一致・パスワード未設定はいずれも
    /// 同一の `InvalidCredentials`。呼び出し側から区別できないこと
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
        device: DeviceInfo,
    ) -> Result<LoginOutcome, AppError> {
        let email = normalize_email(email);
        let user = self.authenticate(&email, password).await?;

        if user.totp_enabled {
            // セッションは発行せず、短命のチャレンジトークンだけを返す。
            // remember フラグはトークンに載せて2FA完了時まで持ち越す
            let temp_token = self.token_service.issue_temp_token(user.id, remember)?;

            tracing::info!(user_id = %user.id, "第一要素成功、2FAコード待ち");

            return Ok(LoginOutcome::SecondFactorRequired { temp_token });
        }

        let issued = self.sessions.issue(user.id, device, remember).await?;

        Ok(LoginOutcome::Authenticated { user, issued })
    }

    /// TOTPコードによるログイン完了
    pub async fn login_with_totp(
        &self,
        temp_token: &str,
        code: &str,
        device: DeviceInfo,
    ) -> Result<(User, IssuedSession), AppError> {
        let (user_id, remember) = self.token_service.validate_temp_token(temp_token)?;
        let user = self.totp_user(user_id).await?;

        let secret_encrypted = user
            .totp_secret_encrypted
            .as_deref()
            .ok_or(AppError::InvalidCredentials)?;
        let secret = self.totp_service.decrypt_secret(secret_encrypted)?;

        let step = match self.totp_service.match_code_step(&secret, code)? {
            Some(step) => step,
            None => {
                tracing::warn!(user_id = %user.id, "2FAログイン失敗: コード不一致");
                return Err(AppError::InvalidCredentials);
            }
        };

        // 同一タイムステップのコードは一度しか受理しない。チャレンジ
        // トークンはステートレスなので、ここが唯一のリプレイ防止点
        if !self.users.consume_totp_step(user.id, step).await? {
            tracing::warn!(user_id = %user.id, "2FAログイン失敗: 使用済みコードの再提示");
            return Err(AppError::InvalidCredentials);
        }

        tracing::info!(user_id = %user.id, "2FAログイン成功");

        let issued = self.sessions.issue(user.id, device, remember).await?;

        Ok((user, issued))
    }

    /// バックアップコードによるログイン完了
    ///
    /// コードの消費は原子的で、同一コードの並行提示で両方成功することはない
    pub async fn login_with_backup_code(
        &self,
        temp_token: &str,
        backup_code: &str,
        device: DeviceInfo,
    ) -> Result<(User, IssuedSession), AppError> {
        let (user_id, remember) = self.token_service.validate_temp_token(temp_token)?;
        let user = self.totp_user(user_id).await?;

        let code_hash = hash_backup_code(backup_code);
        if !self.backup_codes.consume(user.id, &code_hash).await? {
            tracing::warn!(user_id = %user.id, "バックアップコードログイン失敗");
            return Err(AppError::InvalidCredentials);
        }

        tracing::info!(user_id = %user.id, "バックアップコードでログイン成功");

        let issued = self.sessions.issue(user.id, device, remember).await?;

        Ok((user, issued))
    }

    /// ユーザー認証を実行
    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError> {
        let user = self.users.find_by_email(email).await?;

        match user {
            Some(user) => {
                // ソーシャルログインユーザー（パスワードなし）の場合は認証失敗
                let password_hash = match &user.password_hash {
                    Some(hash) => hash,
                    None => {
                        // タイミング攻撃対策: ダミーのパスワード検証を実行
                        let _ = verify_password(password, DUMMY_HASH);
                        tracing::warn!("認証失敗: パスワード未設定ユーザー");
                        return Err(AppError::InvalidCredentials);
                    }
                };

                if verify_password(password, password_hash)? {
                    tracing::info!(user_id = %user.id, "認証成功");
                    Ok(user)
                } else {
                    tracing::warn!(user_id = %user.id, "認証失敗: パスワード不一致");
                    Err(AppError::InvalidCredentials)
                }
            }
            None => {
                // タイミング攻撃対策: ユーザーが存在しない場合もダミーの検証を実行
                let _ = verify_password(password, DUMMY_HASH);
                tracing::warn!("認証失敗: ユーザー不在");
                Err(AppError::InvalidCredentials)
            }
        }
    }

    /// 2FA完了フロー用のユーザー取得
    ///
    /// ユーザー不在・2FA無効はいずれも `InvalidCredentials`
    async fn totp_user(&self, user_id: Uuid) -> Result<User, AppError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !user.totp_enabled {
            return Err(AppError::InvalidCredentials);
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Taro@Example.COM "), "taro@example.com");
        assert_eq!(normalize_email("a@b.com"), "a@b.com");
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("pw123456").unwrap();
        assert!(verify_password("pw123456", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_invalid_hash_format_is_error() {
        let result = PasswordHash::new("invalid_hash_format");
        assert!(result.is_err());
    }
}
