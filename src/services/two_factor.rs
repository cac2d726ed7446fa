use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::repositories::{BackupCodeStore, UserStore};
use crate::services::totp::{TotpService, generate_backup_codes, hash_backup_code};

/// 2FA設定開始の結果
#[derive(Debug)]
pub struct SetupOutput {
    /// Base32エンコードされたシークレット（この応答でのみ平文を返す）
    pub secret: String,
    /// 認証アプリ登録用 otpauth URI
    pub otpauth_uri: String,
    /// QRコード（PNG、Base64エンコード）
    pub qr_code: String,
    /// 手入力用のシークレット表示
    pub manual_entry_key: String,
}

/// 2要素認証エンジン
///
/// TOTP の登録・有効化・無効化とバックアップコードの管理を担当する
#[derive(Clone)]
pub struct TwoFactorService<U, B>
where
    U: UserStore,
    B: BackupCodeStore,
{
    users: U,
    backup_codes: B,
    totp_service: TotpService,
}

impl<U, B> TwoFactorService<U, B>
where
    U: UserStore,
    B: BackupCodeStore,
{
    pub fn new(users: U, backup_codes: B, totp_service: TotpService) -> Self {
        Self {
            users,
            backup_codes,
            totp_service,
        }
    }

    /// 2FA設定を開始（シークレット生成、まだ有効化はしない）
    ///
    /// 既存の未確認シークレットは新しいものに置き換える
    pub async fn setup(&self, user_id: Uuid) -> Result<SetupOutput, AppError> {
        let user = self.require_user(user_id).await?;

        if user.totp_enabled {
            return Err(AppError::TotpAlreadyEnabled);
        }

        let secret = TotpService::generate_secret();
        let encrypted = self.totp_service.encrypt_secret(&secret)?;
        self.users.set_totp_secret(user.id, &encrypted).await?;

        let otpauth_uri = self.totp_service.provisioning_uri(&user.email, &secret)?;
        let qr_code = self.totp_service.generate_qr_code(&user.email, &secret)?;
        let manual_entry_key = TotpService::manual_entry_key(&secret);

        tracing::info!(user_id = %user.id, "2FA設定開始");

        Ok(SetupOutput {
            secret,
            otpauth_uri,
            qr_code,
            manual_entry_key,
        })
    }

    /// 初回コード検証による2FA有効化
    ///
    /// 成功時にバックアップコード8個を生成し、平文をこの一度だけ返す。
    /// 以後の再取得はできない（保存されるのはハッシュのみ）
    pub async fn verify(&self, user_id: Uuid, code: &str) -> Result<Vec<String>, AppError> {
        let user = self.require_user(user_id).await?;

        if user.totp_enabled {
            return Err(AppError::TotpAlreadyEnabled);
        }

        let secret_encrypted = user
            .totp_secret_encrypted
            .as_deref()
            .ok_or(AppError::TotpNotSetup)?;
        let secret = self.totp_service.decrypt_secret(secret_encrypted)?;

        if !self.totp_service.verify_code(&secret, code)? {
            return Err(AppError::TotpInvalid);
        }

        self.users.enable_totp(user.id).await?;

        let codes = generate_backup_codes();
        let hashes: Vec<String> = codes.iter().map(|c| hash_backup_code(c)).collect();
        self.backup_codes.replace_for_user(user.id, &hashes).await?;

        tracing::info!(user_id = %user.id, "2FA有効化完了");

        Ok(codes)
    }

    /// 2FA無効化
    ///
    /// # Security
    /// 有効なTOTPコードの提示が必須。ハイジャックされたセッション単独で
    /// 保護を外せないようにするため。コードが不正な場合は状態を一切変えない
    pub async fn disable(&self, user_id: Uuid, code: &str) -> Result<(), AppError> {
        let user = self.require_enabled_user(user_id).await?;

        self.check_code(&user, code).await?;

        self.users.clear_totp(user.id).await?;
        self.backup_codes.delete_for_user(user.id).await?;

        tracing::info!(user_id = %user.id, "2FA無効化完了");

        Ok(())
    }

    /// バックアップコードの再生成
    ///
    /// 有効なTOTPコードの提示が必須。旧バッチは全て無効化される
    pub async fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Vec<String>, AppError> {
        let user = self.require_enabled_user(user_id).await?;

        self.check_code(&user, code).await?;

        let codes = generate_backup_codes();
        let hashes: Vec<String> = codes.iter().map(|c| hash_backup_code(c)).collect();
        self.backup_codes.replace_for_user(user.id, &hashes).await?;

        tracing::info!(user_id = %user.id, "バックアップコード再生成");

        Ok(codes)
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    async fn require_enabled_user(&self, user_id: Uuid) -> Result<User, AppError> {
        let user = self.require_user(user_id).await?;

        if !user.totp_enabled {
            return Err(AppError::TotpNotEnabled);
        }

        Ok(user)
    }

    async fn check_code(&self, user: &User, code: &str) -> Result<(), AppError> {
        let secret_encrypted = user
            .totp_secret_encrypted
            .as_deref()
            .ok_or(AppError::TotpNotEnabled)?;
        let secret = self.totp_service.decrypt_secret(secret_encrypted)?;

        if !self.totp_service.verify_code(&secret, code)? {
            return Err(AppError::TotpInvalid);
        }

        Ok(())
    }
}
