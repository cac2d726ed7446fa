pub mod backup_code;
pub mod session;
pub mod social_account;
pub mod user;

pub use backup_code::BackupCode;
pub use session::{DeviceInfo, NewSession, Session};
pub use social_account::SocialAccount;
pub use user::User;
