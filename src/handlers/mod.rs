pub mod auth_user;
pub mod cookie;
pub mod health;
pub mod login;
pub mod logout;
pub mod oauth;
pub mod refresh;
pub mod register;
pub mod sessions;
pub mod two_factor;

pub use auth_user::AuthUser;
pub use health::health_check;
pub use login::{login, login_2fa, login_2fa_backup};
pub use logout::logout;
pub use oauth::{google_auth, google_callback};
pub use refresh::refresh;
pub use register::register;
pub use sessions::{list_sessions, revoke_all_sessions, revoke_session};
pub use two_factor::{disable_2fa, regenerate_backup_codes, setup_2fa, verify_2fa};
