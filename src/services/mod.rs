pub mod auth;
pub mod device;
pub mod oauth;
pub mod session;
pub mod token;
pub mod totp;
pub mod two_factor;

pub use auth::{AuthService, LoginOutcome};
pub use oauth::GoogleOAuthService;
pub use session::{IssuedSession, SessionService};
pub use token::TokenService;
pub use totp::TotpService;
pub use two_factor::TwoFactorService;
