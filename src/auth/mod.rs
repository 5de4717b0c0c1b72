pub mod cookies;
mod middleware;
pub mod role;
pub mod session;
mod token;

pub use cookies::{CookieBridge, CookieOptions, CookieToSet, RequestCookie, append_set_cookie_headers};
pub use middleware::{AuthRejection, RequestSession, RequireIdentity};
pub use role::resolve_role;
pub use session::{SessionClient, SessionCookie};
pub use token::{IssuedToken, TokenGenerator, hash_password, parse_token, verify_password};
