mod dto;
pub mod flash;
mod pages;
pub mod response;
mod router;
pub mod validation;
mod views;

pub use dto::UsersPage;
pub use router::{AppState, create_router};

pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
pub const LOGOUT_PATH: &str = "/logout";
pub const USERS_PATH: &str = "/users";
