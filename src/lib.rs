//! # Roster
//!
//! A server-rendered record manager. People sign in, then add, edit and
//! delete rows in a shared table; administrators see every row, everyone else
//! only the rows they own. Sessions live in cookies and are relayed to an
//! identity provider, either a hosted Supabase-compatible service or an
//! embedded SQLite database.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! roster = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use roster::config::ServerConfig;
//! use roster::server::{AppState, create_router};
//!
//! let config = ServerConfig::default();
//! let state = Arc::new(AppState::from_config(&config)?);
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `roster` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod provider;
pub mod server;
pub mod store;
pub mod types;
