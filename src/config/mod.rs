mod server;

pub use server::{ProviderKind, ServerConfig};
