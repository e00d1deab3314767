//! Application glue for quarry: configuration, embedder bootstrap and the
//! `search_codebase` tool.

pub mod bootstrap;
pub mod config;
pub mod search_tool;
pub mod secret;

pub use bootstrap::App;
pub use config::{Config, ConfigError};
pub use search_tool::SearchCodebaseExecutor;
pub use secret::Secret;
