pub mod address;
pub mod assemble;
pub mod auth;
pub mod botx;
pub mod commands;
pub mod config;
pub mod errors;
pub mod metadata;
pub mod mute;
pub mod pipeline;
pub mod platform;
pub mod strings;
pub mod tokens;
pub mod types;
pub mod web_api;

pub use address::{parse_address, AddressResolver};
pub use assemble::assemble_message;
pub use auth::CallerInfo;
pub use errors::{GatewayError, PersistError, TokenLoadError};
pub use metadata::MetadataSealer;
pub use mute::MuteStore;
pub use pipeline::GatewayPipeline;
pub use platform::{InMemoryPlatform, PlatformClient, PlatformError};
pub use tokens::TokenStore;
pub use types::*;
