//! Configuration for the agent substrate.
//!
//! Configuration is read once at process start and handed to each component's
//! constructor; nothing below reads the environment on its own afterwards.

#![warn(missing_docs, clippy::pedantic)]

mod loader;
mod policy;
mod settings;

pub use loader::{
    CACHE_TOKEN_ENV, CACHE_URL_ENV, DISPATCH_URL_ENV, EMBEDDINGS_KEY_ENV, EMBEDDINGS_MODEL_ENV,
    EMBEDDINGS_URL_ENV, STORE_KEY_ENV, STORE_URL_ENV,
};
pub use policy::{ConfigError, ConfigResult, MAX_TRACE_TAIL, PolicyTable};
pub use settings::{
    ChannelKind, ChannelSettings, DispatchSettings, EmbeddingSettings, EndpointSettings,
    SubstrateConfig, DEFAULT_REQUEST_TIMEOUT_SECS,
};
