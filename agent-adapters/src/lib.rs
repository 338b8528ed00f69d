//! HTTP adapters for external substrate services.
//!
//! Every adapter sits on one [`JsonClient`] (hyper + rustls) and implements a
//! trait owned by another crate: [`agent_memory::MemoryStore`],
//! [`agent_memory::CacheLayer`], [`agent_memory::EmbeddingProvider`] or
//! [`agent_policy::NotificationChannel`].

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod http_client;
pub mod notify;
pub mod openai;
pub mod postgrest;
pub mod rest_cache;

pub use error::{AdapterError, AdapterResult};
pub use http_client::{JsonClient, JsonReply};
pub use notify::{DirectMessageChannel, WebhookChannel, build_channel};
pub use openai::OpenAiEmbeddings;
pub use postgrest::RestMemoryStore;
pub use rest_cache::RestCache;
