mod client;
mod embedder;
pub mod error;
pub mod types;

pub use client::{AnthropicClient, Upstream};
pub use embedder::{Embedder, HttpEmbedder};
pub use error::UpstreamError;
pub use types::{GenerateRequest, GenerateResponse, Message, Usage};
