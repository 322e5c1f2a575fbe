mod cache;
mod key;
mod store;

pub use cache::EmbeddingCache;
pub use key::{cache_key, normalize};
pub use store::{CachedVector, FileVectorStore, NoopVectorStore, StoreError, VectorStore, select_store};
