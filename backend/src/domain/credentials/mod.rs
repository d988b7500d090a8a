//! Vehicle-API credentials: caching, persistence, and refresh.

mod cache;
mod model;
mod store;

pub use cache::CredentialCache;
pub use model::{Credential, RefreshSweepReport, StoredCredential, TokenGrant};
pub use store::{TokenStore, TokenStoreConfig};
