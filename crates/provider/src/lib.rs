//! Geodata backend access for the geofence engine.
//!
//! All round trips go through [`HttpTransport`]; the credential cache,
//! region queries, and membership writer are thin, stateless layers over it
//! (the cache's store aside).

pub mod credential;
pub mod feature;
pub mod file_store;
pub mod http;
pub mod membership;
pub mod regions;

pub use credential::{CredentialCache, KeyValueStore, MemoryStore, TOKEN_EXPIRY_MARGIN};
pub use file_store::FileStore;
pub use http::{HttpTransport, ReqwestTransport};
pub use membership::{MembershipWriter, WriteReceipt};
pub use regions::RegionQueryService;
