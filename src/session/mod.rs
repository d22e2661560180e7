//! Session storage subsystem (C8 + C9): chunked content-addressed storage
//! with group ACLs, plus the background housekeeper that enforces the
//! storage budget.

pub mod housekeeper;
pub mod store;

pub use housekeeper::{Housekeeper, PruneSummary};
pub use store::{open_default, BlobStore, FsBlobStore, FsMetadataIndex, MetadataIndex, SessionStore, CHUNK_SIZE_BOUNDS, DEFAULT_CHUNK_SIZE, DEFAULT_GET_FULL_MAX_BYTES};
