//! Claim-check payload indirection.
//!
//! # Module Structure
//!
//! - `codec`: the size-threshold encode/decode middleware
//!   (`ClaimCheckCodec`, `ClaimCheckToken`)
//! - `store`: the blob store seam (`BlobStore`) and an in-memory
//!   reference implementation (`MemoryBlobStore`)

mod codec;
mod store;

pub use codec::{ClaimCheckCodec, ClaimCheckToken};
pub use store::{BlobStore, MemoryBlobStore, content_hash};
