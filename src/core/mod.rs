//! Shared building blocks: failure taxonomy, hashing and bundled files

pub mod digest;
pub mod failure;
pub mod resources;

pub use digest::{keccak_hex, sha256_hex, HashAlgo};
pub use failure::{Failure, FailureKind};
pub use resources::{copy_resource, ResourceError};
