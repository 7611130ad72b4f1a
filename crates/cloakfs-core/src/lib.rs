//! Core storage primitives for the cloakfs encrypting overlay filesystem.
//!
//! A cloakfs mount mirrors a backing directory: file bodies are enciphered
//! with AES-256-CTR under a per-file random nonce, and every path component
//! is enciphered independently with AES-256-GCM so lookups by name need no
//! directory index. This crate holds the pieces that define the on-disk
//! format and the backend contract:
//!
//! - [`crypto`] — the stream cipher for bodies and the name codec
//! - [`store`] — the [`Backend`](store::Backend) trait plus the encrypted
//!   and pass-through stores
//! - [`handles`] — the virtual descriptor table backends allocate from
//! - [`error`] — the error taxonomy shared by every backend

pub mod crypto;
pub mod error;
pub mod handles;
pub mod store;

pub use crypto::keys::{KeyError, SecretKey};
pub use error::{StoreError, StoreResult};
pub use store::{Attr, Backend, DirEntry, FileKind, FsStats, OpenFlags, SetAttr};
