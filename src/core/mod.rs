pub mod error;
pub mod urn;

pub use error::{ConflictKind, Result, StoreError, classify_conflict};
pub use urn::Urn;
