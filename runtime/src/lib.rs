//! Runtime data model for Braid
//!
//! Persistent (structurally shared) vectors and maps, interned keywords, and
//! the `Atom` compare-and-swap slot. The compiler in `braid-core` uses these
//! to represent literal constants; generated programs are expected to
//! reproduce the same semantics.

pub mod abstractions;
pub mod atom;
pub mod error;
pub mod interner;
pub mod map;
pub mod value;
pub mod vector;

pub use abstractions::{assoc, conj, count, dissoc, empty_map, empty_vector, fetch, get, hash_map, nth};
pub use atom::Atom;
pub use error::{IndexError, KeyMiss, RuntimeError};
pub use interner::Keyword;
pub use map::PersistentMap;
pub use value::{MapValue, Value, VectorValue};
pub use vector::PersistentVector;
