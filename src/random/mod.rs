//! Randomness for key generation and resource naming.
//!
//! Sources are either seeded from system entropy or derived from a label, in which case the
//! produced stream (and every certificate or identifier built from it) is reproducible.

mod id;
mod registry;
mod source;

pub use id::{
    CharacterRange, deterministic_id, deterministic_int, id, id_from_source, id_with_prefix, int,
    int_from_source,
};
pub use registry::{SharedSource, SourceRegistry, SourceScope};
pub use source::{RandomSource, deterministic_source, system_source};
