//! Random identifiers and integers for naming test resources.

use rand::Rng;
use rand_core::RngCore;

use super::registry::SourceScope;
use super::source::system_source;

/// Character set used when generating identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterRange(&'static str);

impl CharacterRange {
    pub const ALPHA_NUMERIC: Self =
        Self("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789");
    pub const ALPHA_NUMERIC_LOWER: Self = Self("abcdefghijklmnopqrstuvwxyz0123456789");
    pub const ALPHA_NUMERIC_UPPER: Self = Self("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789");
    pub const ALPHA: Self = Self("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ");
    pub const ALPHA_LOWER: Self = Self("abcdefghijklmnopqrstuvwxyz");
    pub const ALPHA_UPPER: Self = Self("ABCDEFGHIJKLMNOPQRSTUVWXYZ");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Generates an identifier of `length` characters drawn from `range`.
pub fn id_from_source<R: RngCore + ?Sized>(
    rng: &mut R,
    length: usize,
    range: CharacterRange,
) -> String {
    let chars = range.as_str().as_bytes();
    (0..length)
        .map(|_| chars[rng.gen_range(0..chars.len())] as char)
        .collect()
}

/// Non-deterministic identifier.
pub fn id(length: usize, range: CharacterRange) -> String {
    id_from_source(&mut system_source(), length, range)
}

/// Non-deterministic identifier with a prefix. The prefix does not count towards `length`.
pub fn id_with_prefix(prefix: &str, length: usize, range: CharacterRange) -> String {
    format!("{}{}", prefix, id(length, range))
}

/// Identifier drawn from the scope's stream; the n-th call within a scope always yields the
/// same value for the same scope name.
pub fn deterministic_id(scope: &SourceScope<'_>, length: usize, range: CharacterRange) -> String {
    id_from_source(&mut scope.source(), length, range)
}

/// Integer between `min` and `max`, both inclusive.
pub fn int_from_source<R: RngCore + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    rng.gen_range(min..=max)
}

pub fn int(min: i64, max: i64) -> i64 {
    int_from_source(&mut system_source(), min, max)
}

pub fn deterministic_int(scope: &SourceScope<'_>, min: i64, max: i64) -> i64 {
    int_from_source(&mut scope.source(), min, max)
}
