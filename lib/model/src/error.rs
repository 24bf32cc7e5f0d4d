use thiserror::Error;

/// Raised when two subsets of different universes are combined.
///
/// All plan nodes of one planning pass must share the same variable and triple universes. Mixing
/// subsets of unrelated universes would silently reinterpret ids, hence this is treated as an
/// error instead.
#[derive(Clone, Copy, Debug, Default, Error, PartialEq, Eq)]
#[error("Subsets stem from different universes")]
pub struct UniverseMismatchError;
