/// 1-based transcript identifier as written to the probability file; 0 is the noise entry.
pub type TrId = u32;

// Fast hash sets using AHash instead of the default SipHash.
// Import with `use crate::types::{HashSet, HashSetExt}`; `HashSetExt` provides `::new()`.
pub(crate) type HashSet<K> = ahash::HashSet<K>;
pub(crate) use ahash::HashSetExt;
