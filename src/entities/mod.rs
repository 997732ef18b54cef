// Entity Models
//
// Each entity has:
// - Stable identity (id) assigned by the store that NEVER changes
// - Values that change through explicit create/update operations
// - Create fields and partial patches that validate before touching the store

pub mod branch;

pub use branch::{Branch, BranchPatch, NewBranch, BRANCHES_TABLE, DEFAULT_COUNTRY};
