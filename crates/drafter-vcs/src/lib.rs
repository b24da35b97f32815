pub mod branch;
pub mod diff;
pub mod push;

pub use branch::{BranchService, MergeOutcome};
pub use diff::{DirtySet, DirtySetOptions, SyncService};
pub use push::{PushOutcome, PushReconciler};

/// Safety bound on commit-chain walks. A chain longer than this is
/// truncated rather than walked forever, so a cycle or a missing parent
/// link degrades to an approximate count instead of a hang.
pub(crate) const MAX_CHAIN_HOPS: u32 = 1000;
