//! The cancellation primitive shared by the plan executor and the remote
//! client pool. Re-exported rather than reimplemented: `tokio_util`'s
//! token already gives cooperative, clone-cheap, tree-shaped cancellation.

pub use tokio_util::sync::CancellationToken;
