//! One module per state variant
//!
//! Each module offers the same two operations. Targets are validated by the
//! caller: only stable statuses reach these functions.

pub(crate) mod deployed_started;
pub(crate) mod deployed_stopped;
pub(crate) mod not_deployed;
pub(crate) mod transitive;
pub(crate) mod unresolved;
pub(crate) mod waiting_for_ancestor;
