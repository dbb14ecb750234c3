//! `jobtree-kernel` – the job tree manager.
//!
//! Organises processes into a tree of jobs, keeps each job's readiness
//! signals in step with its children, cascades termination, ranks every job
//! in one tree-wide importance order and tracks exception port bindings.
//!
//! # Modules
//!
//! - [`job`] – [`Job`]: a tree node.  Creation, child membership, lookup,
//!   policy, name, info snapshots and signal waiting.
//! - [`cascade`] – [`Job::kill`]: the termination cascade.
//! - [`importance`] – effective importance, explicit ranks and the
//!   tree-wide importance list.
//! - [`exception`] – [`ExceptionPort`][exception::ExceptionPort] binding
//!   and unbinding.
//! - [`enumerate`] – [`JobEnumerator`][enumerate::JobEnumerator]: visiting a
//!   job's children, optionally recursively.
//! - [`policy`] – [`PolicyMerger`][policy::PolicyMerger] and the reference
//!   [`BasicPolicyMerger`][policy::BasicPolicyMerger].
//! - [`process`] – [`ProcessNode`][process::ProcessNode]: what the tree
//!   needs from a process.
//! - [`tree`] – [`JobTree`]: the root job and tree-wide operations.

pub mod cascade;
pub mod enumerate;
pub mod exception;
pub mod importance;
pub mod job;
pub mod policy;
pub mod process;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use enumerate::JobEnumerator;
pub use exception::ExceptionPort;
pub use job::Job;
pub use policy::{BasicPolicyMerger, PolicyMerger};
pub use process::ProcessNode;
pub use tree::JobTree;
