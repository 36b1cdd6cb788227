//! Graph execution runtimes.
//!
//! [`backend`] holds the interfaces the pipeline talks to (backend trait,
//! capability provider, host functions); [`cpu_backend`] is the reference
//! batched executor used to check graph definitions against eager runs.

pub mod backend;
pub mod cpu_backend;
