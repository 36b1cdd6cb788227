//! # Graph Analysis Module
//!
//! Passes that inspect an emitted graph before it reaches a runtime.
//!
//! ## Available Passes
//!
//! - [`GraphCheck`](graph_check::GraphCheck): verifies that a
//!   [`GraphDefinition`](crate::tensor::GraphDefinition) is complete
//!   (no dangling references or cycles, all host functions registered,
//!   image operators wired with the right number of inputs) and returns the
//!   evaluation order.
//!
//! ```text
//! GraphDefinition -> GraphCheck -> evaluation order
//! ```

pub mod graph_check;
