//! The simulation engine for valued-network Markov chains.
//!
//! This module provides:
//! - **errors**: Error types for construction and execution failures
//! - **network**: Mutable valued-graph storage
//! - **term**: Statistic terms and capability slots
//! - **model**: Term sequences with a single aggregate evaluation strategy
//! - **operator**: Set-wide pruning and signal propagation for operator terms
//! - **proposal**: Perturbation-kernel contract
//! - **state**: The network/model/proposal aggregate and its lifecycle
//! - **sampler**: Chain driver with parallel multi-chain fan-out

pub mod errors;
pub mod model;
pub mod network;
pub mod operator;
pub mod proposal;
pub mod sampler;
pub mod state;
pub mod term;
