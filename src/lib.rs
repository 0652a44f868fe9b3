//! # Valnet
//!
//! Markov-chain engine for valued statistical network models: a mutable
//! weighted network, a composable model of statistic terms, and pluggable
//! Metropolis-Hastings proposal kernels, tied together by a [`State`] with
//! construction and teardown order enforced by ownership.

pub mod engine;
pub mod proposals;
pub mod stats;

// Re-export commonly used types
pub use engine::errors::EngineError;
pub use engine::model::{EvalMode, Model};
pub use engine::network::{DyadChange, NetworkSpec, NodeId, WeightedNetwork};
pub use engine::operator::{propagate_signal, prune_if_unused, Propagate};
pub use engine::proposal::{ProposalKernel, ProposalOutcome};
pub use engine::sampler::{run_chain, run_chains, ChainConfig, ChainSummary};
pub use engine::state::{State, StateSpec, StepOutcome};
pub use engine::term::{Capability, CapabilitySet, Signal, SignalKind, Term, TermImpl};
pub use proposals::{ProposalRegistry, ProposalSpec};
pub use stats::{build_model, ModelSpec, TermRegistry, TermSpec};
