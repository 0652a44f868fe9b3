//! Proposal kernels: named generators of candidate dyad perturbations.
//!
//! A kernel drives the Markov chain by proposing one dyad/weight change per
//! step. Kernels are selected by `(source, name)` from a registry (see
//! [`crate::proposals`]), bound once at state construction against the
//! network and the root model's auxiliary storage, and then queried each
//! step. "No legal move" is an ordinary, recoverable answer; the driver
//! treats it as a rejected step.

use rand::rngs::StdRng;

use crate::engine::errors::EngineError;
use crate::engine::model::AuxView;
use crate::engine::network::{DyadChange, WeightedNetwork};

/// Outcome of asking a kernel for a candidate move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProposalOutcome {
    /// A candidate perturbation plus the kernel's log proposal ratio,
    /// `ln q(reverse) - ln q(forward)`, folded into the acceptance
    /// probability by the driver.
    Move {
        change: DyadChange,
        log_ratio: f64,
    },
    /// No legal move available.
    NoMove,
}

/// A dyad/weight perturbation generator.
pub trait ProposalKernel: Send {
    /// Validate against the bound network and inspect the root model's
    /// auxiliary storage. Called once at state construction; kernels must
    /// not assume any particular term's storage layout.
    fn bind(
        &mut self,
        net: &WeightedNetwork,
        aux: &mut AuxView<'_>,
    ) -> Result<(), EngineError> {
        let _ = (net, aux);
        Ok(())
    }

    /// Generate a candidate perturbation.
    fn propose(
        &mut self,
        net: &WeightedNetwork,
        rng: &mut StdRng,
    ) -> Result<ProposalOutcome, EngineError>;
}

/// A selected, bound kernel together with its registry identity.
pub struct Proposal {
    name: String,
    kernel: Box<dyn ProposalKernel>,
}

impl Proposal {
    pub(crate) fn new(name: impl Into<String>, kernel: Box<dyn ProposalKernel>) -> Self {
        Self {
            name: name.into(),
            kernel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn propose(
        &mut self,
        net: &WeightedNetwork,
        rng: &mut StdRng,
    ) -> Result<ProposalOutcome, EngineError> {
        self.kernel.propose(net, rng)
    }
}

impl std::fmt::Debug for Proposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proposal").field("name", &self.name).finish()
    }
}
