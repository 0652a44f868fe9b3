//! State lifecycle: the aggregate that ties network, model, and proposal
//! together with consistent lifetimes.
//!
//! Construction runs in a fixed order: model from term specs, network from
//! the initial edge list, one initial-statistics pass with both fully built,
//! then the optional proposal bound to the network and the model's auxiliary
//! storage. A failure at any stage returns `Err` and drops whatever was
//! built, so no partially-initialized state is ever reachable.
//!
//! Teardown is the exact reverse. Field declaration order encodes it:
//! proposal first (it holds views derived from term storage), then the model
//! with its owned child submodels and term storage, then the network. Rust
//! drops fields in declaration order, so the contract is enforced by the
//! type system rather than by convention.

use rand::rngs::StdRng;
use rand::Rng;

use crate::engine::errors::EngineError;
use crate::engine::model::{EvalMode, Model};
use crate::engine::network::{NetworkSpec, WeightedNetwork};
use crate::engine::proposal::{Proposal, ProposalOutcome};
use crate::proposals::{ProposalRegistry, ProposalSpec};
use crate::stats::{build_model, ModelSpec, TermRegistry};

/// Everything needed to construct a [`State`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateSpec {
    pub network: NetworkSpec,
    pub model: ModelSpec,
    /// Pure-evaluation states may omit the proposal.
    pub proposal: Option<ProposalSpec>,
}

/// What one Markov-chain step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Accepted,
    Rejected,
    /// The kernel had no legal move; treated as a rejection by drivers.
    NoMove,
}

/// One self-contained simulation state: network, model, optional proposal,
/// and the running statistic vector.
///
/// Field order is the teardown contract; do not reorder.
pub struct State {
    proposal: Option<Proposal>,
    model: Model,
    network: WeightedNetwork,
    stats: Vec<f64>,
}

impl State {
    /// Construct a state: model, then network, then initial statistics, then
    /// proposal.
    pub fn new(
        spec: &StateSpec,
        terms: &TermRegistry,
        proposals: &ProposalRegistry,
    ) -> Result<Self, EngineError> {
        let mut model = build_model(&spec.model, terms)?;
        let network = WeightedNetwork::from_spec(&spec.network)?;
        let stats = model.init_stats(&network)?;
        let proposal = match &spec.proposal {
            Some(pspec) => {
                let mut kernel = proposals.build(pspec)?;
                let mut aux = model.aux_view();
                kernel.bind(&network, &mut aux)?;
                drop(aux);
                Some(Proposal::new(pspec.name.clone(), kernel))
            }
            None => None,
        };
        Ok(Self {
            proposal,
            model,
            network,
            stats,
        })
    }

    pub fn network(&self) -> &WeightedNetwork {
        &self.network
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    /// The current statistic vector, maintained across accepted steps.
    pub fn stats(&self) -> &[f64] {
        &self.stats
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    /// Run one Metropolis-Hastings step under coefficients `coef`.
    ///
    /// Incremental mode evaluates the change statistics directly; full mode
    /// tentatively applies the perturbation, recomputes, and reverts before
    /// deciding. On acceptance the commit hooks observe the pre-mutation
    /// network, the weight is applied, and the delta is folded into the
    /// running statistic vector. A rejected or move-less step leaves the
    /// network, term storage, and statistics untouched.
    pub fn step(&mut self, coef: &[f64], rng: &mut StdRng) -> Result<StepOutcome, EngineError> {
        if coef.len() != self.model.n_stats() {
            return Err(EngineError::Spec(format!(
                "coefficient length {} does not match statistic count {}",
                coef.len(),
                self.model.n_stats()
            )));
        }
        let outcome = match self.proposal.as_mut() {
            Some(p) => p.propose(&self.network, rng)?,
            None => {
                return Err(EngineError::Spec(
                    "stepping requires a bound proposal".into(),
                ))
            }
        };
        let (change, log_ratio) = match outcome {
            ProposalOutcome::NoMove => return Ok(StepOutcome::NoMove),
            ProposalOutcome::Move { change, log_ratio } => (change, log_ratio),
        };

        let delta: Vec<f64> = match self.model.mode() {
            EvalMode::Incremental => self.model.eval_change(&self.network, change)?.to_vec(),
            EvalMode::FullRecompute => {
                let previous = self.network.apply(change)?;
                let recomputed = self.model.eval_full(&self.network).map(<[f64]>::to_vec);
                self.network
                    .set_weight(change.tail, change.head, previous)?;
                let recomputed = recomputed?;
                recomputed
                    .iter()
                    .zip(&self.stats)
                    .map(|(new, old)| new - old)
                    .collect()
            }
        };

        let log_accept: f64 = coef
            .iter()
            .zip(&delta)
            .map(|(c, d)| c * d)
            .sum::<f64>()
            + log_ratio;
        if log_accept.is_nan() {
            return Err(EngineError::Numerical(
                "acceptance log-probability is NaN".into(),
            ));
        }

        if log_accept >= 0.0 || rng.gen::<f64>().ln() < log_accept {
            self.model.commit(&self.network, change);
            self.network.apply(change)?;
            for (stat, d) in self.stats.iter_mut().zip(&delta) {
                *stat += d;
            }
            Ok(StepOutcome::Accepted)
        } else {
            Ok(StepOutcome::Rejected)
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("proposal", &self.proposal)
            .field("model", &self.model)
            .field("stats", &self.stats)
            .finish()
    }
}
