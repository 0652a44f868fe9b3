//! Chain driver: repeated Metropolis-Hastings stepping over a state, with
//! parallel multi-chain fan-out.
//!
//! One chain owns one [`State`] and one seeded RNG; parallel runs give every
//! chain its own freshly built state and a per-chain seed, so no two workers
//! ever touch the same mutable simulation data.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::engine::errors::EngineError;
use crate::engine::state::{State, StateSpec, StepOutcome};
use crate::proposals::ProposalRegistry;
use crate::stats::TermRegistry;

/// Configuration for one chain run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainConfig {
    /// Total Markov-chain steps to attempt.
    pub steps: usize,
    /// Steps discarded before sampling begins.
    pub burn_in: usize,
    /// Record every `thin`-th post-burn-in statistic vector.
    pub thin: usize,
    /// RNG seed; parallel runs offset it per chain.
    pub seed: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            steps: 1_000,
            burn_in: 100,
            thin: 10,
            seed: 0,
        }
    }
}

/// What one chain produced.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainSummary {
    /// Statistic vector at the end of the run.
    pub final_stats: Vec<f64>,
    /// Thinned post-burn-in statistic samples.
    pub samples: Vec<Vec<f64>>,
    pub accepted: usize,
    pub rejected: usize,
    pub no_move: usize,
}

/// Drive one chain over an already-built state.
pub fn run_chain(
    state: &mut State,
    coef: &[f64],
    config: &ChainConfig,
) -> Result<ChainSummary, EngineError> {
    if coef.len() != state.model().n_stats() {
        return Err(EngineError::Spec(format!(
            "coefficient length {} does not match statistic count {}",
            coef.len(),
            state.model().n_stats()
        )));
    }
    if config.thin == 0 {
        return Err(EngineError::Spec("thin must be positive".into()));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut summary = ChainSummary {
        final_stats: Vec::new(),
        samples: Vec::new(),
        accepted: 0,
        rejected: 0,
        no_move: 0,
    };
    for step in 0..config.steps {
        match state.step(coef, &mut rng)? {
            StepOutcome::Accepted => summary.accepted += 1,
            StepOutcome::Rejected => summary.rejected += 1,
            StepOutcome::NoMove => summary.no_move += 1,
        }
        if step >= config.burn_in && (step - config.burn_in) % config.thin == 0 {
            summary.samples.push(state.stats().to_vec());
        }
    }
    summary.final_stats = state.stats().to_vec();
    Ok(summary)
}

/// Run `n_chains` independent chains in parallel.
///
/// Each chain builds its own state from `spec` and seeds its RNG with
/// `config.seed + chain_index`, so runs are reproducible and chains never
/// share mutable data.
pub fn run_chains(
    spec: &StateSpec,
    coef: &[f64],
    config: &ChainConfig,
    n_chains: usize,
    terms: &TermRegistry,
    proposals: &ProposalRegistry,
) -> Result<Vec<ChainSummary>, EngineError> {
    (0..n_chains)
        .into_par_iter()
        .map(|chain| {
            let mut state = State::new(spec, terms, proposals)?;
            let chain_config = ChainConfig {
                seed: config.seed.wrapping_add(chain as u64),
                ..config.clone()
            };
            run_chain(&mut state, coef, &chain_config)
        })
        .collect()
}
