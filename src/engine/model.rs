//! Model: an ordered sequence of statistic terms evaluated under a single
//! aggregate strategy.
//!
//! The output statistic vector is the concatenation of each term's
//! contribution in term order; `n_stats` is the sum of term widths and is
//! fixed at construction. One shared workspace buffer of that length is
//! reused across evaluations, so exactly one evaluation may be in flight
//! against a model at a time.
//!
//! The evaluation strategy is a model-wide, binary decision made once at
//! construction: incremental evaluation is chosen only when *every* term
//! carries the change capability; otherwise the whole model recomputes from
//! scratch each step. Whichever slot the chosen strategy will never exercise
//! is disabled on every term, so a model never mixes strategies.

use smallvec::SmallVec;

use crate::engine::errors::EngineError;
use crate::engine::network::{DyadChange, WeightedNetwork};
use crate::engine::term::{Capability, Signal, Term};

/// Aggregate evaluation strategy, chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Every term computes change statistics for proposed perturbations.
    Incremental,
    /// Every term recomputes its contribution from scratch each step.
    FullRecompute,
}

/// One auxiliary-storage slot per term, in term order.
///
/// Proposal kernels receive this view at bind time. Terms that publish
/// nothing contribute `None`; kernels must not assume any particular term's
/// storage layout.
pub type AuxView<'a> = Vec<Option<&'a mut (dyn std::any::Any + Send)>>;

/// An ordered collection of terms plus the shared output workspace.
pub struct Model {
    terms: Vec<Term>,
    offsets: SmallVec<[usize; 8]>,
    n_stats: usize,
    mode: EvalMode,
    workspace: Vec<f64>,
}

impl Model {
    /// Assemble a model from already-built terms, selecting the evaluation
    /// strategy and narrowing capability slots accordingly.
    ///
    /// Fails when full-recompute mode is forced but some term cannot
    /// recompute from scratch: such a model could never evaluate, and the
    /// mismatch is a configuration error owed to the caller now rather than
    /// mid-chain.
    pub fn from_terms(mut terms: Vec<Term>) -> Result<Self, EngineError> {
        let mode = select_eval_mode(&mut terms)?;
        let mut offsets = SmallVec::new();
        let mut n_stats = 0;
        for term in &terms {
            offsets.push(n_stats);
            n_stats += term.width();
        }
        Ok(Self {
            terms,
            offsets,
            n_stats,
            mode,
            workspace: vec![0.0; n_stats],
        })
    }

    /// Total statistic count; fixed after construction.
    pub fn n_stats(&self) -> usize {
        self.n_stats
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Mutable term access for set-wide capability pruning.
    pub fn terms_mut(&mut self) -> &mut [Term] {
        &mut self.terms
    }

    /// Whether any term still carries an enabled `cap` slot.
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.terms.iter().any(|t| t.has(cap))
    }

    /// Run every term's init hook against a freshly built network, returning
    /// the starting statistic vector.
    ///
    /// Always available: init is not part of the prunable capability set.
    pub fn init_stats(&mut self, net: &WeightedNetwork) -> Result<Vec<f64>, EngineError> {
        let mut out = vec![0.0; self.n_stats];
        for (i, term) in self.terms.iter_mut().enumerate() {
            let start = self.offsets[i];
            term.init(net, &mut out[start..start + term.width()])?;
        }
        Ok(out)
    }

    /// Recompute the full statistic vector from scratch into the workspace.
    pub fn eval_full(&mut self, net: &WeightedNetwork) -> Result<&[f64], EngineError> {
        if self.mode != EvalMode::FullRecompute {
            return Err(EngineError::Internal(
                "full evaluation requested from an incremental-mode model".into(),
            ));
        }
        self.workspace.fill(0.0);
        for (i, term) in self.terms.iter_mut().enumerate() {
            let start = self.offsets[i];
            term.recompute(net, &mut self.workspace[start..start + term.width()])?;
        }
        Ok(&self.workspace)
    }

    /// Compute the statistic delta for one proposed perturbation into the
    /// workspace. The network is not touched.
    pub fn eval_change(
        &mut self,
        net: &WeightedNetwork,
        change: DyadChange,
    ) -> Result<&[f64], EngineError> {
        if self.mode != EvalMode::Incremental {
            return Err(EngineError::Internal(
                "change evaluation requested from a full-recompute model".into(),
            ));
        }
        self.workspace.fill(0.0);
        for (i, term) in self.terms.iter_mut().enumerate() {
            let start = self.offsets[i];
            term.change(net, change, &mut self.workspace[start..start + term.width()])?;
        }
        Ok(&self.workspace)
    }

    /// Deliver an exogenous signal to every signal-capable term, each writing
    /// its slice of `out`.
    ///
    /// `out` is written as-is; callers that need a clean buffer zero it
    /// first (see [`crate::engine::operator::propagate_signal`]).
    pub fn send_signal(
        &mut self,
        net: &WeightedNetwork,
        signal: &Signal<'_>,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        if out.len() != self.n_stats {
            return Err(EngineError::Spec(format!(
                "signal output length {} does not match statistic count {}",
                out.len(),
                self.n_stats
            )));
        }
        for (i, term) in self.terms.iter_mut().enumerate() {
            let start = self.offsets[i];
            term.on_signal(net, signal, &mut out[start..start + term.width()])?;
        }
        Ok(())
    }

    /// Deliver a signal into the model's own workspace, zeroed as scratch.
    pub fn signal_into_workspace(
        &mut self,
        net: &WeightedNetwork,
        signal: &Signal<'_>,
    ) -> Result<&[f64], EngineError> {
        let mut workspace = std::mem::take(&mut self.workspace);
        workspace.fill(0.0);
        let sent = self.send_signal(net, signal, &mut workspace);
        self.workspace = workspace;
        sent?;
        Ok(&self.workspace)
    }

    /// Let every term update persistent storage for an accepted perturbation.
    ///
    /// Called with the pre-mutation network; only accepted steps reach here.
    pub fn commit(&mut self, net: &WeightedNetwork, change: DyadChange) {
        for term in &mut self.terms {
            term.commit(net, change);
        }
    }

    /// Collect each term's auxiliary storage for proposal binding.
    pub fn aux_view(&mut self) -> AuxView<'_> {
        self.terms.iter_mut().map(|t| t.aux()).collect()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("terms", &self.terms)
            .field("n_stats", &self.n_stats)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Choose the model-wide evaluation strategy and narrow term slots (never
/// revisited after construction).
fn select_eval_mode(terms: &mut [Term]) -> Result<EvalMode, EngineError> {
    let all_incremental = terms.iter().all(|t| t.has(Capability::Change));
    if all_incremental {
        for term in terms.iter_mut() {
            term.disable(Capability::Full);
        }
        Ok(EvalMode::Incremental)
    } else {
        if let Some(term) = terms.iter().find(|t| !t.has(Capability::Full)) {
            return Err(EngineError::Spec(format!(
                "term '{}' supports neither change nor full-recompute evaluation \
                 under full-recompute mode",
                term.name()
            )));
        }
        for term in terms.iter_mut() {
            term.disable(Capability::Change);
        }
        Ok(EvalMode::FullRecompute)
    }
}
