//! Cross-cutting helpers for operator-style terms.
//!
//! Operator terms delegate to child submodels instead of computing directly
//! from the network. Two pieces of shared machinery live here:
//!
//! - **Set-wide capability pruning**: one generic scan over one or more
//!   independent term sets that disables a capability everywhere when no set
//!   exercises it. An always-unused hook is pure overhead and a correctness
//!   hazard if accidentally invoked.
//! - **Signal propagation**: delivery of an exogenous signal into a child
//!   submodel, either overwriting a caller-supplied buffer or accumulating
//!   into one that already holds contributions from other sources.

use crate::engine::errors::EngineError;
use crate::engine::model::Model;
use crate::engine::network::WeightedNetwork;
use crate::engine::term::{Capability, Signal, Term};

/// Where a child submodel's signal response lands.
pub enum Propagate<'a> {
    /// Zero the buffer, then let each child term write its slice directly.
    /// Use when the operator term's output *is* the child's output.
    Overwrite(&'a mut [f64]),
    /// Dispatch into the child's own workspace first, then add element-wise.
    /// Use when the buffer already holds contributions that must survive.
    AccumulateInto(&'a mut [f64]),
}

/// Scan term sets for an enabled capability slot and disable it everywhere
/// when no set exercises it.
///
/// Returns whether the capability is still in use; operator terms use the
/// answer to decide whether to carry their own forwarding slot. Idempotent:
/// pruning only ever disables, so a second run is a no-op.
pub fn prune_if_unused<'a, I>(cap: Capability, sets: I) -> bool
where
    I: IntoIterator<Item = &'a mut [Term]>,
{
    let sets: Vec<&'a mut [Term]> = sets.into_iter().collect();
    let used = sets.iter().any(|set| set.iter().any(|t| t.has(cap)));
    if !used {
        for set in sets {
            for term in set.iter_mut() {
                term.disable(cap);
            }
        }
    }
    used
}

/// [`prune_if_unused`] over whole submodels, e.g. the children of several
/// operator terms.
pub fn prune_if_unused_in_models<'a, I>(cap: Capability, models: I) -> bool
where
    I: IntoIterator<Item = &'a mut Model>,
{
    prune_if_unused(cap, models.into_iter().map(|m| m.terms_mut()))
}

/// Deliver an exogenous signal to a child submodel, collecting the child
/// terms' responses into the caller's buffer.
///
/// The buffer length must equal the child's statistic count; a mismatch is a
/// fatal configuration error reported before anything is written.
pub fn propagate_signal(
    net: &WeightedNetwork,
    child: &mut Model,
    signal: &Signal<'_>,
    how: Propagate<'_>,
) -> Result<(), EngineError> {
    let out_len = match &how {
        Propagate::Overwrite(out) => out.len(),
        Propagate::AccumulateInto(out) => out.len(),
    };
    if out_len != child.n_stats() {
        return Err(EngineError::Spec(format!(
            "signal propagation: output length {} does not match child statistic count {}",
            out_len,
            child.n_stats()
        )));
    }
    match how {
        Propagate::Overwrite(out) => {
            out.fill(0.0);
            child.send_signal(net, signal, out)
        }
        Propagate::AccumulateInto(out) => {
            let response = child.signal_into_workspace(net, signal)?;
            accumulate(out, response);
            Ok(())
        }
    }
}

/// `dst[i] += src[i]` over equal-length slices.
pub(crate) fn accumulate(dst: &mut [f64], src: &[f64]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s;
    }
}
