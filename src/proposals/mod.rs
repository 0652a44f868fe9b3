//! Built-in proposal kernels and the proposal registry.
//!
//! Kernels are selected by `(source, name)` like statistic terms. Built-ins:
//! - `discrete-step`: uniform random dyad, weight +/-1 bounded below by the
//!   absent value; the log-ratio accounts for the reflected move at the
//!   boundary
//! - `gaussian-jump`: uniform random dyad, symmetric Normal weight jump
//!   with the scale taken from the proposal's numeric configuration

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::engine::errors::EngineError;
use crate::engine::model::AuxView;
use crate::engine::network::{DyadChange, WeightedNetwork};
use crate::engine::proposal::{ProposalKernel, ProposalOutcome};

/// Source string the built-in kernels are registered under.
pub const BUILTIN_SOURCE: &str = "valnet";

/// Selection of one proposal kernel, with its numeric configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProposalSpec {
    pub name: String,
    pub source: Option<String>,
    pub inputs: Vec<f64>,
}

impl ProposalSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            inputs: Vec::new(),
        }
    }

    pub fn with_inputs(name: impl Into<String>, inputs: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            source: None,
            inputs,
        }
    }
}

/// Builds one kernel from its spec.
pub trait ProposalBuilder: Send + Sync + 'static {
    fn build(&self, spec: &ProposalSpec) -> Result<Box<dyn ProposalKernel>, EngineError>;
}

/// Registry mapping `(source, name)` to proposal builders.
#[derive(Default, Clone)]
pub struct ProposalRegistry {
    inner: HashMap<(String, String), Arc<dyn ProposalBuilder>>,
}

impl ProposalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in kernels.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register(BUILTIN_SOURCE, "discrete-step", Arc::new(DiscreteStepBuilder));
        r.register(BUILTIN_SOURCE, "gaussian-jump", Arc::new(GaussianJumpBuilder));
        r
    }

    pub fn register(&mut self, source: &str, name: &str, builder: Arc<dyn ProposalBuilder>) {
        self.inner
            .insert((source.to_string(), name.to_string()), builder);
    }

    /// Resolve and build the kernel a spec names.
    pub fn build(&self, spec: &ProposalSpec) -> Result<Box<dyn ProposalKernel>, EngineError> {
        let source = spec.source.as_deref().unwrap_or(BUILTIN_SOURCE);
        let builder = self
            .inner
            .get(&(source.to_string(), spec.name.clone()))
            .ok_or_else(|| {
                EngineError::Spec(format!(
                    "unknown proposal kernel '{}' (source '{}')",
                    spec.name, source
                ))
            })?;
        builder.build(spec)
    }
}

/// Draw a dyad uniformly from everything the network can hold.
fn random_dyad(net: &WeightedNetwork, rng: &mut StdRng) -> Option<(DyadChange, f64)> {
    let count = net.dyad_count();
    if count == 0 {
        return None;
    }
    let index = rng.gen_range(0..count);
    let (tail, head) = net.dyad_at(index)?;
    let weight = net.weight(tail, head);
    Some((
        DyadChange {
            tail,
            head,
            weight,
        },
        weight,
    ))
}

// ---------------------------------------------------------------------------
// discrete-step
// ---------------------------------------------------------------------------

/// Random walk on integer-spaced weights, reflected at the absent value.
///
/// From the floor only the upward move exists, so the forward density there
/// is 1 instead of 1/2; the log-ratio corrects for both directions across
/// the boundary.
struct DiscreteStep;

impl ProposalKernel for DiscreteStep {
    fn bind(
        &mut self,
        net: &WeightedNetwork,
        _aux: &mut AuxView<'_>,
    ) -> Result<(), EngineError> {
        if net.dyad_count() == 0 {
            return Err(EngineError::Spec(
                "discrete-step requires a network with at least one dyad".into(),
            ));
        }
        Ok(())
    }

    fn propose(
        &mut self,
        net: &WeightedNetwork,
        rng: &mut StdRng,
    ) -> Result<ProposalOutcome, EngineError> {
        let Some((mut change, current)) = random_dyad(net, rng) else {
            return Ok(ProposalOutcome::NoMove);
        };
        let absent = net.absent();
        let (proposed, log_ratio) = if current <= absent {
            // Forced upward from the floor.
            (current + 1.0, -std::f64::consts::LN_2)
        } else if rng.gen::<bool>() {
            (current + 1.0, 0.0)
        } else {
            let down = current - 1.0;
            let log_ratio = if down <= absent {
                // The reverse move from the floor is forced.
                std::f64::consts::LN_2
            } else {
                0.0
            };
            (down, log_ratio)
        };
        change.weight = proposed;
        Ok(ProposalOutcome::Move { change, log_ratio })
    }
}

struct DiscreteStepBuilder;

impl ProposalBuilder for DiscreteStepBuilder {
    fn build(&self, spec: &ProposalSpec) -> Result<Box<dyn ProposalKernel>, EngineError> {
        if !spec.inputs.is_empty() {
            return Err(EngineError::Spec(format!(
                "discrete-step takes no numeric inputs, got {}",
                spec.inputs.len()
            )));
        }
        Ok(Box::new(DiscreteStep))
    }
}

// ---------------------------------------------------------------------------
// gaussian-jump
// ---------------------------------------------------------------------------

/// Symmetric Normal jump on a uniformly drawn dyad.
struct GaussianJump {
    jump: Normal<f64>,
}

impl ProposalKernel for GaussianJump {
    fn bind(
        &mut self,
        net: &WeightedNetwork,
        _aux: &mut AuxView<'_>,
    ) -> Result<(), EngineError> {
        if net.dyad_count() == 0 {
            return Err(EngineError::Spec(
                "gaussian-jump requires a network with at least one dyad".into(),
            ));
        }
        Ok(())
    }

    fn propose(
        &mut self,
        net: &WeightedNetwork,
        rng: &mut StdRng,
    ) -> Result<ProposalOutcome, EngineError> {
        let Some((mut change, current)) = random_dyad(net, rng) else {
            return Ok(ProposalOutcome::NoMove);
        };
        change.weight = current + self.jump.sample(rng);
        Ok(ProposalOutcome::Move {
            change,
            log_ratio: 0.0,
        })
    }
}

struct GaussianJumpBuilder;

impl ProposalBuilder for GaussianJumpBuilder {
    fn build(&self, spec: &ProposalSpec) -> Result<Box<dyn ProposalKernel>, EngineError> {
        let scale = match spec.inputs.as_slice() {
            [] => 1.0,
            [scale] => *scale,
            more => {
                return Err(EngineError::Spec(format!(
                    "gaussian-jump takes at most one numeric input, got {}",
                    more.len()
                )))
            }
        };
        if !(scale.is_finite() && scale > 0.0) {
            return Err(EngineError::Spec(format!(
                "gaussian-jump scale must be positive and finite, got {}",
                scale
            )));
        }
        let jump = Normal::new(0.0, scale)
            .map_err(|e| EngineError::Spec(format!("gaussian-jump scale rejected: {}", e)))?;
        Ok(Box::new(GaussianJump { jump }))
    }
}
