//! Built-in statistic terms and the term registry.
//!
//! Terms are selected by `(source, name)`; the registry maps each pair to a
//! builder that consumes its declared arguments from the shared
//! numeric-input stack. Registering under your own source string lets host
//! packages add term families without touching the built-ins.
//!
//! Built-ins:
//! - `sum`: sum of edge weights above the absent value
//! - `nonzero`: count of present edges
//! - `atleast(threshold)`: count of edges with weight >= threshold
//! - `maxweight`: maximum edge weight (full-recompute only)
//! - `scaledsum`: covariate-scaled weight sum; handles covariate signals
//! - `passthrough`: operator term delegating to a child submodel

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::errors::EngineError;
use crate::engine::model::{EvalMode, Model};
use crate::engine::network::{DyadChange, WeightedNetwork};
use crate::engine::operator::{propagate_signal, prune_if_unused, Propagate};
use crate::engine::term::{Capability, CapabilitySet, Signal, SignalKind, Term, TermImpl};

/// Source string the built-in terms are registered under.
pub const BUILTIN_SOURCE: &str = "valnet";

/// Model configuration: term selections plus the shared numeric-input stack.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelSpec {
    pub terms: Vec<TermSpec>,
    /// Numeric inputs consumed left-to-right by the term builders.
    pub inputs: Vec<f64>,
}

impl ModelSpec {
    pub fn new(terms: Vec<TermSpec>) -> Self {
        Self {
            terms,
            inputs: Vec::new(),
        }
    }
}

/// Selection of one term by name, with an optional source qualifier and, for
/// operator terms, a nested submodel specification.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TermSpec {
    pub name: String,
    pub source: Option<String>,
    pub submodel: Option<ModelSpec>,
}

impl TermSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            submodel: None,
        }
    }

    pub fn with_submodel(name: impl Into<String>, submodel: ModelSpec) -> Self {
        Self {
            name: name.into(),
            source: None,
            submodel: Some(submodel),
        }
    }
}

/// Cursor over the shared numeric-input stack.
///
/// Each builder takes its declared arguments in term order; running short or
/// leaving values unconsumed is a configuration error.
pub struct InputStack<'a> {
    data: &'a [f64],
    pos: usize,
}

impl<'a> InputStack<'a> {
    pub fn new(data: &'a [f64]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn take(&mut self, n: usize, term: &str) -> Result<&'a [f64], EngineError> {
        if self.pos + n > self.data.len() {
            return Err(EngineError::Spec(format!(
                "term '{}' needs {} numeric input(s) but only {} remain",
                term,
                n,
                self.data.len() - self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn take_one(&mut self, term: &str) -> Result<f64, EngineError> {
        Ok(self.take(1, term)?[0])
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Builds one term implementation from its spec slot and the input stack.
pub trait TermBuilder: Send + Sync + 'static {
    fn build(
        &self,
        spec: &TermSpec,
        inputs: &mut InputStack<'_>,
        registry: &TermRegistry,
    ) -> Result<Box<dyn TermImpl>, EngineError>;
}

/// Registry mapping `(source, name)` to term builders.
#[derive(Default, Clone)]
pub struct TermRegistry {
    inner: HashMap<(String, String), Arc<dyn TermBuilder>>,
}

impl TermRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in term family.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register(BUILTIN_SOURCE, "sum", Arc::new(SumBuilder));
        r.register(BUILTIN_SOURCE, "nonzero", Arc::new(NonzeroBuilder));
        r.register(BUILTIN_SOURCE, "atleast", Arc::new(AtLeastBuilder));
        r.register(BUILTIN_SOURCE, "maxweight", Arc::new(MaxWeightBuilder));
        r.register(BUILTIN_SOURCE, "scaledsum", Arc::new(ScaledSumBuilder));
        r.register(BUILTIN_SOURCE, "passthrough", Arc::new(PassthroughBuilder));
        r
    }

    pub fn register(&mut self, source: &str, name: &str, builder: Arc<dyn TermBuilder>) {
        self.inner
            .insert((source.to_string(), name.to_string()), builder);
    }

    fn resolve(
        &self,
        source: Option<&str>,
        name: &str,
    ) -> Result<&Arc<dyn TermBuilder>, EngineError> {
        let source = source.unwrap_or(BUILTIN_SOURCE);
        self.inner
            .get(&(source.to_string(), name.to_string()))
            .ok_or_else(|| {
                EngineError::Spec(format!(
                    "unknown statistic term '{}' (source '{}')",
                    name, source
                ))
            })
    }
}

/// Build a model from its spec: resolve every term, feed the input stack
/// through the builders in term order, and hand the terms to
/// [`Model::from_terms`] for mode selection.
///
/// The stack must come out exactly empty; leftovers mean the input list and
/// the term list disagree.
pub fn build_model(spec: &ModelSpec, registry: &TermRegistry) -> Result<Model, EngineError> {
    let mut inputs = InputStack::new(&spec.inputs);
    let mut terms = Vec::with_capacity(spec.terms.len());
    for term_spec in &spec.terms {
        let builder = registry.resolve(term_spec.source.as_deref(), &term_spec.name)?;
        let imp = builder.build(term_spec, &mut inputs, registry)?;
        terms.push(Term::new(&term_spec.name, imp));
    }
    if inputs.remaining() != 0 {
        return Err(EngineError::Spec(format!(
            "numeric-input stack has {} unconsumed value(s) after building {} term(s)",
            inputs.remaining(),
            spec.terms.len()
        )));
    }
    Model::from_terms(terms)
}

// ---------------------------------------------------------------------------
// sum
// ---------------------------------------------------------------------------

/// Sum of `weight - absent` over present edges.
struct SumTerm;

impl TermImpl for SumTerm {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full_and_change()
    }

    fn init(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        self.recompute(net, out)
    }

    fn recompute(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        out[0] = net.edges().map(|(_, _, w)| w - net.absent()).sum();
        Ok(())
    }

    fn change(
        &mut self,
        net: &WeightedNetwork,
        change: DyadChange,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        out[0] = change.weight - net.weight(change.tail, change.head);
        Ok(())
    }
}

struct SumBuilder;

impl TermBuilder for SumBuilder {
    fn build(
        &self,
        _spec: &TermSpec,
        _inputs: &mut InputStack<'_>,
        _registry: &TermRegistry,
    ) -> Result<Box<dyn TermImpl>, EngineError> {
        Ok(Box::new(SumTerm))
    }
}

// ---------------------------------------------------------------------------
// nonzero
// ---------------------------------------------------------------------------

/// Count of present edges.
struct NonzeroTerm;

impl TermImpl for NonzeroTerm {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full_and_change()
    }

    fn init(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        self.recompute(net, out)
    }

    fn recompute(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        out[0] = net.edge_count() as f64;
        Ok(())
    }

    fn change(
        &mut self,
        net: &WeightedNetwork,
        change: DyadChange,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let was = net.weight(change.tail, change.head) != net.absent();
        let is = change.weight != net.absent();
        out[0] = f64::from(is as i32 - was as i32);
        Ok(())
    }
}

struct NonzeroBuilder;

impl TermBuilder for NonzeroBuilder {
    fn build(
        &self,
        _spec: &TermSpec,
        _inputs: &mut InputStack<'_>,
        _registry: &TermRegistry,
    ) -> Result<Box<dyn TermImpl>, EngineError> {
        Ok(Box::new(NonzeroTerm))
    }
}

// ---------------------------------------------------------------------------
// atleast
// ---------------------------------------------------------------------------

/// Count of edges with weight >= threshold. The threshold must exceed the
/// absent value, otherwise every missing edge would count too.
struct AtLeastTerm {
    threshold: f64,
}

impl TermImpl for AtLeastTerm {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full_and_change()
    }

    fn init(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        if self.threshold <= net.absent() {
            return Err(EngineError::Spec(format!(
                "atleast threshold {} must exceed the absent value {}",
                self.threshold,
                net.absent()
            )));
        }
        self.recompute(net, out)
    }

    fn recompute(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        out[0] = net
            .edges()
            .filter(|&(_, _, w)| w >= self.threshold)
            .count() as f64;
        Ok(())
    }

    fn change(
        &mut self,
        net: &WeightedNetwork,
        change: DyadChange,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let was = net.weight(change.tail, change.head) >= self.threshold;
        let is = change.weight >= self.threshold;
        out[0] = f64::from(is as i32 - was as i32);
        Ok(())
    }
}

struct AtLeastBuilder;

impl TermBuilder for AtLeastBuilder {
    fn build(
        &self,
        _spec: &TermSpec,
        inputs: &mut InputStack<'_>,
        _registry: &TermRegistry,
    ) -> Result<Box<dyn TermImpl>, EngineError> {
        let threshold = inputs.take_one("atleast")?;
        Ok(Box::new(AtLeastTerm { threshold }))
    }
}

// ---------------------------------------------------------------------------
// maxweight
// ---------------------------------------------------------------------------

/// Maximum edge weight; the absent value on an empty network.
///
/// Full-recompute only: the maximum cannot be maintained incrementally when
/// the maximal edge shrinks, so a model containing this term runs in
/// full-recompute mode.
struct MaxWeightTerm;

impl TermImpl for MaxWeightTerm {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full_only()
    }

    fn init(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        self.recompute(net, out)
    }

    fn recompute(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        out[0] = net
            .edges()
            .map(|(_, _, w)| w)
            .fold(net.absent(), f64::max);
        Ok(())
    }
}

struct MaxWeightBuilder;

impl TermBuilder for MaxWeightBuilder {
    fn build(
        &self,
        _spec: &TermSpec,
        _inputs: &mut InputStack<'_>,
        _registry: &TermRegistry,
    ) -> Result<Box<dyn TermImpl>, EngineError> {
        Ok(Box::new(MaxWeightTerm))
    }
}

// ---------------------------------------------------------------------------
// scaledsum
// ---------------------------------------------------------------------------

/// Weight sum scaled by an exogenous covariate: `c * sum(weight - absent)`.
///
/// The running sum is private storage seeded at init and maintained by the
/// commit hook; a covariate signal carrying a new `f64` coefficient writes
/// the resulting statistic shift and replaces the coefficient.
struct ScaledSumTerm {
    coefficient: f64,
    cached_sum: f64,
}

impl TermImpl for ScaledSumTerm {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full_and_change().with_signal()
    }

    fn init(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        self.cached_sum = net.edges().map(|(_, _, w)| w - net.absent()).sum();
        out[0] = self.coefficient * self.cached_sum;
        Ok(())
    }

    fn recompute(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        out[0] = self.coefficient
            * net
                .edges()
                .map(|(_, _, w)| w - net.absent())
                .sum::<f64>();
        Ok(())
    }

    fn change(
        &mut self,
        net: &WeightedNetwork,
        change: DyadChange,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        out[0] = self.coefficient * (change.weight - net.weight(change.tail, change.head));
        Ok(())
    }

    fn on_signal(
        &mut self,
        _net: &WeightedNetwork,
        signal: &Signal<'_>,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        if signal.kind != SignalKind::Covariate {
            return Ok(());
        }
        let new_coefficient = signal
            .payload
            .and_then(|p| p.downcast_ref::<f64>())
            .copied()
            .ok_or_else(|| {
                EngineError::Execution(
                    "covariate signal for scaledsum must carry an f64 payload".into(),
                )
            })?;
        out[0] += (new_coefficient - self.coefficient) * self.cached_sum;
        self.coefficient = new_coefficient;
        Ok(())
    }

    fn commit(&mut self, net: &WeightedNetwork, change: DyadChange) {
        self.cached_sum += change.weight - net.weight(change.tail, change.head);
    }
}

struct ScaledSumBuilder;

impl TermBuilder for ScaledSumBuilder {
    fn build(
        &self,
        _spec: &TermSpec,
        inputs: &mut InputStack<'_>,
        _registry: &TermRegistry,
    ) -> Result<Box<dyn TermImpl>, EngineError> {
        let coefficient = inputs.take_one("scaledsum")?;
        Ok(Box::new(ScaledSumTerm {
            coefficient,
            cached_sum: 0.0,
        }))
    }
}

// ---------------------------------------------------------------------------
// passthrough
// ---------------------------------------------------------------------------

/// Operator term whose output is its child submodel's output.
///
/// Exposes exactly the evaluation capability implied by the child's chosen
/// mode, so a capability mismatch between submodel and parent surfaces at
/// parent construction. Carries a signal slot only when some child term has
/// one (the forwarding hook would otherwise be an always-unused hazard).
struct PassthroughTerm {
    child: Model,
    forwards_signals: bool,
}

impl TermImpl for PassthroughTerm {
    fn width(&self) -> usize {
        self.child.n_stats()
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            full: self.child.mode() == EvalMode::FullRecompute,
            change: self.child.mode() == EvalMode::Incremental,
            signal: self.forwards_signals,
        }
    }

    fn init(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        let stats = self.child.init_stats(net)?;
        out.copy_from_slice(&stats);
        Ok(())
    }

    fn recompute(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        let stats = self.child.eval_full(net)?;
        out.copy_from_slice(stats);
        Ok(())
    }

    fn change(
        &mut self,
        net: &WeightedNetwork,
        change: DyadChange,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let delta = self.child.eval_change(net, change)?;
        out.copy_from_slice(delta);
        Ok(())
    }

    fn on_signal(
        &mut self,
        net: &WeightedNetwork,
        signal: &Signal<'_>,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        propagate_signal(net, &mut self.child, signal, Propagate::Overwrite(out))
    }

    fn commit(&mut self, net: &WeightedNetwork, change: DyadChange) {
        self.child.commit(net, change);
    }
}

struct PassthroughBuilder;

impl TermBuilder for PassthroughBuilder {
    fn build(
        &self,
        spec: &TermSpec,
        _inputs: &mut InputStack<'_>,
        registry: &TermRegistry,
    ) -> Result<Box<dyn TermImpl>, EngineError> {
        let submodel_spec = spec.submodel.as_ref().ok_or_else(|| {
            EngineError::Spec("passthrough requires a submodel specification".into())
        })?;
        let mut child = build_model(submodel_spec, registry)?;
        let forwards_signals =
            prune_if_unused(Capability::Signal, [child.terms_mut()]);
        Ok(Box::new(PassthroughTerm {
            child,
            forwards_signals,
        }))
    }
}
