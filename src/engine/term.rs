//! Statistic terms and their capability slots.
//!
//! A term is one statistic-contributing unit of a model. Its formula lives
//! behind the [`TermImpl`] trait together with whatever private working
//! storage the formula needs; the engine holds it boxed inside a [`Term`]
//! next to the capability slots that survived model construction.
//!
//! Capabilities are narrowed, never widened: a [`TermImpl`] reports the
//! hooks it populates through [`TermImpl::capabilities`], and model
//! construction disables the slots the chosen evaluation strategy will never
//! exercise. Dispatching through a disabled slot is a programmer error and
//! surfaces as [`EngineError::Internal`].

use std::any::Any;

use crate::engine::errors::EngineError;
use crate::engine::network::{DyadChange, WeightedNetwork};

/// Kind of an exogenous event delivered to signal-capable terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// An external covariate changed.
    Covariate,
    /// A clock tick in temporal models.
    Tick,
    /// An application-defined signal.
    Custom(u32),
}

/// An exogenous event (not a dyad change) with an opaque payload.
pub struct Signal<'a> {
    pub kind: SignalKind,
    pub payload: Option<&'a dyn Any>,
}

impl<'a> Signal<'a> {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    pub fn with_payload(kind: SignalKind, payload: &'a dyn Any) -> Self {
        Self {
            kind,
            payload: Some(payload),
        }
    }
}

/// One of the capability slots a term may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Full recompute of the term's statistics from scratch.
    Full,
    /// Incremental change statistic for a single dyad perturbation.
    Change,
    /// Exogenous-signal handling.
    Signal,
}

/// The set of capabilities a term populates or retains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    pub full: bool,
    pub change: bool,
    pub signal: bool,
}

impl CapabilitySet {
    pub fn full_only() -> Self {
        Self {
            full: true,
            ..Self::default()
        }
    }

    pub fn change_only() -> Self {
        Self {
            change: true,
            ..Self::default()
        }
    }

    pub fn full_and_change() -> Self {
        Self {
            full: true,
            change: true,
            signal: false,
        }
    }

    pub fn with_signal(mut self) -> Self {
        self.signal = true;
        self
    }

    pub fn contains(&self, cap: Capability) -> bool {
        match cap {
            Capability::Full => self.full,
            Capability::Change => self.change,
            Capability::Signal => self.signal,
        }
    }

    fn clear(&mut self, cap: Capability) {
        match cap {
            Capability::Full => self.full = false,
            Capability::Change => self.change = false,
            Capability::Signal => self.signal = false,
        }
    }
}

/// A statistic formula object.
///
/// Private working storage lives on `self` and shares the term's lifetime.
/// Only the hooks reported by [`capabilities`](Self::capabilities) may be
/// populated; the engine never calls an unreported hook. The [`init`]
/// hook is separate from the capability set: it runs exactly once at state
/// construction regardless of the evaluation mode, seeding storage and the
/// starting statistic vector.
///
/// [`init`]: Self::init
pub trait TermImpl: Send {
    /// Number of statistics this term contributes.
    fn width(&self) -> usize {
        1
    }

    /// The hooks this implementation populates.
    fn capabilities(&self) -> CapabilitySet;

    /// Seed private storage and write the statistics of the starting
    /// configuration into `out`.
    fn init(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError>;

    /// Full recompute: write this term's statistics from scratch.
    fn recompute(&mut self, net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        let _ = (net, out);
        Err(EngineError::Internal(
            "recompute called on a term without the full capability".into(),
        ))
    }

    /// Change statistic: write the delta a single dyad perturbation would
    /// cause, without mutating anything.
    fn change(
        &mut self,
        net: &WeightedNetwork,
        change: DyadChange,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let _ = (net, change, out);
        Err(EngineError::Internal(
            "change called on a term without the change capability".into(),
        ))
    }

    /// Handle an exogenous signal, writing this term's response into `out`.
    fn on_signal(
        &mut self,
        net: &WeightedNetwork,
        signal: &Signal<'_>,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let _ = (net, signal, out);
        Err(EngineError::Internal(
            "on_signal called on a term without the signal capability".into(),
        ))
    }

    /// Update persistent storage after an accepted perturbation.
    ///
    /// Observes the pre-mutation network together with the accepted change;
    /// the engine applies the weight afterwards. Rejected steps never reach
    /// this hook.
    fn commit(&mut self, net: &WeightedNetwork, change: DyadChange) {
        let _ = (net, change);
    }

    /// Auxiliary storage this term publishes for proposal kernels.
    fn aux(&mut self) -> Option<&mut (dyn Any + Send)> {
        None
    }
}

/// One model term: a formula object plus the capability slots that survived
/// model construction.
pub struct Term {
    name: String,
    width: usize,
    slots: CapabilitySet,
    imp: Box<dyn TermImpl>,
}

impl Term {
    pub fn new(name: impl Into<String>, imp: Box<dyn TermImpl>) -> Self {
        let width = imp.width();
        let slots = imp.capabilities();
        Self {
            name: name.into(),
            width,
            slots,
            imp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether the slot for `cap` is still enabled.
    pub fn has(&self, cap: Capability) -> bool {
        self.slots.contains(cap)
    }

    /// Disable a capability slot. Narrowing only; a disabled slot stays
    /// disabled.
    pub fn disable(&mut self, cap: Capability) {
        self.slots.clear(cap);
    }

    pub(crate) fn init(
        &mut self,
        net: &WeightedNetwork,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        self.imp.init(net, out)
    }

    pub(crate) fn recompute(
        &mut self,
        net: &WeightedNetwork,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        if !self.slots.full {
            return Err(EngineError::Internal(format!(
                "full-recompute slot disabled on term '{}'",
                self.name
            )));
        }
        self.imp.recompute(net, out)
    }

    pub(crate) fn change(
        &mut self,
        net: &WeightedNetwork,
        change: DyadChange,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        if !self.slots.change {
            return Err(EngineError::Internal(format!(
                "change slot disabled on term '{}'",
                self.name
            )));
        }
        self.imp.change(net, change, out)
    }

    /// Deliver a signal. Terms without an enabled signal slot are skipped,
    /// so set-wide delivery can loop over every term.
    pub(crate) fn on_signal(
        &mut self,
        net: &WeightedNetwork,
        signal: &Signal<'_>,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        if !self.slots.signal {
            return Ok(());
        }
        self.imp.on_signal(net, signal, out)
    }

    pub(crate) fn commit(&mut self, net: &WeightedNetwork, change: DyadChange) {
        self.imp.commit(net, change);
    }

    pub(crate) fn aux(&mut self) -> Option<&mut (dyn Any + Send)> {
        self.imp.aux()
    }
}

impl std::fmt::Debug for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Term")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("slots", &self.slots)
            .finish()
    }
}
