//! End-to-end lifecycle tests: construction order, evaluation modes over a
//! live chain, rejection purity, and teardown order.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;

use valnet::engine::proposal::ProposalKernel;
use valnet::proposals::{ProposalBuilder, ProposalRegistry, ProposalSpec};
use valnet::stats::{InputStack, TermBuilder, TermRegistry};
use valnet::{
    CapabilitySet, DyadChange, EngineError, EvalMode, ModelSpec, NetworkSpec, ProposalOutcome,
    State, StateSpec, StepOutcome, TermImpl, TermSpec, WeightedNetwork,
};

fn registries() -> (TermRegistry, ProposalRegistry) {
    (
        TermRegistry::with_builtins(),
        ProposalRegistry::with_builtins(),
    )
}

#[test]
fn initial_stats_never_observe_an_empty_network() {
    // A non-empty initial edge list must be visible to the init pass.
    let (terms, proposals) = registries();
    let spec = StateSpec {
        network: NetworkSpec {
            edges: vec![(1, 2, 1.5), (2, 3, 0.5)],
            ..NetworkSpec::new(3, false)
        },
        model: ModelSpec::new(vec![TermSpec::new("nonzero")]),
        proposal: None,
    };
    let state = State::new(&spec, &terms, &proposals).expect("state");
    assert_eq!(state.stats(), &[2.0]);
}

#[test]
fn full_only_term_drives_a_full_recompute_chain() {
    // Two nodes, no edges, one term with only a full-recompute hook: the
    // model must select full-recompute mode, and after one accepted toggle
    // the statistic vector must reflect exactly one edge present.
    let (terms, proposals) = registries();
    let spec = StateSpec {
        network: NetworkSpec::new(2, false),
        model: ModelSpec::new(vec![TermSpec::new("maxweight")]),
        proposal: Some(ProposalSpec::new("discrete-step")),
    };
    let mut state = State::new(&spec, &terms, &proposals).expect("state");
    assert_eq!(state.model().mode(), EvalMode::FullRecompute);
    assert_eq!(state.stats(), &[0.0]);

    // A large positive coefficient makes the upward move certain.
    let mut rng = StdRng::seed_from_u64(1);
    let outcome = state.step(&[10.0], &mut rng).expect("step");
    assert_eq!(outcome, StepOutcome::Accepted);
    assert_eq!(state.network().edge_count(), 1);
    assert_eq!(state.stats(), &[1.0]);
}

#[test]
fn rejected_step_leaves_network_and_stats_untouched() {
    // Both terms support incremental evaluation, so the model must go
    // incremental; a rejected toggle leaves every observable byte alone.
    let (terms, proposals) = registries();
    let spec = StateSpec {
        network: NetworkSpec {
            edges: vec![(1, 2, 2.0)],
            ..NetworkSpec::new(3, false)
        },
        model: ModelSpec::new(vec![TermSpec::new("sum"), TermSpec::new("nonzero")]),
        proposal: Some(ProposalSpec::new("discrete-step")),
    };
    let mut state = State::new(&spec, &terms, &proposals).expect("state");
    assert_eq!(state.model().mode(), EvalMode::Incremental);

    // Step until a rejection is observed, snapshotting before each attempt.
    let mut rng = StdRng::seed_from_u64(9);
    let mut saw_rejection = false;
    for _ in 0..200 {
        let stats_before = state.stats().to_vec();
        let edges_before = state.network().sorted_edges();
        if state.step(&[-2.0, -2.0], &mut rng).expect("step") == StepOutcome::Rejected {
            assert_eq!(state.stats(), stats_before.as_slice());
            assert_eq!(state.network().sorted_edges(), edges_before);
            saw_rejection = true;
            break;
        }
    }
    assert!(saw_rejection, "expected at least one rejected step");
}

#[test]
fn incremental_chain_tracks_recomputed_statistics() {
    // Run a short chain incrementally, then recompute the same statistics
    // from the final network: the running vector must agree.
    let (terms, proposals) = registries();
    let spec = StateSpec {
        network: NetworkSpec::new(4, false),
        model: ModelSpec::new(vec![TermSpec::new("sum"), TermSpec::new("nonzero")]),
        proposal: Some(ProposalSpec::new("discrete-step")),
    };
    let mut state = State::new(&spec, &terms, &proposals).expect("state");
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..200 {
        state.step(&[0.1, -0.3], &mut rng).expect("step");
    }
    let expected_sum: f64 = state.network().edges().map(|(_, _, w)| w).sum();
    let expected_count = state.network().edge_count() as f64;
    assert!((state.stats()[0] - expected_sum).abs() < 1e-9);
    assert_eq!(state.stats()[1], expected_count);
}

// ---------------------------------------------------------------------------
// Teardown order
// ---------------------------------------------------------------------------

/// Term and kernel that record their drop order through a shared log.
struct DropProbeTerm {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl TermImpl for DropProbeTerm {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full_and_change()
    }

    fn init(&mut self, _net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        out[0] = 0.0;
        Ok(())
    }

    fn change(
        &mut self,
        _net: &WeightedNetwork,
        _change: DyadChange,
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        out[0] = 0.0;
        Ok(())
    }

    fn recompute(&mut self, _net: &WeightedNetwork, out: &mut [f64]) -> Result<(), EngineError> {
        out[0] = 0.0;
        Ok(())
    }
}

impl Drop for DropProbeTerm {
    fn drop(&mut self) {
        self.log.lock().expect("log").push("term");
    }
}

struct DropProbeTermBuilder {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl TermBuilder for DropProbeTermBuilder {
    fn build(
        &self,
        _spec: &TermSpec,
        _inputs: &mut InputStack<'_>,
        _registry: &TermRegistry,
    ) -> Result<Box<dyn TermImpl>, EngineError> {
        Ok(Box::new(DropProbeTerm {
            log: Arc::clone(&self.log),
        }))
    }
}

struct DropProbeKernel {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl ProposalKernel for DropProbeKernel {
    fn propose(
        &mut self,
        _net: &WeightedNetwork,
        _rng: &mut StdRng,
    ) -> Result<ProposalOutcome, EngineError> {
        Ok(ProposalOutcome::NoMove)
    }
}

impl Drop for DropProbeKernel {
    fn drop(&mut self) {
        self.log.lock().expect("log").push("proposal");
    }
}

struct DropProbeKernelBuilder {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl ProposalBuilder for DropProbeKernelBuilder {
    fn build(&self, _spec: &ProposalSpec) -> Result<Box<dyn ProposalKernel>, EngineError> {
        Ok(Box::new(DropProbeKernel {
            log: Arc::clone(&self.log),
        }))
    }
}

#[test]
fn proposal_is_torn_down_strictly_before_the_model() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut terms = TermRegistry::new();
    terms.register(
        "test",
        "drop-probe",
        Arc::new(DropProbeTermBuilder {
            log: Arc::clone(&log),
        }),
    );
    let mut proposals = ProposalRegistry::new();
    proposals.register(
        "test",
        "drop-probe",
        Arc::new(DropProbeKernelBuilder {
            log: Arc::clone(&log),
        }),
    );

    let spec = StateSpec {
        network: NetworkSpec::new(3, false),
        model: ModelSpec::new(vec![TermSpec {
            name: "drop-probe".into(),
            source: Some("test".into()),
            submodel: None,
        }]),
        proposal: Some(ProposalSpec {
            name: "drop-probe".into(),
            source: Some("test".into()),
            inputs: Vec::new(),
        }),
    };
    let state = State::new(&spec, &terms, &proposals).expect("state");
    drop(state);

    let order = log.lock().expect("log").clone();
    assert_eq!(
        order,
        vec!["proposal", "term"],
        "proposal must be destroyed before the model's terms"
    );
}

#[test]
fn failed_construction_leaks_no_partial_state() {
    // The model builds, the network builds, and then the proposal lookup
    // fails: the caller sees only the error, and the already-built term is
    // dropped on the way out.
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut terms = TermRegistry::new();
    terms.register(
        "test",
        "drop-probe",
        Arc::new(DropProbeTermBuilder {
            log: Arc::clone(&log),
        }),
    );
    let proposals = ProposalRegistry::with_builtins();

    let spec = StateSpec {
        network: NetworkSpec::new(3, false),
        model: ModelSpec::new(vec![TermSpec {
            name: "drop-probe".into(),
            source: Some("test".into()),
            submodel: None,
        }]),
        proposal: Some(ProposalSpec::new("no-such-kernel")),
    };
    let err = State::new(&spec, &terms, &proposals).expect_err("must fail");
    assert!(matches!(err, EngineError::Spec(_)));
    assert_eq!(log.lock().expect("log").as_slice(), ["term"]);
}

#[test]
fn no_move_is_recoverable() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let mut proposals = ProposalRegistry::new();
    proposals.register(
        "test",
        "drop-probe",
        Arc::new(DropProbeKernelBuilder {
            log: Arc::clone(&log),
        }),
    );
    let spec = StateSpec {
        network: NetworkSpec::new(3, false),
        model: ModelSpec::new(vec![TermSpec::new("sum")]),
        proposal: Some(ProposalSpec {
            name: "drop-probe".into(),
            source: Some("test".into()),
            inputs: Vec::new(),
        }),
    };
    let (terms, _) = registries();
    let mut state = State::new(&spec, &terms, &proposals).expect("state");
    let mut rng = StdRng::seed_from_u64(2);
    assert_eq!(
        state.step(&[0.0], &mut rng).expect("step"),
        StepOutcome::NoMove
    );
    // The chain can keep going afterwards.
    assert_eq!(
        state.step(&[0.0], &mut rng).expect("step"),
        StepOutcome::NoMove
    );
}

#[test]
fn node_ids_are_one_based() {
    let (terms, proposals) = registries();
    let spec = StateSpec {
        network: NetworkSpec {
            edges: vec![(0, 1, 1.0)],
            ..NetworkSpec::new(3, false)
        },
        model: ModelSpec::new(vec![TermSpec::new("sum")]),
        proposal: None,
    };
    assert!(matches!(
        State::new(&spec, &terms, &proposals),
        Err(EngineError::Spec(_))
    ));
}
