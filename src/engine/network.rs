//! Mutable storage for a graph with real-valued edge weights.
//!
//! A [`WeightedNetwork`] keeps at most one weight entry per canonical dyad;
//! writing the network's designated absent value removes the entry, so "no
//! edge" and "weight == absent" are the same configuration. Undirected dyads
//! are canonicalized to `tail <= head` on every access, and bipartite
//! networks are validated so that every edge runs from the first mode into
//! the second.
//!
//! The store is deliberately simple: proposals mutate one dyad at a time and
//! statistic terms query weights or iterate edges. Deterministic snapshots
//! for tests and summaries go through [`WeightedNetwork::sorted_edges`].

use rustc_hash::FxHashMap;

use crate::engine::errors::EngineError;

/// A unique 1-based identifier for a node.
///
/// Valued-network convention numbers vertices `1..=node_count`; zero is never
/// a valid id. Uses u32 internally for efficient storage.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

/// A single proposed dyad perturbation: the dyad plus its tentative new weight.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DyadChange {
    pub tail: NodeId,
    pub head: NodeId,
    /// The weight the dyad would take if the perturbation is accepted.
    pub weight: f64,
}

/// Topology and initial contents of a network.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkSpec {
    pub node_count: u32,
    pub directed: bool,
    /// Size of the first mode for bipartite networks.
    pub bipartite: Option<u32>,
    /// The weight value that means "no edge".
    pub absent: f64,
    /// Initial edges as `(tail, head, weight)` triples.
    pub edges: Vec<(u32, u32, f64)>,
}

impl NetworkSpec {
    /// A unipartite spec with absent value `0.0` and no initial edges.
    pub fn new(node_count: u32, directed: bool) -> Self {
        Self {
            node_count,
            directed,
            bipartite: None,
            absent: 0.0,
            edges: Vec::new(),
        }
    }
}

/// Mutable valued-graph store.
#[derive(Debug, Clone)]
pub struct WeightedNetwork {
    node_count: u32,
    directed: bool,
    bipartite: Option<u32>,
    absent: f64,
    weights: FxHashMap<(u32, u32), f64>,
}

impl WeightedNetwork {
    /// Build a network from its spec, inserting every initial edge.
    ///
    /// Fails on an out-of-range or self-looping dyad, an edge violating the
    /// bipartite split, a non-finite weight, or a directed bipartite spec.
    pub fn from_spec(spec: &NetworkSpec) -> Result<Self, EngineError> {
        if spec.node_count == 0 {
            return Err(EngineError::Spec(
                "network must have at least one node".into(),
            ));
        }
        if let Some(bip) = spec.bipartite {
            if spec.directed {
                return Err(EngineError::Spec(
                    "bipartite networks are undirected".into(),
                ));
            }
            if bip == 0 || bip >= spec.node_count {
                return Err(EngineError::Spec(format!(
                    "bipartite split {} must lie strictly inside 1..{}",
                    bip, spec.node_count
                )));
            }
        }
        if !spec.absent.is_finite() {
            return Err(EngineError::Numerical(
                "absent value must be finite".into(),
            ));
        }

        let mut net = Self {
            node_count: spec.node_count,
            directed: spec.directed,
            bipartite: spec.bipartite,
            absent: spec.absent,
            weights: FxHashMap::default(),
        };
        for &(tail, head, weight) in &spec.edges {
            net.set_weight(NodeId(tail), NodeId(head), weight)?;
        }
        Ok(net)
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn directed(&self) -> bool {
        self.directed
    }

    pub fn bipartite(&self) -> Option<u32> {
        self.bipartite
    }

    /// The weight value that means "no edge".
    pub fn absent(&self) -> f64 {
        self.absent
    }

    /// Number of edges currently present (weight != absent).
    pub fn edge_count(&self) -> usize {
        self.weights.len()
    }

    /// Canonical storage key for a dyad. Undirected dyads store `tail <= head`.
    fn key(&self, tail: NodeId, head: NodeId) -> (u32, u32) {
        if !self.directed && tail.0 > head.0 {
            (head.0, tail.0)
        } else {
            (tail.0, head.0)
        }
    }

    /// Check that `(tail, head)` names a dyad this network can hold.
    pub fn validate_dyad(&self, tail: NodeId, head: NodeId) -> Result<(), EngineError> {
        if tail.0 == 0 || head.0 == 0 || tail.0 > self.node_count || head.0 > self.node_count {
            return Err(EngineError::Spec(format!(
                "dyad ({}, {}) out of range for {} node(s)",
                tail.0, head.0, self.node_count
            )));
        }
        if tail == head {
            return Err(EngineError::Spec(format!(
                "self-loop on node {} is not a valid dyad",
                tail.0
            )));
        }
        if let Some(bip) = self.bipartite {
            let (lo, hi) = if tail.0 < head.0 {
                (tail.0, head.0)
            } else {
                (head.0, tail.0)
            };
            if lo > bip || hi <= bip {
                return Err(EngineError::Spec(format!(
                    "dyad ({}, {}) does not cross the bipartite split at {}",
                    tail.0, head.0, bip
                )));
            }
        }
        Ok(())
    }

    /// Current weight of a dyad; the absent value when no edge is stored.
    pub fn weight(&self, tail: NodeId, head: NodeId) -> f64 {
        self.weights
            .get(&self.key(tail, head))
            .copied()
            .unwrap_or(self.absent)
    }

    /// Set a dyad's weight in place. Writing the absent value removes the edge.
    ///
    /// Returns the previous weight so a tentative mutation can be undone
    /// exactly.
    pub fn set_weight(
        &mut self,
        tail: NodeId,
        head: NodeId,
        weight: f64,
    ) -> Result<f64, EngineError> {
        self.validate_dyad(tail, head)?;
        if !weight.is_finite() {
            return Err(EngineError::Numerical(format!(
                "weight {} for dyad ({}, {}) is not finite",
                weight, tail.0, head.0
            )));
        }
        let key = self.key(tail, head);
        let previous = if weight == self.absent {
            self.weights.remove(&key)
        } else {
            self.weights.insert(key, weight)
        };
        Ok(previous.unwrap_or(self.absent))
    }

    /// Apply a [`DyadChange`], returning the weight it replaced.
    pub fn apply(&mut self, change: DyadChange) -> Result<f64, EngineError> {
        self.set_weight(change.tail, change.head, change.weight)
    }

    /// Iterate present edges in unspecified order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, f64)> + '_ {
        self.weights
            .iter()
            .map(|(&(t, h), &w)| (NodeId(t), NodeId(h), w))
    }

    /// Present edges in deterministic `(tail, head)` order.
    pub fn sorted_edges(&self) -> Vec<(NodeId, NodeId, f64)> {
        let mut edges: Vec<_> = self.edges().collect();
        edges.sort_by_key(|&(t, h, _)| (t, h));
        edges
    }

    /// Number of dyads this network can hold.
    pub fn dyad_count(&self) -> u64 {
        let n = u64::from(self.node_count);
        match self.bipartite {
            Some(bip) => u64::from(bip) * (n - u64::from(bip)),
            None if self.directed => n * (n - 1),
            None => n * (n - 1) / 2,
        }
    }

    /// The `index`-th dyad under a fixed enumeration of all holdable dyads.
    ///
    /// Used by proposal kernels to draw a dyad uniformly. Returns `None` when
    /// `index >= dyad_count()`.
    pub fn dyad_at(&self, index: u64) -> Option<(NodeId, NodeId)> {
        if index >= self.dyad_count() {
            return None;
        }
        let n = u64::from(self.node_count);
        match self.bipartite {
            Some(bip) => {
                let second = n - u64::from(bip);
                let tail = 1 + index / second;
                let head = u64::from(bip) + 1 + index % second;
                Some((NodeId(tail as u32), NodeId(head as u32)))
            }
            None if self.directed => {
                let tail = 1 + index / (n - 1);
                let slot = index % (n - 1);
                let head = if slot + 1 < tail { slot + 1 } else { slot + 2 };
                Some((NodeId(tail as u32), NodeId(head as u32)))
            }
            None => {
                // Row-by-row over pairs with tail < head.
                let mut remaining = index;
                for tail in 1..n {
                    let row = n - tail;
                    if remaining < row {
                        let head = tail + 1 + remaining;
                        return Some((NodeId(tail as u32), NodeId(head as u32)));
                    }
                    remaining -= row;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(nodes: u32, directed: bool) -> WeightedNetwork {
        WeightedNetwork::from_spec(&NetworkSpec::new(nodes, directed)).expect("network")
    }

    #[test]
    fn undirected_dyads_are_canonical() {
        let mut net = empty(4, false);
        net.set_weight(NodeId(3), NodeId(1), 2.5).expect("set");
        assert_eq!(net.weight(NodeId(1), NodeId(3)), 2.5);
        assert_eq!(net.weight(NodeId(3), NodeId(1)), 2.5);
        assert_eq!(net.edge_count(), 1);
    }

    #[test]
    fn directed_dyads_are_distinct() {
        let mut net = empty(3, true);
        net.set_weight(NodeId(1), NodeId(2), 1.0).expect("set");
        assert_eq!(net.weight(NodeId(2), NodeId(1)), 0.0);
        assert_eq!(net.edge_count(), 1);
    }

    #[test]
    fn absent_weight_removes_edge() {
        let mut net = empty(3, false);
        net.set_weight(NodeId(1), NodeId(2), 4.0).expect("set");
        let previous = net.set_weight(NodeId(1), NodeId(2), 0.0).expect("unset");
        assert_eq!(previous, 4.0);
        assert_eq!(net.edge_count(), 0);
        assert_eq!(net.weight(NodeId(1), NodeId(2)), 0.0);
    }

    #[test]
    fn nonzero_absent_value_is_no_edge() {
        let spec = NetworkSpec {
            absent: -1.0,
            ..NetworkSpec::new(3, false)
        };
        let mut net = WeightedNetwork::from_spec(&spec).expect("network");
        net.set_weight(NodeId(1), NodeId(2), -1.0).expect("set");
        assert_eq!(net.edge_count(), 0);
        assert_eq!(net.weight(NodeId(1), NodeId(2)), -1.0);
    }

    #[test]
    fn rejects_self_loops_and_out_of_range() {
        let mut net = empty(3, false);
        assert!(net.set_weight(NodeId(2), NodeId(2), 1.0).is_err());
        assert!(net.set_weight(NodeId(0), NodeId(1), 1.0).is_err());
        assert!(net.set_weight(NodeId(1), NodeId(4), 1.0).is_err());
    }

    #[test]
    fn rejects_non_finite_weight() {
        let mut net = empty(3, false);
        assert!(net.set_weight(NodeId(1), NodeId(2), f64::NAN).is_err());
        assert!(net.set_weight(NodeId(1), NodeId(2), f64::INFINITY).is_err());
    }

    #[test]
    fn bipartite_edges_must_cross_split() {
        let spec = NetworkSpec {
            bipartite: Some(2),
            edges: vec![(1, 3, 1.0)],
            ..NetworkSpec::new(5, false)
        };
        let mut net = WeightedNetwork::from_spec(&spec).expect("network");
        assert!(net.set_weight(NodeId(1), NodeId(2), 1.0).is_err());
        assert!(net.set_weight(NodeId(3), NodeId(4), 1.0).is_err());
        assert!(net.set_weight(NodeId(2), NodeId(5), 1.0).is_ok());
    }

    #[test]
    fn bipartite_spec_must_be_undirected() {
        let spec = NetworkSpec {
            bipartite: Some(2),
            ..NetworkSpec::new(5, true)
        };
        assert!(WeightedNetwork::from_spec(&spec).is_err());
    }

    #[test]
    fn dyad_enumeration_is_a_bijection() {
        for (nodes, directed, bipartite) in
            [(5, false, None), (5, true, None), (5, false, Some(2))]
        {
            let spec = NetworkSpec {
                bipartite,
                ..NetworkSpec::new(nodes, directed)
            };
            let net = WeightedNetwork::from_spec(&spec).expect("network");
            let mut seen = std::collections::HashSet::new();
            for i in 0..net.dyad_count() {
                let (tail, head) = net.dyad_at(i).expect("dyad in range");
                net.validate_dyad(tail, head).expect("valid dyad");
                assert!(seen.insert((tail, head)), "duplicate dyad at index {}", i);
            }
            assert_eq!(seen.len() as u64, net.dyad_count());
            assert_eq!(net.dyad_at(net.dyad_count()), None);
        }
    }

    #[test]
    fn apply_returns_previous_weight_for_exact_revert() {
        let mut net = empty(3, false);
        net.set_weight(NodeId(1), NodeId(2), 2.0).expect("set");
        let change = DyadChange {
            tail: NodeId(1),
            head: NodeId(2),
            weight: 7.0,
        };
        let previous = net.apply(change).expect("apply");
        assert_eq!(previous, 2.0);
        net.set_weight(NodeId(1), NodeId(2), previous).expect("revert");
        assert_eq!(net.weight(NodeId(1), NodeId(2)), 2.0);
    }
}
