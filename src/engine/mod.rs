//! # Conflation Engine
//!
//! Decides, for each track point, whether it merges into an existing node or
//! becomes a new one.
//!
//! ## Architecture
//!
//! The engine is composed of focused modules:
//! - `SpatialIndex` - R-tree proximity queries over node coordinates
//! - `GraphStore` - Node/edge storage behind scoped transactions
//!
//! The engine itself holds only configuration. The store transaction and
//! the index are passed into every call, so the caller owns their lifetime
//! and the commit/rollback decision.

pub mod graph_store;
pub mod spatial_index;

pub use graph_store::{GraphStore, GraphTransaction, MemoryGraphStore, MemoryTransaction};
pub use spatial_index::{Candidate, IndexScope, IndexedNode, NodeIndex, SpatialIndex};

use log::debug;

use crate::error::Result;
use crate::{ConflationConfig, ConflationMode, MatchPolicy, NodeId, NodeStats, TrackPoint};

/// How a point was attributed to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// A new node was created for the point.
    Created,
    /// The point was folded into an existing node.
    Merged {
        /// Distance to the node, in the unit of the configured radius
        distance: f64,
    },
}

/// The node a point resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub node: NodeId,
    pub outcome: Outcome,
}

impl Resolution {
    pub fn is_merge(&self) -> bool {
        matches!(self.outcome, Outcome::Merged { .. })
    }
}

/// Merge-vs-insert decision maker.
#[derive(Debug, Clone, Default)]
pub struct ConflationEngine {
    config: ConflationConfig,
}

impl ConflationEngine {
    pub fn new(config: ConflationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConflationConfig {
        &self.config
    }

    /// Resolve one track point to a node.
    ///
    /// In `Seed` mode a node is always created. In `Merge` mode the index is
    /// queried and the point merges into a single unambiguous candidate;
    /// otherwise a node is created. Created nodes are inserted into the index
    /// straight away so later points of the same track can merge into them.
    ///
    /// No edges are created here.
    pub fn resolve<T, I>(
        &self,
        tx: &mut T,
        index: &mut I,
        point: &TrackPoint,
        mode: ConflationMode,
    ) -> Result<Resolution>
    where
        T: GraphTransaction,
        I: SpatialIndex,
    {
        if mode == ConflationMode::Merge {
            let candidates = index.nearest_within(point.coordinate(), self.config.radius)?;
            if let Some(matched) = self.select(&candidates) {
                let node = tx.node(matched.node)?;
                let stats = node.stats.absorb(point.instant_speed);
                tx.update_node_stats(node.id, stats)?;
                debug!(
                    "Using existing node {} at {:.6}{} (n={}, avg={:.3})",
                    node.id,
                    matched.distance,
                    self.config.radius.unit(),
                    stats.sample_count,
                    stats.average_speed
                );
                return Ok(Resolution {
                    node: node.id,
                    outcome: Outcome::Merged {
                        distance: matched.distance,
                    },
                });
            }
            if candidates.len() > 1 {
                debug!(
                    "Ambiguous match at ({:.6}, {:.6}): {} candidates, inserting",
                    point.longitude,
                    point.latitude,
                    candidates.len()
                );
            }
        }

        let coordinate = point.coordinate();
        let id = tx.create_node(coordinate, NodeStats::first(point.instant_speed))?;
        index.insert(id, coordinate)?;
        Ok(Resolution {
            node: id,
            outcome: Outcome::Created,
        })
    }

    /// Pick the merge target among candidates sorted nearest first, if any.
    fn select<'c>(&self, candidates: &'c [Candidate]) -> Option<&'c Candidate> {
        match self.config.policy {
            MatchPolicy::UniqueWithinRadius => match candidates {
                [only] => Some(only),
                _ => None,
            },
            MatchPolicy::UniqueNearest { tie_tolerance } => match candidates {
                [] => None,
                [only] => Some(only),
                [nearest, runner_up, ..] => {
                    (runner_up.distance - nearest.distance > tie_tolerance).then_some(nearest)
                }
            },
        }
    }
}
