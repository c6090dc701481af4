//! # Track Graph
//!
//! Conflates repeated GPS recordings of overlapping routes into a single
//! deduplicated spatial graph.
//!
//! Every track point is either merged into an existing nearby node (updating
//! its running average speed and sample count) or becomes a new node. Adjacent
//! points of a track are linked by directed `Sequence` edges. A whole track is
//! applied atomically: either all of its mutations land or none do.
//!
//! This library provides:
//! - The conflation engine (merge-vs-insert decision, running averages)
//! - A batch importer with scoped commit/rollback
//! - An R-tree backed spatial index over graph nodes
//! - In-memory and SQLite graph stores
//! - Track sources, including GPX folders with derived speeds
//!
//! ## Features
//!
//! - **`persistence`** - Enable the SQLite graph store
//! - **`gpx`** - Enable reading tracks from GPX files
//! - **`synthetic`** - Enable the synthetic lap generator
//! - **`cli`** - Build the `trackgraph-cli` binary
//!
//! ## Quick Start
//!
//! ```rust
//! use trackgraph::{
//!     ConflationConfig, ConflationMode, GraphStore, MemoryGraphStore, NodeIndex, TrackImporter,
//!     TrackPoint,
//! };
//!
//! let mut importer = TrackImporter::new(
//!     MemoryGraphStore::new(),
//!     NodeIndex::new(),
//!     ConflationConfig::default(),
//! );
//!
//! let first = vec![TrackPoint::new(0.0, 0.0, 0, 5.0)];
//! importer.import_track(&first, ConflationMode::Seed).unwrap();
//!
//! let second = vec![TrackPoint::new(0.0001, 0.0001, 60, 7.0)];
//! let summary = importer.import_track(&second, ConflationMode::Merge).unwrap();
//! assert_eq!(summary.nodes_merged, 1);
//!
//! let nodes = importer.store().nodes().unwrap();
//! let node = &nodes[0];
//! assert_eq!(node.stats.sample_count, 2);
//! assert_eq!(node.stats.average_speed, 6.0);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{ConflationError, ErrorKind, OptionExt, Result};

// Configuration (proximity radius, match policy)
pub mod config;
pub use config::{ConflationConfig, MatchPolicy, ProximityRadius, DEFAULT_RADIUS_DEGREES};

// Geographic utilities (distance, degree conversion)
pub mod geo_utils;

// Conflation engine with its index and store components
pub mod engine;
pub use engine::{
    Candidate, ConflationEngine, GraphStore, GraphTransaction, IndexScope, MemoryGraphStore,
    NodeIndex, Outcome, Resolution, SpatialIndex,
};

// Persistent SQLite graph store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteGraphStore;

// Batch import with atomic commit/rollback
pub mod importer;
pub use importer::{ImportSummary, TrackImporter, TrackReport};

// Track sources
pub mod source;
pub use source::{RawTrackPoint, Track, TrackSource, VecTrackSource};

// Synthetic lap generator for tests and benchmarks
#[cfg(feature = "synthetic")]
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    /// Create a coordinate from longitude and latitude (x, y order).
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Check if the coordinate is finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// The coordinate as an `[x, y]` pair for R-tree queries.
    pub fn as_xy(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// A single sample of a recorded track.
///
/// Points are supplied in timestamp order by a [`TrackSource`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub longitude: f64,
    pub latitude: f64,
    /// Unix timestamp (seconds since epoch)
    pub timestamp: i64,
    /// Instantaneous horizontal speed in m/s
    pub instant_speed: f64,
}

impl TrackPoint {
    pub fn new(longitude: f64, latitude: f64, timestamp: i64, instant_speed: f64) -> Self {
        Self {
            longitude,
            latitude,
            timestamp,
            instant_speed,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.longitude, self.latitude)
    }
}

/// Identifier of a node in the graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Aggregated observations attributed to one node.
///
/// `average_speed` is always the mean of exactly `sample_count` speeds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Mean of all observed instantaneous speeds (m/s)
    pub average_speed: f64,
    /// Number of observations, never zero
    pub sample_count: u64,
}

impl NodeStats {
    /// Stats for a node created from a single observation.
    pub fn first(speed: f64) -> Self {
        Self {
            average_speed: speed,
            sample_count: 1,
        }
    }

    /// Fold one more observation into the running mean.
    ///
    /// The mean is denormalized back into a sum, extended, and renormalized,
    /// so no history is kept.
    pub fn absorb(&self, speed: f64) -> Self {
        let count = self.sample_count as f64;
        let total = self.average_speed * count;
        Self {
            average_speed: (total + speed) / (count + 1.0),
            sample_count: self.sample_count + 1,
        }
    }
}

/// A deduplicated geographic sample point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub coordinate: Coordinate,
    pub stats: NodeStats,
}

/// Kind of a directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// "Visited next" within a track
    Sequence,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Sequence => "SEQUENCE",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed connection between two distinct nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// Whether a track establishes the initial node set or conflates against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflationMode {
    /// First-ever track: every point becomes a new node, no proximity search.
    Seed,
    /// Later tracks: proximity search decides merge vs insert.
    Merge,
}

impl ConflationMode {
    /// `Seed` while the graph is still empty, `Merge` afterwards.
    ///
    /// Only the committed node count is consulted, so an empty track leaves
    /// the next one seeded as well. [`TrackImporter::import_source`] also
    /// counts committed tracks and switches to `Merge` after the first one.
    pub fn for_graph(node_count: usize) -> Self {
        if node_count == 0 {
            ConflationMode::Seed
        } else {
            ConflationMode::Merge
        }
    }
}

impl fmt::Display for ConflationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflationMode::Seed => f.write_str("seed"),
            ConflationMode::Merge => f.write_str("merge"),
        }
    }
}
