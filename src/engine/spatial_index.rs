//! Spatial indexing for proximity queries.
//!
//! Uses an R-tree over node coordinates to find merge candidates near a
//! track point, ranked nearest first.

use log::warn;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::error::Result;
use crate::geo_utils::{haversine_distance, meters_to_degrees, meters_to_degrees_lat};
use crate::{Coordinate, Node, NodeId, ProximityRadius};

use super::graph_store::GraphStore;

/// A node found near a query coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub node: NodeId,
    /// Distance to the query, in the unit of the radius used for the query
    pub distance: f64,
}

/// Nearest-neighbor capability consumed by the conflation engine.
pub trait SpatialIndex {
    /// All nodes within `radius` of `at`, nearest first.
    fn nearest_within(&self, at: Coordinate, radius: ProximityRadius) -> Result<Vec<Candidate>>;

    /// Make a node visible to later queries.
    fn insert(&mut self, node: NodeId, at: Coordinate) -> Result<()>;

    /// Remove a node. Returns whether it was present.
    fn remove(&mut self, node: NodeId, at: Coordinate) -> Result<bool>;

    /// Number of indexed nodes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A node position wrapper for R-tree indexing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedNode {
    pub id: NodeId,
    pub lng: f64,
    pub lat: f64,
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlng = self.lng - point[0];
        let dlat = self.lat - point[1];
        dlng * dlng + dlat * dlat
    }
}

/// R-tree index of graph nodes.
#[derive(Debug, Default)]
pub struct NodeIndex {
    tree: RTree<IndexedNode>,
}

impl NodeIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Bulk-load an index from existing nodes.
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let entries: Vec<IndexedNode> = nodes
            .iter()
            .map(|n| IndexedNode {
                id: n.id,
                lng: n.coordinate.longitude,
                lat: n.coordinate.latitude,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Rebuild the index from the committed nodes of a store.
    pub fn rebuild<S: GraphStore>(&mut self, store: &S) -> Result<()> {
        *self = Self::from_nodes(&store.nodes()?);
        Ok(())
    }

    /// Clear the index.
    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    fn within_degrees(&self, at: Coordinate, radius: f64) -> Vec<Candidate> {
        let max_d2 = radius * radius;
        self.tree
            .nearest_neighbor_iter_with_distance_2(&at.as_xy())
            .take_while(|(_, d2)| *d2 <= max_d2)
            .map(|(entry, d2)| Candidate {
                node: entry.id,
                distance: d2.sqrt(),
            })
            .collect()
    }

    fn within_meters(&self, at: Coordinate, radius: f64) -> Vec<Candidate> {
        // Widest longitude span is at the bbox edge closest to a pole.
        let dlat = meters_to_degrees_lat(radius);
        let edge_lat = (at.latitude.abs() + dlat).min(90.0);
        let dlng = meters_to_degrees(radius, edge_lat);
        let envelope = AABB::from_corners(
            [at.longitude - dlng, at.latitude - dlat],
            [at.longitude + dlng, at.latitude + dlat],
        );

        self.tree
            .locate_in_envelope(&envelope)
            .filter_map(|entry| {
                let distance = haversine_distance(&at, &Coordinate::new(entry.lng, entry.lat));
                (distance <= radius).then_some(Candidate {
                    node: entry.id,
                    distance,
                })
            })
            .collect()
    }
}

impl SpatialIndex for NodeIndex {
    fn nearest_within(&self, at: Coordinate, radius: ProximityRadius) -> Result<Vec<Candidate>> {
        let mut candidates = match radius {
            ProximityRadius::Degrees(r) => self.within_degrees(at, r),
            ProximityRadius::Meters(r) => self.within_meters(at, r),
        };
        // Deterministic order among equidistant nodes
        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.node.cmp(&b.node))
        });
        Ok(candidates)
    }

    fn insert(&mut self, node: NodeId, at: Coordinate) -> Result<()> {
        self.tree.insert(IndexedNode {
            id: node,
            lng: at.longitude,
            lat: at.latitude,
        });
        Ok(())
    }

    fn remove(&mut self, node: NodeId, at: Coordinate) -> Result<bool> {
        let entry = IndexedNode {
            id: node,
            lng: at.longitude,
            lat: at.latitude,
        };
        Ok(self.tree.remove(&entry).is_some())
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

/// Journaled view over an index for the duration of one track.
///
/// Inserts made through the scope are undone when it is dropped without
/// [`IndexScope::commit`], mirroring the store transaction.
pub struct IndexScope<'a, I: SpatialIndex> {
    index: &'a mut I,
    inserted: Vec<(NodeId, Coordinate)>,
}

impl<'a, I: SpatialIndex> IndexScope<'a, I> {
    pub fn new(index: &'a mut I) -> Self {
        Self {
            index,
            inserted: Vec::new(),
        }
    }

    /// Keep every insert made through this scope.
    pub fn commit(mut self) {
        self.inserted.clear();
    }

    /// Number of inserts that would be undone on drop.
    pub fn pending(&self) -> usize {
        self.inserted.len()
    }
}

impl<I: SpatialIndex> SpatialIndex for IndexScope<'_, I> {
    fn nearest_within(&self, at: Coordinate, radius: ProximityRadius) -> Result<Vec<Candidate>> {
        self.index.nearest_within(at, radius)
    }

    fn insert(&mut self, node: NodeId, at: Coordinate) -> Result<()> {
        self.index.insert(node, at)?;
        self.inserted.push((node, at));
        Ok(())
    }

    fn remove(&mut self, node: NodeId, at: Coordinate) -> Result<bool> {
        let removed = self.index.remove(node, at)?;
        if removed {
            self.inserted.retain(|(id, _)| *id != node);
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

impl<I: SpatialIndex> Drop for IndexScope<'_, I> {
    fn drop(&mut self) {
        while let Some((node, at)) = self.inserted.pop() {
            if let Err(e) = self.index.remove(node, at) {
                warn!("Failed to undo index insert of node {}: {}", node, e);
            }
        }
    }
}
