//! Graph storage abstraction and in-memory backend.
//!
//! A store hands out scoped transactions. All node and edge mutations go
//! through a transaction; dropping it without calling
//! [`GraphTransaction::commit`] discards every mutation made through it.

use std::collections::BTreeMap;

use log::debug;

use crate::error::{ConflationError, OptionExt, Result};
use crate::{Coordinate, Edge, EdgeKind, Node, NodeId, NodeStats};

/// Mutation capability over the graph, valid for one batch.
pub trait GraphTransaction {
    /// Create a node and return its id.
    fn create_node(&mut self, coordinate: Coordinate, stats: NodeStats) -> Result<NodeId>;

    /// Read a node, including uncommitted changes made in this transaction.
    fn node(&self, id: NodeId) -> Result<Node>;

    /// Overwrite the statistics of an existing node.
    fn update_node_stats(&mut self, id: NodeId, stats: NodeStats) -> Result<()>;

    /// Create a directed edge. Self-loops are rejected.
    fn create_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<()>;

    /// Make every mutation of this transaction durable.
    fn commit(self) -> Result<()>;
}

/// Durable node/edge storage with transactional batches.
pub trait GraphStore {
    type Tx<'a>: GraphTransaction
    where
        Self: 'a;

    /// Begin a transactional scope. Rolls back on drop unless committed.
    fn begin(&mut self) -> Result<Self::Tx<'_>>;

    fn node_count(&self) -> Result<usize>;

    fn edge_count(&self) -> Result<usize>;

    /// All committed nodes, ordered by id.
    fn nodes(&self) -> Result<Vec<Node>>;

    /// All committed edges, in creation order.
    fn edges(&self) -> Result<Vec<Edge>>;
}

pub(crate) fn reject_self_loop(from: NodeId, to: NodeId) -> Result<()> {
    if from == to {
        return Err(ConflationError::Store(format!(
            "refusing to create self-loop on node {}",
            from
        )));
    }
    Ok(())
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Graph store kept entirely in memory.
#[derive(Debug)]
pub struct MemoryGraphStore {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
    next_id: u64,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            next_id: 1,
        }
    }

    /// Get a committed node by id.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Iterate committed nodes in id order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Committed edges in creation order.
    pub fn edge_slice(&self) -> &[Edge] {
        &self.edges
    }
}

impl GraphStore for MemoryGraphStore {
    type Tx<'a> = MemoryTransaction<'a>;

    fn begin(&mut self) -> Result<MemoryTransaction<'_>> {
        Ok(MemoryTransaction::new(self))
    }

    fn node_count(&self) -> Result<usize> {
        Ok(self.nodes.len())
    }

    fn edge_count(&self) -> Result<usize> {
        Ok(self.edges.len())
    }

    fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.values().copied().collect())
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        Ok(self.edges.clone())
    }
}

/// Undo record for a single mutation.
#[derive(Debug)]
enum Undo {
    CreatedNode(NodeId),
    UpdatedStats(NodeId, NodeStats),
}

/// Transaction over a [`MemoryGraphStore`].
///
/// Mutations are applied directly and journaled; rollback replays the
/// journal backwards.
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    store: &'a mut MemoryGraphStore,
    journal: Vec<Undo>,
    edges_at_begin: usize,
    next_id_at_begin: u64,
    committed: bool,
}

impl<'a> MemoryTransaction<'a> {
    fn new(store: &'a mut MemoryGraphStore) -> Self {
        let edges_at_begin = store.edges.len();
        let next_id_at_begin = store.next_id;
        Self {
            store,
            journal: Vec::new(),
            edges_at_begin,
            next_id_at_begin,
            committed: false,
        }
    }

    /// Number of journaled node mutations plus created edges.
    pub fn mutation_count(&self) -> usize {
        self.journal.len() + (self.store.edges.len() - self.edges_at_begin)
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::CreatedNode(id) => {
                    self.store.nodes.remove(&id);
                }
                Undo::UpdatedStats(id, stats) => {
                    if let Some(node) = self.store.nodes.get_mut(&id) {
                        node.stats = stats;
                    }
                }
            }
        }
        self.store.edges.truncate(self.edges_at_begin);
        self.store.next_id = self.next_id_at_begin;
    }
}

impl GraphTransaction for MemoryTransaction<'_> {
    fn create_node(&mut self, coordinate: Coordinate, stats: NodeStats) -> Result<NodeId> {
        let id = NodeId(self.store.next_id);
        self.store.next_id += 1;
        self.store.nodes.insert(
            id,
            Node {
                id,
                coordinate,
                stats,
            },
        );
        self.journal.push(Undo::CreatedNode(id));
        Ok(id)
    }

    fn node(&self, id: NodeId) -> Result<Node> {
        self.store.nodes.get(&id).copied().ok_or_unknown_node(id)
    }

    fn update_node_stats(&mut self, id: NodeId, stats: NodeStats) -> Result<()> {
        let node = self.store.nodes.get_mut(&id).ok_or_unknown_node(id)?;
        let previous = node.stats;
        node.stats = stats;
        self.journal.push(Undo::UpdatedStats(id, previous));
        Ok(())
    }

    fn create_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<()> {
        reject_self_loop(from, to)?;
        if !self.store.nodes.contains_key(&from) {
            return Err(ConflationError::UnknownNode(from));
        }
        if !self.store.nodes.contains_key(&to) {
            return Err(ConflationError::UnknownNode(to));
        }
        self.store.edges.push(Edge { from, to, kind });
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        self.committed = true;
        self.journal.clear();
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!(
                "Rolling back in-memory transaction ({} mutations)",
                self.mutation_count()
            );
            self.rollback();
        }
    }
}
