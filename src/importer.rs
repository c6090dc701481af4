//! Batch import of whole tracks.
//!
//! A track is applied as one indivisible unit: the store transaction and the
//! index scope are both committed at the end, and both roll back if anything
//! fails before that point.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::engine::{ConflationEngine, GraphStore, GraphTransaction, IndexScope, SpatialIndex};
use crate::error::{ConflationError, Result};
use crate::source::{check_point, RawTrackPoint, TrackSource};
use crate::{ConflationConfig, ConflationMode, EdgeKind, NodeId, TrackPoint};

/// What importing one track did to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Number of points processed
    pub points: usize,
    /// Nodes created for this track
    pub nodes_created: usize,
    /// Merge decisions into existing nodes
    pub nodes_merged: usize,
    /// Sequence edges created
    pub edges_created: usize,
    touched: HashSet<NodeId>,
}

impl ImportSummary {
    /// Number of distinct nodes created or updated by the track.
    pub fn nodes_touched(&self) -> usize {
        self.touched.len()
    }
}

/// Outcome of one track pulled from a [`TrackSource`].
#[derive(Debug)]
pub struct TrackReport {
    pub track_id: String,
    /// Mode the track was imported in; `None` if it never reached the engine
    pub mode: Option<ConflationMode>,
    pub result: Result<ImportSummary>,
}

/// Drives tracks through the conflation engine against a store and index.
///
/// The importer is the single writer: it owns both collaborators for as long
/// as it lives.
pub struct TrackImporter<S, I> {
    store: S,
    index: I,
    engine: ConflationEngine,
    committed_tracks: usize,
}

impl<S, I> TrackImporter<S, I>
where
    S: GraphStore,
    I: SpatialIndex,
{
    pub fn new(store: S, index: I, config: ConflationConfig) -> Self {
        Self {
            store,
            index,
            engine: ConflationEngine::new(config),
            committed_tracks: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn engine(&self) -> &ConflationEngine {
        &self.engine
    }

    /// Tracks committed by this importer, empty ones included.
    pub fn committed_tracks(&self) -> usize {
        self.committed_tracks
    }

    /// Give the collaborators back.
    pub fn into_parts(self) -> (S, I) {
        (self.store, self.index)
    }

    /// Import one track atomically.
    ///
    /// Each point is resolved to a node in order; consecutive distinct nodes
    /// are linked by a `Sequence` edge. On error nothing from this track is
    /// kept, neither in the store nor in the index.
    ///
    /// Every point is checked before the transaction begins; a non-finite or
    /// negative speed, or a coordinate outside WGS84, rejects the track with
    /// [`ConflationError::MalformedInput`].
    pub fn import_track(
        &mut self,
        points: &[TrackPoint],
        mode: ConflationMode,
    ) -> Result<ImportSummary> {
        for (i, point) in points.iter().enumerate() {
            check_point(i, point)?;
        }

        let result = self.apply_track(points, mode);
        match &result {
            Ok(summary) => info!(
                "[Import] {} track: {} points, {} created, {} merged, {} edges",
                mode,
                summary.points,
                summary.nodes_created,
                summary.nodes_merged,
                summary.edges_created
            ),
            Err(e) => warn!("[Import] {} track rolled back: {}", mode, e),
        }
        if result.is_ok() {
            self.committed_tracks += 1;
        }
        result
    }

    fn apply_track(
        &mut self,
        points: &[TrackPoint],
        mode: ConflationMode,
    ) -> Result<ImportSummary> {
        let mut tx = self.store.begin()?;
        let mut index = IndexScope::new(&mut self.index);
        let mut summary = ImportSummary {
            points: points.len(),
            ..ImportSummary::default()
        };

        let mut previous: Option<NodeId> = None;
        for point in points {
            let resolution = self.engine.resolve(&mut tx, &mut index, point, mode)?;
            let current = resolution.node;
            if resolution.is_merge() {
                summary.nodes_merged += 1;
            } else {
                summary.nodes_created += 1;
            }
            summary.touched.insert(current);

            if let Some(prev) = previous {
                if prev != current {
                    tx.create_edge(prev, current, EdgeKind::Sequence)?;
                    summary.edges_created += 1;
                }
            }
            previous = Some(current);
        }

        tx.commit()?;
        index.commit();
        Ok(summary)
    }

    /// Validate raw points, then import them as one track.
    ///
    /// A malformed point rejects the whole track before any transaction is
    /// opened.
    pub fn import_raw(
        &mut self,
        points: &[RawTrackPoint],
        mode: ConflationMode,
    ) -> Result<ImportSummary> {
        let points = points
            .iter()
            .enumerate()
            .map(|(i, raw)| raw.validate(i))
            .collect::<Result<Vec<TrackPoint>>>()?;
        self.import_track(&points, mode)
    }

    /// Import every track a source yields, in order.
    ///
    /// The first track committed into an empty graph is seeded, every later
    /// one is merged, even when that first track had no points. A failed
    /// track is reported and skipped; the rest still import.
    pub fn import_source<T: TrackSource>(&mut self, source: &mut T) -> Vec<TrackReport> {
        let mut reports = Vec::new();

        while let Some(next) = source.next_track() {
            let track = match next {
                Ok(track) => track,
                Err(e) => {
                    warn!("[Import] Skipping unreadable track: {}", e);
                    reports.push(TrackReport {
                        track_id: source_error_id(&e),
                        mode: None,
                        result: Err(e),
                    });
                    continue;
                }
            };

            let mode = match self.store.node_count() {
                Ok(_) if self.committed_tracks > 0 => ConflationMode::Merge,
                Ok(count) => ConflationMode::for_graph(count),
                Err(e) => {
                    reports.push(TrackReport {
                        track_id: track.id,
                        mode: None,
                        result: Err(e),
                    });
                    continue;
                }
            };

            debug!("[Import] Track {} ({} points) as {}", track.id, track.points.len(), mode);
            let result = self.import_track(&track.points, mode);
            reports.push(TrackReport {
                track_id: track.id,
                mode: Some(mode),
                result,
            });
        }

        reports
    }
}

fn source_error_id(error: &ConflationError) -> String {
    match error {
        ConflationError::TrackParse { path, .. } => path.display().to_string(),
        _ => "unknown".to_string(),
    }
}
