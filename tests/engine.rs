//! Tests for the merge-vs-insert decision of the conflation engine

use trackgraph::geo_utils::offset_meters;
use trackgraph::{
    ConflationConfig, ConflationEngine, ConflationMode, Coordinate, GraphStore, GraphTransaction,
    MatchPolicy, MemoryGraphStore, NodeIndex, NodeStats, Outcome, ProximityRadius, SpatialIndex,
    TrackPoint,
};

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

fn engine(radius: ProximityRadius, policy: MatchPolicy) -> ConflationEngine {
    ConflationEngine::new(ConflationConfig { radius, policy })
}

/// Store and index holding one committed node per (lon, lat, speed).
fn seeded(nodes: &[(f64, f64, f64)]) -> (MemoryGraphStore, NodeIndex) {
    let mut store = MemoryGraphStore::new();
    let mut index = NodeIndex::new();
    let mut tx = store.begin().unwrap();
    for &(lon, lat, speed) in nodes {
        let at = Coordinate::new(lon, lat);
        let id = tx.create_node(at, NodeStats::first(speed)).unwrap();
        index.insert(id, at).unwrap();
    }
    tx.commit().unwrap();
    (store, index)
}

#[test]
fn test_seed_always_creates() {
    let (mut store, mut index) = seeded(&[(0.0, 0.0, 5.0)]);
    let engine = ConflationEngine::default();
    let mut tx = store.begin().unwrap();

    // Exactly on top of an existing node, still a new node in seed mode
    let point = TrackPoint::new(0.0, 0.0, 0, 9.0);
    let resolution = engine
        .resolve(&mut tx, &mut index, &point, ConflationMode::Seed)
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(resolution.outcome, Outcome::Created);
    assert_eq!(store.node_count().unwrap(), 2);
    assert_eq!(index.len(), 2);
    let created = store.get(resolution.node).unwrap();
    assert_eq!(created.stats, NodeStats::first(9.0));
}

#[test]
fn test_merge_into_single_candidate() {
    let (mut store, mut index) = seeded(&[(0.0, 0.0, 5.0)]);
    let engine = ConflationEngine::default();
    let mut tx = store.begin().unwrap();

    let point = TrackPoint::new(0.0001, 0.0001, 0, 7.0);
    let resolution = engine
        .resolve(&mut tx, &mut index, &point, ConflationMode::Merge)
        .unwrap();
    tx.commit().unwrap();

    assert!(resolution.is_merge());
    match resolution.outcome {
        Outcome::Merged { distance } => {
            assert!(approx_eq(distance, (2.0f64).sqrt() * 0.0001, 1e-12))
        }
        Outcome::Created => panic!("expected a merge"),
    }

    let node = store.get(resolution.node).unwrap();
    assert_eq!(node.stats.sample_count, 2);
    assert_eq!(node.stats.average_speed, 6.0);
    // Merging never moves a node
    assert_eq!(node.coordinate, Coordinate::new(0.0, 0.0));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_merge_mode_creates_when_nothing_near() {
    let (mut store, mut index) = seeded(&[(0.0, 0.0, 5.0)]);
    let engine = ConflationEngine::default();
    let mut tx = store.begin().unwrap();

    let point = TrackPoint::new(0.5, 0.5, 0, 4.0);
    let resolution = engine
        .resolve(&mut tx, &mut index, &point, ConflationMode::Merge)
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(resolution.outcome, Outcome::Created);
    assert_eq!(store.node_count().unwrap(), 2);
    assert_eq!(store.get(trackgraph::NodeId(1)).unwrap().stats.sample_count, 1);
}

#[test]
fn test_point_on_radius_boundary_merges() {
    let (mut store, mut index) = seeded(&[(0.0, 0.0, 5.0)]);
    let engine = engine(ProximityRadius::Degrees(0.5), MatchPolicy::UniqueWithinRadius);
    let mut tx = store.begin().unwrap();

    let point = TrackPoint::new(0.5, 0.0, 0, 1.0);
    let resolution = engine
        .resolve(&mut tx, &mut index, &point, ConflationMode::Merge)
        .unwrap();

    assert!(resolution.is_merge());
}

#[test]
fn test_equidistant_candidates_create_new_node() {
    let (mut store, mut index) = seeded(&[(-1.0, 0.0, 5.0), (1.0, 0.0, 5.0)]);
    let mut tx = store.begin().unwrap();

    let point = TrackPoint::new(0.0, 0.0, 0, 3.0);
    for policy in [
        MatchPolicy::UniqueWithinRadius,
        MatchPolicy::UniqueNearest { tie_tolerance: 0.0 },
    ] {
        let engine = engine(ProximityRadius::Degrees(2.0), policy);
        let candidates = index
            .nearest_within(point.coordinate(), engine.config().radius)
            .unwrap();
        assert_eq!(candidates.len(), 2);

        let resolution = engine
            .resolve(&mut tx, &mut index, &point, ConflationMode::Merge)
            .unwrap();
        assert_eq!(resolution.outcome, Outcome::Created, "policy {:?}", policy);
        // Leave the index as it was for the next policy
        index.remove(resolution.node, point.coordinate()).unwrap();
    }
    drop(tx);

    // Neither existing node was touched
    for node in store.iter_nodes() {
        assert_eq!(node.stats, NodeStats::first(5.0));
    }
}

#[test]
fn test_unique_nearest_merges_clear_winner() {
    let (mut store, mut index) = seeded(&[(-1.0, 0.0, 5.0), (1.5, 0.0, 5.0)]);
    let point = TrackPoint::new(0.0, 0.0, 0, 3.0);

    // Strict uniqueness refuses: two nodes within the radius
    let strict = engine(ProximityRadius::Degrees(2.0), MatchPolicy::UniqueWithinRadius);
    let mut tx = store.begin().unwrap();
    let resolution = strict
        .resolve(&mut tx, &mut index, &point, ConflationMode::Merge)
        .unwrap();
    assert_eq!(resolution.outcome, Outcome::Created);
    drop(tx);
    index.remove(resolution.node, point.coordinate()).unwrap();

    // Nearest policy picks the node 1.0 away over the one 1.5 away
    let nearest = engine(
        ProximityRadius::Degrees(2.0),
        MatchPolicy::UniqueNearest { tie_tolerance: 0.1 },
    );
    let mut tx = store.begin().unwrap();
    let resolution = nearest
        .resolve(&mut tx, &mut index, &point, ConflationMode::Merge)
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(resolution.node, trackgraph::NodeId(1));
    assert!(resolution.is_merge());
    assert_eq!(store.get(resolution.node).unwrap().stats.average_speed, 4.0);
}

#[test]
fn test_unique_nearest_respects_tie_tolerance() {
    let (mut store, mut index) = seeded(&[(-1.0, 0.0, 5.0), (1.05, 0.0, 5.0)]);
    let engine = engine(
        ProximityRadius::Degrees(2.0),
        MatchPolicy::UniqueNearest { tie_tolerance: 0.1 },
    );
    let mut tx = store.begin().unwrap();

    let point = TrackPoint::new(0.0, 0.0, 0, 3.0);
    let resolution = engine
        .resolve(&mut tx, &mut index, &point, ConflationMode::Merge)
        .unwrap();

    // 0.05 apart is within the tolerance, so this counts as a tie
    assert_eq!(resolution.outcome, Outcome::Created);
}

#[test]
fn test_created_node_visible_to_next_point() {
    let (mut store, mut index) = seeded(&[(10.0, 10.0, 1.0)]);
    let engine = ConflationEngine::default();
    let mut tx = store.begin().unwrap();

    let first = TrackPoint::new(0.0, 0.0, 0, 2.0);
    let second = TrackPoint::new(0.001, 0.0, 1, 4.0);
    let a = engine
        .resolve(&mut tx, &mut index, &first, ConflationMode::Merge)
        .unwrap();
    let b = engine
        .resolve(&mut tx, &mut index, &second, ConflationMode::Merge)
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(a.outcome, Outcome::Created);
    assert!(b.is_merge());
    assert_eq!(a.node, b.node);
    let node = store.get(a.node).unwrap();
    assert_eq!(node.stats.sample_count, 2);
    assert_eq!(node.stats.average_speed, 3.0);
}

#[test]
fn test_meters_radius_at_high_latitude() {
    let origin = Coordinate::new(10.0, 60.0);
    let (mut store, mut index) = seeded(&[(origin.longitude, origin.latitude, 5.0)]);
    let engine = engine(ProximityRadius::Meters(20.0), MatchPolicy::UniqueWithinRadius);

    let near = offset_meters(&origin, 15.0, 0.0);
    let far = offset_meters(&origin, 25.0, 0.0);

    let mut tx = store.begin().unwrap();
    let merged = engine
        .resolve(
            &mut tx,
            &mut index,
            &TrackPoint::new(near.longitude, near.latitude, 0, 5.0),
            ConflationMode::Merge,
        )
        .unwrap();
    assert!(merged.is_merge());
    match merged.outcome {
        Outcome::Merged { distance } => assert!(approx_eq(distance, 15.0, 0.1)),
        Outcome::Created => unreachable!(),
    }

    let created = engine
        .resolve(
            &mut tx,
            &mut index,
            &TrackPoint::new(far.longitude, far.latitude, 1, 5.0),
            ConflationMode::Merge,
        )
        .unwrap();
    // 25m from the only node in the graph
    assert_eq!(created.outcome, Outcome::Created);
}

#[test]
fn test_unknown_candidate_is_store_failure() {
    let mut store = MemoryGraphStore::new();
    let mut index = NodeIndex::new();
    // Index entry with no backing node
    index
        .insert(trackgraph::NodeId(99), Coordinate::new(0.0, 0.0))
        .unwrap();

    let engine = ConflationEngine::default();
    let mut tx = store.begin().unwrap();
    let result = engine.resolve(
        &mut tx,
        &mut index,
        &TrackPoint::new(0.0, 0.0, 0, 1.0),
        ConflationMode::Merge,
    );

    assert!(matches!(
        result,
        Err(trackgraph::ConflationError::UnknownNode(trackgraph::NodeId(99)))
    ));
}
