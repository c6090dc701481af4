//! Tests for error.rs

use std::io;

use trackgraph::{ConflationError, ErrorKind, NodeId, OptionExt};

#[test]
fn test_display_messages() {
    let err = ConflationError::MalformedInput {
        index: 3,
        reason: "missing speed".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "malformed track point at index 3: missing speed"
    );
    assert_eq!(
        ConflationError::UnknownNode(NodeId(12)).to_string(),
        "node #12 not found in graph store"
    );
    assert_eq!(
        ConflationError::Store("disk full".to_string()).to_string(),
        "graph store failure: disk full"
    );
}

#[test]
fn test_kind_classification() {
    let malformed = ConflationError::MalformedInput {
        index: 0,
        reason: String::new(),
    };
    assert_eq!(malformed.kind(), ErrorKind::MalformedInput);
    assert_eq!(
        ConflationError::Config("bad".to_string()).kind(),
        ErrorKind::MalformedInput
    );

    for err in [
        ConflationError::Store("x".to_string()),
        ConflationError::Index("x".to_string()),
        ConflationError::UnknownNode(NodeId(1)),
        ConflationError::TrackParse {
            path: "a.gpx".into(),
            reason: "x".to_string(),
        },
        ConflationError::from(io::Error::new(io::ErrorKind::NotFound, "gone")),
    ] {
        assert_eq!(err.kind(), ErrorKind::CollaboratorFailure, "{}", err);
    }
}

#[test]
fn test_ok_or_unknown_node() {
    assert_eq!(Some(5).ok_or_unknown_node(NodeId(1)).unwrap(), 5);

    let missing: Option<u32> = None;
    assert!(matches!(
        missing.ok_or_unknown_node(NodeId(9)),
        Err(ConflationError::UnknownNode(NodeId(9)))
    ));
}
