use std::time::Duration;

use async_trait::async_trait;
use cadastre_redefinition::replay::{GestureAction, ScriptedManipulator, StaticMapView};
use cadastre_redefinition::service::CadastreObjectRefTo;
use cadastre_redefinition::{
    envelope, BoundaryNode, CadastreEditor, CadastreNodeService, CadastreObjectNodeTo, EditConfig,
    EditError, EventLog, GeometryError, GestureOutcome, InMemoryCadastreService, NodeId,
    OverlayEvent, Parcel, ParcelId, ServiceError, ToolKind, ToolState,
};
use geo_types::{coord, polygon, Coord};

const SRID: i32 = 2193;

fn node_to(id: &str, x: f64, y: f64, parcels: &[&str]) -> CadastreObjectNodeTo {
    CadastreObjectNodeTo {
        id: id.to_string(),
        x,
        y,
        cadastre_object_list: parcels
            .iter()
            .map(|p| CadastreObjectRefTo { id: p.to_string() })
            .collect(),
    }
}

fn default_service() -> InMemoryCadastreService {
    InMemoryCadastreService::new(
        vec![node_to("potential-1", 10.0, 5.0, &["a", "b", "d"])],
        vec![node_to("existing-1", 10.0, 10.0, &["a", "b", "c"])],
    )
}

// a = [0,10]x[0,10], b = [10,20]x[0,10], c = [0,20]x[10,20].
// Parcel d is known to the server but not loaded.
fn editor_with<S: CadastreNodeService>(
    service: S,
    config: EditConfig,
) -> CadastreEditor<S, StaticMapView> {
    let mut editor = CadastreEditor::new(service, StaticMapView::new(SRID), config);
    let overlay = editor.overlay_mut();
    overlay.insert_parcel(Parcel::new(
        "a",
        polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
    ));
    overlay.insert_parcel(Parcel::new(
        "b",
        polygon![(x: 10.0, y: 0.0), (x: 20.0, y: 0.0), (x: 20.0, y: 10.0), (x: 10.0, y: 10.0)],
    ));
    overlay.insert_parcel(Parcel::new(
        "c",
        polygon![(x: 0.0, y: 10.0), (x: 20.0, y: 10.0), (x: 20.0, y: 20.0), (x: 0.0, y: 20.0)],
    ));
    overlay.insert_node(BoundaryNode::new(
        "local-1",
        coord! { x: 0.0, y: 0.0 },
        vec![ParcelId::from("a")],
    ));
    editor
}

fn editor() -> CadastreEditor<InMemoryCadastreService, StaticMapView> {
    editor_with(default_service(), EditConfig::default())
}

fn has_vertex<S>(
    editor: &CadastreEditor<S, StaticMapView>,
    parcel: &str,
    at: Coord<f64>,
) -> bool
where
    S: CadastreNodeService,
{
    editor
        .overlay()
        .parcel(&ParcelId::from(parcel))
        .map_or(false, |p| p.has_vertex(at, 0.0))
}

struct FailingService;

#[async_trait(?Send)]
impl CadastreNodeService for FailingService {
    async fn get_cadastre_object_node_potential(
        &self,
        _min_x: f64,
        _min_y: f64,
        _max_x: f64,
        _max_y: f64,
        _srid: i32,
    ) -> Result<Option<CadastreObjectNodeTo>, ServiceError> {
        Err(ServiceError::Unavailable("connection refused".to_string()))
    }

    async fn get_cadastre_object_node(
        &self,
        _min_x: f64,
        _min_y: f64,
        _max_x: f64,
        _max_y: f64,
        _srid: i32,
    ) -> Result<Option<CadastreObjectNodeTo>, ServiceError> {
        Err(ServiceError::Unavailable("connection refused".to_string()))
    }
}

struct StalledService;

#[async_trait(?Send)]
impl CadastreNodeService for StalledService {
    async fn get_cadastre_object_node_potential(
        &self,
        _min_x: f64,
        _min_y: f64,
        _max_x: f64,
        _max_y: f64,
        _srid: i32,
    ) -> Result<Option<CadastreObjectNodeTo>, ServiceError> {
        std::future::pending().await
    }

    async fn get_cadastre_object_node(
        &self,
        _min_x: f64,
        _min_y: f64,
        _max_x: f64,
        _max_y: f64,
        _srid: i32,
    ) -> Result<Option<CadastreObjectNodeTo>, ServiceError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_add_node_commit_updates_loaded_parcels() {
    let mut editor = editor();
    let mut manipulator = ScriptedManipulator::new([GestureAction::Confirm]);

    let report = editor
        .gesture(ToolKind::AddNode, envelope(9.0, 4.0, 11.0, 6.0), &mut manipulator)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        GestureOutcome::Committed {
            node: NodeId::from("potential-1"),
            parcels: vec![ParcelId::from("a"), ParcelId::from("b")],
        }
    );
    assert_eq!(
        report.path,
        vec![
            ToolState::AwaitingGesture,
            ToolState::Fetching,
            ToolState::Inserting,
            ToolState::Manipulating,
            ToolState::Committed,
            ToolState::Idle,
        ]
    );
    assert!(report.refreshed);
    assert_eq!(editor.map().refresh_count(), 1);
    assert_eq!(editor.tool(ToolKind::AddNode).state(), ToolState::Idle);

    let point = coord! { x: 10.0, y: 5.0 };
    assert!(has_vertex(&editor, "a", point));
    assert!(has_vertex(&editor, "b", point));
    assert!(!has_vertex(&editor, "c", point));
    assert!(editor.overlay().parcel(&ParcelId::from("d")).is_none());
    assert!(editor.overlay().node(&NodeId::from("potential-1")).is_some());

    for parcel in editor.overlay().parcels() {
        let exterior = parcel.geometry.exterior();
        assert!(exterior.is_closed(), "parcel {} not closed", parcel.id);
    }
}

#[tokio::test]
async fn test_add_node_cancel_removes_node_and_restores_rings() {
    let mut editor = editor();
    let before = editor.overlay().snapshot();
    let mut manipulator = ScriptedManipulator::new([GestureAction::Cancel]);

    let report = editor
        .gesture(ToolKind::AddNode, envelope(9.0, 4.0, 11.0, 6.0), &mut manipulator)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        GestureOutcome::RolledBack {
            node: NodeId::from("potential-1"),
            removed: true,
        }
    );
    assert_eq!(report.path[report.path.len() - 2], ToolState::RolledBack);
    assert!(editor.overlay().node(&NodeId::from("potential-1")).is_none());
    assert_eq!(editor.overlay().snapshot(), before);
    assert_eq!(editor.map().refresh_count(), 1);
}

#[tokio::test]
async fn test_add_node_dragged_before_confirm() {
    let mut editor = editor();
    let mut manipulator = ScriptedManipulator::new([GestureAction::MoveTo([10.0, 6.0])]);

    editor
        .gesture(ToolKind::AddNode, envelope(9.0, 4.0, 11.0, 6.0), &mut manipulator)
        .await
        .unwrap();

    let moved = coord! { x: 10.0, y: 6.0 };
    let original = coord! { x: 10.0, y: 5.0 };
    for parcel in ["a", "b"] {
        assert!(has_vertex(&editor, parcel, moved));
        assert!(!has_vertex(&editor, parcel, original));
    }
    assert_eq!(
        editor.overlay().node(&NodeId::from("potential-1")).unwrap().coordinate,
        moved
    );
    assert_eq!(editor.map().refresh_count(), 1);
}

#[tokio::test]
async fn test_no_result_is_a_no_op_for_both_tools() {
    for kind in [ToolKind::AddNode, ToolKind::ChangeNode] {
        let mut editor = editor();
        let log = EventLog::new();
        editor.overlay_mut().subscribe(log.clone());
        let before = editor.overlay().snapshot();
        let mut manipulator = ScriptedManipulator::new([GestureAction::Confirm]);

        let report = editor
            .gesture(kind, envelope(50.0, 50.0, 51.0, 51.0), &mut manipulator)
            .await
            .unwrap();

        assert_eq!(report.outcome, GestureOutcome::NoNode, "{}", kind.name());
        assert_eq!(
            report.path,
            vec![ToolState::AwaitingGesture, ToolState::Fetching, ToolState::Idle]
        );
        assert!(!report.refreshed);
        assert_eq!(editor.overlay().snapshot(), before);
        assert_eq!(editor.map().refresh_count(), 0);
        assert_eq!(manipulator.calls(), 0);
        assert!(log.events().is_empty());
    }
}

#[tokio::test]
async fn test_change_node_cancel_keeps_local_node() {
    let mut editor = editor();
    let log = EventLog::new();
    editor.overlay_mut().subscribe(log.clone());
    let before = editor.overlay().snapshot();
    let mut manipulator = ScriptedManipulator::new([GestureAction::Cancel]);

    let report = editor
        .gesture(ToolKind::ChangeNode, envelope(-1.0, -1.0, 1.0, 1.0), &mut manipulator)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        GestureOutcome::RolledBack {
            node: NodeId::from("local-1"),
            removed: false,
        }
    );
    assert!(!report.path.contains(&ToolState::Fetching));
    assert_eq!(editor.service().request_count(), 0);
    assert!(editor.overlay().node(&NodeId::from("local-1")).is_some());
    assert_eq!(editor.overlay().snapshot(), before);
    assert_eq!(log.events(), vec![OverlayEvent::FeatureChanged(ParcelId::from("a"))]);
    assert_eq!(editor.map().refresh_count(), 1);
}

#[tokio::test]
async fn test_change_node_cancel_drops_node_from_server() {
    let mut editor = editor();
    let log = EventLog::new();
    editor.overlay_mut().subscribe(log.clone());
    let before = editor.overlay().snapshot();
    let mut manipulator = ScriptedManipulator::new([GestureAction::Cancel]);

    let report = editor
        .gesture(ToolKind::ChangeNode, envelope(9.0, 9.0, 11.0, 11.0), &mut manipulator)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        GestureOutcome::RolledBack {
            node: NodeId::from("existing-1"),
            removed: true,
        }
    );
    assert!(editor.overlay().node(&NodeId::from("existing-1")).is_none());
    assert_eq!(editor.overlay().snapshot(), before);

    let events = log.events();
    assert_eq!(events.first(), Some(&OverlayEvent::NodeAdded(NodeId::from("existing-1"))));
    assert_eq!(events.last(), Some(&OverlayEvent::NodeRemoved(NodeId::from("existing-1"))));
    for parcel in ["a", "b", "c"] {
        assert!(events.contains(&OverlayEvent::FeatureChanged(ParcelId::from(parcel))));
    }
    assert_eq!(editor.map().refresh_count(), 1);
}

#[tokio::test]
async fn test_change_node_moves_shared_corner() {
    let mut editor = editor();
    let mut manipulator = ScriptedManipulator::new([GestureAction::MoveTo([11.0, 11.0])]);

    let report = editor
        .gesture(ToolKind::ChangeNode, envelope(9.0, 9.0, 11.0, 11.0), &mut manipulator)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        GestureOutcome::Committed {
            node: NodeId::from("existing-1"),
            parcels: vec![ParcelId::from("a"), ParcelId::from("b"), ParcelId::from("c")],
        }
    );
    assert_eq!(
        report.path,
        vec![
            ToolState::AwaitingGesture,
            ToolState::Fetching,
            ToolState::Relocating,
            ToolState::Manipulating,
            ToolState::Committed,
            ToolState::Idle,
        ]
    );
    let moved = coord! { x: 11.0, y: 11.0 };
    for parcel in ["a", "b", "c"] {
        assert!(has_vertex(&editor, parcel, moved), "parcel {} misses the node", parcel);
        assert!(!has_vertex(&editor, parcel, coord! { x: 10.0, y: 10.0 }));
    }
    assert_eq!(
        editor.overlay().node(&NodeId::from("existing-1")).unwrap().coordinate,
        moved
    );
    assert_eq!(editor.map().refresh_count(), 1);
}

#[tokio::test]
async fn test_change_node_gives_local_node_to_parcels_missing_it() {
    let mut editor = editor();
    // (10, 10) is a corner of a and b but only a point on the bottom edge of c
    editor.overlay_mut().insert_node(BoundaryNode::new(
        "shared",
        coord! { x: 10.0, y: 10.0 },
        vec![ParcelId::from("a"), ParcelId::from("b"), ParcelId::from("c")],
    ));
    let mut manipulator = ScriptedManipulator::new([GestureAction::MoveTo([10.0, 11.0])]);

    let report = editor
        .gesture(ToolKind::ChangeNode, envelope(9.0, 9.0, 11.0, 11.0), &mut manipulator)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        GestureOutcome::Committed {
            node: NodeId::from("shared"),
            parcels: vec![ParcelId::from("a"), ParcelId::from("b"), ParcelId::from("c")],
        }
    );
    let moved = coord! { x: 10.0, y: 11.0 };
    for parcel in ["a", "b", "c"] {
        assert!(has_vertex(&editor, parcel, moved), "parcel {} misses the node", parcel);
    }
    assert_eq!(editor.service().request_count(), 0);
}

#[tokio::test]
async fn test_change_node_cancel_restores_parcels_that_gained_the_node() {
    let mut editor = editor();
    editor.overlay_mut().insert_node(BoundaryNode::new(
        "shared",
        coord! { x: 10.0, y: 10.0 },
        vec![ParcelId::from("a"), ParcelId::from("b"), ParcelId::from("c")],
    ));
    let before = editor.overlay().snapshot();
    let mut manipulator = ScriptedManipulator::new([GestureAction::Cancel]);

    let report = editor
        .gesture(ToolKind::ChangeNode, envelope(9.0, 9.0, 11.0, 11.0), &mut manipulator)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        GestureOutcome::RolledBack {
            node: NodeId::from("shared"),
            removed: false,
        }
    );
    assert_eq!(editor.overlay().snapshot(), before);
}

#[tokio::test]
async fn test_change_node_off_boundary_is_rejected() {
    let service = InMemoryCadastreService::new(
        vec![],
        vec![node_to("existing-2", 10.0, 5.0, &["a", "c"])],
    );
    let mut editor = editor_with(service, EditConfig::default());
    let before = editor.overlay().snapshot();
    let mut manipulator = ScriptedManipulator::new([GestureAction::MoveTo([10.0, 6.0])]);

    let err = editor
        .gesture(ToolKind::ChangeNode, envelope(9.0, 4.0, 11.0, 6.0), &mut manipulator)
        .await
        .unwrap_err();

    match err {
        EditError::Geometry(GeometryError::OffBoundary { parcel, .. }) => {
            assert_eq!(parcel, ParcelId::from("c"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(editor.overlay().snapshot(), before);
    assert_eq!(manipulator.calls(), 0);
    assert_eq!(editor.tool(ToolKind::ChangeNode).state(), ToolState::Idle);
}

#[tokio::test]
async fn test_change_node_second_gesture_finds_node_locally() {
    let mut editor = editor();
    let bbox = envelope(9.0, 9.0, 11.0, 11.0);

    let mut confirm = ScriptedManipulator::new([GestureAction::Confirm]);
    editor.gesture(ToolKind::ChangeNode, bbox, &mut confirm).await.unwrap();
    assert_eq!(editor.service().request_count(), 1);

    let mut cancel = ScriptedManipulator::new([GestureAction::Cancel]);
    let report = editor.gesture(ToolKind::ChangeNode, bbox, &mut cancel).await.unwrap();

    assert_eq!(editor.service().request_count(), 1);
    assert_eq!(
        report.outcome,
        GestureOutcome::RolledBack {
            node: NodeId::from("existing-1"),
            removed: false,
        }
    );
    assert!(editor.overlay().node(&NodeId::from("existing-1")).is_some());
}

#[tokio::test]
async fn test_service_failure_leaves_overlay_untouched() {
    let mut editor = editor_with(FailingService, EditConfig::default());
    let before = editor.overlay().snapshot();

    for kind in [ToolKind::AddNode, ToolKind::ChangeNode] {
        let mut manipulator = ScriptedManipulator::new([GestureAction::Confirm]);
        let err = editor
            .gesture(kind, envelope(9.0, 4.0, 11.0, 6.0), &mut manipulator)
            .await
            .unwrap_err();

        assert!(matches!(err, EditError::Service(ServiceError::Unavailable(_))));
        assert_eq!(editor.tool(kind).state(), ToolState::Idle);
    }
    assert_eq!(editor.overlay().snapshot(), before);
    assert_eq!(editor.map().refresh_count(), 0);
}

#[tokio::test]
async fn test_node_off_parcel_boundary_is_rejected() {
    let service = InMemoryCadastreService::new(
        vec![node_to("potential-2", 10.0, 5.0, &["a", "c"])],
        vec![],
    );
    let mut editor = editor_with(service, EditConfig::default());
    let before = editor.overlay().snapshot();
    let mut manipulator = ScriptedManipulator::new([GestureAction::Confirm]);

    let err = editor
        .gesture(ToolKind::AddNode, envelope(9.0, 4.0, 11.0, 6.0), &mut manipulator)
        .await
        .unwrap_err();

    match err {
        EditError::Geometry(GeometryError::OffBoundary { parcel, .. }) => {
            assert_eq!(parcel, ParcelId::from("c"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(editor.overlay().snapshot(), before);
    assert_eq!(editor.map().refresh_count(), 0);
    assert_eq!(manipulator.calls(), 0);
}

#[tokio::test]
async fn test_pending_fetch_can_be_cancelled() {
    let config = EditConfig {
        fetch_timeout: None,
        ..EditConfig::default()
    };
    let mut editor = editor_with(StalledService, config);
    let before = editor.overlay().snapshot();
    let canceller = editor.canceller(ToolKind::AddNode);
    let mut manipulator = ScriptedManipulator::new([GestureAction::Confirm]);

    let (result, _) = tokio::join!(
        editor.gesture(ToolKind::AddNode, envelope(9.0, 4.0, 11.0, 6.0), &mut manipulator),
        async {
            tokio::task::yield_now().await;
            canceller.cancel();
        }
    );

    assert!(matches!(result, Err(EditError::Cancelled)));
    assert_eq!(editor.overlay().snapshot(), before);
    assert_eq!(editor.map().refresh_count(), 0);
}

#[tokio::test]
async fn test_stalled_fetch_times_out() {
    let config = EditConfig {
        fetch_timeout: Some(Duration::from_millis(20)),
        ..EditConfig::default()
    };
    let mut editor = editor_with(StalledService, config);
    let mut manipulator = ScriptedManipulator::new([GestureAction::Confirm]);

    let result = editor
        .gesture(ToolKind::ChangeNode, envelope(9.0, 9.0, 11.0, 11.0), &mut manipulator)
        .await;

    assert!(matches!(result, Err(EditError::TimedOut(_))));
    assert_eq!(editor.tool(ToolKind::ChangeNode).state(), ToolState::Idle);
}
