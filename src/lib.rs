pub mod config;
pub mod editor;
pub mod error;
pub mod fetch;
pub mod model;
pub mod overlay;
pub mod propagate;
pub mod replay;
pub mod ring;
pub mod service;
pub mod tool;

pub use config::{CoincidentVertex, EditConfig};
pub use editor::CadastreEditor;
pub use error::{ConfigError, EditError, GeometryError, ServiceError};
pub use fetch::{fetch_node, FetchCanceller, FetchMode};
pub use model::{envelope, BoundaryNode, Envelope, NodeId, Parcel, ParcelId};
pub use overlay::{EventLog, OverlayEvent, OverlayListener, WorkingOverlay};
pub use propagate::{anchor_node, apply_node_to_parcels, relocate_node};
pub use ring::insert_coordinate;
pub use service::{CadastreNodeService, CadastreObjectNodeTo, InMemoryCadastreService};
pub use tool::{
    GestureOutcome, GestureReport, Manipulation, MapView, NodeEditTool, NodeManipulator, ToolKind,
    ToolState,
};
