//! Recorded editing sessions: a JSON file with the parcels, the server's
//! nodes and a list of gestures, replayed against the node tools.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EditConfig;
use crate::editor::CadastreEditor;
use crate::model::{envelope, BoundaryNode, Parcel, ParcelId};
use crate::overlay::WorkingOverlay;
use crate::service::{CadastreObjectNodeTo, InMemoryCadastreService};
use crate::tool::{GestureReport, Manipulation, MapView, NodeManipulator, ToolKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelRecord {
    pub id: String,
    pub exterior: Vec<[f64; 2]>,
    #[serde(default)]
    pub interiors: Vec<Vec<[f64; 2]>>,
}

fn ring_to_points(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

impl From<&Parcel> for ParcelRecord {
    fn from(parcel: &Parcel) -> Self {
        Self {
            id: parcel.id.to_string(),
            exterior: ring_to_points(parcel.geometry.exterior()),
            interiors: parcel.geometry.interiors().iter().map(ring_to_points).collect(),
        }
    }
}

impl From<ParcelRecord> for Parcel {
    fn from(record: ParcelRecord) -> Self {
        let geometry = Polygon::new(
            LineString::from(record.exterior),
            record.interiors.into_iter().map(LineString::from).collect(),
        );
        Parcel::new(ParcelId::from(record.id), geometry)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerFixture {
    pub potential: Vec<CadastreObjectNodeTo>,
    pub existing: Vec<CadastreObjectNodeTo>,
}

/// What the user does once the node is under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GestureAction {
    /// Accept the node where it is.
    Confirm,
    /// Drag the node to a new location and accept.
    MoveTo([f64; 2]),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureRecord {
    pub tool: ToolKind,
    /// `[min_x, min_y, max_x, max_y]`
    pub bbox: [f64; 4],
    pub action: GestureAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    pub srid: i32,
    #[serde(default)]
    pub config: EditConfig,
    pub parcels: Vec<ParcelRecord>,
    #[serde(default)]
    pub nodes: Vec<CadastreObjectNodeTo>,
    #[serde(default)]
    pub server: ServerFixture,
    #[serde(default)]
    pub gestures: Vec<GestureRecord>,
}

pub fn load_session(path: &Path) -> Result<SessionFile> {
    let file = File::open(path).with_context(|| format!("Failed to open session {:?}", path))?;
    let session: SessionFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse session {:?}", path))?;
    session
        .config
        .validate()
        .with_context(|| format!("Invalid config in session {:?}", path))?;
    Ok(session)
}

/// Manipulator that plays back a fixed list of actions and cancels once the
/// list runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedManipulator {
    actions: VecDeque<GestureAction>,
    calls: usize,
}

impl ScriptedManipulator {
    pub fn new(actions: impl IntoIterator<Item = GestureAction>) -> Self {
        Self {
            actions: actions.into_iter().collect(),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl NodeManipulator for ScriptedManipulator {
    fn manipulate(&mut self, node: &BoundaryNode, _overlay: &WorkingOverlay) -> Manipulation {
        self.calls += 1;
        match self.actions.pop_front() {
            Some(GestureAction::Confirm) => Manipulation::Confirmed(node.coordinate),
            Some(GestureAction::MoveTo([x, y])) => Manipulation::Confirmed(Coord { x, y }),
            Some(GestureAction::Cancel) | None => Manipulation::Cancelled,
        }
    }
}

/// Map view without a screen; it only counts redraw requests.
#[derive(Debug, Clone)]
pub struct StaticMapView {
    srid: i32,
    refreshes: usize,
}

impl StaticMapView {
    pub fn new(srid: i32) -> Self {
        Self { srid, refreshes: 0 }
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes
    }
}

impl MapView for StaticMapView {
    fn srid(&self) -> i32 {
        self.srid
    }

    fn refresh(&mut self) {
        self.refreshes += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureSummary {
    pub index: usize,
    pub tool: ToolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<GestureReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub gestures: Vec<GestureSummary>,
    pub refreshes: usize,
    pub parcels: Vec<ParcelRecord>,
    pub nodes: Vec<CadastreObjectNodeTo>,
}

/// Replays every gesture of the session. A gesture that fails is recorded
/// and the replay carries on with the next one.
pub async fn replay(session: SessionFile) -> Result<ReplayOutcome> {
    let SessionFile {
        srid,
        config,
        parcels,
        nodes,
        server,
        gestures,
    } = session;

    config.validate()?;
    let service = InMemoryCadastreService::new(server.potential, server.existing);
    let mut editor = CadastreEditor::new(service, StaticMapView::new(srid), config);

    for record in parcels {
        editor.overlay_mut().insert_parcel(Parcel::from(record));
    }
    for to in nodes {
        let id = to.id.clone();
        let node = BoundaryNode::try_from(to).with_context(|| format!("Invalid node {}", id))?;
        editor.overlay_mut().insert_node(node);
    }
    info!(
        "Replaying {} gestures over {} parcels",
        gestures.len(),
        editor.overlay().parcels().count()
    );

    let mut summaries = Vec::with_capacity(gestures.len());
    for (index, gesture) in gestures.into_iter().enumerate() {
        let [min_x, min_y, max_x, max_y] = gesture.bbox;
        let mut manipulator = ScriptedManipulator::new([gesture.action]);

        let summary = match editor
            .gesture(gesture.tool, envelope(min_x, min_y, max_x, max_y), &mut manipulator)
            .await
        {
            Ok(report) => GestureSummary {
                index,
                tool: gesture.tool,
                report: Some(report),
                error: None,
            },
            Err(err) => {
                warn!("Gesture {} ({}) failed: {}", index, gesture.tool.name(), err);
                GestureSummary {
                    index,
                    tool: gesture.tool,
                    report: None,
                    error: Some(err.to_string()),
                }
            }
        };
        summaries.push(summary);
    }

    let overlay = editor.overlay();
    Ok(ReplayOutcome {
        gestures: summaries,
        refreshes: editor.map().refresh_count(),
        parcels: overlay.parcels().map(ParcelRecord::from).collect(),
        nodes: overlay.nodes().map(CadastreObjectNodeTo::from).collect(),
    })
}
