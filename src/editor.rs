use crate::config::EditConfig;
use crate::error::Result;
use crate::fetch::FetchCanceller;
use crate::model::Envelope;
use crate::overlay::WorkingOverlay;
use crate::service::CadastreNodeService;
use crate::tool::{EditContext, GestureReport, MapView, NodeEditTool, NodeManipulator, ToolKind};

/// Cadastre redefinition session: the working overlay plus the add-node and
/// change-node tools that edit it.
pub struct CadastreEditor<S, V> {
    overlay: WorkingOverlay,
    service: S,
    map: V,
    config: EditConfig,
    add_node: NodeEditTool,
    change_node: NodeEditTool,
}

impl<S, V> CadastreEditor<S, V>
where
    S: CadastreNodeService,
    V: MapView,
{
    pub fn new(service: S, map: V, config: EditConfig) -> Self {
        Self {
            overlay: WorkingOverlay::new(),
            add_node: NodeEditTool::add_node(config.fetch_timeout),
            change_node: NodeEditTool::change_node(config.fetch_timeout),
            service,
            map,
            config,
        }
    }

    pub fn overlay(&self) -> &WorkingOverlay {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut WorkingOverlay {
        &mut self.overlay
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn map(&self) -> &V {
        &self.map
    }

    pub fn config(&self) -> &EditConfig {
        &self.config
    }

    pub fn tool(&self, kind: ToolKind) -> &NodeEditTool {
        match kind {
            ToolKind::AddNode => &self.add_node,
            ToolKind::ChangeNode => &self.change_node,
        }
    }

    pub fn canceller(&self, kind: ToolKind) -> FetchCanceller {
        self.tool(kind).canceller()
    }

    /// Runs one gesture with the given tool.
    pub async fn gesture<M>(
        &mut self,
        kind: ToolKind,
        bbox: Envelope,
        manipulator: &mut M,
    ) -> Result<GestureReport>
    where
        M: NodeManipulator + ?Sized,
    {
        let tool = match kind {
            ToolKind::AddNode => &mut self.add_node,
            ToolKind::ChangeNode => &mut self.change_node,
        };
        let ctx = EditContext {
            overlay: &mut self.overlay,
            service: &self.service,
            map: &mut self.map,
            config: &self.config,
        };
        tool.on_rectangle_finished(bbox, ctx, manipulator).await
    }

    pub fn into_overlay(self) -> WorkingOverlay {
        self.overlay
    }
}
