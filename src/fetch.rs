//! Node fetch adapter. A fetch always completes before any overlay mutation,
//! so a failed, cancelled or timed-out request changes nothing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::error::{EditError, ServiceError};
use crate::model::{BoundaryNode, Envelope};
use crate::service::CadastreNodeService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchMode {
    /// A location where a new node can be inserted.
    Potential,
    /// A node that already exists on the server.
    Existing,
}

/// Asks the service for a node in `bbox`. `Ok(None)` means nothing was found.
pub async fn fetch_node<S>(
    service: &S,
    bbox: &Envelope,
    srid: i32,
    mode: FetchMode,
) -> Result<Option<BoundaryNode>, ServiceError>
where
    S: CadastreNodeService + ?Sized,
{
    let (min, max) = (bbox.min(), bbox.max());
    let to = match mode {
        FetchMode::Potential => {
            service
                .get_cadastre_object_node_potential(min.x, min.y, max.x, max.y, srid)
                .await?
        }
        FetchMode::Existing => {
            service
                .get_cadastre_object_node(min.x, min.y, max.x, max.y, srid)
                .await?
        }
    };
    to.map(BoundaryNode::try_from).transpose()
}

/// Handle that aborts whatever fetch is in flight on its gate.
#[derive(Debug, Clone)]
pub struct FetchCanceller {
    generation: Arc<watch::Sender<u64>>,
}

impl FetchCanceller {
    pub fn cancel(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }
}

/// Runs service requests so they can be superseded by a newer gesture or
/// abandoned after a timeout.
#[derive(Debug)]
pub struct FetchGate {
    generation: Arc<watch::Sender<u64>>,
    timeout: Option<Duration>,
}

impl FetchGate {
    pub fn new(timeout: Option<Duration>) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            generation: Arc::new(tx),
            timeout,
        }
    }

    pub fn canceller(&self) -> FetchCanceller {
        FetchCanceller {
            generation: Arc::clone(&self.generation),
        }
    }

    /// Cancellations issued before this call do not affect it.
    pub async fn run<T, F>(&self, request: F) -> Result<T, EditError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let mut cancelled = self.generation.subscribe();

        let guarded = async {
            tokio::select! {
                result = request => result.map_err(EditError::from),
                _ = cancelled.changed() => {
                    warn!("Node request cancelled");
                    Err(EditError::Cancelled)
                }
            }
        };

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Node request timed out after {:?}", limit);
                    Err(EditError::TimedOut(limit))
                }
            },
            None => guarded.await,
        }
    }
}
