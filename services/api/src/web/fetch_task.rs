//! services/api/src/web/fetch_task.rs
//!
//! Background store fetches for a live connection. Each fetch carries the
//! ticket it was started with; the connection loop decides on arrival whether
//! the result is still wanted.

use labmarket_core::collection::FetchRequest;
use labmarket_core::ports::{EquipmentStore, PortResult};
use labmarket_core::Listing;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Which view a fetch was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    Browse,
    Dashboard,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub target: FetchTarget,
    pub request: FetchRequest,
    pub result: PortResult<Vec<Listing>>,
}

/// Runs `request` on its own task and reports the result on `results`.
///
/// A cancelled token drops the fetch; nothing is reported.
pub fn spawn_fetch(
    store: Arc<dyn EquipmentStore>,
    target: FetchTarget,
    request: FetchRequest,
    results: UnboundedSender<FetchOutcome>,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                debug!("{:?} fetch cancelled", target);
                return;
            }
            result = request.run(store.as_ref()) => result,
        };
        if results
            .send(FetchOutcome {
                target,
                request,
                result,
            })
            .is_err()
        {
            debug!("{:?} fetch finished after the connection closed", target);
        }
    })
}
