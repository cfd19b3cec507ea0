use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::{
    protocol::Frame,
    registry::{ConnectionRegistry, ConnectionTags},
};
use crate::metrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Hands `frame` to every connection in `group` that passes the shadow filter.
///
/// Frames are only enqueued, never written here, so one slow or dead
/// recipient cannot hold up the rest. Failed recipients are left for their
/// own session loop to tear down.
pub fn broadcast(registry: &ConnectionRegistry, group: &str, frame: &Frame) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    registry.for_each(|id, connection| {
        let tags = connection.tags();
        if tags.group != group || !passes_shadow_filter(tags) {
            return;
        }

        match connection.enqueue(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(TrySendError::Full(_)) => {
                report.failed += 1;
                warn!(connection_id = %id, group, "outbound queue full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                report.failed += 1;
                warn!(connection_id = %id, group, "outbound queue closed, dropping frame");
            }
        }
    });

    debug!(group, delivered = report.delivered, failed = report.failed, "broadcast complete");
    metrics::record_broadcast(report.delivered, report.failed);
    report
}

fn passes_shadow_filter(tags: &ConnectionTags) -> bool {
    match tags.shadow_target {
        None => true,
        Some(target) => tags.viewer == Some(target),
    }
}
