//! Event Reactor Adapter
//!
//! Single consumer of controller events. The host runtime (OpenFlow session
//! handling, or any other event source) pushes [`ControllerEvent`]s into the
//! queue; the reactor handles them one at a time, in delivery order.

use crate::application::{ControllerService, EventOutcome};
use crate::domain::entities::ControllerEvent;
use crate::infrastructure::ShutdownController;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Producer side of the event queue.
pub type EventSender = mpsc::Sender<ControllerEvent>;

pub struct EventReactor {
    service: Arc<ControllerService>,
    events: mpsc::Receiver<ControllerEvent>,
}

impl EventReactor {
    /// Create a reactor and the bounded queue feeding it.
    pub fn new(service: Arc<ControllerService>, capacity: usize) -> (EventSender, Self) {
        let (tx, events) = mpsc::channel(capacity.max(1));
        (tx, Self { service, events })
    }

    /// Process events until every sender is dropped or shutdown is signalled.
    ///
    /// An event already being handled is finished before shutdown is honoured.
    /// Returns the number of events handled.
    pub async fn run(mut self, shutdown: ShutdownController) -> u64 {
        let _guard = shutdown.task_guard();
        let mut cancel = shutdown.subscribe();
        let mut handled = 0u64;

        tracing::info!("event reactor started");

        while !shutdown.is_shutdown() {
            let event = tokio::select! {
                biased;
                _ = cancel.recv() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let dpid = event.dpid();
            let outcome = self.service.handle(event).await;
            if let EventOutcome::Packet(ref outcome) = outcome {
                tracing::trace!("packet-in on {}: {:?}", dpid, outcome);
            }
            handled += 1;
        }

        tracing::info!("event reactor stopped after {} events", handled);
        handled
    }
}
