use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the core services after a successful commit.
///
/// Consumers (notification fan-out, audit sinks, dashboards) subscribe via
/// the channel; the services never block on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Stock ledger events
    StockReceived {
        lot_id: Uuid,
        movement_id: Uuid,
        product_id: Uuid,
        center_id: Uuid,
        quantity: i32,
    },
    StockDispensed {
        prescription_line_id: Uuid,
        center_id: Uuid,
        quantity: i32,
        lots_touched: Vec<Uuid>,
    },
    StockAdjusted {
        lot_id: Uuid,
        movement_id: Uuid,
        delta: i32,
    },
    LotDeleted {
        lot_id: Uuid,
        compensating_movement_id: Option<Uuid>,
    },
    LotsMarkedExpired {
        as_of: NaiveDate,
        count: u64,
    },
    LotWrittenOff {
        lot_id: Uuid,
        movement_id: Uuid,
        quantity: i32,
    },

    // Consultation workflow events
    ConsultationCreated {
        consultation_id: Uuid,
        patient_id: Uuid,
        center_id: Uuid,
    },
    ConsultationStatusChanged {
        consultation_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Prescription events
    PrescriptionCreated {
        prescription_id: Uuid,
        consultation_id: Uuid,
        line_count: usize,
        exam_count: usize,
    },
    PrescriptionCompleted {
        prescription_id: Uuid,
    },
    ExamStatusChanged {
        exam_id: Uuid,
        old_status: String,
        new_status: String,
    },
}

/// Cloneable handle used by services to publish events.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Builds a connected sender/receiver pair with the given buffer size.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event as structured JSON.
///
/// Embedders that need richer handling replace this loop with their own
/// consumer; the services only depend on `EventSender`.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = %payload, "domain event"),
            Err(e) => warn!("Failed to serialize event {:?}: {}", event, e),
        }
    }

    info!("Event channel closed, stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(4);
        sender
            .send(Event::PrescriptionCompleted {
                prescription_id: Uuid::new_v4(),
            })
            .await
            .expect("send");

        let received = rx.recv().await.expect("event");
        assert!(matches!(received, Event::PrescriptionCompleted { .. }));
    }
}
