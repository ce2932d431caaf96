use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;

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

    /// Best-effort send: a closed channel never fails the caller's operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!("Dropping domain event: {}", err);
        }
    }
}

/// Domain events emitted by the storefront services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CartItemAdded {
        user_id: Uuid,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemUpdated {
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        user_id: Uuid,
        item_id: Uuid,
        product_id: Uuid,
    },
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        total_amount: Decimal,
        item_count: usize,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    ReviewSubmitted {
        review_id: Uuid,
        product_id: Uuid,
        user_id: Uuid,
        rating: i32,
    },
    ReviewModerated {
        review_id: Uuid,
        approved: bool,
    },
    UserRegistered {
        user_id: Uuid,
        username: String,
    },
}

impl Event {
    /// Short stable name used as a log field and metric label
    pub fn name(&self) -> &'static str {
        match self {
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartItemUpdated { .. } => "cart_item_updated",
            Event::CartItemRemoved { .. } => "cart_item_removed",
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::ReviewSubmitted { .. } => "review_submitted",
            Event::ReviewModerated { .. } => "review_moderated",
            Event::UserRegistered { .. } => "user_registered",
        }
    }
}

/// Drains the event channel until every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("terko_events.processed", 1, "event" => event.name());

        match &event {
            Event::OrderPlaced {
                order_id,
                order_number,
                user_id,
                total_amount,
                item_count,
            } => {
                info!(
                    %order_id,
                    %order_number,
                    %user_id,
                    %total_amount,
                    item_count,
                    "Order placed"
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::ReviewSubmitted {
                review_id,
                product_id,
                rating,
                ..
            } => {
                info!(%review_id, %product_id, rating, "Review awaiting moderation");
            }
            other => {
                info!(event = other.name(), payload = ?other, "Domain event");
            }
        }
    }

    info!("Event channel closed; event processing loop finished");
}
