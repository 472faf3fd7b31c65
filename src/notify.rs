//! Notification events
//!
//! The engine emits a typed event after each committed state change;
//! rendering and delivery belong to the embedding front-end. Delivery is
//! fire-and-forget: a failed or ignored notification never rolls back
//! the transaction that produced it.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{AccountId, OrderId, TrustStatus};

/// Who should see the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// One account (client or worker)
    Account(AccountId),
    /// The administrator audience (moderation, arbitration, transfers)
    Admins,
}

/// Templated notification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A new order awaits moderation
    ModerationRequested { order: OrderId, title: String },
    /// Moderation published the order
    OrderApproved { order: OrderId, title: String },
    /// Moderation declined the order; the hold was refunded
    OrderRejected {
        order: OrderId,
        title: String,
        reason: String,
        refund: Decimal,
    },
    /// A worker submitted materials for one slot
    WorkSubmitted {
        order: OrderId,
        title: String,
        worker: AccountId,
        materials: String,
    },
    /// The work was accepted and paid
    WorkApproved {
        order: OrderId,
        title: String,
        amount: Decimal,
    },
    /// The client disputed the work; arbitration will decide
    WorkDisputed {
        order: OrderId,
        title: String,
        worker: AccountId,
        reason: Option<String>,
    },
    /// Arbitration rejected the work; the slot reopened
    WorkRejected {
        order: OrderId,
        title: String,
        worker: AccountId,
        trust: TrustStatus,
    },
    /// An order went back on the board after arbitration
    OrderReopened { order: OrderId, title: String },
    /// A claim ran out its deadline and was released
    AssignmentExpired { order: OrderId, title: String },
    /// A deposit request awaits confirmation
    DepositRequested {
        request: Uuid,
        account: AccountId,
        amount: Decimal,
    },
    /// The deposit was confirmed and credited
    DepositConfirmed { request: Uuid, amount: Decimal },
    /// The deposit was declined; nothing was credited
    DepositRejected { request: Uuid, amount: Decimal },
    /// A withdrawal request awaits the external transfer
    WithdrawalRequested {
        request: Uuid,
        account: AccountId,
        amount: Decimal,
        method: String,
    },
    /// The external transfer went out
    WithdrawalCompleted { request: Uuid, amount: Decimal },
    /// The withdrawal was declined and the debit refunded
    WithdrawalRejected { request: Uuid, amount: Decimal },
}

/// One deliverable notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub event: NotificationEvent,
}

impl Notification {
    pub fn to_account(account: AccountId, event: NotificationEvent) -> Self {
        Self {
            recipient: Recipient::Account(account),
            event,
        }
    }

    pub fn to_admins(event: NotificationEvent) -> Self {
        Self {
            recipient: Recipient::Admins,
            event,
        }
    }
}

/// Delivery seam implemented by the embedding front-end
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Hand one notification to the delivery layer. Must not block on
    /// external retries; the engine will not call twice for one event.
    async fn deliver(&self, notification: Notification);
}

/// Fan-out sink over a tokio broadcast channel.
///
/// Slow or absent subscribers only lose their own copies.
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Open a receiver for delivery consumers
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn deliver(&self, notification: Notification) {
        // No subscribers is fine; events are advisory
        let _ = self.tx.send(notification);
    }
}

/// Sink that drops everything, for embedders and tests that do not
/// consume events
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _notification: Notification) {}
}
