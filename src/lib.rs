//! Escrow coordination engine for a paid-task marketplace
//!
//! Clients post paid orders backed by an escrow hold, workers claim
//! capacity slots first-come-first-served, submitted work is reviewed by
//! the client and, when disputed, settled by arbitration. This crate
//! implements the order/assignment state machines and the ledger moves
//! between them:
//! - [`Marketplace`] -- orders, claims, reviews, moderation, arbitration
//! - [`TransferDesk`] -- admin-confirmed deposits and withdrawals
//! - [`DeadlineSweeper`] -- background release of overdue claims
//!
//! The conversational front-end, notification delivery, and durable
//! storage are external collaborators: the front-end calls one method
//! per operation and renders the typed errors, delivery consumes
//! [`notify::Notification`] events, and [`store::MarketStore`] is the
//! storage boundary (the bundled engine is in-memory and transactional).

pub mod assignments;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod payments;
pub mod store;
pub mod sweeper;
pub mod workflow;

pub use assignments::{SubmitOutcome, WorkerAssignment};
pub use catalog::{ClientOrder, OpenOrder, OrderSort};
pub use config::MarketConfig;
pub use error::MarketError;
pub use models::{
    Account, AccountId, Assignment, AssignmentId, AssignmentStatus, DepositRequest, Order,
    OrderId, OrderStatus, PayerDetails, RequestStatus, TrustStatus, WithdrawalRequest,
};
pub use notify::{
    BroadcastSink, Notification, NotificationEvent, NotificationSink, NullSink, Recipient,
};
pub use payments::TransferDesk;
pub use store::MarketStore;
pub use sweeper::DeadlineSweeper;
pub use workflow::{CreateOrderRequest, Marketplace};

/// Result type alias for marketplace operations
pub type MarketResult<T> = Result<T, MarketError>;

/// Install a plain stdout subscriber; embedding services that bring
/// their own subscriber can skip this
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
}
