//! Error types for the marketplace engine
//!
//! Every operation fails atomically: an error means none of the
//! operation's state changes or ledger adjustments were committed.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{AccountId, OrderId};

/// Main error type for marketplace operations
#[derive(Error, Debug)]
pub enum MarketError {
    /// Malformed input (empty title, non-positive price, bad amount).
    /// Recovered locally by the front-end, which reprompts the caller.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A per-account cap was hit (open orders per client, live
    /// assignments per worker)
    #[error("Limit exceeded: at most {limit} {resource} allowed")]
    LimitExceeded { resource: &'static str, limit: u32 },

    /// The worker already holds a live claim on this order
    #[error("Order {order} already claimed by worker {worker}")]
    AlreadyClaimed { order: OrderId, worker: AccountId },

    /// Every capacity slot of the order is taken
    #[error("Order {order} has no free slots")]
    OrderFull { order: OrderId },

    /// Work for this claim was already submitted and awaits review
    #[error("Work for order {order} by worker {worker} is already under review")]
    AlreadySubmitted { order: OrderId, worker: AccountId },

    /// A debit would drive a balance negative
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    /// Banned accounts may not claim work
    #[error("Account {account} is banned")]
    AccountBanned { account: AccountId },

    /// State machine transition errors
    #[error("Invalid {entity} transition: {from} -> {to}")]
    StateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Missing order/assignment/account/request reference
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Storage I/O or transaction fault; nothing was committed and the
    /// operation is safe to retry
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarketError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: ToString>(entity: &'static str, id: S) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a state transition error
    pub fn state_transition<F, T>(entity: &'static str, from: F, to: T) -> Self
    where
        F: ToString,
        T: ToString,
    {
        Self::StateTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
