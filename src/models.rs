//! Core data models for the marketplace
//!
//! This module contains the persisted entities, their status state
//! machines, and the id newtypes shared across components.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account identity key, supplied by the front-end on first interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

/// Store-assigned order key; ordering follows insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

/// Store-assigned assignment key; ordering follows insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentId(pub u64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account standing, degraded one step per lost arbitration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustStatus {
    /// Account in good standing
    Verified,
    /// One arbitration lost; the next loss bans the account
    Suspicious,
    /// Banned accounts may not claim work
    Banned,
}

impl TrustStatus {
    /// One penalty step down; banned is absorbing
    pub fn demoted(self) -> Self {
        match self {
            Self::Verified => Self::Suspicious,
            Self::Suspicious | Self::Banned => Self::Banned,
        }
    }
}

impl std::fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Verified => "verified",
            Self::Suspicious => "suspicious",
            Self::Banned => "banned",
        };
        f.write_str(s)
    }
}

/// Account with its two balances
///
/// `payable` holds funds earned by the account as a worker, awaiting
/// withdrawal. `escrow` holds funds reserved by the account as a client
/// to pay for posted orders. Both are mutated only through ledger deltas
/// and can never go negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub payable: Decimal,
    pub escrow: Decimal,
    pub trust: TrustStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account with zero balances
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            payable: Decimal::ZERO,
            escrow: Decimal::ZERO,
            trust: TrustStatus::Verified,
            created_at: Utc::now(),
        }
    }
}

/// Order state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created and paid for, awaiting moderation
    PendingModeration,
    /// Published on the board, claimable while slots remain
    Active,
    /// Every slot completed; the record is purged shortly after
    Completed,
    /// Declined by moderation, escrow hold refunded
    Rejected,
}

impl OrderStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Orders in these states count against the client's creation cap
    pub fn counts_against_cap(&self) -> bool {
        matches!(self, Self::PendingModeration | Self::Active)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingModeration => "pending_moderation",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A posted work item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: AccountId,
    pub title: String,
    /// Price paid to the worker per completed slot
    pub price: Decimal,
    /// Number of workers that may complete the order
    pub capacity: u32,
    pub description: String,
    /// Time each worker has to finish, counted from claim time
    pub deadline_hours: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Escrow amount held from the client at creation: price x capacity
    /// x the commission multiplier. The same amount is refunded if
    /// moderation rejects the order.
    pub fn escrow_hold(&self, commission: Decimal) -> Decimal {
        self.price * Decimal::from(self.capacity) * commission
    }

    /// Duration a worker has to finish one slot
    pub fn deadline(&self) -> Duration {
        Duration::hours(i64::from(self.deadline_hours))
    }
}

/// Assignment state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Worker is on the clock
    InProgress,
    /// Materials submitted, awaiting the client's decision
    WaitingReview,
    /// Client rejected the work; awaiting arbitration
    UnderReview,
    /// Work accepted and paid out
    Completed,
    /// Work rejected in arbitration with a worker penalty
    Rejected,
    /// Abandoned by the worker or expired past its deadline
    Canceled,
}

impl AssignmentStatus {
    /// Live assignments occupy a capacity slot and count against the
    /// worker's concurrent-claim cap
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Self::InProgress | Self::WaitingReview | Self::UnderReview
        )
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Canceled)
    }

    /// Check if this state allows submitting materials
    pub fn can_submit(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Check if this state allows the worker to walk away
    pub fn can_cancel(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InProgress => "in_progress",
            Self::WaitingReview => "waiting_review",
            Self::UnderReview => "under_review",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A worker's claim on one capacity slot of an order
///
/// Unique per (order, worker) while live; a worker may reclaim an order
/// after an earlier claim was canceled or rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub order: OrderId,
    pub worker: AccountId,
    pub status: AssignmentStatus,
    /// Link to the submitted work, recorded on submission
    pub materials: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Assignment {
    /// Instant the claim expires if still in progress
    pub fn deadline_at(&self, deadline: Duration) -> DateTime<Utc> {
        self.started_at + deadline
    }

    /// Time left on the clock, `None` once overdue. Review states pause
    /// the clock, so this is only meaningful for `InProgress`.
    pub fn remaining(&self, deadline: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let left = self.deadline_at(deadline) - now;
        (left > Duration::zero()).then_some(left)
    }
}

/// Transfer request status, shared by deposits and withdrawals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting the administrator's decision
    Pending,
    /// Confirmed; the ledger effect (if any) is committed
    Completed,
    /// Declined by the administrator
    Rejected,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Payer details accompanying a deposit request, used by the
/// administrator to match the incoming external transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayerDetails {
    pub full_name: String,
    pub phone: String,
    pub bank: String,
}

/// Request to move external funds into a client's escrow balance
///
/// The escrow balance is credited only when the administrator confirms
/// receipt of the external transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub id: Uuid,
    pub account: AccountId,
    pub amount: Decimal,
    pub payer: PayerDetails,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Request to pay out a worker's payable balance
///
/// The payable balance is debited immediately when the request is
/// created; admin confirmation only records that the external transfer
/// went out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub account: AccountId,
    pub amount: Decimal,
    /// Payout rail chosen by the account (bank name etc.)
    pub method: String,
    /// Card or phone number to send the funds to
    pub details: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}
