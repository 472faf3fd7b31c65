//! Assignment tracker
//!
//! The claim protocol and the per-claim state machine. `claim` is the
//! concurrency-critical path: its duplicate, cap, and capacity checks
//! and the insert they guard must run inside one store transaction so
//! racing claimants observe a consistent snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::models::{
    AccountId, AssignmentId, AssignmentStatus, OrderId, OrderStatus, TrustStatus,
};
use crate::store::StoreState;
use crate::MarketResult;

/// A worker's live claim as shown in their overview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub order: OrderId,
    pub title: String,
    pub price: Decimal,
    pub status: AssignmentStatus,
    pub started_at: DateTime<Utc>,
    /// Expiry instant while the clock runs; `None` in review states,
    /// where the clock is paused
    pub deadline_at: Option<DateTime<Utc>>,
}

/// An assignment canceled by the deadline scan
#[derive(Debug, Clone)]
pub struct ExpiredClaim {
    pub assignment: AssignmentId,
    pub order: OrderId,
    pub title: String,
    pub worker: AccountId,
}

/// What a submission attempt did to the assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Moved to `WaitingReview`; the order owner should be told
    Submitted,
    /// The deadline had already passed; the claim was canceled instead
    Expired,
}

/// Claim one capacity slot of an order.
///
/// Admission checks in order: banned worker, duplicate live claim,
/// worker's concurrent-claim cap, then the order's capacity recomputed
/// against the current snapshot. Canceled and rejected claims free
/// their slot and allow the same worker to claim again.
pub fn claim(
    state: &mut StoreState,
    order_id: OrderId,
    worker: AccountId,
    max_live: u32,
) -> MarketResult<AssignmentId> {
    let trust = state.ensure_account(worker).trust;
    if trust == TrustStatus::Banned {
        return Err(MarketError::AccountBanned { account: worker });
    }

    if state.live_assignment(order_id, worker).is_some() {
        return Err(MarketError::AlreadyClaimed {
            order: order_id,
            worker,
        });
    }

    if state.worker_live_count(worker) >= max_live {
        return Err(MarketError::LimitExceeded {
            resource: "concurrent assignments",
            limit: max_live,
        });
    }

    let order = state.order(order_id)?;
    if order.status != OrderStatus::Active {
        return Err(MarketError::OrderFull { order: order_id });
    }
    let capacity = order.capacity;
    if state.claim_count(order_id) >= capacity {
        return Err(MarketError::OrderFull { order: order_id });
    }

    Ok(state.insert_assignment(order_id, worker))
}

/// Submit materials for review.
///
/// Idempotently rejected while already waiting on a decision; an
/// overdue claim is canceled instead of accepted (the caller commits
/// that cancelation and surfaces the expiry).
pub fn submit(
    state: &mut StoreState,
    order_id: OrderId,
    worker: AccountId,
    materials: String,
) -> MarketResult<SubmitOutcome> {
    let deadline = state.order(order_id)?.deadline();
    let assignment = state
        .live_assignment_mut(order_id, worker)
        .ok_or_else(|| MarketError::not_found("assignment", order_id))?;

    match assignment.status {
        AssignmentStatus::WaitingReview | AssignmentStatus::UnderReview => {
            return Err(MarketError::AlreadySubmitted {
                order: order_id,
                worker,
            });
        }
        status if status.can_submit() => {}
        other => {
            return Err(MarketError::state_transition(
                "assignment",
                other,
                AssignmentStatus::WaitingReview,
            ));
        }
    }

    if assignment.remaining(deadline, Utc::now()).is_none() {
        assignment.status = AssignmentStatus::Canceled;
        return Ok(SubmitOutcome::Expired);
    }

    assignment.status = AssignmentStatus::WaitingReview;
    assignment.materials = Some(materials);
    Ok(SubmitOutcome::Submitted)
}

/// Walk away from a claim.
///
/// Idempotent once canceled. Only an `InProgress` claim may retreat:
/// review states pause the clock and must resolve through the client or
/// arbitration.
pub fn cancel(state: &mut StoreState, order_id: OrderId, worker: AccountId) -> MarketResult<()> {
    let assignment = state
        .assignments_mut()
        .filter(|a| a.order == order_id && a.worker == worker)
        .max_by_key(|a| a.id)
        .ok_or_else(|| MarketError::not_found("assignment", order_id))?;

    match assignment.status {
        AssignmentStatus::Canceled => Ok(()),
        status if status.can_cancel() => {
            assignment.status = AssignmentStatus::Canceled;
            Ok(())
        }
        other => Err(MarketError::state_transition(
            "assignment",
            other,
            AssignmentStatus::Canceled,
        )),
    }
}

/// Cancel every `InProgress` assignment past its deadline.
///
/// Called by the periodic sweeper and opportunistically from read
/// paths; either way the scan runs inside a store transaction.
pub fn expire_overdue(state: &mut StoreState) -> Vec<ExpiredClaim> {
    let now = Utc::now();
    let overdue: Vec<(AssignmentId, OrderId, AccountId)> = state
        .assignments()
        .filter(|a| a.status == AssignmentStatus::InProgress)
        .filter_map(|a| {
            let order = state.order(a.order).ok()?;
            a.remaining(order.deadline(), now)
                .is_none()
                .then_some((a.id, a.order, a.worker))
        })
        .collect();

    let mut expired = Vec::with_capacity(overdue.len());
    for (assignment, order_id, worker) in overdue {
        let title = state
            .order(order_id)
            .map(|o| o.title.clone())
            .unwrap_or_default();
        if let Some(a) = state.assignments_mut().find(|a| a.id == assignment) {
            a.status = AssignmentStatus::Canceled;
        }
        expired.push(ExpiredClaim {
            assignment,
            order: order_id,
            title,
            worker,
        });
    }
    expired
}

/// A worker's live claims joined with their orders, newest first
pub fn worker_assignments(state: &StoreState, worker: AccountId) -> Vec<WorkerAssignment> {
    let mut live: Vec<WorkerAssignment> = state
        .assignments()
        .filter(|a| a.worker == worker && a.status.is_live())
        .filter_map(|a| {
            let order = state.order(a.order).ok()?;
            let deadline_at = (a.status == AssignmentStatus::InProgress)
                .then(|| a.deadline_at(order.deadline()));
            Some(WorkerAssignment {
                order: a.order,
                title: order.title.clone(),
                price: order.price,
                status: a.status,
                started_at: a.started_at,
                deadline_at,
            })
        })
        .collect();
    live.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn active_order(state: &mut StoreState, capacity: u32) -> OrderId {
        state.ensure_account(AccountId(1));
        let id = catalog::create_order(
            state,
            AccountId(1),
            "job".into(),
            dec!(100),
            capacity,
            String::new(),
            24,
            10,
        )
        .unwrap();
        catalog::set_status(state, id, OrderStatus::Active).unwrap();
        id
    }

    fn backdate(state: &mut StoreState, id: AssignmentId, hours: i64) {
        let assignment = state.assignments_mut().find(|a| a.id == id).unwrap();
        assignment.started_at = Utc::now() - Duration::hours(hours);
    }

    #[test]
    fn banned_worker_cannot_claim() {
        let mut state = StoreState::default();
        let order = active_order(&mut state, 1);
        state.ensure_account(AccountId(2)).trust = TrustStatus::Banned;
        assert!(matches!(
            claim(&mut state, order, AccountId(2), 5),
            Err(MarketError::AccountBanned { .. })
        ));
    }

    #[test]
    fn duplicate_live_claim_is_rejected() {
        let mut state = StoreState::default();
        let order = active_order(&mut state, 3);
        claim(&mut state, order, AccountId(2), 5).unwrap();
        assert!(matches!(
            claim(&mut state, order, AccountId(2), 5),
            Err(MarketError::AlreadyClaimed { .. })
        ));
    }

    #[test]
    fn reclaim_allowed_after_cancel() {
        let mut state = StoreState::default();
        let order = active_order(&mut state, 1);
        claim(&mut state, order, AccountId(2), 5).unwrap();
        cancel(&mut state, order, AccountId(2)).unwrap();
        claim(&mut state, order, AccountId(2), 5).unwrap();
    }

    #[test]
    fn worker_cap_spans_orders() {
        let mut state = StoreState::default();
        let orders: Vec<OrderId> = (0..6).map(|_| active_order(&mut state, 1)).collect();
        for order in &orders[..5] {
            claim(&mut state, *order, AccountId(2), 5).unwrap();
        }
        assert!(matches!(
            claim(&mut state, orders[5], AccountId(2), 5),
            Err(MarketError::LimitExceeded { limit: 5, .. })
        ));
    }

    #[test]
    fn capacity_fills_up() {
        let mut state = StoreState::default();
        let order = active_order(&mut state, 2);
        claim(&mut state, order, AccountId(2), 5).unwrap();
        claim(&mut state, order, AccountId(3), 5).unwrap();
        assert!(matches!(
            claim(&mut state, order, AccountId(4), 5),
            Err(MarketError::OrderFull { .. })
        ));
    }

    #[test]
    fn unmoderated_order_is_not_claimable() {
        let mut state = StoreState::default();
        state.ensure_account(AccountId(1));
        let order = catalog::create_order(
            &mut state,
            AccountId(1),
            "job".into(),
            dec!(100),
            1,
            String::new(),
            24,
            10,
        )
        .unwrap();
        assert!(matches!(
            claim(&mut state, order, AccountId(2), 5),
            Err(MarketError::OrderFull { .. })
        ));
    }

    #[test]
    fn submit_is_idempotently_rejected() {
        let mut state = StoreState::default();
        let order = active_order(&mut state, 1);
        claim(&mut state, order, AccountId(2), 5).unwrap();

        let outcome = submit(&mut state, order, AccountId(2), "link".into()).unwrap();
        assert_eq!(outcome, SubmitOutcome::Submitted);
        assert!(matches!(
            submit(&mut state, order, AccountId(2), "link".into()),
            Err(MarketError::AlreadySubmitted { .. })
        ));

        // Same guard once escalated to arbitration
        state
            .live_assignment_mut(order, AccountId(2))
            .unwrap()
            .status = AssignmentStatus::UnderReview;
        assert!(matches!(
            submit(&mut state, order, AccountId(2), "link".into()),
            Err(MarketError::AlreadySubmitted { .. })
        ));
    }

    #[test]
    fn submit_past_deadline_cancels_instead() {
        let mut state = StoreState::default();
        let order = active_order(&mut state, 1);
        let id = claim(&mut state, order, AccountId(2), 5).unwrap();
        backdate(&mut state, id, 30);

        let outcome = submit(&mut state, order, AccountId(2), "link".into()).unwrap();
        assert_eq!(outcome, SubmitOutcome::Expired);
        assert!(state.live_assignment(order, AccountId(2)).is_none());
    }

    #[test]
    fn cancel_is_idempotent_but_guarded_in_review() {
        let mut state = StoreState::default();
        let order = active_order(&mut state, 1);
        claim(&mut state, order, AccountId(2), 5).unwrap();
        cancel(&mut state, order, AccountId(2)).unwrap();
        cancel(&mut state, order, AccountId(2)).unwrap();

        claim(&mut state, order, AccountId(2), 5).unwrap();
        submit(&mut state, order, AccountId(2), "link".into()).unwrap();
        assert!(matches!(
            cancel(&mut state, order, AccountId(2)),
            Err(MarketError::StateTransition { .. })
        ));
    }

    #[test]
    fn expiry_scan_cancels_only_overdue_claims() {
        let mut state = StoreState::default();
        let order = active_order(&mut state, 3);
        let stale = claim(&mut state, order, AccountId(2), 5).unwrap();
        let fresh = claim(&mut state, order, AccountId(3), 5).unwrap();
        let reviewing = claim(&mut state, order, AccountId(4), 5).unwrap();
        submit(&mut state, order, AccountId(4), "link".into()).unwrap();
        backdate(&mut state, stale, 25);
        backdate(&mut state, reviewing, 48);

        let expired = expire_overdue(&mut state);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].assignment, stale);
        assert_eq!(expired[0].worker, AccountId(2));

        // The fresh claim keeps running; the review clock is paused
        let statuses: Vec<AssignmentStatus> = state
            .assignments()
            .map(|a| a.status)
            .collect();
        assert!(statuses.contains(&AssignmentStatus::Canceled));
        assert_eq!(
            state
                .assignments()
                .find(|a| a.id == fresh)
                .unwrap()
                .status,
            AssignmentStatus::InProgress
        );
        assert_eq!(
            state
                .assignments()
                .find(|a| a.id == reviewing)
                .unwrap()
                .status,
            AssignmentStatus::WaitingReview
        );
    }

    #[test]
    fn worker_overview_pauses_clock_in_review() {
        let mut state = StoreState::default();
        let running = active_order(&mut state, 1);
        let submitted = active_order(&mut state, 1);
        claim(&mut state, running, AccountId(2), 5).unwrap();
        claim(&mut state, submitted, AccountId(2), 5).unwrap();
        submit(&mut state, submitted, AccountId(2), "link".into()).unwrap();

        let overview = worker_assignments(&state, AccountId(2));
        assert_eq!(overview.len(), 2);
        let by_order = |id: OrderId| overview.iter().find(|w| w.order == id).unwrap();
        assert!(by_order(running).deadline_at.is_some());
        assert!(by_order(submitted).deadline_at.is_none());
    }
}
