//! Order catalog
//!
//! Creation, moderation status changes, purging, and the public listing
//! of claimable orders. Cross-entity guards (escrow holds, payouts) live
//! in the workflow; the catalog only enforces its own invariants.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::models::{AccountId, OrderId, OrderStatus};
use crate::store::StoreState;
use crate::MarketResult;

/// Sort orders for the public listing; ties keep insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    Newest,
    Oldest,
    PriceHigh,
    PriceLow,
}

/// A claimable order as shown on the board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: OrderId,
    pub title: String,
    pub price: Decimal,
    pub deadline_hours: u32,
    /// Capacity slots still free
    pub slots_available: u32,
    pub created_at: DateTime<Utc>,
}

/// A client's own order with progress counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOrder {
    pub id: OrderId,
    pub title: String,
    pub price: Decimal,
    pub capacity: u32,
    pub status: OrderStatus,
    pub accepted_count: u32,
    pub completed_count: u32,
}

/// How many of a client's most recent orders the overview returns
const CLIENT_ORDER_LIMIT: usize = 10;

/// Create an order in `PendingModeration`.
///
/// Rejects with `LimitExceeded` once the owner holds `max_open` orders
/// in moderation or on the board. The escrow hold for the order is the
/// workflow's job and must run in the same transaction.
pub fn create_order(
    state: &mut StoreState,
    owner: AccountId,
    title: String,
    price: Decimal,
    capacity: u32,
    description: String,
    deadline_hours: u32,
    max_open: u32,
) -> MarketResult<OrderId> {
    if title.trim().is_empty() {
        return Err(MarketError::validation("Title cannot be empty"));
    }
    if price <= Decimal::ZERO {
        return Err(MarketError::validation("Price must be greater than 0"));
    }
    if capacity == 0 {
        return Err(MarketError::validation("Capacity must be greater than 0"));
    }
    if deadline_hours == 0 {
        return Err(MarketError::validation("Deadline must be greater than 0"));
    }

    if state.open_order_count(owner) >= max_open {
        return Err(MarketError::LimitExceeded {
            resource: "open orders",
            limit: max_open,
        });
    }

    Ok(state.insert_order(owner, title, price, capacity, description, deadline_hours))
}

/// Direct status transition, used by moderation and completion
pub fn set_status(state: &mut StoreState, id: OrderId, status: OrderStatus) -> MarketResult<()> {
    state.order_mut(id)?.status = status;
    Ok(())
}

/// Delete a fully paid-out order together with its assignment history.
///
/// Only valid once the order is `Completed` and no live assignment
/// remains; the record carries no information after the last payout.
pub fn purge(state: &mut StoreState, id: OrderId) -> MarketResult<()> {
    let order = state.order(id)?;
    if order.status != OrderStatus::Completed {
        return Err(MarketError::state_transition(
            "order",
            order.status,
            "purged",
        ));
    }
    let unresolved = state
        .assignments()
        .any(|a| a.order == id && a.status.is_live());
    if unresolved {
        return Err(MarketError::validation(
            "Order still has unresolved assignments",
        ));
    }
    state.purge_order(id);
    Ok(())
}

/// Active orders with free slots, sorted for display.
///
/// The stable sort keeps equal keys in insertion order, which is the
/// listing's tie-break contract.
pub fn list_open(state: &StoreState, sort: OrderSort) -> Vec<OpenOrder> {
    let mut open: Vec<OpenOrder> = state
        .orders()
        .filter(|o| o.status == OrderStatus::Active)
        .filter_map(|o| {
            let accepted = state.accepted_count(o.id);
            (accepted < o.capacity).then(|| OpenOrder {
                id: o.id,
                title: o.title.clone(),
                price: o.price,
                deadline_hours: o.deadline_hours,
                slots_available: o.capacity - accepted,
                created_at: o.created_at,
            })
        })
        .collect();

    match sort {
        OrderSort::Newest => open.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        OrderSort::Oldest => open.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        OrderSort::PriceHigh => open.sort_by(|a, b| b.price.cmp(&a.price)),
        OrderSort::PriceLow => open.sort_by(|a, b| a.price.cmp(&b.price)),
    }
    open
}

/// A client's most recent orders, newest first
pub fn client_orders(state: &StoreState, owner: AccountId) -> Vec<ClientOrder> {
    let mut own: Vec<&crate::models::Order> =
        state.orders().filter(|o| o.owner == owner).collect();
    own.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    own.truncate(CLIENT_ORDER_LIMIT);
    own.into_iter()
        .map(|o| ClientOrder {
            id: o.id,
            title: o.title.clone(),
            price: o.price,
            capacity: o.capacity,
            status: o.status,
            accepted_count: state.accepted_count(o.id),
            completed_count: state.completed_count(o.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentStatus;
    use rust_decimal_macros::dec;

    fn seeded_state() -> StoreState {
        let mut state = StoreState::default();
        state.ensure_account(AccountId(1));
        state
    }

    fn add_order(state: &mut StoreState, price: Decimal, capacity: u32) -> OrderId {
        let id = create_order(
            state,
            AccountId(1),
            format!("order at {price}"),
            price,
            capacity,
            String::new(),
            24,
            10,
        )
        .unwrap();
        set_status(state, id, OrderStatus::Active).unwrap();
        id
    }

    #[test]
    fn creation_cap_counts_pending_and_active() {
        let mut state = seeded_state();
        for _ in 0..10 {
            create_order(
                &mut state,
                AccountId(1),
                "job".into(),
                dec!(10),
                1,
                String::new(),
                24,
                10,
            )
            .unwrap();
        }
        let err = create_order(
            &mut state,
            AccountId(1),
            "one too many".into(),
            dec!(10),
            1,
            String::new(),
            24,
            10,
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::LimitExceeded { limit: 10, .. }));

        // Terminal orders stop counting
        let first = state.orders().next().unwrap().id;
        set_status(&mut state, first, OrderStatus::Rejected).unwrap();
        assert!(create_order(
            &mut state,
            AccountId(1),
            "fits again".into(),
            dec!(10),
            1,
            String::new(),
            24,
            10,
        )
        .is_ok());
    }

    #[test]
    fn rejects_bad_fields() {
        let mut state = seeded_state();
        let cases = [
            ("", dec!(10), 1, 24),
            ("x", dec!(0), 1, 24),
            ("x", dec!(10), 0, 24),
            ("x", dec!(10), 1, 0),
        ];
        for (title, price, capacity, deadline) in cases {
            let err = create_order(
                &mut state,
                AccountId(1),
                title.into(),
                price,
                capacity,
                String::new(),
                deadline,
                10,
            )
            .unwrap_err();
            assert!(matches!(err, MarketError::Validation(_)));
        }
    }

    #[test]
    fn listing_hides_full_and_unmoderated_orders() {
        let mut state = seeded_state();
        let open = add_order(&mut state, dec!(10), 2);
        let full = add_order(&mut state, dec!(20), 1);
        state.insert_assignment(full, AccountId(2));
        // Still pending moderation, must not appear
        create_order(
            &mut state,
            AccountId(1),
            "unmoderated".into(),
            dec!(30),
            1,
            String::new(),
            24,
            10,
        )
        .unwrap();

        let listed = list_open(&state, OrderSort::Newest);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, open);
        assert_eq!(listed[0].slots_available, 2);
    }

    #[test]
    fn canceled_claims_free_listing_slots() {
        let mut state = seeded_state();
        let order = add_order(&mut state, dec!(10), 1);
        let id = state.insert_assignment(order, AccountId(2));
        assert!(list_open(&state, OrderSort::Newest).is_empty());

        state
            .assignments_mut()
            .find(|a| a.id == id)
            .unwrap()
            .status = AssignmentStatus::Canceled;
        assert_eq!(list_open(&state, OrderSort::Newest).len(), 1);
    }

    #[test]
    fn price_sort_breaks_ties_by_insertion() {
        let mut state = seeded_state();
        let a = add_order(&mut state, dec!(10), 1);
        let b = add_order(&mut state, dec!(10), 1);
        let c = add_order(&mut state, dec!(50), 1);

        let high: Vec<OrderId> = list_open(&state, OrderSort::PriceHigh)
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(high, vec![c, a, b]);

        let low: Vec<OrderId> = list_open(&state, OrderSort::PriceLow)
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(low, vec![a, b, c]);
    }

    #[test]
    fn purge_requires_completed_order() {
        let mut state = seeded_state();
        let order = add_order(&mut state, dec!(10), 1);
        assert!(matches!(
            purge(&mut state, order),
            Err(MarketError::StateTransition { .. })
        ));

        set_status(&mut state, order, OrderStatus::Completed).unwrap();
        purge(&mut state, order).unwrap();
        assert!(state.order(order).is_err());
    }
}
