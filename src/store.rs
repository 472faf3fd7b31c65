//! Transactional state store
//!
//! In-memory stand-in for the relational store behind the engine. The
//! whole persisted state lives in one [`StoreState`] snapshot guarded by
//! a `tokio::sync::RwLock`; a write transaction clones the committed
//! snapshot, applies the operation to the draft, and swaps it in only on
//! success. An error discards the draft, so no operation ever commits
//! half its effects.
//!
//! The writer lock serializes competing transactions, which subsumes the
//! two serialization points the domain needs: capacity check-and-insert
//! on one order, and read-modify-write on one account's balances. A SQL
//! backend would scope the same guarantees to row locks (`SELECT ... FOR
//! UPDATE`) inside an ordinary transaction.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::MarketError;
use crate::models::{
    Account, AccountId, Assignment, AssignmentId, AssignmentStatus, DepositRequest, Order,
    OrderId, OrderStatus, WithdrawalRequest,
};
use crate::MarketResult;

/// Complete persisted state: one value, cloned per write transaction
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    accounts: HashMap<AccountId, Account>,
    orders: BTreeMap<OrderId, Order>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    deposits: HashMap<Uuid, DepositRequest>,
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
    next_order: u64,
    next_assignment: u64,
}

impl StoreState {
    // ── Accounts ────────────────────────────────────────────────────

    /// Fetch an account, creating it on first interaction
    pub fn ensure_account(&mut self, id: AccountId) -> &mut Account {
        self.accounts.entry(id).or_insert_with(|| Account::new(id))
    }

    pub fn account(&self, id: AccountId) -> MarketResult<&Account> {
        self.accounts
            .get(&id)
            .ok_or_else(|| MarketError::not_found("account", id))
    }

    pub fn account_mut(&mut self, id: AccountId) -> MarketResult<&mut Account> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("account", id))
    }

    // ── Orders ──────────────────────────────────────────────────────

    /// Insert a new order in `PendingModeration`, allocating its id
    pub fn insert_order(
        &mut self,
        owner: AccountId,
        title: String,
        price: rust_decimal::Decimal,
        capacity: u32,
        description: String,
        deadline_hours: u32,
    ) -> OrderId {
        self.next_order += 1;
        let id = OrderId(self.next_order);
        self.orders.insert(
            id,
            Order {
                id,
                owner,
                title,
                price,
                capacity,
                description,
                deadline_hours,
                status: OrderStatus::PendingModeration,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn order(&self, id: OrderId) -> MarketResult<&Order> {
        self.orders
            .get(&id)
            .ok_or_else(|| MarketError::not_found("order", id))
    }

    pub fn order_mut(&mut self, id: OrderId) -> MarketResult<&mut Order> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("order", id))
    }

    /// All orders in insertion order
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Orders a client has in states counting against the creation cap
    pub fn open_order_count(&self, owner: AccountId) -> u32 {
        self.orders
            .values()
            .filter(|o| o.owner == owner && o.status.counts_against_cap())
            .count() as u32
    }

    /// Delete an order together with all of its assignments
    pub fn purge_order(&mut self, id: OrderId) {
        self.orders.remove(&id);
        self.assignments.retain(|_, a| a.order != id);
    }

    // ── Assignments ─────────────────────────────────────────────────

    /// Insert a fresh `InProgress` assignment, allocating its id
    pub fn insert_assignment(&mut self, order: OrderId, worker: AccountId) -> AssignmentId {
        self.next_assignment += 1;
        let id = AssignmentId(self.next_assignment);
        self.assignments.insert(
            id,
            Assignment {
                id,
                order,
                worker,
                status: AssignmentStatus::InProgress,
                materials: None,
                started_at: Utc::now(),
            },
        );
        id
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.values()
    }

    pub fn assignments_mut(&mut self) -> impl Iterator<Item = &mut Assignment> {
        self.assignments.values_mut()
    }

    /// The worker's live claim on an order, if any. Canceled and
    /// rejected claims do not count: the worker may claim again.
    pub fn live_assignment(&self, order: OrderId, worker: AccountId) -> Option<&Assignment> {
        self.assignments.values().find(|a| {
            a.order == order
                && a.worker == worker
                && !matches!(
                    a.status,
                    AssignmentStatus::Canceled | AssignmentStatus::Rejected
                )
        })
    }

    pub fn live_assignment_mut(
        &mut self,
        order: OrderId,
        worker: AccountId,
    ) -> Option<&mut Assignment> {
        self.assignments.values_mut().find(|a| {
            a.order == order
                && a.worker == worker
                && !matches!(
                    a.status,
                    AssignmentStatus::Canceled | AssignmentStatus::Rejected
                )
        })
    }

    pub fn remove_assignment(&mut self, id: AssignmentId) {
        self.assignments.remove(&id);
    }

    /// Slots taken for listing purposes: everything but canceled claims
    pub fn accepted_count(&self, order: OrderId) -> u32 {
        self.assignments
            .values()
            .filter(|a| a.order == order && a.status != AssignmentStatus::Canceled)
            .count() as u32
    }

    /// Slots taken for claim admission: canceled and rejected claims
    /// both free their slot
    pub fn claim_count(&self, order: OrderId) -> u32 {
        self.assignments
            .values()
            .filter(|a| {
                a.order == order
                    && !matches!(
                        a.status,
                        AssignmentStatus::Canceled | AssignmentStatus::Rejected
                    )
            })
            .count() as u32
    }

    pub fn completed_count(&self, order: OrderId) -> u32 {
        self.assignments
            .values()
            .filter(|a| a.order == order && a.status == AssignmentStatus::Completed)
            .count() as u32
    }

    /// Live assignments the worker holds across all orders
    pub fn worker_live_count(&self, worker: AccountId) -> u32 {
        self.assignments
            .values()
            .filter(|a| a.worker == worker && a.status.is_live())
            .count() as u32
    }

    // ── Transfer requests ───────────────────────────────────────────

    pub fn insert_deposit(&mut self, request: DepositRequest) {
        self.deposits.insert(request.id, request);
    }

    pub fn deposit(&self, id: Uuid) -> MarketResult<&DepositRequest> {
        self.deposits
            .get(&id)
            .ok_or_else(|| MarketError::not_found("deposit request", id))
    }

    pub fn deposit_mut(&mut self, id: Uuid) -> MarketResult<&mut DepositRequest> {
        self.deposits
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("deposit request", id))
    }

    pub fn insert_withdrawal(&mut self, request: WithdrawalRequest) {
        self.withdrawals.insert(request.id, request);
    }

    pub fn withdrawal(&self, id: Uuid) -> MarketResult<&WithdrawalRequest> {
        self.withdrawals
            .get(&id)
            .ok_or_else(|| MarketError::not_found("withdrawal request", id))
    }

    pub fn withdrawal_mut(&mut self, id: Uuid) -> MarketResult<&mut WithdrawalRequest> {
        self.withdrawals
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("withdrawal request", id))
    }
}

/// Shared store handle
pub struct MarketStore {
    state: RwLock<StoreState>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Run a write transaction.
    ///
    /// The operation works on a draft clone of the committed state; the
    /// draft replaces the committed state only if the operation returns
    /// `Ok`. Concurrent transactions serialize on the writer lock, so a
    /// capacity check and the insert it guards observe one consistent
    /// snapshot.
    pub async fn transaction<T>(
        &self,
        op: impl FnOnce(&mut StoreState) -> MarketResult<T>,
    ) -> MarketResult<T> {
        let mut committed = self.state.write().await;
        let mut draft = committed.clone();
        let value = op(&mut draft)?;
        *committed = draft;
        Ok(value)
    }

    /// Run a point-in-time read. Not synchronized with later writes;
    /// anything that must pair a read with a commit belongs in
    /// [`MarketStore::transaction`].
    pub async fn read<T>(&self, op: impl FnOnce(&StoreState) -> T) -> T {
        let state = self.state.read().await;
        op(&state)
    }
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_failed_transaction_commits_nothing() {
        let store = MarketStore::new();

        let result: MarketResult<()> = store
            .transaction(|state| {
                state.ensure_account(AccountId(1)).escrow = dec!(500);
                Err(MarketError::validation("boom"))
            })
            .await;
        assert!(result.is_err());

        let exists = store.read(|state| state.account(AccountId(1)).is_ok()).await;
        assert!(!exists);
    }

    #[tokio::test]
    async fn test_order_ids_follow_insertion_order() {
        let store = MarketStore::new();
        let (first, second) = store
            .transaction(|state| {
                let a = state.insert_order(
                    AccountId(1),
                    "a".into(),
                    dec!(10),
                    1,
                    String::new(),
                    24,
                );
                let b = state.insert_order(
                    AccountId(1),
                    "b".into(),
                    dec!(10),
                    1,
                    String::new(),
                    24,
                );
                Ok((a, b))
            })
            .await
            .unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_ensure_account_is_idempotent() {
        let store = MarketStore::new();
        store
            .transaction(|state| {
                state.ensure_account(AccountId(5)).payable = dec!(42);
                Ok(())
            })
            .await
            .unwrap();
        store
            .transaction(|state| {
                state.ensure_account(AccountId(5));
                Ok(())
            })
            .await
            .unwrap();

        let payable = store
            .read(|state| state.account(AccountId(5)).unwrap().payable)
            .await;
        assert_eq!(payable, dec!(42));
    }

    #[tokio::test]
    async fn test_purge_removes_order_and_assignments() {
        let store = MarketStore::new();
        store
            .transaction(|state| {
                let order = state.insert_order(
                    AccountId(1),
                    "job".into(),
                    dec!(10),
                    2,
                    String::new(),
                    24,
                );
                state.insert_assignment(order, AccountId(2));
                state.insert_assignment(order, AccountId(3));
                state.purge_order(order);
                Ok(order)
            })
            .await
            .unwrap();

        let (orders, assignments) = store
            .read(|state| (state.orders().count(), state.assignments().count()))
            .await;
        assert_eq!(orders, 0);
        assert_eq!(assignments, 0);
    }
}
