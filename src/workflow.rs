//! Escrow workflow
//!
//! `Marketplace` orchestrates the catalog, the assignment tracker, and
//! the ledger. Every public operation runs as one store transaction, so
//! a status change and the ledger adjustment paying for it commit
//! together or not at all; notifications go out only after the commit.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::assignments::{self, SubmitOutcome, WorkerAssignment};
use crate::catalog::{self, ClientOrder, OpenOrder, OrderSort};
use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::ledger;
use crate::models::{
    Account, AccountId, AssignmentId, AssignmentStatus, Order, OrderId, OrderStatus,
};
use crate::notify::{Notification, NotificationEvent, NotificationSink};
use crate::store::{MarketStore, StoreState};
use crate::MarketResult;

/// Order creation request, assembled by the front-end wizard
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub owner: AccountId,
    pub title: String,
    pub price: Decimal,
    pub capacity: u32,
    pub description: String,
    pub deadline_hours: u32,
}

/// Main marketplace orchestrator
pub struct Marketplace {
    config: MarketConfig,
    store: Arc<MarketStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl Marketplace {
    pub fn new(
        config: MarketConfig,
        store: Arc<MarketStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
        }
    }

    async fn notify_all(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.notifier.deliver(notification).await;
        }
    }

    // ── Accounts ────────────────────────────────────────────────────

    /// Fetch an account profile, creating the account on first contact
    pub async fn profile(&self, account: AccountId) -> MarketResult<Account> {
        self.store
            .transaction(|state| Ok(state.ensure_account(account).clone()))
            .await
    }

    // ── Order lifecycle ─────────────────────────────────────────────

    /// Create an order and debit the escrow hold in one transaction.
    ///
    /// The hold is price x capacity x commission; if the client cannot
    /// cover it the order is not created.
    pub async fn create_order(&self, request: CreateOrderRequest) -> MarketResult<OrderId> {
        let commission = self.config.commission_multiplier;
        let max_open = self.config.max_open_orders;

        let (order_id, title, hold) = self
            .store
            .transaction(move |state| {
                state.ensure_account(request.owner);
                let order_id = catalog::create_order(
                    state,
                    request.owner,
                    request.title,
                    request.price,
                    request.capacity,
                    request.description,
                    request.deadline_hours,
                    max_open,
                )?;
                let order = state.order(order_id)?;
                let hold = order.escrow_hold(commission);
                let title = order.title.clone();
                ledger::adjust_escrow(state, request.owner, -hold)?;
                Ok((order_id, title, hold))
            })
            .await?;

        info!("Created order {} with escrow hold {}", order_id, hold);
        self.notify_all(vec![Notification::to_admins(
            NotificationEvent::ModerationRequested {
                order: order_id,
                title,
            },
        )])
        .await;
        Ok(order_id)
    }

    /// Publish a moderated order on the board
    pub async fn moderate_approve(&self, order_id: OrderId) -> MarketResult<()> {
        let (owner, title) = self
            .store
            .transaction(|state| {
                let order = state.order(order_id)?;
                if order.status != OrderStatus::PendingModeration {
                    return Err(MarketError::state_transition(
                        "order",
                        order.status,
                        OrderStatus::Active,
                    ));
                }
                let (owner, title) = (order.owner, order.title.clone());
                catalog::set_status(state, order_id, OrderStatus::Active)?;
                Ok((owner, title))
            })
            .await?;

        info!("Order {} approved by moderation", order_id);
        self.notify_all(vec![Notification::to_account(
            owner,
            NotificationEvent::OrderApproved {
                order: order_id,
                title,
            },
        )])
        .await;
        Ok(())
    }

    /// Decline a moderated order and refund the full escrow hold
    pub async fn moderate_reject(&self, order_id: OrderId, reason: String) -> MarketResult<()> {
        let commission = self.config.commission_multiplier;
        let (owner, title, refund) = self
            .store
            .transaction(move |state| {
                let order = state.order(order_id)?;
                if order.status != OrderStatus::PendingModeration {
                    return Err(MarketError::state_transition(
                        "order",
                        order.status,
                        OrderStatus::Rejected,
                    ));
                }
                let (owner, title) = (order.owner, order.title.clone());
                let refund = order.escrow_hold(commission);
                catalog::set_status(state, order_id, OrderStatus::Rejected)?;
                ledger::adjust_escrow(state, owner, refund)?;
                Ok((owner, title, refund))
            })
            .await?;

        info!("Order {} rejected by moderation, refunded {}", order_id, refund);
        self.notify_all(vec![Notification::to_account(
            owner,
            NotificationEvent::OrderRejected {
                order: order_id,
                title,
                reason,
                refund,
            },
        )])
        .await;
        Ok(())
    }

    /// Claimable orders for the public board
    pub async fn list_open_orders(&self, sort: OrderSort) -> Vec<OpenOrder> {
        self.store.read(|state| catalog::list_open(state, sort)).await
    }

    /// Full order record, for the details view
    pub async fn order_details(&self, order_id: OrderId) -> MarketResult<Order> {
        self.store
            .read(|state| state.order(order_id).cloned())
            .await
    }

    /// A client's own orders with progress counts
    pub async fn client_orders(&self, owner: AccountId) -> Vec<ClientOrder> {
        self.store
            .read(|state| catalog::client_orders(state, owner))
            .await
    }

    // ── Claims ──────────────────────────────────────────────────────

    /// Claim one slot of an active order
    pub async fn claim_order(
        &self,
        order_id: OrderId,
        worker: AccountId,
    ) -> MarketResult<AssignmentId> {
        let max_live = self.config.max_live_assignments;
        let assignment = self
            .store
            .transaction(move |state| assignments::claim(state, order_id, worker, max_live))
            .await?;
        info!("Worker {} claimed order {}", worker, order_id);
        Ok(assignment)
    }

    /// A worker's live claims. Runs the deadline scan first so overdue
    /// claims show up canceled rather than impossibly "in progress".
    pub async fn worker_assignments(
        &self,
        worker: AccountId,
    ) -> MarketResult<Vec<WorkerAssignment>> {
        let (views, expired) = self
            .store
            .transaction(move |state| {
                let expired = assignments::expire_overdue(state);
                Ok((assignments::worker_assignments(state, worker), expired))
            })
            .await?;

        let notifications = expired
            .into_iter()
            .map(|claim| {
                Notification::to_account(
                    claim.worker,
                    NotificationEvent::AssignmentExpired {
                        order: claim.order,
                        title: claim.title,
                    },
                )
            })
            .collect();
        self.notify_all(notifications).await;
        Ok(views)
    }

    /// Walk away from a claim, freeing its slot
    pub async fn cancel_assignment(
        &self,
        order_id: OrderId,
        worker: AccountId,
    ) -> MarketResult<()> {
        self.store
            .transaction(move |state| assignments::cancel(state, order_id, worker))
            .await?;
        info!("Worker {} canceled claim on order {}", worker, order_id);
        Ok(())
    }

    /// Submit materials for client review.
    ///
    /// Returns [`SubmitOutcome::Expired`] when the deadline had already
    /// passed; in that case the claim is canceled and the slot freed.
    pub async fn submit_work(
        &self,
        order_id: OrderId,
        worker: AccountId,
        materials: String,
    ) -> MarketResult<SubmitOutcome> {
        let submitted = materials.clone();
        let (outcome, owner, title) = self
            .store
            .transaction(move |state| {
                let outcome = assignments::submit(state, order_id, worker, materials)?;
                let order = state.order(order_id)?;
                Ok((outcome, order.owner, order.title.clone()))
            })
            .await?;

        match outcome {
            SubmitOutcome::Submitted => {
                info!("Worker {} submitted order {} for review", worker, order_id);
                self.notify_all(vec![Notification::to_account(
                    owner,
                    NotificationEvent::WorkSubmitted {
                        order: order_id,
                        title,
                        worker,
                        materials: submitted,
                    },
                )])
                .await;
            }
            SubmitOutcome::Expired => {
                info!("Claim on order {} by worker {} expired at submit", order_id, worker);
                self.notify_all(vec![Notification::to_account(
                    worker,
                    NotificationEvent::AssignmentExpired {
                        order: order_id,
                        title,
                    },
                )])
                .await;
            }
        }
        Ok(outcome)
    }

    // ── Review decisions ────────────────────────────────────────────

    /// Client accepts the submitted work: the worker is paid and, once
    /// every slot is completed, the order is closed and purged
    pub async fn approve_work(
        &self,
        order_id: OrderId,
        worker: AccountId,
        client: AccountId,
    ) -> MarketResult<()> {
        let outcome = self
            .store
            .transaction(move |state| {
                let order = state.order(order_id)?;
                if order.owner != client {
                    return Err(MarketError::validation(
                        "Only the order owner can review submitted work",
                    ));
                }
                complete_assignment(state, order_id, worker, AssignmentStatus::WaitingReview)
            })
            .await?;

        info!(
            "Client approved order {} slot by worker {} (order done: {})",
            order_id, worker, outcome.order_completed
        );
        self.notify_completion(order_id, worker, outcome).await;
        Ok(())
    }

    /// Client disputes the submitted work; arbitration decides.
    ///
    /// No funds move. The single escalation path replaces the two
    /// overlapping rejection flows of the conversational front-end.
    pub async fn reject_work(
        &self,
        order_id: OrderId,
        worker: AccountId,
        client: AccountId,
        reason: Option<String>,
    ) -> MarketResult<()> {
        let title = self
            .store
            .transaction(move |state| {
                let order = state.order(order_id)?;
                if order.owner != client {
                    return Err(MarketError::validation(
                        "Only the order owner can review submitted work",
                    ));
                }
                let title = order.title.clone();
                let assignment = state
                    .live_assignment_mut(order_id, worker)
                    .ok_or_else(|| MarketError::not_found("assignment", order_id))?;
                if assignment.status != AssignmentStatus::WaitingReview {
                    return Err(MarketError::state_transition(
                        "assignment",
                        assignment.status,
                        AssignmentStatus::UnderReview,
                    ));
                }
                assignment.status = AssignmentStatus::UnderReview;
                Ok(title)
            })
            .await?;

        info!("Client disputed order {} slot by worker {}", order_id, worker);
        self.notify_all(vec![Notification::to_admins(NotificationEvent::WorkDisputed {
            order: order_id,
            title,
            worker,
            reason,
        })])
        .await;
        Ok(())
    }

    /// Arbitration sides with the worker: same effects as a client
    /// approval, reachable from the disputed state
    pub async fn arbitrate_approve(
        &self,
        order_id: OrderId,
        worker: AccountId,
    ) -> MarketResult<()> {
        let outcome = self
            .store
            .transaction(move |state| {
                complete_assignment(state, order_id, worker, AssignmentStatus::UnderReview)
            })
            .await?;

        info!(
            "Arbitration approved order {} slot by worker {} (order done: {})",
            order_id, worker, outcome.order_completed
        );
        self.notify_completion(order_id, worker, outcome).await;
        Ok(())
    }

    /// Arbitration sides with the client: the claim record is deleted
    /// (the slot is freed even at capacity), the order goes back on the
    /// board, and the worker's standing drops one step
    pub async fn arbitrate_reject(
        &self,
        order_id: OrderId,
        worker: AccountId,
    ) -> MarketResult<()> {
        let (owner, title, trust) = self
            .store
            .transaction(move |state| {
                let order = state.order(order_id)?;
                let (owner, title) = (order.owner, order.title.clone());

                let assignment = state
                    .live_assignment(order_id, worker)
                    .ok_or_else(|| MarketError::not_found("assignment", order_id))?;
                if assignment.status != AssignmentStatus::UnderReview {
                    return Err(MarketError::state_transition(
                        "assignment",
                        assignment.status,
                        AssignmentStatus::Rejected,
                    ));
                }
                let assignment_id = assignment.id;

                state.remove_assignment(assignment_id);
                catalog::set_status(state, order_id, OrderStatus::Active)?;

                let account = state.account_mut(worker)?;
                account.trust = account.trust.demoted();
                let trust = account.trust;
                Ok((owner, title, trust))
            })
            .await?;

        info!(
            "Arbitration rejected order {} slot by worker {}, standing now {}",
            order_id, worker, trust
        );
        self.notify_all(vec![
            Notification::to_account(
                worker,
                NotificationEvent::WorkRejected {
                    order: order_id,
                    title: title.clone(),
                    worker,
                    trust,
                },
            ),
            Notification::to_account(
                owner,
                NotificationEvent::OrderReopened {
                    order: order_id,
                    title,
                },
            ),
        ])
        .await;
        Ok(())
    }

    async fn notify_completion(
        &self,
        order_id: OrderId,
        worker: AccountId,
        outcome: CompletionOutcome,
    ) {
        self.notify_all(vec![
            Notification::to_account(
                worker,
                NotificationEvent::WorkApproved {
                    order: order_id,
                    title: outcome.title.clone(),
                    amount: outcome.price,
                },
            ),
            Notification::to_account(
                outcome.owner,
                NotificationEvent::WorkApproved {
                    order: order_id,
                    title: outcome.title,
                    amount: outcome.price,
                },
            ),
        ])
        .await;
    }
}

/// What an approval did, for logging and notifications
struct CompletionOutcome {
    owner: AccountId,
    title: String,
    price: Decimal,
    order_completed: bool,
}

/// Shared tail of the client-approval and arbitration-approval paths:
/// mark the slot completed, pay the worker, and close out the order
/// once every slot is done, against the same snapshot.
fn complete_assignment(
    state: &mut StoreState,
    order_id: OrderId,
    worker: AccountId,
    expected: AssignmentStatus,
) -> MarketResult<CompletionOutcome> {
    let order = state.order(order_id)?;
    let (owner, title, price, capacity) = (
        order.owner,
        order.title.clone(),
        order.price,
        order.capacity,
    );

    let assignment = state
        .live_assignment_mut(order_id, worker)
        .ok_or_else(|| MarketError::not_found("assignment", order_id))?;
    if assignment.status != expected {
        return Err(MarketError::state_transition(
            "assignment",
            assignment.status,
            AssignmentStatus::Completed,
        ));
    }
    assignment.status = AssignmentStatus::Completed;

    ledger::adjust_payable(state, worker, price)?;

    let order_completed = state.completed_count(order_id) >= capacity;
    if order_completed {
        catalog::set_status(state, order_id, OrderStatus::Completed)?;
        catalog::purge(state, order_id)?;
    }

    Ok(CompletionOutcome {
        owner,
        title,
        price,
        order_completed,
    })
}
