//! Deposit / withdrawal request queue
//!
//! Transfers between external funds and the ledger are asynchronous and
//! confirmed by an administrator. The two directions are deliberately
//! asymmetric: a deposit credits escrow only when the administrator
//! confirms the external transfer arrived, while a withdrawal debits the
//! payable balance the moment the request is created; confirmation only
//! records that the payout went out.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::ledger;
use crate::models::{AccountId, DepositRequest, PayerDetails, RequestStatus, WithdrawalRequest};
use crate::notify::{Notification, NotificationEvent, NotificationSink};
use crate::store::MarketStore;
use crate::MarketResult;

/// Admin-confirmed transfer queue between external funds and the ledger
pub struct TransferDesk {
    config: MarketConfig,
    store: Arc<MarketStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl TransferDesk {
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

    fn check_amount(&self, amount: Decimal) -> MarketResult<()> {
        if amount < self.config.min_transfer_amount {
            return Err(MarketError::validation(format!(
                "Minimum transfer amount is {}",
                self.config.min_transfer_amount
            )));
        }
        Ok(())
    }

    // ── Deposits ────────────────────────────────────────────────────

    /// File a deposit request. No balance changes until confirmation.
    pub async fn request_deposit(
        &self,
        account: AccountId,
        amount: Decimal,
        payer: PayerDetails,
    ) -> MarketResult<Uuid> {
        self.check_amount(amount)?;

        let id = Uuid::new_v4();
        self.store
            .transaction(move |state| {
                state.ensure_account(account);
                state.insert_deposit(DepositRequest {
                    id,
                    account,
                    amount,
                    payer,
                    status: RequestStatus::Pending,
                    created_at: Utc::now(),
                });
                Ok(())
            })
            .await?;

        info!("Deposit request {} filed by account {} for {}", id, account, amount);
        self.notifier
            .deliver(Notification::to_admins(NotificationEvent::DepositRequested {
                request: id,
                account,
                amount,
            }))
            .await;
        Ok(id)
    }

    /// Administrator resolves a pending deposit. Approval credits the
    /// escrow balance and marks the request completed in one
    /// transaction; each request resolves exactly once.
    pub async fn resolve_deposit(&self, id: Uuid, approve: bool) -> MarketResult<()> {
        let (account, amount) = self
            .store
            .transaction(move |state| {
                let request = state.deposit(id)?;
                if request.status != RequestStatus::Pending {
                    return Err(MarketError::state_transition(
                        "deposit request",
                        request.status,
                        if approve {
                            RequestStatus::Completed
                        } else {
                            RequestStatus::Rejected
                        },
                    ));
                }
                let (account, amount) = (request.account, request.amount);

                if approve {
                    ledger::adjust_escrow(state, account, amount)?;
                }
                state.deposit_mut(id)?.status = if approve {
                    RequestStatus::Completed
                } else {
                    RequestStatus::Rejected
                };
                Ok((account, amount))
            })
            .await?;

        info!("Deposit request {} resolved (approved: {})", id, approve);
        let event = if approve {
            NotificationEvent::DepositConfirmed {
                request: id,
                amount,
            }
        } else {
            NotificationEvent::DepositRejected {
                request: id,
                amount,
            }
        };
        self.notifier
            .deliver(Notification::to_account(account, event))
            .await;
        Ok(())
    }

    /// Point-in-time view of a deposit request
    pub async fn deposit(&self, id: Uuid) -> MarketResult<DepositRequest> {
        self.store.read(|state| state.deposit(id).cloned()).await
    }

    // ── Withdrawals ─────────────────────────────────────────────────

    /// File a withdrawal request. The payable balance is debited
    /// immediately, in the same transaction that records the request:
    /// funds leave the balance on submission, not on confirmation.
    pub async fn request_withdrawal(
        &self,
        account: AccountId,
        amount: Decimal,
        method: String,
        details: String,
    ) -> MarketResult<Uuid> {
        self.check_amount(amount)?;

        let id = Uuid::new_v4();
        let method_for_event = method.clone();
        self.store
            .transaction(move |state| {
                state.ensure_account(account);
                ledger::adjust_payable(state, account, -amount)?;
                state.insert_withdrawal(WithdrawalRequest {
                    id,
                    account,
                    amount,
                    method,
                    details,
                    status: RequestStatus::Pending,
                    created_at: Utc::now(),
                });
                Ok(())
            })
            .await?;

        info!(
            "Withdrawal request {} filed by account {} for {}",
            id, account, amount
        );
        self.notifier
            .deliver(Notification::to_admins(
                NotificationEvent::WithdrawalRequested {
                    request: id,
                    account,
                    amount,
                    method: method_for_event,
                },
            ))
            .await;
        Ok(id)
    }

    /// Administrator resolves a pending withdrawal. Approval only marks
    /// the request completed; the debit already happened at request
    /// time. Rejection refunds that debit in the same transaction.
    pub async fn resolve_withdrawal(&self, id: Uuid, approve: bool) -> MarketResult<()> {
        let (account, amount) = self
            .store
            .transaction(move |state| {
                let request = state.withdrawal(id)?;
                if request.status != RequestStatus::Pending {
                    return Err(MarketError::state_transition(
                        "withdrawal request",
                        request.status,
                        if approve {
                            RequestStatus::Completed
                        } else {
                            RequestStatus::Rejected
                        },
                    ));
                }
                let (account, amount) = (request.account, request.amount);

                if !approve {
                    // A rejected payout must not burn the worker's funds
                    ledger::adjust_payable(state, account, amount)?;
                }
                state.withdrawal_mut(id)?.status = if approve {
                    RequestStatus::Completed
                } else {
                    RequestStatus::Rejected
                };
                Ok((account, amount))
            })
            .await?;

        info!("Withdrawal request {} resolved (approved: {})", id, approve);
        let event = if approve {
            NotificationEvent::WithdrawalCompleted {
                request: id,
                amount,
            }
        } else {
            NotificationEvent::WithdrawalRejected {
                request: id,
                amount,
            }
        };
        self.notifier
            .deliver(Notification::to_account(account, event))
            .await;
        Ok(())
    }

    /// Point-in-time view of a withdrawal request
    pub async fn withdrawal(&self, id: Uuid) -> MarketResult<WithdrawalRequest> {
        self.store.read(|state| state.withdrawal(id).cloned()).await
    }
}
