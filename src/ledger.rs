//! Balance ledger
//!
//! Per-account payable and escrow balances, mutated only through signed
//! deltas. The functions here operate on [`StoreState`] so callers can
//! compose a balance adjustment with the state transition it pays for
//! inside a single store transaction; failing the delta aborts that
//! whole transaction.

use rust_decimal::Decimal;

use crate::error::MarketError;
use crate::models::AccountId;
use crate::store::StoreState;
use crate::MarketResult;

/// Apply a signed delta to the worker-payable balance
pub fn adjust_payable(
    state: &mut StoreState,
    account: AccountId,
    delta: Decimal,
) -> MarketResult<()> {
    let acct = state.account_mut(account)?;
    acct.payable = apply(acct.payable, delta)?;
    Ok(())
}

/// Apply a signed delta to the client-escrow balance
pub fn adjust_escrow(
    state: &mut StoreState,
    account: AccountId,
    delta: Decimal,
) -> MarketResult<()> {
    let acct = state.account_mut(account)?;
    acct.escrow = apply(acct.escrow, delta)?;
    Ok(())
}

/// Point-in-time payable balance; zero for accounts never seen.
/// Not synchronized with later writes: pair the read with its commit in
/// one transaction when they must act as a unit.
pub fn payable_of(state: &StoreState, account: AccountId) -> Decimal {
    state
        .account(account)
        .map(|a| a.payable)
        .unwrap_or(Decimal::ZERO)
}

/// Point-in-time escrow balance; zero for accounts never seen
pub fn escrow_of(state: &StoreState, account: AccountId) -> Decimal {
    state
        .account(account)
        .map(|a| a.escrow)
        .unwrap_or(Decimal::ZERO)
}

/// Balances never go negative; a debit past zero rejects the delta
fn apply(balance: Decimal, delta: Decimal) -> MarketResult<Decimal> {
    let next = balance + delta;
    if next < Decimal::ZERO {
        return Err(MarketError::InsufficientFunds {
            required: -delta,
            available: balance,
        });
    }
    Ok(next)
}
