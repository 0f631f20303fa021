//! Custom Test Assertions
//!
//! Ledger-level checks with messages that name the offending row.

use rust_decimal::Decimal;

use core_kernel::{Money, SavingsAccountId};
use domain_savings::{LedgerStore, SavingsTransaction, TransactionStatus};

/// Whether a posting has moved the balance
///
/// A reversed posting still counts; its counter-entry undoes it.
pub fn affects_balance(tx: &SavingsTransaction) -> bool {
    matches!(tx.status, TransactionStatus::Completed | TransactionStatus::Reversed)
}

/// Asserts that `history` replays to `balance`
///
/// Every balance-affecting row must carry consistent before/after figures and
/// their net effects must sum to the stored balance.
///
/// # Panics
///
/// Panics on the first inconsistent row or on a total mismatch
pub fn assert_history_replays(history: &[SavingsTransaction], balance: Money) {
    let mut total = Money::ZERO;
    for tx in history.iter().filter(|tx| affects_balance(tx)) {
        assert!(
            tx.is_consistent(),
            "Posting {} records {} -> {} but nets {}",
            tx.id,
            tx.balance_before,
            tx.balance_after,
            tx.net_effect()
        );
        total += tx.net_effect();
    }
    assert_eq!(
        total, balance,
        "History nets {} but the stored balance is {}",
        total, balance
    );
}

/// Loads an account and its history and asserts they agree
///
/// # Panics
///
/// Panics if the account cannot be read or the history does not replay
pub async fn assert_balance_consistent(ledger: &LedgerStore, account_id: SavingsAccountId) {
    let account = ledger
        .get_account(account_id)
        .await
        .expect("Failed to load account");
    let history = ledger
        .list_transactions(account_id)
        .await
        .expect("Failed to load history");
    assert!(
        !account.balance.is_negative(),
        "Account {} has negative balance {}",
        account.account_number,
        account.balance
    );
    assert_history_replays(&history, account.balance);
}

/// Asserts that two Money values differ by at most `tolerance`
pub fn assert_money_approx_eq(actual: Money, expected: Money, tolerance: Decimal) {
    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual,
        expected,
        diff,
        tolerance
    );
}
