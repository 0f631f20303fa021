//! Ledger and loan services over PostgreSQL
//!
//! Each test starts its own migrated container, so these need Docker and are
//! ignored by default. Run with `cargo test -p infra_db -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Barrier;

use core_kernel::{LoanId, MemberId, Money};
use domain_loan::{LoanError, LoanStatus, RepaymentSource};
use domain_savings::{LedgerError, LedgerRepository, PostRequest, TransferRequest};
use infra_db::{PostgresLedgerRepository, PostgresLoanRepository};
use test_utils::{
    assert_balance_consistent, create_isolated_test_database, guarantee, CoopHarness,
    TestDatabase,
};

async fn database() -> TestDatabase {
    create_isolated_test_database()
        .await
        .expect("Failed to start PostgreSQL container")
}

fn harness(db: &TestDatabase) -> CoopHarness {
    CoopHarness::with_repositories(
        Arc::new(PostgresLedgerRepository::new(db.pool().clone())),
        Arc::new(PostgresLoanRepository::new(db.pool().clone())),
    )
}

// ============================================================================
// Ledger
// ============================================================================

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_postings_survive_round_trip() {
    let db = database().await;
    let h = harness(&db);
    let account = h.funded_account(Money::from_major(1_000)).await;

    h.ledger
        .post(PostRequest::deposit(account.id, Money::from_major(250)).with_reference("DEP-1"))
        .await
        .unwrap();
    h.ledger
        .post(
            PostRequest::withdrawal(account.id, Money::from_major(100))
                .with_reference("WD-1")
                .with_fees(Money::from_major(2))
                .pre_approved(),
        )
        .await
        .unwrap();

    let stored = h.ledger.get_account(account.id).await.unwrap();
    assert_eq!(stored.balance, Money::from_major(1_148));
    assert_eq!(h.ledger.list_transactions(account.id).await.unwrap().len(), 3);
    assert_balance_consistent(&h.ledger, account.id).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_replayed_reference_returns_original_row() {
    let db = database().await;
    let h = harness(&db);
    let account = h.funded_account(Money::ZERO).await;

    let request = PostRequest::deposit(account.id, Money::from_major(40)).with_reference("DEP-7");
    let first = h.ledger.post(request.clone()).await.unwrap();
    let second = h.ledger.post(request).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(
        h.ledger.get_account(account.id).await.unwrap().balance,
        Money::from_major(40)
    );

    let err = h
        .ledger
        .post(PostRequest::deposit(account.id, Money::from_major(41)).with_reference("DEP-7"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateReference { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn test_competing_withdrawals_never_overdraw() {
    let db = database().await;
    let h = harness(&db);
    let account = h.funded_account(Money::from_major(1_000)).await;
    let barrier = Arc::new(Barrier::new(10));

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let ledger = h.ledger.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                ledger
                    .post(
                        PostRequest::withdrawal(account.id, Money::from_major(200))
                            .with_reference(format!("WD-{i}"))
                            .pre_approved(),
                    )
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(LedgerError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 5);
    assert!(h.ledger.get_account(account.id).await.unwrap().balance.is_zero());
    assert_balance_consistent(&h.ledger, account.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn test_opposing_transfers_conserve_money() {
    let db = database().await;
    let h = harness(&db);
    let a = h.funded_account(Money::from_major(500)).await;
    let b = h.funded_account(Money::from_major(500)).await;

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let ledger = h.ledger.clone();
            let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
            tokio::spawn(async move {
                ledger
                    .transfer(TransferRequest {
                        from_account: from,
                        to_account: to,
                        amount: Money::from_major(25),
                        fees_charged: Money::ZERO,
                        reference_number: Some(format!("TRF-{i}")),
                        description: None,
                    })
                    .await
            })
        })
        .collect();

    let all = tokio::time::timeout(Duration::from_secs(30), join_all(tasks))
        .await
        .expect("transfers deadlocked");
    for result in all {
        result.unwrap().unwrap();
    }

    let a = h.ledger.get_account(a.id).await.unwrap();
    let b = h.ledger.get_account(b.id).await.unwrap();
    assert_eq!(a.balance, Money::from_major(500));
    assert_eq!(b.balance, Money::from_major(500));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_held_row_lock_times_out() {
    let db = database().await;
    let h = harness(&db);
    let account = h.funded_account(Money::from_major(10)).await;
    let repository = PostgresLedgerRepository::new(db.pool().clone());

    let _held = repository
        .begin(&[account.id], Duration::from_secs(5))
        .await
        .unwrap();
    let err = match repository.begin(&[account.id], Duration::from_millis(100)).await {
        Ok(_) => panic!("second unit of work acquired a held lock"),
        Err(e) => e,
    };

    assert!(matches!(err, LedgerError::LockTimeout { waited_ms: 100, .. }));
    assert!(err.is_retryable());
}

// ============================================================================
// Loans
// ============================================================================

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_loan_lifecycle_through_payoff() {
    let db = database().await;
    let h = harness(&db);
    let loan = h.pending_loan(Money::from_major(12_000)).await;
    let (guarantor, _) = h.member().await;

    h.loans
        .add_guarantor(loan.id, guarantee(guarantor, Money::from_major(6_000)))
        .await
        .unwrap();
    h.loans.approve(loan.id).await.unwrap();
    let active = h.loans.disburse(loan.id).await.unwrap();
    assert_eq!(active.status, LoanStatus::Active);

    let account = h.ledger.get_account(loan.disbursement_account).await.unwrap();
    assert_eq!(account.balance, Money::from_major(12_000));

    let outstanding = active.total_payable();
    // Disbursement alone does not cover the interest
    h.ledger
        .post(
            PostRequest::deposit(loan.disbursement_account, active.total_interest)
                .with_reference("TOP-UP"),
        )
        .await
        .unwrap();
    let receipt = h
        .loans
        .record_repayment(
            loan.id,
            RepaymentSource::Account {
                account_id: loan.disbursement_account,
                reference: None,
            },
            outstanding,
        )
        .await
        .unwrap();

    assert_eq!(receipt.loan.status, LoanStatus::Paid);
    let guarantors = h.loans.list_guarantors(loan.id).await.unwrap();
    assert!(guarantors.iter().all(|g| !g.is_active()));
    assert_balance_consistent(&h.ledger, loan.disbursement_account).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_external_repayment_reference_is_unique_per_loan() {
    let db = database().await;
    let h = harness(&db);
    let loan = h.pending_loan(Money::from_major(5_000)).await;
    h.loans.approve(loan.id).await.unwrap();
    h.loans.disburse(loan.id).await.unwrap();

    let source = RepaymentSource::External {
        reference: "CASH-001".to_string(),
    };
    let first = h
        .loans
        .record_repayment(loan.id, source.clone(), Money::from_major(100))
        .await
        .unwrap();
    let replay = h
        .loans
        .record_repayment(loan.id, source.clone(), Money::from_major(100))
        .await
        .unwrap();
    assert!(replay.replayed);
    assert_eq!(first.repayment.id, replay.repayment.id);

    let err = h
        .loans
        .record_repayment(loan.id, source, Money::from_major(99))
        .await
        .unwrap_err();
    assert!(matches!(err, LoanError::DuplicateRepayment { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn test_concurrent_guarantees_respect_count_cap() {
    let db = database().await;
    let h = harness(&db);
    let guarantor = MemberId::new();
    let mut loan_ids: Vec<LoanId> = Vec::new();
    for _ in 0..8 {
        loan_ids.push(h.pending_loan(Money::from_major(1_000)).await.id);
    }
    let barrier = Arc::new(Barrier::new(loan_ids.len()));

    let tasks: Vec<_> = loan_ids
        .iter()
        .map(|&loan_id| {
            let loans = h.loans.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                loans
                    .add_guarantor(loan_id, guarantee(guarantor, Money::from_major(10)))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut refused = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(LoanError::GuarantorExposureExceeded { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 5);
    assert_eq!(refused, 3);
    let decision = h.loans.can_guarantee(guarantor, Money::from_major(1)).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.current_guarantees, 5);
}
