//! Underwriting service behaviour over the in-memory adapters
//!
//! Covers the full loan lifecycle against a real ledger, guarantor exposure
//! caps (including concurrent registrations) and refused state transitions.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Barrier;

use core_kernel::{Clock, FixedClock, LoanId, MemberId, Money, SavingsAccountId};
use domain_loan::{
    compute_schedule, ExposureLimits, ExposureReason, GuaranteeTerms, GuarantorRequest, GuarantorStatus,
    GuarantorType, InMemoryLoanRepository, Loan, LoanApplication, LoanDisplayStatus, LoanError,
    LoanLimits, LoanStatus, LoanUnderwritingService, RepaymentSource,
};
use domain_savings::{
    InMemoryLedgerRepository, LedgerConfig, LedgerError, LedgerStore, OpenAccountRequest,
    TransactionStatus, TransactionType,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

struct Harness {
    loans: Arc<LoanUnderwritingService>,
    ledger: Arc<LedgerStore>,
    clock: Arc<FixedClock>,
}

fn harness() -> Harness {
    let clock = Arc::new(FixedClock::on(today()));
    let ledger = Arc::new(LedgerStore::new(
        Arc::new(InMemoryLedgerRepository::new()),
        LedgerConfig::default(),
        clock.clone(),
    ));
    let loans = Arc::new(LoanUnderwritingService::new(
        Arc::new(InMemoryLoanRepository::new()),
        ledger.clone(),
        LoanLimits::default(),
        ExposureLimits::default(),
        clock.clone(),
    ));
    Harness {
        loans,
        ledger,
        clock,
    }
}

/// Opens a savings account for a fresh member
async fn member_account(h: &Harness, opening: i64) -> (MemberId, SavingsAccountId) {
    let member_id = MemberId::new();
    let mut request = OpenAccountRequest::regular(member_id);
    request.opening_balance = Money::from_major(opening);
    let account = h.ledger.open_account(request).await.unwrap();
    (member_id, account.id)
}

fn application(
    member_id: MemberId,
    account: SavingsAccountId,
    principal: i64,
    rate: Decimal,
    term: u32,
) -> LoanApplication {
    LoanApplication {
        member_id,
        principal: Money::from_major(principal),
        purpose: "Working capital".into(),
        term_months: term,
        annual_rate_percent: rate,
        disbursement_account: account,
    }
}

async fn pending_loan(h: &Harness, principal: i64) -> Loan {
    let (member_id, account) = member_account(h, 0).await;
    h.loans
        .submit(application(member_id, account, principal, dec!(12), 12))
        .await
        .unwrap()
}

async fn active_loan(h: &Harness, principal: i64) -> Loan {
    let loan = pending_loan(h, principal).await;
    h.loans.approve(loan.id).await.unwrap();
    h.loans.disburse(loan.id).await.unwrap()
}

fn guarantee(member: MemberId, terms: GuaranteeTerms) -> GuarantorRequest {
    GuarantorRequest {
        guarantor_member_id: member,
        terms,
        guarantor_type: GuarantorType::Individual,
    }
}

fn amount(units: i64) -> GuaranteeTerms {
    GuaranteeTerms::Amount(Money::from_major(units))
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_disbursement_posts_one_deposit() {
        let h = harness();
        let (member_id, account) = member_account(&h, 0).await;

        let loan = h
            .loans
            .submit(application(member_id, account, 200_000, dec!(10), 12))
            .await
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.application_date, today());
        assert_eq!(loan.monthly_payment, Money::new(dec!(17583.18)));

        let approved = h.loans.approve(loan.id).await.unwrap();
        assert_eq!(approved.status, LoanStatus::Approved);
        assert_eq!(approved.approval_date, Some(today()));

        let active = h.loans.disburse(loan.id).await.unwrap();
        assert_eq!(active.status, LoanStatus::Active);
        assert_eq!(active.disbursement_date, Some(today()));
        assert_eq!(active.next_payment_date, NaiveDate::from_ymd_opt(2024, 2, 15));
        assert_eq!(
            active.remaining_balance(),
            active.principal + active.total_interest
        );

        let history = h.ledger.list_transactions(account).await.unwrap();
        assert_eq!(history.len(), 1);
        let deposit = &history[0];
        assert_eq!(deposit.transaction_type, TransactionType::Deposit);
        assert_eq!(deposit.amount, Money::from_major(200_000));
        assert_eq!(deposit.status, TransactionStatus::Completed);
        assert_eq!(active.disbursement_transaction_id, Some(deposit.id));

        let balance = h.ledger.get_account(account).await.unwrap().balance;
        assert_eq!(balance, Money::from_major(200_000));
    }

    #[tokio::test]
    async fn test_account_repayment_debits_ledger() {
        let h = harness();
        let loan = active_loan(&h, 12_000).await;
        let installment = loan.monthly_payment;

        let receipt = h
            .loans
            .record_repayment(
                loan.id,
                RepaymentSource::Account {
                    account_id: loan.disbursement_account,
                    reference: None,
                },
                installment,
            )
            .await
            .unwrap();

        assert!(!receipt.replayed);
        assert_eq!(receipt.repayment.reference, format!("LOAN-REPAY-{}-1", loan.id));
        assert_eq!(receipt.loan.total_repaid, installment);
        assert_eq!(receipt.loan.repayment_count, 1);
        assert_eq!(receipt.loan.next_payment_date, NaiveDate::from_ymd_opt(2024, 3, 15));

        let account = h.ledger.get_account(loan.disbursement_account).await.unwrap();
        assert_eq!(account.balance, Money::from_major(12_000) - installment);

        let withdrawal = h
            .ledger
            .get_transaction(receipt.repayment.transaction_id.unwrap())
            .await
            .unwrap();
        assert_eq!(withdrawal.transaction_type, TransactionType::Withdrawal);
        assert_eq!(withdrawal.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_paying_off_releases_guarantors() {
        let h = harness();
        let guarantor = MemberId::new();
        let loan = pending_loan(&h, 10_000).await;
        h.loans
            .add_guarantor(loan.id, guarantee(guarantor, GuaranteeTerms::Percentage(dec!(50))))
            .await
            .unwrap();
        h.loans.approve(loan.id).await.unwrap();
        let loan = h.loans.disburse(loan.id).await.unwrap();

        let live = h.loans.can_guarantee(guarantor, Money::ZERO).await.unwrap();
        assert_eq!(live.current_exposure, Money::from_major(5_000));

        let receipt = h
            .loans
            .record_repayment(
                loan.id,
                RepaymentSource::External {
                    reference: "CASH-0001".into(),
                },
                loan.remaining_balance(),
            )
            .await
            .unwrap();
        assert_eq!(receipt.loan.status, LoanStatus::Paid);
        assert_eq!(receipt.loan.remaining_balance(), Money::ZERO);
        assert!(receipt.repayment.transaction_id.is_none());

        let guarantors = h.loans.list_guarantors(loan.id).await.unwrap();
        assert_eq!(guarantors[0].status, GuarantorStatus::Released);

        let after = h.loans.can_guarantee(guarantor, Money::ZERO).await.unwrap();
        assert_eq!(after.current_guarantees, 0);
        assert_eq!(after.current_exposure, Money::ZERO);
    }

    #[tokio::test]
    async fn test_overdue_is_display_only() {
        let h = harness();
        let loan = active_loan(&h, 5_000).await;

        h.clock.advance_days(45);
        let loan = h.loans.get_loan(loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.display_status(h.clock.today()), LoanDisplayStatus::Overdue);
    }

    #[tokio::test]
    async fn test_default_marks_guarantees() {
        let h = harness();
        let guarantor = MemberId::new();
        let loan = pending_loan(&h, 8_000).await;
        h.loans
            .add_guarantor(loan.id, guarantee(guarantor, amount(2_000)))
            .await
            .unwrap();
        h.loans.approve(loan.id).await.unwrap();
        h.loans.disburse(loan.id).await.unwrap();

        let defaulted = h.loans.mark_defaulted(loan.id).await.unwrap();
        assert_eq!(defaulted.status, LoanStatus::Defaulted);
        let guarantors = h.loans.list_guarantors(loan.id).await.unwrap();
        assert_eq!(guarantors[0].status, GuarantorStatus::Defaulted);
    }

    #[tokio::test]
    async fn test_schedule_dates_follow_disbursement() {
        let h = harness();
        let loan = active_loan(&h, 12_000).await;

        let schedule = h.loans.repayment_schedule(loan.id).await.unwrap();
        assert_eq!(schedule.len(), 12);
        assert_eq!(schedule[0].due_date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
        assert_eq!(schedule[11].remaining, Money::ZERO);
    }
}

// ============================================================================
// Repayment references
// ============================================================================

mod repayments {
    use super::*;

    #[tokio::test]
    async fn test_same_reference_same_amount_is_replayed() {
        let h = harness();
        let loan = active_loan(&h, 6_000).await;
        let source = RepaymentSource::Account {
            account_id: loan.disbursement_account,
            reference: Some("JAN-2024".into()),
        };

        let first = h
            .loans
            .record_repayment(loan.id, source.clone(), Money::from_major(500))
            .await
            .unwrap();
        let second = h
            .loans
            .record_repayment(loan.id, source, Money::from_major(500))
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(second.repayment.id, first.repayment.id);
        assert_eq!(second.loan.total_repaid, Money::from_major(500));

        let history = h.ledger.list_transactions(loan.disbursement_account).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_same_reference_other_amount_is_refused() {
        let h = harness();
        let loan = active_loan(&h, 6_000).await;
        let source = RepaymentSource::External {
            reference: "BANK-77".into(),
        };

        h.loans
            .record_repayment(loan.id, source.clone(), Money::from_major(500))
            .await
            .unwrap();
        let err = h
            .loans
            .record_repayment(loan.id, source, Money::from_major(600))
            .await
            .unwrap_err();
        assert!(matches!(err, LoanError::DuplicateRepayment { .. }));
    }

    #[tokio::test]
    async fn test_overpayment_is_refused() {
        let h = harness();
        let loan = active_loan(&h, 1_000).await;
        let too_much = loan.remaining_balance() + Money::from_major(1);

        let err = h
            .loans
            .record_repayment(
                loan.id,
                RepaymentSource::External {
                    reference: "CASH-9".into(),
                },
                too_much,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LoanError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ledger_refusal_leaves_loan_unchanged() {
        let h = harness();
        let loan = active_loan(&h, 1_000).await;
        let (_, empty_account) = member_account(&h, 0).await;

        let err = h
            .loans
            .record_repayment(
                loan.id,
                RepaymentSource::Account {
                    account_id: empty_account,
                    reference: None,
                },
                Money::from_major(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoanError::Ledger(LedgerError::InsufficientFunds { .. })
        ));

        let loan = h.loans.get_loan(loan.id).await.unwrap();
        assert_eq!(loan.total_repaid, Money::ZERO);
        assert_eq!(loan.repayment_count, 0);
        assert!(h.loans.list_repayments(loan.id).await.unwrap().is_empty());
    }
}

// ============================================================================
// Exposure caps
// ============================================================================

mod exposure {
    use super::*;

    #[tokio::test]
    async fn test_sixth_guarantee_is_refused() {
        let h = harness();
        let guarantor = MemberId::new();

        for _ in 0..5 {
            let loan = pending_loan(&h, 1_000).await;
            h.loans
                .add_guarantor(loan.id, guarantee(guarantor, amount(1)))
                .await
                .unwrap();
        }

        let sixth = pending_loan(&h, 1_000).await;
        let err = h
            .loans
            .add_guarantor(sixth.id, guarantee(guarantor, amount(1)))
            .await
            .unwrap_err();
        match err {
            LoanError::GuarantorExposureExceeded { guarantor: who, reason } => {
                assert_eq!(who, guarantor);
                assert_eq!(reason, ExposureReason::TooManyGuarantees);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exposure_cap_boundary() {
        let h = harness();

        let refused = pending_loan(&h, 600_000).await;
        let err = h
            .loans
            .add_guarantor(refused.id, guarantee(MemberId::new(), amount(500_001)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoanError::GuarantorExposureExceeded {
                reason: ExposureReason::ExposureExceeded,
                ..
            }
        ));

        let accepted = pending_loan(&h, 600_000).await;
        h.loans
            .add_guarantor(accepted.id, guarantee(MemberId::new(), amount(500_000)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_approval_rechecks_live_exposure() {
        let h = harness();
        let guarantor = MemberId::new();
        let first = pending_loan(&h, 300_000).await;
        let second = pending_loan(&h, 300_000).await;

        for loan in [&first, &second] {
            h.loans
                .add_guarantor(loan.id, guarantee(guarantor, GuaranteeTerms::Percentage(dec!(100))))
                .await
                .unwrap();
        }

        h.loans.approve(first.id).await.unwrap();
        h.loans.disburse(first.id).await.unwrap();

        let err = h.loans.approve(second.id).await.unwrap_err();
        assert!(matches!(
            err,
            LoanError::GuarantorExposureExceeded {
                reason: ExposureReason::ExposureExceeded,
                ..
            }
        ));
        let second = h.loans.get_loan(second.id).await.unwrap();
        assert_eq!(second.status, LoanStatus::Pending);
    }

    #[tokio::test]
    async fn test_rejection_frees_guarantee_slot() {
        let h = harness();
        let guarantor = MemberId::new();
        let loan = pending_loan(&h, 1_000).await;
        h.loans
            .add_guarantor(loan.id, guarantee(guarantor, amount(500)))
            .await
            .unwrap();
        assert_eq!(
            h.loans.can_guarantee(guarantor, Money::ZERO).await.unwrap().current_guarantees,
            1
        );

        let rejected = h.loans.reject(loan.id, Some("income too low".into())).await.unwrap();
        assert_eq!(rejected.status, LoanStatus::Rejected);
        assert_eq!(rejected.status_reason.as_deref(), Some("income too low"));
        assert_eq!(
            h.loans.can_guarantee(guarantor, Money::ZERO).await.unwrap().current_guarantees,
            0
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_respect_count_cap() {
        let h = harness();
        let guarantor = MemberId::new();
        let mut loan_ids: Vec<LoanId> = Vec::new();
        for _ in 0..8 {
            loan_ids.push(pending_loan(&h, 1_000).await.id);
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
                        .add_guarantor(loan_id, guarantee(guarantor, amount(10)))
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        let mut refused = 0;
        for result in join_all(tasks).await {
            match result.unwrap() {
                Ok(_) => accepted += 1,
                Err(LoanError::GuarantorExposureExceeded { reason, .. }) => {
                    assert_eq!(reason, ExposureReason::TooManyGuarantees);
                    refused += 1;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(accepted, 5);
        assert_eq!(refused, 3);
        let decision = h.loans.can_guarantee(guarantor, Money::ZERO).await.unwrap();
        assert_eq!(decision.current_guarantees, 5);
    }
}

// ============================================================================
// Refused transitions and validation
// ============================================================================

mod transitions {
    use super::*;

    #[tokio::test]
    async fn test_disburse_requires_approval() {
        let h = harness();
        let loan = pending_loan(&h, 1_000).await;

        let err = h.loans.disburse(loan.id).await.unwrap_err();
        assert!(matches!(
            err,
            LoanError::InvalidStateTransition {
                from: LoanStatus::Pending,
                ..
            }
        ));
        let history = h.ledger.list_transactions(loan.disbursement_account).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_repay_requires_active() {
        let h = harness();
        let loan = pending_loan(&h, 1_000).await;
        h.loans.approve(loan.id).await.unwrap();

        let err = h
            .loans
            .record_repayment(
                loan.id,
                RepaymentSource::External {
                    reference: "EARLY".into(),
                },
                Money::from_major(10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_active_loan_cannot_be_cancelled() {
        let h = harness();
        let loan = active_loan(&h, 1_000).await;

        let err = h.loans.cancel(loan.id, None).await.unwrap_err();
        assert!(matches!(err, LoanError::InvalidStateTransition { .. }));
        assert_eq!(h.loans.get_loan(loan.id).await.unwrap().status, LoanStatus::Active);
    }

    #[tokio::test]
    async fn test_guarantor_rules() {
        let h = harness();
        let loan = pending_loan(&h, 1_000).await;

        let own = h
            .loans
            .add_guarantor(loan.id, guarantee(loan.member_id, amount(100)))
            .await
            .unwrap_err();
        assert!(matches!(own, LoanError::Validation(_)));

        let member = MemberId::new();
        h.loans
            .add_guarantor(loan.id, guarantee(member, amount(100)))
            .await
            .unwrap();
        let twice = h
            .loans
            .add_guarantor(loan.id, guarantee(member, amount(100)))
            .await
            .unwrap_err();
        assert!(matches!(twice, LoanError::Validation(_)));

        h.loans.approve(loan.id).await.unwrap();
        let late = h
            .loans
            .add_guarantor(loan.id, guarantee(MemberId::new(), amount(100)))
            .await
            .unwrap_err();
        assert!(matches!(late, LoanError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_submit_bounds() {
        let h = harness();
        let (member_id, account) = member_account(&h, 0).await;

        for bad in [
            application(member_id, account, 0, dec!(10), 12),
            application(member_id, account, 1_000, dec!(10), 0),
            application(member_id, account, 1_000, dec!(10), 241),
            application(member_id, account, 1_000, dec!(50.01), 12),
            application(member_id, account, 1_000, dec!(-1), 12),
        ] {
            let err = h.loans.submit(bad).await.unwrap_err();
            assert!(matches!(err, LoanError::Validation(_)), "{err:?}");
        }

        let (_, someone_else) = member_account(&h, 0).await;
        let err = h
            .loans
            .submit(application(member_id, someone_else, 1_000, dec!(10), 12))
            .await
            .unwrap_err();
        assert!(matches!(err, LoanError::Validation(_)));

        let err = h
            .loans
            .submit(application(member_id, SavingsAccountId::new(), 1_000, dec!(10), 12))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_zero_rate_loan_is_accepted() {
        let h = harness();
        let (member_id, account) = member_account(&h, 0).await;
        let loan = h
            .loans
            .submit(application(member_id, account, 1_200, Decimal::ZERO, 12))
            .await
            .unwrap();
        assert_eq!(loan.monthly_payment, Money::from_major(100));
        assert_eq!(loan.total_interest, Money::ZERO);
    }
}

// ============================================================================
// Amounts at the edge of the decimal range
// ============================================================================

mod extreme_amounts {
    use super::*;

    #[tokio::test]
    async fn test_unquotable_principal_is_rejected() {
        let h = harness();
        let (member_id, account) = member_account(&h, 0).await;
        let mut oversized = application(member_id, account, 1, dec!(10), 12);
        oversized.principal = Money::new(dec!(79000000000000000000000000000));

        let err = h.loans.submit(oversized).await.unwrap_err();
        assert!(matches!(err, LoanError::Validation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_guarantee_beyond_any_cap_is_refused() {
        let h = harness();
        let loan = pending_loan(&h, 10_000).await;
        let (guarantor, _) = member_account(&h, 0).await;
        let everything = GuaranteeTerms::Amount(Money::new(Decimal::MAX));

        let err = h
            .loans
            .add_guarantor(loan.id, guarantee(guarantor, everything))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoanError::GuarantorExposureExceeded {
                reason: ExposureReason::ExposureExceeded,
                ..
            }
        ));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_schedule_never_panics_near_max(
        offset in 0u64..u64::MAX,
        rate in 0u32..=50,
        term in 1u32..=240,
    ) {
        let principal = Money::new(Decimal::MAX - Decimal::from(offset));
        let summary = compute_schedule(principal, Decimal::from(rate), term);

        // Either the figures fit or the schedule collapses to zero
        prop_assert!(!summary.monthly_payment.is_negative());
        prop_assert!(!summary.total_interest.is_negative() || rate == 0);
    }
}
