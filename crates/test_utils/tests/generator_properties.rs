//! Properties of the domain checked over the shared generators

use proptest::prelude::*;

use domain_loan::repayment_table;
use domain_savings::{LedgerError, PostRequest};
use test_utils::{
    annual_rate_strategy, assert_balance_consistent, ledger_ops_strategy, principal_strategy,
    term_months_strategy, CoopHarness, DateFixtures, LedgerOp, MoneyFixtures,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_posting_scripts_keep_history_consistent(ops in ledger_ops_strategy(20)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = CoopHarness::in_memory();
            let account = h.funded_account(MoneyFixtures::deposit()).await;

            for op in ops {
                let request = match op {
                    LedgerOp::Deposit(amount) => PostRequest::deposit(account.id, amount),
                    LedgerOp::Withdrawal(amount) => {
                        PostRequest::withdrawal(account.id, amount).pre_approved()
                    }
                };
                match h.ledger.post(request).await {
                    Ok(_) | Err(LedgerError::InsufficientFunds { .. }) => {}
                    Err(other) => panic!("unexpected posting failure: {other}"),
                }
            }

            assert_balance_consistent(&h.ledger, account.id).await;
        });
    }

    #[test]
    fn prop_repayment_table_retires_the_principal(
        principal in principal_strategy(),
        rate in annual_rate_strategy(),
        term in term_months_strategy(),
    ) {
        let rows = repayment_table(principal, rate, term, DateFixtures::business_date());
        prop_assert_eq!(rows.len(), term as usize);

        let repaid: core_kernel::Money = rows.iter().map(|row| row.principal).sum();
        prop_assert_eq!(repaid, principal);
        prop_assert!(rows.last().map(|row| row.remaining.is_zero()).unwrap_or(false));
        prop_assert!(rows.iter().all(|row| !row.interest.is_negative()));
    }
}
