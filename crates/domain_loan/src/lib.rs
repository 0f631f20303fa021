//! Loan Domain - Amortization, Guarantor Exposure and Underwriting
//!
//! # Loan Lifecycle
//!
//! ```text
//!   submit ──► Pending ──approve──► Approved ──disburse──► Active ──repay*──► Paid
//!                │                     │                      │
//!                └──reject/cancel──────┴──► Rejected          └──► Defaulted
//!                                           Cancelled
//! ```
//!
//! Guarantors attach to pending loans. Each registration and each approval
//! re-checks the guarantor against two caps (number of active guarantees and
//! cumulative exposure on live loans) while holding that member's lock.
//!
//! Disbursement and account-funded repayments are posted through the savings
//! [`domain_savings::LedgerStore`]; this crate never touches a balance.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_loan::{LoanApplication, LoanUnderwritingService};
//!
//! let loan = service.submit(application).await?;
//! service.add_guarantor(loan.id, guarantor).await?;
//! service.approve(loan.id).await?;
//! let loan = service.disburse(loan.id).await?;
//! ```

pub mod amortization;
pub mod loan;
pub mod guarantor;
pub mod exposure;
pub mod config;
pub mod ports;
pub mod memory;
pub mod services;
pub mod error;

pub use amortization::{compute_schedule, remaining_balance, repayment_table, ScheduleEntry, ScheduleSummary};
pub use loan::{
    Loan, LoanApplication, LoanDisplayStatus, LoanRepayment, LoanStatus, RepaymentSource,
};
pub use guarantor::{GuaranteeTerms, GuarantorRequest, GuarantorStatus, GuarantorType, LoanGuarantor};
pub use exposure::{
    ExposureDecision, ExposureReason, GuaranteeCommitment, GuarantorExposureValidator,
};
pub use config::{ExposureLimits, LoanLimits};
pub use ports::{LockScope, LoanRepository, LoanUnitOfWork};
pub use memory::InMemoryLoanRepository;
pub use services::{LoanUnderwritingService, RepaymentReceipt};
pub use error::LoanError;
