pub mod account_service;
pub mod allocation_service;
pub mod mutation_service;
pub mod reimbursement_service;
pub mod rollover_service;
pub mod summary_service;

pub use account_service::{AccountChanges, AccountService};
pub use allocation_service::{AllocationService, PaycheckReport, PaycheckRequest, PaycheckSplit};
pub use mutation_service::MutationService;
pub use reimbursement_service::{ReimbursementService, ReimbursementSort, ReimbursementTotals};
pub use rollover_service::{NoOpReason, PeriodRollover, RecalcOutcome, RolloverService};
pub use summary_service::{
    AccountStatus, CashFlowSummary, PeriodSummary, SummaryService, WeekSummary, UNCATEGORIZED,
};

use crate::core::errors::BudgetError;

pub type ServiceResult<T> = Result<T, BudgetError>;
