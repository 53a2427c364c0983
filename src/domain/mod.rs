pub mod account;
pub mod common;
pub mod entry;
pub mod mutation;
pub mod reimbursement;
pub mod week;

pub use account::{AccountKind, ActivationPeriod, LastPayment, PaymentFrequency, TrackableAccount};
pub use common::{Displayable, Identifiable, Money, NamedEntity};
pub use entry::ChangeEntry;
pub use mutation::{
    Mutation, MutationKind, MutationOrigin, MutationPatch, NewMutation, RolloverLeg,
};
pub use reimbursement::{NewReimbursement, Reimbursement, ReimbursementPatch, ReimbursementState};
pub use week::{BudgetWeek, PayPeriod};
