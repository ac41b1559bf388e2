mod account;
mod audit_record;
mod outcome;

pub use account::{Account, AccountStatus};
pub use audit_record::{AuditQuery, AuditRecord};
pub use outcome::{
    BatchSummary, DeletionOutcome, EraseReport, IdentityRemoval, OutcomeStatus,
};
