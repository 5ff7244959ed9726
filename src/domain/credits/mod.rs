//! Credits module - ledger entries and balance arithmetic.

mod balance;
mod transaction;

pub use balance::CreditBalance;
pub use transaction::{
    CreditTransaction, CreditTransactionKind, NewCreditTransaction, TransactionQuery,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
