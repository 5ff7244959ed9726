//! In-memory credit ledger.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::credits::{
    CreditTransaction, CreditTransactionKind, NewCreditTransaction, TransactionQuery,
};
use crate::domain::foundation::{DomainError, TransactionId, UserId};
use crate::ports::CreditTransactionRepository;

/// In-memory implementation of `CreditTransactionRepository`.
///
/// Entries are kept in insertion order, which is also `created_at` order.
#[derive(Default)]
pub struct InMemoryCreditTransactionRepository {
    entries: RwLock<Vec<CreditTransaction>>,
}

impl InMemoryCreditTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, oldest first.
    pub async fn all(&self) -> Vec<CreditTransaction> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CreditTransactionRepository for InMemoryCreditTransactionRepository {
    async fn record(&self, entry: NewCreditTransaction) -> Result<CreditTransaction, DomainError> {
        let tx = entry.into_transaction();
        self.entries.write().await.push(tx.clone());
        Ok(tx)
    }

    async fn list(
        &self,
        user_id: &UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|tx| &tx.user_id == user_id)
            .filter(|tx| query.kind.map_or(true, |kind| tx.kind == kind))
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn find(
        &self,
        id: &TransactionId,
        user_id: &UserId,
    ) -> Result<Option<CreditTransaction>, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|tx| &tx.id == id && &tx.user_id == user_id)
            .cloned())
    }

    async fn has_reference(&self, user_id: &UserId, reference_id: &str) -> Result<bool, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .any(|tx| &tx.user_id == user_id && tx.reference_id.as_deref() == Some(reference_id)))
    }

    async fn total_granted(&self, user_id: &UserId) -> Result<i64, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|tx| &tx.user_id == user_id && tx.kind == CreditTransactionKind::Grant)
            .map(|tx| tx.amount)
            .sum())
    }

    async fn total_consumed(&self, user_id: &UserId) -> Result<i64, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|tx| &tx.user_id == user_id && tx.kind == CreditTransactionKind::Consume)
            .map(|tx| tx.amount.abs())
            .sum())
    }

    async fn reassign_user(&self, from: &UserId, to: &UserId) -> Result<u64, DomainError> {
        let mut entries = self.entries.write().await;
        let mut moved = 0;
        for tx in entries.iter_mut().filter(|tx| &tx.user_id == from) {
            tx.user_id = to.clone();
            moved += 1;
        }
        Ok(moved)
    }
}
