//! The credit ledger: balances and finalized transaction history.
//!
//! The ledger is dumb on purpose — it applies transactions the witness
//! engine has already validated. Application is idempotent by transaction
//! id, so replayed awards and gossip loops cannot double-spend.
//!
//! Store layout:
//!   credit/balance/{peer}  → f64
//!   credit/history/{tx_id} → CreditTransaction

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use weft_core::schema::CreditTransaction;
use weft_mesh::{KvStore, KvStoreExt, StoreError};

/// Ledger entry source for minted rewards (asset seeding and friends).
pub const MINT: &str = "MESH";

pub struct CreditLedger {
    store: Arc<dyn KvStore>,
    genesis_balance: f64,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn KvStore>, genesis_balance: f64) -> Self {
        Self {
            store,
            genesis_balance,
        }
    }

    /// A peer's balance. First touch grants the genesis balance and
    /// persists it, so every replica agrees on the starting point.
    pub async fn balance(&self, peer: &str) -> Result<f64, CreditError> {
        let key = balance_key(peer);
        match self.store.get_as::<f64>(&key).await? {
            Some(balance) => Ok(balance),
            None => {
                self.store.put_as(&key, &self.genesis_balance).await?;
                Ok(self.genesis_balance)
            }
        }
    }

    /// Apply a finalized transaction. Returns `false` when the id was
    /// already in history (replay) — balances are untouched.
    pub async fn apply(&self, tx: &CreditTransaction) -> Result<bool, CreditError> {
        let history_key = format!("credit/history/{}", tx.id);
        if self.store.get(&history_key).await?.is_some() {
            return Ok(false);
        }

        if tx.from != MINT {
            let from_balance = self.balance(&tx.from).await?;
            self.store
                .put_as(&balance_key(&tx.from), &(from_balance - tx.amount))
                .await?;
        }
        let to_balance = self.balance(&tx.to).await?;
        self.store
            .put_as(&balance_key(&tx.to), &(to_balance + tx.amount))
            .await?;
        self.store.put_as(&history_key, tx).await?;

        info!(
            tx = tx.id.as_str(),
            to = tx.to.as_str(),
            amount = tx.amount,
            "credit applied"
        );
        Ok(true)
    }

    /// Finalized transactions, in id order.
    pub async fn history(&self) -> Result<Vec<CreditTransaction>, CreditError> {
        let mut txs = Vec::new();
        for key in self.store.keys_with_prefix("credit/history/").await? {
            if let Some(tx) = self.store.get_as::<CreditTransaction>(&key).await? {
                txs.push(tx);
            }
        }
        Ok(txs)
    }
}

fn balance_key(peer: &str) -> String {
    format!("credit/balance/{peer}")
}

#[derive(Debug, Error)]
pub enum CreditError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] weft_core::CryptoError),

    #[error("reason {0:?} is not a recognized contribution")]
    UnrecognizedReason(String),
}
