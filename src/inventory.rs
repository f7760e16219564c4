//! Inventory-creation collaborator.
//!
//! The extraction core hands finished scans to an [`InventoryStore`];
//! persistence itself lives outside this crate. [`InMemoryInventory`]
//! backs tests and demos.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("inventory rejected the batch: {0}")]
    Rejected(String),

    #[error("inventory storage failure: {0}")]
    Storage(String),
}

/// One batch to add: a quantity of one product sharing one expiry date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBatchRequest {
    pub product_name: String,
    pub category_name: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
}

/// A stored product batch as echoed back by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub id: u64,
    pub product_name: String,
    pub category_name: String,
    pub expiry_date: NaiveDate,
    pub quantity: u32,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn add_batch(&self, request: AddBatchRequest) -> Result<StoredProduct, InventoryError>;
}

/// In-memory inventory. Batches with the same name and expiry merge into
/// one entry with a summed quantity.
#[derive(Default)]
pub struct InMemoryInventory {
    products: Mutex<Vec<StoredProduct>>,
    next_id: AtomicU64,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<StoredProduct> {
        self.products.lock().await.clone()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn add_batch(&self, request: AddBatchRequest) -> Result<StoredProduct, InventoryError> {
        if request.product_name.trim().is_empty() {
            return Err(InventoryError::Rejected("empty product name".to_string()));
        }

        let mut products = self.products.lock().await;

        if let Some(existing) = products.iter_mut().find(|p| {
            p.product_name.eq_ignore_ascii_case(&request.product_name)
                && p.expiry_date == request.expiry_date
        }) {
            existing.quantity += request.quantity.max(1);
            return Ok(existing.clone());
        }

        let product = StoredProduct {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            product_name: request.product_name,
            category_name: request.category_name,
            expiry_date: request.expiry_date,
            quantity: request.quantity.max(1),
        };
        products.push(product.clone());
        Ok(product)
    }
}
