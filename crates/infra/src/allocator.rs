//! Human-readable identifier allocation (`S001`, `C014`, `P120`, `INV-007`).
//!
//! Each kind has a monotonic counter row that is read and written inside the
//! caller's transaction, so two concurrent allocations of the same kind either
//! serialize on the counter lock or one of them fails with a retryable conflict.
//! A missing counter is seeded from the highest suffix already in storage.

use tracing::debug;

use billbook_core::{CustomerId, DomainError, EntityKind, InvoiceId, ProductId, SellerId};

use crate::error::EngineError;
use crate::store::StoreTx;

/// Allocate the next free number for `kind`.
pub async fn allocate(tx: &mut dyn StoreTx, kind: EntityKind) -> Result<u32, EngineError> {
    let last = match tx.counter_value(kind).await? {
        Some(value) => value,
        None => tx.max_allocated_suffix(kind).await?.unwrap_or(0),
    };

    let mut candidate = next(kind, last)?;
    // Rows inserted without going through the counter (imports, legacy data).
    while tx.id_exists(kind, candidate).await? {
        candidate = next(kind, candidate)?;
    }

    tx.store_counter(kind, candidate).await?;
    debug!(%kind, id = %kind.format(candidate), "allocated identifier");
    Ok(candidate)
}

fn next(kind: EntityKind, value: u32) -> Result<u32, EngineError> {
    value.checked_add(1).ok_or_else(|| {
        DomainError::invariant(format!("{kind} identifier space exhausted")).into()
    })
}

pub async fn seller_id(tx: &mut dyn StoreTx) -> Result<SellerId, EngineError> {
    allocate(tx, EntityKind::Seller).await.map(SellerId::from_number)
}

pub async fn customer_id(tx: &mut dyn StoreTx) -> Result<CustomerId, EngineError> {
    allocate(tx, EntityKind::Customer)
        .await
        .map(CustomerId::from_number)
}

pub async fn product_id(tx: &mut dyn StoreTx) -> Result<ProductId, EngineError> {
    allocate(tx, EntityKind::Product)
        .await
        .map(ProductId::from_number)
}

pub async fn invoice_id(tx: &mut dyn StoreTx) -> Result<InvoiceId, EngineError> {
    allocate(tx, EntityKind::Invoice)
        .await
        .map(InvoiceId::from_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BillingStore, InMemoryStore};
    use billbook_core::Money;
    use billbook_inventory::{NewProduct, Product};

    #[tokio::test]
    async fn first_allocation_starts_at_one() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let id = invoice_id(tx.as_mut()).await.unwrap();
        assert_eq!(id.to_string(), "INV-001");
        let id = invoice_id(tx.as_mut()).await.unwrap();
        assert_eq!(id.to_string(), "INV-002");
    }

    #[tokio::test]
    async fn seeds_from_existing_rows_and_skips_taken_ids() {
        let store = InMemoryStore::new();
        let seller = SellerId::from_number(1);
        let mut tx = store.begin().await.unwrap();
        for n in [3, 4] {
            let (product, _) = Product::create(
                ProductId::from_number(n),
                seller,
                NewProduct::new("Widget", Money::from_units(1), 1),
            )
            .unwrap();
            tx.insert_product(&product).await.unwrap();
        }

        // No counter yet: reconciled from the highest existing suffix.
        assert_eq!(product_id(tx.as_mut()).await.unwrap().to_string(), "P005");

        // Counter behind reality: walks past ids that are already taken.
        tx.store_counter(EntityKind::Product, 2).await.unwrap();
        assert_eq!(product_id(tx.as_mut()).await.unwrap().to_string(), "P005");
    }

    #[tokio::test]
    async fn ids_widen_past_three_digits() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.store_counter(EntityKind::Customer, 999).await.unwrap();

        assert_eq!(customer_id(tx.as_mut()).await.unwrap().to_string(), "C1000");
    }

    #[tokio::test]
    async fn uncommitted_allocation_is_not_recorded() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            seller_id(tx.as_mut()).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert_eq!(seller_id(tx.as_mut()).await.unwrap().to_string(), "S001");
    }
}
