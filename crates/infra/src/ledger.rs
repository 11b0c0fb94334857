//! Inventory ledger: the only code path that changes a product's stock.
//!
//! Every movement runs inside the caller's transaction. A reservation is a
//! single compare-and-swap in the store; a failed reservation mutates nothing,
//! and rolling back the transaction undoes every earlier movement.

use tracing::debug;

use billbook_core::{DomainError, ProductId};
use billbook_inventory::{StockAdjustment, validate_quantity};

use crate::error::EngineError;
use crate::store::{ReserveOutcome, StoreTx};

/// Take `quantity` units of `product_id` out of stock. Returns the remaining stock.
pub async fn reserve(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    quantity: i64,
) -> Result<i64, EngineError> {
    validate_quantity(quantity)?;
    match tx.reserve_stock(product_id, quantity).await? {
        ReserveOutcome::Reserved { remaining } => {
            debug!(%product_id, quantity, remaining, "reserved stock");
            Ok(remaining)
        }
        ReserveOutcome::Insufficient { available } => Err(EngineError::from_stock(
            product_id,
            DomainError::insufficient_stock(available, quantity),
        )),
        ReserveOutcome::UnknownProduct => Err(EngineError::not_found("product", product_id)),
    }
}

/// Return `quantity` units of `product_id` to stock. Returns the new stock.
pub async fn release(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    quantity: i64,
) -> Result<i64, EngineError> {
    validate_quantity(quantity)?;
    let stock = tx
        .release_stock(product_id, quantity)
        .await?
        .ok_or_else(|| EngineError::not_found("product", product_id))?;
    debug!(%product_id, quantity, stock, "released stock");
    Ok(stock)
}

/// Apply the stock movement implied by a line going from `old_quantity` to
/// `new_quantity` units of the same product.
pub async fn adjust_for_quantity_change(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    old_quantity: i64,
    new_quantity: i64,
) -> Result<StockAdjustment, EngineError> {
    validate_quantity(new_quantity)?;
    let adjustment = StockAdjustment::for_quantity_change(old_quantity, new_quantity);
    match adjustment {
        StockAdjustment::None => {}
        StockAdjustment::Reserve(q) => {
            reserve(tx, product_id, q).await?;
        }
        StockAdjustment::Release(q) => {
            release(tx, product_id, q).await?;
        }
    }
    Ok(adjustment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BillingStore, InMemoryStore};
    use billbook_core::{Money, SellerId};
    use billbook_inventory::{NewProduct, Product};

    async fn store_with_stock(stock: i64) -> (InMemoryStore, ProductId) {
        let store = InMemoryStore::new();
        let id = ProductId::from_number(1);
        let (product, _) = Product::create(
            id,
            SellerId::from_number(1),
            NewProduct::new("Widget", Money::from_units(50), stock),
        )
        .unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&product).await.unwrap();
        tx.commit().await.unwrap();
        (store, id)
    }

    async fn stock_of(store: &InMemoryStore, id: ProductId) -> i64 {
        let mut tx = store.begin().await.unwrap();
        tx.get_product(id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn reserve_and_release_move_stock() {
        let (store, id) = store_with_stock(10).await;
        let mut tx = store.begin().await.unwrap();

        assert_eq!(reserve(tx.as_mut(), id, 3).await.unwrap(), 7);
        assert_eq!(release(tx.as_mut(), id, 2).await.unwrap(), 9);
        tx.commit().await.unwrap();

        assert_eq!(stock_of(&store, id).await, 9);
    }

    #[tokio::test]
    async fn insufficient_reserve_leaves_stock_untouched() {
        let (store, id) = store_with_stock(4).await;
        let mut tx = store.begin().await.unwrap();

        let err = reserve(tx.as_mut(), id, 6).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientStock {
                product_id: id,
                available: 4,
                requested: 6
            }
        );
        tx.commit().await.unwrap();
        assert_eq!(stock_of(&store, id).await, 4);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (store, _) = store_with_stock(1).await;
        let mut tx = store.begin().await.unwrap();
        let ghost = ProductId::from_number(99);

        match reserve(tx.as_mut(), ghost, 1).await {
            Err(EngineError::NotFound { entity: "product", .. }) => {}
            other => panic!("Expected NotFound, got {other:?}"),
        }
        match release(tx.as_mut(), ghost, 1).await {
            Err(EngineError::NotFound { entity: "product", .. }) => {}
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_positive_quantities_are_rejected() {
        let (store, id) = store_with_stock(5).await;
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            reserve(tx.as_mut(), id, 0).await,
            Err(EngineError::Validation { .. })
        ));
        assert!(matches!(
            release(tx.as_mut(), id, -2).await,
            Err(EngineError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn quantity_change_applies_signed_delta() {
        let (store, id) = store_with_stock(10).await;
        let mut tx = store.begin().await.unwrap();

        assert_eq!(
            adjust_for_quantity_change(tx.as_mut(), id, 3, 5).await.unwrap(),
            StockAdjustment::Reserve(2)
        );
        assert_eq!(
            adjust_for_quantity_change(tx.as_mut(), id, 5, 1).await.unwrap(),
            StockAdjustment::Release(4)
        );
        assert_eq!(
            adjust_for_quantity_change(tx.as_mut(), id, 1, 1).await.unwrap(),
            StockAdjustment::None
        );
        tx.commit().await.unwrap();
        assert_eq!(stock_of(&store, id).await, 12);
    }

    #[tokio::test]
    async fn growing_past_stock_fails_without_change() {
        let (store, id) = store_with_stock(2).await;
        let mut tx = store.begin().await.unwrap();

        let err = adjust_for_quantity_change(tx.as_mut(), id, 1, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { requested: 3, .. }));
        tx.commit().await.unwrap();
        assert_eq!(stock_of(&store, id).await, 2);
    }
}
