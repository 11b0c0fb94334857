//! Pure stock arithmetic.
//!
//! Stock is a non-negative count. These helpers compute the next value or
//! refuse; applying them atomically is the ledger's job.

use billbook_core::DomainError;

/// Quantities on invoice lines and stock movements must be positive.
pub fn validate_quantity(quantity: i64) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation(
            "quantity",
            "quantity must be a positive integer",
        ));
    }
    Ok(())
}

/// Take `quantity` units out of `stock`.
pub fn reserve(stock: i64, quantity: i64) -> Result<i64, DomainError> {
    validate_quantity(quantity)?;
    if stock < quantity {
        return Err(DomainError::insufficient_stock(stock, quantity));
    }
    Ok(stock - quantity)
}

/// Put `quantity` units back into `stock`.
pub fn release(stock: i64, quantity: i64) -> Result<i64, DomainError> {
    validate_quantity(quantity)?;
    stock
        .checked_add(quantity)
        .ok_or_else(|| DomainError::validation("quantity", "stock out of range"))
}

/// The stock movement implied by changing a line's quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StockAdjustment {
    None,
    Reserve(i64),
    Release(i64),
}

impl StockAdjustment {
    pub fn for_quantity_change(old_quantity: i64, new_quantity: i64) -> Self {
        match new_quantity - old_quantity {
            0 => StockAdjustment::None,
            d if d > 0 => StockAdjustment::Reserve(d),
            d => StockAdjustment::Release(-d),
        }
    }

    pub fn apply(self, stock: i64) -> Result<i64, DomainError> {
        match self {
            StockAdjustment::None => Ok(stock),
            StockAdjustment::Reserve(q) => reserve(stock, q),
            StockAdjustment::Release(q) => release(stock, q),
        }
    }
}
