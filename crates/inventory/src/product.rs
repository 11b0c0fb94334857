use serde::{Deserialize, Serialize};

use billbook_core::{DomainError, Money, ProductId, SellerId};
use billbook_events::Event;

/// A product in a seller's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub price: Money,
    pub description: Option<String>,
    /// Units on hand. Never negative after a committed write.
    pub stock: i64,
}

/// Payload for adding a product (from the catalog form, an invoice line, or an intent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stock: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            name: name.into(),
            price,
            description: None,
            stock,
        }
    }
}

/// Detail changes. Stock is deliberately absent: it only moves through the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub description: Option<String>,
}

fn validate_name(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name", "product name cannot be empty"));
    }
    Ok(name.to_string())
}

fn validate_price(price: Money) -> Result<Money, DomainError> {
    if price.is_negative() {
        return Err(DomainError::validation("price", "price cannot be negative"));
    }
    Ok(price)
}

impl Product {
    pub fn create(
        id: ProductId,
        seller_id: SellerId,
        payload: NewProduct,
    ) -> Result<(Product, ProductEvent), DomainError> {
        if payload.stock < 0 {
            return Err(DomainError::validation("stock", "stock cannot be negative"));
        }
        let product = Product {
            id,
            seller_id,
            name: validate_name(&payload.name)?,
            price: validate_price(payload.price)?,
            description: payload
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            stock: payload.stock,
        };
        let event = ProductEvent::ProductAdded(ProductAdded {
            product_id: id,
            name: product.name.clone(),
            stock: product.stock,
        });
        Ok((product, event))
    }

    pub fn apply_update(&mut self, update: ProductUpdate) -> Result<ProductEvent, DomainError> {
        let name = match update.name {
            Some(n) => validate_name(&n)?,
            None => self.name.clone(),
        };
        let price = match update.price {
            Some(p) => validate_price(p)?,
            None => self.price,
        };
        self.name = name;
        self.price = price;
        if let Some(d) = update.description {
            let d = d.trim();
            self.description = (!d.is_empty()).then(|| d.to_string());
        }
        Ok(ProductEvent::ProductUpdated(ProductUpdated {
            product_id: self.id,
            name: self.name.clone(),
        }))
    }

    pub fn deleted_event(&self) -> ProductEvent {
        ProductEvent::ProductDeleted(ProductDeleted {
            product_id: self.id,
            name: self.name.clone(),
        })
    }
}

/// Event: ProductAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAdded {
    pub product_id: ProductId,
    pub name: String,
    pub stock: i64,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
}

/// Event: ProductDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub name: String,
}

/// Event: StockReceived (a seller restocked a product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub product_id: ProductId,
    pub quantity: i64,
    pub new_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductAdded(ProductAdded),
    ProductUpdated(ProductUpdated),
    ProductDeleted(ProductDeleted),
    StockReceived(StockReceived),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductAdded(_) => "product_added",
            ProductEvent::ProductUpdated(_) => "product_updated",
            ProductEvent::ProductDeleted(_) => "product_deleted",
            ProductEvent::StockReceived(_) => "stock_received",
        }
    }

    fn describe(&self) -> String {
        match self {
            ProductEvent::ProductAdded(e) => {
                format!("Added new product: {} ({}) with stock {}", e.name, e.product_id, e.stock)
            }
            ProductEvent::ProductUpdated(e) => {
                format!("Updated product: {} ({})", e.name, e.product_id)
            }
            ProductEvent::ProductDeleted(e) => {
                format!("Deleted product: {} ({})", e.name, e.product_id)
            }
            ProductEvent::StockReceived(e) => format!(
                "Received {} units of {} (stock now {})",
                e.quantity, e.product_id, e.new_stock
            ),
        }
    }
}
