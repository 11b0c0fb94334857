//! Create and edit requests for invoices.
//!
//! These are the validated-shape inputs the engine consumes. They say *what*
//! the caller wants; stock, identifiers and totals are resolved by the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use billbook_core::{CustomerId, Money, ProductId, SellerId};
use billbook_inventory::NewProduct;
use billbook_parties::NewCustomer;

use crate::invoice::{InvoiceItemId, InvoiceStatus};

/// Who the invoice is for: an existing customer of the seller or one to create inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomerRef {
    Existing { customer_id: CustomerId },
    New(NewCustomer),
}

/// Which product a line bills: an existing catalog product or one to create inline.
///
/// Inline products are created with their own initial stock, which the line
/// then reserves from like any other product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductRef {
    Existing { product_id: ProductId },
    New(NewProduct),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product: ProductRef,
    pub quantity: i64,
    #[serde(default)]
    pub discount: Money,
}

impl LineRequest {
    pub fn existing(product_id: ProductId, quantity: i64, discount: Money) -> Self {
        Self {
            product: ProductRef::Existing { product_id },
            quantity,
            discount,
        }
    }
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub seller_id: SellerId,
    pub customer: CustomerRef,
    pub items: Vec<LineRequest>,
    pub tax: Money,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "date", rename_all = "snake_case")]
pub enum DueDateChange {
    Set(NaiveDate),
    Clear,
}

impl DueDateChange {
    pub fn into_option(self) -> Option<NaiveDate> {
        match self {
            DueDateChange::Set(d) => Some(d),
            DueDateChange::Clear => None,
        }
    }
}

/// A single line-item mutation inside an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ItemOp {
    /// Change quantity, discount and/or substitute the product of an existing line.
    Update {
        item_id: InvoiceItemId,
        #[serde(default)]
        quantity: Option<i64>,
        #[serde(default)]
        discount: Option<Money>,
        #[serde(default)]
        product_id: Option<ProductId>,
    },
    Remove {
        item_id: InvoiceItemId,
    },
    Add(LineRequest),
}

/// Command: EditInvoice. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceEdit {
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub tax: Option<Money>,
    #[serde(default)]
    pub due_date: Option<DueDateChange>,
    #[serde(default)]
    pub items: Vec<ItemOp>,
}

impl InvoiceEdit {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.tax.is_none() && self.due_date.is_none() && self.items.is_empty()
    }
}
