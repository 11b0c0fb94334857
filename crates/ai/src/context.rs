use serde::{Deserialize, Serialize};

use billbook_core::{CustomerId, Money, ProductId};

/// What the assistant may know about a seller's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
}

/// Read-only context handed to the extractor alongside the user's message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentContext {
    pub products: Vec<ProductSnapshot>,
    pub customers: Vec<CustomerSnapshot>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl IntentContext {
    /// Render the context as the plain-text block sent to the model.
    pub fn render(&self) -> String {
        let mut out = String::from("Available products:\n");
        for p in &self.products {
            out.push_str(&format!(
                "- {}: {} (price {}, stock {})\n",
                p.id, p.name, p.price, p.stock
            ));
        }
        out.push_str("\nExisting customers:\n");
        for c in &self.customers {
            out.push_str(&format!("- {}: {} <{}>\n", c.id, c.name, c.email));
        }
        out
    }
}
