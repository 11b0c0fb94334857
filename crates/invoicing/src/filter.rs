use serde::{Deserialize, Serialize};

use billbook_core::{CustomerId, DateRange, Money};
use billbook_parties::Customer;

use crate::invoice::{Invoice, InvoiceStatus};

/// Listing filters. Every set field must match; text matches are
/// case-insensitive substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFilter {
    #[serde(default)]
    pub id_contains: Option<String>,
    /// Exact customer; unlike `customer_contains` this never matches a namesake.
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    /// Matched against the customer's name or email.
    #[serde(default)]
    pub customer_contains: Option<String>,
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    /// Creation-date window; the end day is inclusive.
    #[serde(default)]
    pub created: DateRange,
    #[serde(default)]
    pub min_amount: Option<Money>,
    #[serde(default)]
    pub max_amount: Option<Money>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn needle(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice, customer: Option<&Customer>) -> bool {
        if let Some(n) = needle(&self.id_contains) {
            if !contains_ci(&invoice.id().to_string(), n) {
                return false;
            }
        }
        if self.customer_id.is_some_and(|id| id != invoice.customer_id()) {
            return false;
        }
        if let Some(n) = needle(&self.customer_contains) {
            let hit = customer.is_some_and(|c| contains_ci(&c.name, n) || contains_ci(&c.email, n));
            if !hit {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != invoice.status()) {
            return false;
        }
        if !self.created.contains(invoice.created_at()) {
            return false;
        }
        if self.min_amount.is_some_and(|min| invoice.amount() < min) {
            return false;
        }
        if self.max_amount.is_some_and(|max| invoice.amount() > max) {
            return false;
        }
        true
    }

    /// Normalized text needles, for storage backends that push filtering into queries.
    pub fn id_needle(&self) -> Option<&str> {
        needle(&self.id_contains)
    }

    pub fn customer_needle(&self) -> Option<&str> {
        needle(&self.customer_contains)
    }
}
