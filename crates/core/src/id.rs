//! Strongly-typed, human-readable identifiers used across the domain.
//!
//! Every identifier is a kind prefix followed by a zero-padded decimal counter
//! (`P001`, `C014`, `INV-120`). Padding is three digits; larger counters simply
//! grow wider (`P1000`).

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The kinds of entity that receive allocated identifiers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Seller,
    Customer,
    Product,
    Invoice,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Seller,
        EntityKind::Customer,
        EntityKind::Product,
        EntityKind::Invoice,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Seller => "S",
            EntityKind::Customer => "C",
            EntityKind::Product => "P",
            EntityKind::Invoice => "INV-",
        }
    }

    /// Stable name used as the counter key in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Seller => "seller",
            EntityKind::Customer => "customer",
            EntityKind::Product => "product",
            EntityKind::Invoice => "invoice",
        }
    }

    pub fn format(self, number: u32) -> String {
        format!("{}{:03}", self.prefix(), number)
    }

    /// Extract the numeric suffix of an identifier of this kind.
    ///
    /// Returns `None` for anything that is not `prefix` followed by ASCII digits.
    pub fn parse_suffix(self, raw: &str) -> Option<u32> {
        let digits = raw.strip_prefix(self.prefix())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a seller (tenant boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SellerId(u32);

/// Identifier of a customer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerId(u32);

/// Identifier of a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(u32);

/// Identifier of an invoice.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceId(u32);

macro_rules! impl_counter_newtype {
    ($t:ident, $kind:expr) => {
        impl $t {
            pub const KIND: EntityKind = $kind;

            pub fn from_number(number: u32) -> Self {
                Self(number)
            }

            pub fn number(&self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&Self::KIND.format(self.0))
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::KIND
                    .parse_suffix(s.trim())
                    .map(Self)
                    .ok_or_else(|| DomainError::invalid_id(format!("{}: {s:?}", stringify!($t))))
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.to_string()
            }
        }
    };
}

impl_counter_newtype!(SellerId, EntityKind::Seller);
impl_counter_newtype!(CustomerId, EntityKind::Customer);
impl_counter_newtype!(ProductId, EntityKind::Product);
impl_counter_newtype!(InvoiceId, EntityKind::Invoice);
