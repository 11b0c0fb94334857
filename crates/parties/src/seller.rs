use serde::{Deserialize, Serialize};

use billbook_core::{DomainError, SellerId};
use billbook_events::Event;

use crate::contact::{normalize_email, optional, required};

/// Opaque login credential (e.g. a password hash produced by the auth layer).
///
/// Never serialized and redacted from `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A seller: the tenant that owns products, customers and invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    pub id: SellerId,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[serde(skip)]
    pub credential: Credential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSeller {
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub credential: Credential,
}

impl Seller {
    pub fn register(id: SellerId, payload: NewSeller) -> Result<(Seller, SellerEvent), DomainError> {
        let seller = Seller {
            id,
            name: required("name", &payload.name)?,
            email: normalize_email(&payload.email)?,
            address: optional(payload.address),
            phone: optional(payload.phone),
            credential: payload.credential,
        };
        let event = SellerEvent::SellerRegistered(SellerRegistered {
            seller_id: id,
            name: seller.name.clone(),
        });
        Ok((seller, event))
    }
}

/// Partial profile update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Seller {
    /// Apply an update, returning the normalized email if it changed.
    ///
    /// Uniqueness of a changed email is checked by the caller against storage.
    pub fn apply_update(
        &mut self,
        update: SellerUpdate,
    ) -> Result<(Option<String>, SellerEvent), DomainError> {
        let name = match update.name {
            Some(n) => required("name", &n)?,
            None => self.name.clone(),
        };
        let email = match update.email {
            Some(e) => normalize_email(&e)?,
            None => self.email.clone(),
        };
        let email_changed = (email != self.email).then(|| email.clone());

        self.name = name;
        self.email = email;
        if update.address.is_some() {
            self.address = optional(update.address);
        }
        if update.phone.is_some() {
            self.phone = optional(update.phone);
        }

        let event = SellerEvent::SellerUpdated(SellerUpdated {
            seller_id: self.id,
            name: self.name.clone(),
        });
        Ok((email_changed, event))
    }

    pub fn deleted_event(&self) -> SellerEvent {
        SellerEvent::SellerDeleted(SellerDeleted {
            seller_id: self.id,
            name: self.name.clone(),
        })
    }
}

/// Event: SellerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRegistered {
    pub seller_id: SellerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerUpdated {
    pub seller_id: SellerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerDeleted {
    pub seller_id: SellerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellerEvent {
    SellerRegistered(SellerRegistered),
    SellerUpdated(SellerUpdated),
    SellerDeleted(SellerDeleted),
}

impl Event for SellerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SellerEvent::SellerRegistered(_) => "seller_registered",
            SellerEvent::SellerUpdated(_) => "seller_updated",
            SellerEvent::SellerDeleted(_) => "seller_deleted",
        }
    }

    fn describe(&self) -> String {
        match self {
            SellerEvent::SellerRegistered(e) => {
                format!("Registered seller: {} ({})", e.name, e.seller_id)
            }
            SellerEvent::SellerUpdated(e) => {
                format!("Updated seller: {} ({})", e.name, e.seller_id)
            }
            SellerEvent::SellerDeleted(e) => {
                format!("Deleted seller: {} ({})", e.name, e.seller_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> NewSeller {
        NewSeller {
            name: "Acme Supplies".to_string(),
            email: "Owner@Acme.test".to_string(),
            address: None,
            phone: Some(" ".to_string()),
            credential: Credential::new("argon2$hash"),
        }
    }

    #[test]
    fn register_normalizes_email() {
        let (seller, event) = Seller::register(SellerId::from_number(1), payload()).unwrap();
        assert_eq!(seller.email, "owner@acme.test");
        assert_eq!(seller.phone, None);
        assert_eq!(event.describe(), "Registered seller: Acme Supplies (S001)");
    }

    #[test]
    fn credential_never_leaks() {
        let (seller, _) = Seller::register(SellerId::from_number(1), payload()).unwrap();
        let json = serde_json::to_string(&seller).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!format!("{seller:?}").contains("argon2"));
        assert_eq!(seller.credential.expose(), "argon2$hash");
    }

    #[test]
    fn update_reports_email_change_only_when_it_differs() {
        let (mut seller, _) = Seller::register(SellerId::from_number(1), payload()).unwrap();

        let (changed, _) = seller
            .apply_update(SellerUpdate {
                email: Some("OWNER@acme.test".into()),
                ..SellerUpdate::default()
            })
            .unwrap();
        assert_eq!(changed, None);

        let (changed, event) = seller
            .apply_update(SellerUpdate {
                name: Some("Acme Wholesale".into()),
                email: Some("Sales@Acme.test".into()),
                phone: Some("555-0199".into()),
                ..SellerUpdate::default()
            })
            .unwrap();
        assert_eq!(changed.as_deref(), Some("sales@acme.test"));
        assert_eq!(seller.phone.as_deref(), Some("555-0199"));
        assert_eq!(event.event_type(), "seller_updated");
        assert_eq!(event.describe(), "Updated seller: Acme Wholesale (S001)");
    }

    #[test]
    fn update_rejects_blank_name() {
        let (mut seller, _) = Seller::register(SellerId::from_number(1), payload()).unwrap();
        let err = seller
            .apply_update(SellerUpdate {
                name: Some("  ".into()),
                ..SellerUpdate::default()
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
        assert_eq!(seller.name, "Acme Supplies");
    }
}
