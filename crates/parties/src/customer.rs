use serde::{Deserialize, Serialize};

use billbook_core::{CustomerId, DomainError, SellerId};
use billbook_events::Event;

use crate::contact::{normalize_email, optional, required};

/// A seller's customer.
///
/// Emails are stored normalized (see [`normalize_email`]) and are unique
/// across all sellers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub seller_id: SellerId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Payload for creating a customer (inline on an invoice or standalone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl NewCustomer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            address: None,
        }
    }

    /// Validate and normalize the payload.
    pub fn validated(self) -> Result<NewCustomer, DomainError> {
        Ok(NewCustomer {
            name: required("name", &self.name)?,
            email: normalize_email(&self.email)?,
            phone: optional(self.phone),
            address: optional(self.address),
        })
    }
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Customer {
    pub fn create(
        id: CustomerId,
        seller_id: SellerId,
        payload: NewCustomer,
    ) -> Result<(Customer, CustomerEvent), DomainError> {
        let payload = payload.validated()?;
        let customer = Customer {
            id,
            seller_id,
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            address: payload.address,
        };
        let event = CustomerEvent::CustomerCreated(CustomerCreated {
            customer_id: id,
            name: customer.name.clone(),
            email: customer.email.clone(),
        });
        Ok((customer, event))
    }

    /// Apply an update, returning the normalized email if it changed.
    ///
    /// Uniqueness of a changed email is checked by the caller against storage.
    pub fn apply_update(
        &mut self,
        update: CustomerUpdate,
    ) -> Result<(Option<String>, CustomerEvent), DomainError> {
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
        if update.phone.is_some() {
            self.phone = optional(update.phone);
        }
        if update.address.is_some() {
            self.address = optional(update.address);
        }

        let event = CustomerEvent::CustomerUpdated(CustomerUpdated {
            customer_id: self.id,
            name: self.name.clone(),
        });
        Ok((email_changed, event))
    }

    pub fn deleted_event(&self) -> CustomerEvent {
        CustomerEvent::CustomerDeleted(CustomerDeleted {
            customer_id: self.id,
            name: self.name.clone(),
        })
    }
}

/// Event: CustomerCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCreated {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
}

/// Event: CustomerUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdated {
    pub customer_id: CustomerId,
    pub name: String,
}

/// Event: CustomerDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDeleted {
    pub customer_id: CustomerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerCreated(CustomerCreated),
    CustomerUpdated(CustomerUpdated),
    CustomerDeleted(CustomerDeleted),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerCreated(_) => "customer_created",
            CustomerEvent::CustomerUpdated(_) => "customer_updated",
            CustomerEvent::CustomerDeleted(_) => "customer_deleted",
        }
    }

    fn describe(&self) -> String {
        match self {
            CustomerEvent::CustomerCreated(e) => {
                format!("Created new customer: {} ({})", e.name, e.customer_id)
            }
            CustomerEvent::CustomerUpdated(e) => {
                format!("Updated customer: {} ({})", e.name, e.customer_id)
            }
            CustomerEvent::CustomerDeleted(e) => {
                format!("Deleted customer: {} ({})", e.name, e.customer_id)
            }
        }
    }
}
