use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use billbook_core::{CustomerId, DomainError, InvoiceId, Money, ProductId, SellerId};
use billbook_events::Event;
use billbook_inventory::validate_quantity;

/// Invoice status lifecycle.
///
/// `pending -> overdue -> paid`, `pending -> paid`, anything open `-> cancelled`.
/// `paid` only moves on explicit edit (back to `pending`, or to `cancelled`).
/// `cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Overdue,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(InvoiceStatus::Pending),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "paid" => Ok(InvoiceStatus::Paid),
            "cancelled" | "canceled" => Ok(InvoiceStatus::Cancelled),
            other => Err(DomainError::validation(
                "status",
                format!("unknown invoice status {other:?}"),
            )),
        }
    }

    pub fn can_transition_to(self, target: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, target) {
            (Cancelled, _) => false,
            (_, Cancelled) => true,
            (Pending, Overdue | Paid) | (Overdue, Pending | Paid) | (Paid, Pending) => true,
            (a, b) => a == b,
        }
    }

    /// Statuses whose amount is still owed.
    pub fn is_outstanding(self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::Overdue)
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a line item (internal, not human-facing).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceItemId(Uuid);

impl InvoiceItemId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InvoiceItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for InvoiceItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One product line on an invoice.
///
/// `unit_price` is the product price captured when the line was created (or its
/// product substituted), so later catalog price changes never alter the amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Money,
}

impl InvoiceItem {
    pub fn new(
        product_id: ProductId,
        quantity: i64,
        unit_price: Money,
        discount: Money,
    ) -> Result<Self, DomainError> {
        let item = Self {
            id: InvoiceItemId::new(),
            product_id,
            quantity,
            unit_price,
            discount,
        };
        item.validate()?;
        Ok(item)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_quantity(self.quantity)?;
        if self.unit_price.is_negative() {
            return Err(DomainError::validation("price", "unit price cannot be negative"));
        }
        if self.discount.is_negative() {
            return Err(DomainError::validation("discount", "discount cannot be negative"));
        }
        if self.discount > self.subtotal()? {
            return Err(DomainError::validation(
                "discount",
                "discount cannot exceed the line subtotal",
            ));
        }
        Ok(())
    }

    pub fn subtotal(&self) -> Result<Money, DomainError> {
        self.unit_price.checked_mul_qty(self.quantity)
    }

    pub fn total(&self) -> Result<Money, DomainError> {
        self.subtotal()?.checked_sub(self.discount)
    }
}

/// Stored field values used to rebuild an [`Invoice`] from persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceParts {
    pub id: InvoiceId,
    pub seller_id: SellerId,
    pub customer_id: CustomerId,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
    pub tax: Money,
    pub amount: Money,
    pub items: Vec<InvoiceItem>,
}

/// Invoice with its ordered line items.
///
/// Invariant: `amount == sum(item.total()) + tax` whenever the value is handed
/// to storage. Mutators leave `amount` stale until [`Invoice::recompute_amount`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    id: InvoiceId,
    seller_id: SellerId,
    customer_id: CustomerId,
    created_at: DateTime<Utc>,
    due_date: Option<NaiveDate>,
    status: InvoiceStatus,
    tax: Money,
    amount: Money,
    items: Vec<InvoiceItem>,
}

impl Invoice {
    /// Issue a new invoice. Status starts `pending`, or `overdue` when the due
    /// date already lies before `now`'s calendar day.
    pub fn issue(
        id: InvoiceId,
        seller_id: SellerId,
        customer_id: CustomerId,
        items: Vec<InvoiceItem>,
        tax: Money,
        due_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<(Invoice, InvoiceEvent), DomainError> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "items",
                "an invoice needs at least one item",
            ));
        }
        validate_tax(tax)?;

        let mut invoice = Invoice {
            id,
            seller_id,
            customer_id,
            created_at: now,
            due_date,
            status: InvoiceStatus::Pending,
            tax,
            amount: Money::ZERO,
            items,
        };
        invoice.recompute_amount()?;
        invoice.refresh_overdue(now.date_naive());

        let event = InvoiceEvent::InvoiceCreated(InvoiceCreated {
            invoice_id: id,
            customer_id,
            amount: invoice.amount,
            status: invoice.status,
        });
        Ok((invoice, event))
    }

    /// Rebuild from stored values, checking the amount invariant.
    pub fn restore(parts: InvoiceParts) -> Result<Invoice, DomainError> {
        let invoice = Invoice {
            id: parts.id,
            seller_id: parts.seller_id,
            customer_id: parts.customer_id,
            created_at: parts.created_at,
            due_date: parts.due_date,
            status: parts.status,
            tax: parts.tax,
            amount: parts.amount,
            items: parts.items,
        };
        let computed = invoice.computed_amount()?;
        if computed != invoice.amount {
            return Err(DomainError::invariant(format!(
                "invoice {} stored amount {} does not match computed {}",
                invoice.id, invoice.amount, computed
            )));
        }
        Ok(invoice)
    }

    pub fn id(&self) -> InvoiceId {
        self.id
    }

    pub fn seller_id(&self) -> SellerId {
        self.seller_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn items(&self) -> &[InvoiceItem] {
        &self.items
    }

    pub fn item(&self, item_id: InvoiceItemId) -> Option<&InvoiceItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.due_date.is_some_and(|due| due < today)
    }

    /// Invariant: cancelled invoices are immutable.
    pub fn ensure_mutable(&self) -> Result<(), DomainError> {
        if self.status == InvoiceStatus::Cancelled {
            return Err(DomainError::invalid_state(format!(
                "invoice {} is cancelled and cannot be edited",
                self.id
            )));
        }
        Ok(())
    }

    pub fn set_tax(&mut self, tax: Money) -> Result<(), DomainError> {
        self.ensure_mutable()?;
        self.tax = validate_tax(tax)?;
        Ok(())
    }

    pub fn set_due_date(&mut self, due_date: Option<NaiveDate>) -> Result<(), DomainError> {
        self.ensure_mutable()?;
        self.due_date = due_date;
        Ok(())
    }

    pub fn add_item(&mut self, item: InvoiceItem) -> Result<(), DomainError> {
        self.ensure_mutable()?;
        item.validate()?;
        self.items.push(item);
        Ok(())
    }

    pub fn item_mut(&mut self, item_id: InvoiceItemId) -> Result<&mut InvoiceItem, DomainError> {
        self.ensure_mutable()?;
        self.items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(DomainError::not_found)
    }

    pub fn remove_item(&mut self, item_id: InvoiceItemId) -> Result<InvoiceItem, DomainError> {
        self.ensure_mutable()?;
        let pos = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(DomainError::not_found)?;
        Ok(self.items.remove(pos))
    }

    fn computed_amount(&self) -> Result<Money, DomainError> {
        let mut total = self.tax;
        for item in &self.items {
            item.validate()?;
            total = total.checked_add(item.total()?)?;
        }
        Ok(total)
    }

    /// Re-derive `amount` from the items and tax.
    pub fn recompute_amount(&mut self) -> Result<Money, DomainError> {
        self.amount = self.computed_amount()?;
        Ok(self.amount)
    }

    /// Explicit status change requested by a seller. Cancellation is not
    /// accepted here because it must release stock; use [`Invoice::cancel`].
    pub fn transition_to(
        &mut self,
        target: InvoiceStatus,
        today: NaiveDate,
    ) -> Result<bool, DomainError> {
        if target == InvoiceStatus::Cancelled {
            return Err(DomainError::invariant(
                "cancellation must go through cancel()",
            ));
        }
        if self.status == target {
            return Ok(false);
        }
        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_state(format!(
                "invoice {} cannot move from {} to {}",
                self.id, self.status, target
            )));
        }
        if target == InvoiceStatus::Overdue && !self.is_past_due(today) {
            return Err(DomainError::validation(
                "status",
                "an invoice can only be overdue once its due date has passed",
            ));
        }
        self.status = target;
        Ok(true)
    }

    /// Re-apply the due-date rule after an edit. Only open statuses move.
    pub fn refresh_overdue(&mut self, today: NaiveDate) -> bool {
        match self.status {
            InvoiceStatus::Pending if self.is_past_due(today) => {
                self.status = InvoiceStatus::Overdue;
                true
            }
            InvoiceStatus::Overdue if !self.is_past_due(today) => {
                self.status = InvoiceStatus::Pending;
                true
            }
            _ => false,
        }
    }

    /// Sweep rule: `pending` with a due date before `as_of` becomes `overdue`.
    pub fn mark_overdue(&mut self, as_of: NaiveDate) -> bool {
        if self.status == InvoiceStatus::Pending && self.is_past_due(as_of) {
            self.status = InvoiceStatus::Overdue;
            return true;
        }
        false
    }

    /// Move to `cancelled`. Returns `false` when already cancelled, in which
    /// case the caller must not release stock again.
    pub fn cancel(&mut self) -> bool {
        if self.status == InvoiceStatus::Cancelled {
            return false;
        }
        self.status = InvoiceStatus::Cancelled;
        true
    }

    pub fn ensure_deletable(&self) -> Result<(), DomainError> {
        if self.status != InvoiceStatus::Cancelled {
            return Err(DomainError::invalid_state(format!(
                "invoice {} must be cancelled before it can be deleted",
                self.id
            )));
        }
        Ok(())
    }

    pub fn updated_event(&self) -> InvoiceEvent {
        InvoiceEvent::InvoiceUpdated(InvoiceUpdated {
            invoice_id: self.id,
            amount: self.amount,
            status: self.status,
        })
    }
}

fn validate_tax(tax: Money) -> Result<Money, DomainError> {
    if tax.is_negative() {
        return Err(DomainError::validation("tax", "tax cannot be negative"));
    }
    Ok(tax)
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub status: InvoiceStatus,
}

/// Event: InvoiceUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdated {
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub status: InvoiceStatus,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub invoice_id: InvoiceId,
    pub released_units: i64,
}

/// Event: InvoiceDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDeleted {
    pub invoice_id: InvoiceId,
}

/// Event: InvoicesMarkedOverdue (one per sweep that changed anything).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicesMarkedOverdue {
    pub invoice_ids: Vec<InvoiceId>,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoiceUpdated(InvoiceUpdated),
    InvoiceCancelled(InvoiceCancelled),
    InvoiceDeleted(InvoiceDeleted),
    InvoicesMarkedOverdue(InvoicesMarkedOverdue),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoice_created",
            InvoiceEvent::InvoiceUpdated(_) => "invoice_updated",
            InvoiceEvent::InvoiceCancelled(_) => "invoice_cancelled",
            InvoiceEvent::InvoiceDeleted(_) => "invoice_deleted",
            InvoiceEvent::InvoicesMarkedOverdue(_) => "invoices_marked_overdue",
        }
    }

    fn describe(&self) -> String {
        match self {
            InvoiceEvent::InvoiceCreated(e) => format!(
                "Created invoice {} for customer {} ({}, {})",
                e.invoice_id, e.customer_id, e.amount, e.status
            ),
            InvoiceEvent::InvoiceUpdated(e) => {
                format!("Updated invoice {} ({}, {})", e.invoice_id, e.amount, e.status)
            }
            InvoiceEvent::InvoiceCancelled(e) => format!(
                "Cancelled invoice {} and returned {} units to stock",
                e.invoice_id, e.released_units
            ),
            InvoiceEvent::InvoiceDeleted(e) => format!("Deleted invoice {}", e.invoice_id),
            InvoiceEvent::InvoicesMarkedOverdue(e) => format!(
                "Marked {} invoice(s) overdue as of {}",
                e.invoice_ids.len(),
                e.as_of
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn widget_line(quantity: i64, discount_cents: i64) -> InvoiceItem {
        InvoiceItem::new(
            ProductId::from_number(1),
            quantity,
            Money::from_units(50),
            Money::from_cents(discount_cents),
        )
        .unwrap()
    }

    fn issue(due: Option<NaiveDate>) -> Invoice {
        Invoice::issue(
            InvoiceId::from_number(1),
            SellerId::from_number(1),
            CustomerId::from_number(1),
            vec![widget_line(3, 500)],
            Money::from_units(10),
            due,
            test_time(),
        )
        .unwrap()
        .0
    }

    #[test]
    fn issue_computes_amount_from_items_and_tax() {
        let (invoice, event) = Invoice::issue(
            InvoiceId::from_number(1),
            SellerId::from_number(1),
            CustomerId::from_number(1),
            vec![widget_line(3, 500)],
            Money::from_units(10),
            Some(day(2024, 1, 31)),
            test_time(),
        )
        .unwrap();

        assert_eq!(invoice.items()[0].total().unwrap(), Money::from_units(145));
        assert_eq!(invoice.amount(), Money::from_units(155));
        assert_eq!(invoice.status(), InvoiceStatus::Pending);
        assert_eq!(event.event_type(), "invoice_created");
    }

    #[test]
    fn issue_with_past_due_date_starts_overdue() {
        let invoice = issue(Some(day(2024, 1, 14)));
        assert_eq!(invoice.status(), InvoiceStatus::Overdue);

        let invoice = issue(Some(day(2024, 1, 15)));
        assert_eq!(invoice.status(), InvoiceStatus::Pending);
    }

    #[test]
    fn issue_rejects_empty_items_and_negative_tax() {
        let err = Invoice::issue(
            InvoiceId::from_number(1),
            SellerId::from_number(1),
            CustomerId::from_number(1),
            vec![],
            Money::ZERO,
            None,
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "items"));

        let err = Invoice::issue(
            InvoiceId::from_number(1),
            SellerId::from_number(1),
            CustomerId::from_number(1),
            vec![widget_line(1, 0)],
            Money::from_cents(-1),
            None,
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "tax"));
    }

    #[test]
    fn discount_cannot_exceed_line_subtotal() {
        let err = InvoiceItem::new(
            ProductId::from_number(1),
            1,
            Money::from_units(5),
            Money::from_units(6),
        )
        .unwrap_err();
        match err {
            DomainError::Validation { field, .. } if field == "discount" => {}
            other => panic!("Expected discount validation error, got {other:?}"),
        }
    }

    #[test]
    fn restore_detects_amount_drift() {
        let invoice = issue(None);
        let mut parts = InvoiceParts {
            id: invoice.id(),
            seller_id: invoice.seller_id(),
            customer_id: invoice.customer_id(),
            created_at: invoice.created_at(),
            due_date: invoice.due_date(),
            status: invoice.status(),
            tax: invoice.tax(),
            amount: invoice.amount(),
            items: invoice.items().to_vec(),
        };
        assert_eq!(Invoice::restore(parts.clone()).unwrap(), invoice);

        parts.amount = Money::from_units(1);
        match Invoice::restore(parts).unwrap_err() {
            DomainError::InvariantViolation(msg) if msg.contains("does not match") => {}
            other => panic!("Expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_invoice_is_immutable() {
        let mut invoice = issue(None);
        assert!(invoice.cancel());
        assert!(!invoice.cancel());

        assert!(matches!(invoice.set_tax(Money::ZERO), Err(DomainError::InvalidState(_))));
        assert!(matches!(
            invoice.transition_to(InvoiceStatus::Paid, day(2024, 1, 15)),
            Err(DomainError::InvalidState(_))
        ));
        let item_id = invoice.items()[0].id;
        assert!(matches!(invoice.remove_item(item_id), Err(DomainError::InvalidState(_))));
        assert!(invoice.ensure_deletable().is_ok());
    }

    #[test]
    fn only_cancelled_invoices_are_deletable() {
        let invoice = issue(None);
        assert!(matches!(invoice.ensure_deletable(), Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn transition_rules() {
        let today = day(2024, 1, 15);
        let mut invoice = issue(Some(day(2024, 1, 20)));

        match invoice.transition_to(InvoiceStatus::Overdue, today) {
            Err(DomainError::Validation { field, .. }) if field == "status" => {}
            other => panic!("Expected validation error, got {other:?}"),
        }

        assert!(invoice.transition_to(InvoiceStatus::Paid, today).unwrap());
        assert!(matches!(
            invoice.transition_to(InvoiceStatus::Overdue, today),
            Err(DomainError::InvalidState(_))
        ));
        assert!(invoice.transition_to(InvoiceStatus::Pending, today).unwrap());
        assert!(!invoice.transition_to(InvoiceStatus::Pending, today).unwrap());
        assert!(matches!(
            invoice.transition_to(InvoiceStatus::Cancelled, today),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn status_machine_table() {
        use InvoiceStatus::*;
        assert!(Pending.can_transition_to(Overdue));
        assert!(Overdue.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Overdue));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn refresh_overdue_follows_due_date_both_ways() {
        let mut invoice = issue(Some(day(2024, 1, 20)));
        assert!(!invoice.refresh_overdue(day(2024, 1, 20)));
        assert!(invoice.refresh_overdue(day(2024, 1, 21)));
        assert_eq!(invoice.status(), InvoiceStatus::Overdue);

        invoice.set_due_date(Some(day(2024, 2, 1))).unwrap();
        assert!(invoice.refresh_overdue(day(2024, 1, 21)));
        assert_eq!(invoice.status(), InvoiceStatus::Pending);
    }

    #[test]
    fn mark_overdue_leaves_paid_alone() {
        let mut invoice = issue(Some(day(2024, 1, 20)));
        invoice.transition_to(InvoiceStatus::Paid, day(2024, 1, 15)).unwrap();
        assert!(!invoice.mark_overdue(day(2024, 2, 1)));
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
    }

    #[test]
    fn status_parse_accepts_both_spellings() {
        assert_eq!(InvoiceStatus::parse("Canceled").unwrap(), InvoiceStatus::Cancelled);
        assert_eq!(InvoiceStatus::parse("paid").unwrap(), InvoiceStatus::Paid);
        assert!(InvoiceStatus::parse("void").is_err());
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Add(i64, i64, i64),
        SetQuantity(usize, i64),
        SetDiscount(usize, i64),
        Remove(usize),
        Tax(i64),
    }

    fn edit_strategy() -> impl Strategy<Value = Edit> {
        prop_oneof![
            (1i64..20, 0i64..10_000, 0i64..500).prop_map(|(q, p, d)| Edit::Add(q, p, d)),
            (0usize..8, 1i64..20).prop_map(|(i, q)| Edit::SetQuantity(i, q)),
            (0usize..8, 0i64..2_000).prop_map(|(i, d)| Edit::SetDiscount(i, d)),
            (0usize..8).prop_map(Edit::Remove),
            (0i64..5_000).prop_map(Edit::Tax),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn amount_equals_items_plus_tax_after_any_edits(
            edits in proptest::collection::vec(edit_strategy(), 0..24),
        ) {
            let mut invoice = issue(None);
            for edit in edits {
                let before = invoice.clone();
                let ids: Vec<_> = invoice.items().iter().map(|i| i.id).collect();
                let result = match edit {
                    Edit::Add(q, p, d) => InvoiceItem::new(
                        ProductId::from_number(2),
                        q,
                        Money::from_cents(p),
                        Money::from_cents(d),
                    )
                    .and_then(|item| invoice.add_item(item)),
                    Edit::SetQuantity(i, q) => match ids.get(i) {
                        Some(id) => invoice.item_mut(*id).map(|item| item.quantity = q),
                        None => Ok(()),
                    },
                    Edit::SetDiscount(i, d) => match ids.get(i) {
                        Some(id) => invoice
                            .item_mut(*id)
                            .map(|item| item.discount = Money::from_cents(d)),
                        None => Ok(()),
                    },
                    Edit::Remove(i) => match ids.get(i) {
                        Some(id) => invoice.remove_item(*id).map(|_| ()),
                        None => Ok(()),
                    },
                    Edit::Tax(t) => invoice.set_tax(Money::from_cents(t)),
                };
                if result.and_then(|_| invoice.recompute_amount()).is_err() {
                    invoice = before;
                }

                let expected = invoice
                    .items()
                    .iter()
                    .map(|i| i.total().unwrap())
                    .sum::<Money>()
                    .checked_add(invoice.tax())
                    .unwrap();
                prop_assert_eq!(invoice.amount(), expected);
            }
        }
    }
}
