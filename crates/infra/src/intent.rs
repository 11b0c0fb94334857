//! Acting on the assistant's intents.
//!
//! An [`IntentResponse`] is untrusted input. Every field is checked here the
//! same way a submitted form would be, then the regular engine operation runs
//! and checks it again. Nothing the assistant says is applied without going
//! through those operations.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument, warn};

use billbook_ai::{
    AddCustomerIntent, AddProductIntent, ConversationTurn, CreateInvoiceIntent, CustomerSnapshot,
    Intent, IntentContext, IntentExtractor, IntentLine, IntentRequest, IntentResponse,
    ProductSnapshot,
};
use billbook_core::{Money, SellerId};
use billbook_inventory::{NewProduct, Product};
use billbook_invoicing::{CreateInvoice, CustomerRef, LineRequest, ProductRef};
use billbook_parties::{Customer, NewCustomer};

use crate::engine::BillingEngine;
use crate::error::EngineError;
use crate::store::BillingStore;

const EXTRACTION_FAILED: &str = "Sorry, I couldn't process that request. Please try again.";
const NOT_UNDERSTOOD: &str = "I'm not sure what you'd like me to do. Try asking me to create an invoice, add a customer or add a product.";

/// What happened to one intent, phrased for the person who asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentOutcome {
    pub success: bool,
    pub intent: &'static str,
    pub message: String,
    /// Identifier of the record created, if any.
    pub created_id: Option<String>,
    /// Follow-up questions when the request was incomplete.
    pub missing_info: Vec<String>,
}

impl IntentOutcome {
    fn done(intent: &'static str, id: String, message: String) -> Self {
        Self {
            success: true,
            intent,
            message,
            created_id: Some(id),
            missing_info: Vec::new(),
        }
    }

    fn failed(intent: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            intent,
            message: message.into(),
            created_id: None,
            missing_info: Vec::new(),
        }
    }
}

fn required_text(field: &str, value: Option<String>) -> Result<String, EngineError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EngineError::validation(field, format!("{field} is required")))
}

fn parse_due_date(raw: Option<String>) -> Result<Option<NaiveDate>, EngineError> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| EngineError::validation("due_date", format!("{s:?} is not a YYYY-MM-DD date"))),
    }
}

/// Resolve the customer named by an invoice intent against the seller's customers.
fn customer_ref(
    data: &CreateInvoiceIntent,
    customers: &[Customer],
) -> Result<CustomerRef, EngineError> {
    let email = data
        .customer_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let name = data
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let by_email = email.and_then(|e| customers.iter().find(|c| c.email.eq_ignore_ascii_case(e)));
    let by_name = name.and_then(|n| customers.iter().find(|c| c.name.eq_ignore_ascii_case(n)));
    if let Some(found) = by_email.or(by_name) {
        return Ok(CustomerRef::Existing {
            customer_id: found.id,
        });
    }

    let name = name.ok_or_else(|| EngineError::validation("customer_name", "customer name is required"))?;
    if !data.is_new_customer {
        return Err(EngineError::not_found("customer", name));
    }
    let email = email.ok_or_else(|| {
        EngineError::validation("customer_email", "an email is required for a new customer")
    })?;
    Ok(CustomerRef::New(NewCustomer::new(name, email)))
}

fn line_request(line: &IntentLine, products: &[Product]) -> Result<LineRequest, EngineError> {
    let name = required_text("product_name", line.product_name.clone())?;
    let quantity = line.quantity.unwrap_or(1);
    let discount = line.discount.unwrap_or(Money::ZERO);

    if let Some(found) = products.iter().find(|p| p.name.eq_ignore_ascii_case(&name)) {
        return Ok(LineRequest::existing(found.id, quantity, discount));
    }
    if !line.is_new_product {
        return Err(EngineError::not_found("product", name));
    }
    let price = line
        .price
        .ok_or_else(|| EngineError::validation("price", "a price is required for a new product"))?;
    // A product created for an invoice starts with exactly what the invoice takes.
    let stock = line.stock.unwrap_or(quantity);
    Ok(LineRequest {
        product: ProductRef::New(NewProduct::new(name, price, stock)),
        quantity,
        discount,
    })
}

impl<S: BillingStore> BillingEngine<S> {
    /// Catalog snapshot for the extractor.
    #[instrument(skip(self), err)]
    pub async fn intent_context(&self, seller_id: SellerId) -> Result<IntentContext, EngineError> {
        let products = self.list_products(seller_id, None).await?;
        let customers = self.list_customers(seller_id, None).await?;
        Ok(IntentContext {
            products: products
                .into_iter()
                .map(|p| ProductSnapshot {
                    id: p.id,
                    name: p.name,
                    price: p.price,
                    stock: p.stock,
                })
                .collect(),
            customers: customers
                .into_iter()
                .map(|c| CustomerSnapshot {
                    id: c.id,
                    name: c.name,
                    email: c.email,
                })
                .collect(),
        })
    }

    /// Send a message to the extractor and act on its answer.
    ///
    /// Extractor failures become an unsuccessful outcome; only storage-level
    /// failures are returned as errors.
    #[instrument(skip(self, extractor, message, history), err)]
    pub async fn process_command<E>(
        &self,
        extractor: &E,
        seller_id: SellerId,
        message: &str,
        history: Vec<ConversationTurn>,
    ) -> Result<IntentOutcome, EngineError>
    where
        E: IntentExtractor + ?Sized,
    {
        let request = IntentRequest {
            message: message.to_string(),
            context: self.intent_context(seller_id).await?,
            history,
        };
        if let Err(err) = request.validate() {
            return Ok(IntentOutcome::failed("unknown", err.to_string()));
        }

        match extractor.extract(&request).await {
            Ok(response) => self.handle_intent(seller_id, response).await,
            Err(err) => {
                warn!(error = %err, "intent extraction failed");
                Ok(IntentOutcome::failed("unknown", EXTRACTION_FAILED))
            }
        }
    }

    /// Execute one intent on behalf of `seller_id`.
    #[instrument(skip(self, response), fields(intent = response.intent.name()), err)]
    pub async fn handle_intent(
        &self,
        seller_id: SellerId,
        response: IntentResponse,
    ) -> Result<IntentOutcome, EngineError> {
        let intent = response.intent.name();
        if !response.missing_info.is_empty() {
            let message = if response.response_text.trim().is_empty() {
                response.missing_info.join(" ")
            } else {
                response.response_text
            };
            return Ok(IntentOutcome {
                missing_info: response.missing_info,
                ..IntentOutcome::failed(intent, message)
            });
        }

        let result = match response.intent {
            Intent::AddProduct(data) => self.intent_add_product(seller_id, data).await,
            Intent::AddCustomer(data) => self.intent_add_customer(seller_id, data).await,
            Intent::CreateInvoice(data) => self.intent_create_invoice(seller_id, data).await,
            Intent::Unknown => {
                let message = match response.response_text.trim() {
                    "" => NOT_UNDERSTOOD.to_string(),
                    text => text.to_string(),
                };
                return Ok(IntentOutcome::failed(intent, message));
            }
        };

        match result {
            Ok((id, message)) => {
                info!(intent, created_id = %id, "intent executed");
                Ok(IntentOutcome::done(intent, id, message))
            }
            Err(err) if err.is_business() => Ok(IntentOutcome::failed(intent, err.to_string())),
            Err(err) => Err(err),
        }
    }

    async fn intent_add_product(
        &self,
        seller_id: SellerId,
        data: AddProductIntent,
    ) -> Result<(String, String), EngineError> {
        let payload = NewProduct {
            name: required_text("name", data.name)?,
            price: data.price.unwrap_or(Money::ZERO),
            description: data.description,
            stock: data.stock.unwrap_or(0),
        };
        let product = self.add_product(seller_id, payload).await?;
        Ok((
            product.id.to_string(),
            format!("Added product {} ({}) with stock {}", product.name, product.id, product.stock),
        ))
    }

    async fn intent_add_customer(
        &self,
        seller_id: SellerId,
        data: AddCustomerIntent,
    ) -> Result<(String, String), EngineError> {
        let payload = NewCustomer {
            name: required_text("name", data.name)?,
            email: required_text("email", data.email)?,
            phone: data.phone,
            address: data.address,
        };
        let customer = self.add_customer(seller_id, payload).await?;
        Ok((
            customer.id.to_string(),
            format!("Added customer {} ({})", customer.name, customer.id),
        ))
    }

    async fn intent_create_invoice(
        &self,
        seller_id: SellerId,
        data: CreateInvoiceIntent,
    ) -> Result<(String, String), EngineError> {
        if data.items.is_empty() {
            return Err(EngineError::EmptyItemList);
        }
        let customers = self.list_customers(seller_id, None).await?;
        let products = self.list_products(seller_id, None).await?;

        let customer = customer_ref(&data, &customers)?;
        let items = data
            .items
            .iter()
            .map(|line| line_request(line, &products))
            .collect::<Result<Vec<_>, _>>()?;

        let cmd = CreateInvoice {
            seller_id,
            customer,
            items,
            tax: data.tax.unwrap_or(Money::ZERO),
            due_date: parse_due_date(data.due_date)?,
        };
        let invoice = self.create_invoice(&cmd).await?;
        Ok((
            invoice.id().to_string(),
            format!("Created invoice {} for {}", invoice.id(), invoice.amount()),
        ))
    }
}
