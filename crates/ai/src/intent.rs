//! Typed model of the assistant's intent document.
//!
//! Wire shape:
//!
//! ```json
//! {"intent": "create_invoice", "data": {...}, "missing_info": [], "response_text": "..."}
//! ```
//!
//! Every payload field is optional here; nothing is trusted until the engine
//! has checked it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use billbook_core::Money;

use crate::result::AiError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentLine {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub is_new_product: bool,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub discount: Option<Money>,
    /// Opening stock for a product created by this line.
    #[serde(default)]
    pub stock: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoiceIntent {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub is_new_customer: bool,
    #[serde(default)]
    pub items: Vec<IntentLine>,
    #[serde(default)]
    pub tax: Option<Money>,
    /// Kept as text; parsed and validated by the engine.
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCustomerIntent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddProductIntent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "intent", content = "data", rename_all = "snake_case")]
pub enum Intent {
    CreateInvoice(CreateInvoiceIntent),
    AddCustomer(AddCustomerIntent),
    AddProduct(AddProductIntent),
    Unknown,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::CreateInvoice(_) => "create_invoice",
            Intent::AddCustomer(_) => "add_customer",
            Intent::AddProduct(_) => "add_product",
            Intent::Unknown => "unknown",
        }
    }
}

/// The assistant's full answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentResponse {
    #[serde(flatten)]
    pub intent: Intent,
    pub missing_info: Vec<String>,
    pub response_text: String,
}

/// `missing_info` arrives as `null`, a single follow-up question, or a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum MissingInfo {
    One(String),
    Many(Vec<String>),
}

impl MissingInfo {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            MissingInfo::One(s) => vec![s],
            MissingInfo::Many(v) => v,
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    data: JsonValue,
    #[serde(default)]
    missing_info: Option<MissingInfo>,
    #[serde(default)]
    response_text: String,
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn payload<T: Default + for<'de> Deserialize<'de>>(data: JsonValue) -> Result<T, AiError> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|e| AiError::MalformedResponse(e.to_string()))
}

impl IntentResponse {
    pub fn unknown(response_text: impl Into<String>) -> Self {
        Self {
            intent: Intent::Unknown,
            missing_info: Vec::new(),
            response_text: response_text.into(),
        }
    }

    /// Parse the assistant's raw text. Intent names are accepted in
    /// `snake_case` or `camelCase`; unrecognized names become [`Intent::Unknown`].
    pub fn from_json(raw: &str) -> Result<Self, AiError> {
        let body = strip_code_fence(raw);
        let parsed: RawResponse =
            serde_json::from_str(body).map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        let name: String = parsed
            .intent
            .unwrap_or_default()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        let intent = match name.as_str() {
            "createinvoice" => Intent::CreateInvoice(payload(parsed.data)?),
            "addcustomer" => Intent::AddCustomer(payload(parsed.data)?),
            "addproduct" => Intent::AddProduct(payload(parsed.data)?),
            _ => Intent::Unknown,
        };

        Ok(Self {
            intent,
            missing_info: parsed
                .missing_info
                .map(MissingInfo::into_vec)
                .unwrap_or_default(),
            response_text: parsed.response_text,
        })
    }
}
