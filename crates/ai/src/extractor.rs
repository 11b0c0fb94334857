use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{ConversationTurn, IntentContext};
use crate::intent::IntentResponse;
use crate::result::AiError;

/// Everything an extractor needs to interpret one user message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub message: String,
    pub context: IntentContext,
    pub history: Vec<ConversationTurn>,
}

impl IntentRequest {
    pub fn validate(&self) -> Result<(), AiError> {
        if self.message.trim().is_empty() {
            return Err(AiError::InvalidInput("message cannot be empty".into()));
        }
        Ok(())
    }
}

/// External natural-language service that turns a message into an intent document.
///
/// Implementations talk to a model over the network; results are untrusted.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(&self, request: &IntentRequest) -> Result<IntentResponse, AiError>;
}

#[async_trait]
impl<T: IntentExtractor + ?Sized> IntentExtractor for std::sync::Arc<T> {
    async fn extract(&self, request: &IntentRequest) -> Result<IntentResponse, AiError> {
        (**self).extract(request).await
    }
}
