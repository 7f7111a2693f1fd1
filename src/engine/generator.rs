use std::sync::Arc;
use tracing::{info, warn};

use super::GenerateError;
use crate::gateway::PaymentGateway;
use crate::model::{CodePayload, PaymentRequest};

/// Obtains a payment code and its rendered image from the gateway.
#[derive(Clone)]
pub struct CodeGenerator {
    gateway: Arc<dyn PaymentGateway>,
}

impl CodeGenerator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Generate a code for an already validated `request`:
    /// - CreateCode failures are fatal
    /// - RenderCodeImage failures only drop the image
    pub async fn generate(&self, request: PaymentRequest) -> Result<CodePayload, GenerateError> {
        let generated = self.gateway.create_code(request.amount()).await?;
        info!(
            amount = %request.amount(),
            correlation_id = %generated.correlation_id,
            "payment code generated"
        );

        let image = match self
            .gateway
            .render_code_image(&generated.code, &generated.correlation_id)
            .await
        {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(
                    correlation_id = %generated.correlation_id,
                    reason = %e,
                    "code image unavailable, continuing without it"
                );
                None
            }
        };

        Ok(CodePayload {
            code: generated.code,
            correlation_id: generated.correlation_id,
            image,
        })
    }
}
