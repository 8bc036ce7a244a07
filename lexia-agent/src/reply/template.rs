//! Fixed acknowledgement reply.

use async_trait::async_trait;

use super::{ReplyError, ReplyGenerator, ReplyRequest};

/// Acknowledges the message without calling a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateReplyGenerator;

#[async_trait]
impl ReplyGenerator for TemplateReplyGenerator {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn generate(&self, request: ReplyRequest<'_>) -> Result<String, ReplyError> {
        Ok(format!(
            "Obrigado pela mensagem: '{}'. Estou processando sua solicitação.",
            request.text
        ))
    }
}
