// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MainProcessing: handler dispatch and the provider call.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use parley_core::error::ParleyError;
use tracing::debug;

use crate::context::ProcessingContext;
use crate::handlers::{output_to_message, ContentHandler};
use crate::stage::{PipelineStage, STAGE_MAIN_PROCESSING};

/// Selects a content handler by capability match and invokes it.
///
/// Handlers are resolved against the ordered registry built at
/// startup; the first `can_handle` match wins. A message no handler
/// claims is an internal error, since schema validation already
/// constrained the content kinds.
pub struct MainProcessingStage {
    handlers: Vec<Arc<dyn ContentHandler>>,
}

impl MainProcessingStage {
    pub fn new(handlers: Vec<Arc<dyn ContentHandler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl PipelineStage for MainProcessingStage {
    fn name(&self) -> &'static str {
        STAGE_MAIN_PROCESSING
    }

    async fn run(&self, ctx: &mut ProcessingContext) -> Result<(), ParleyError> {
        let message = ctx
            .message
            .clone()
            .ok_or_else(|| ParleyError::Internal("main processing before parsing".into()))?;

        let handler = self
            .handlers
            .iter()
            .find(|h| h.can_handle(&message))
            .cloned()
            .ok_or_else(|| {
                ParleyError::Internal(format!(
                    "no handler for content kind of message {}",
                    message.id
                ))
            })?;

        debug!(request_id = %ctx.request_id, handler = handler.name(), "dispatching content handler");
        ctx.details.handler = Some(handler.name().to_string());

        let output = handler.handle(ctx).await?;
        counter!("parley_provider_calls_total").increment(u64::from(output.depth));
        if output.depth > 1 {
            ctx.details.tool_depth = Some(output.depth);
        }
        ctx.usage.accumulate(&output.usage);
        ctx.assistant = Some(output_to_message(&ctx.session, &output));
        Ok(())
    }
}
