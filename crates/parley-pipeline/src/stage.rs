// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pipeline stage contract.
//!
//! Stage order is fixed (Parsing, Validating, Enriching,
//! MainProcessing, Responding) but stages live in a registry list, so
//! a new stage can be inserted between existing ones without touching
//! the driver loop.

use async_trait::async_trait;

use parley_core::error::ParleyError;

use crate::context::ProcessingContext;

/// Canonical stage names, in execution order.
pub const STAGE_PARSING: &str = "parsing";
pub const STAGE_VALIDATING: &str = "validating";
pub const STAGE_ENRICHING: &str = "enriching";
pub const STAGE_MAIN_PROCESSING: &str = "main_processing";
pub const STAGE_RESPONDING: &str = "responding";

/// One stage of the message processor.
///
/// A stage reads and updates the [`ProcessingContext`]; an error
/// short-circuits the remaining stages and sends the request to the
/// terminal failed state. The driver records each stage's timing
/// regardless of outcome.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut ProcessingContext) -> Result<(), ParleyError>;
}
