// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observability adapter trait for exporting metrics to a sink.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::MetricEvent;

/// Adapter for exporting metric events to an external sink.
///
/// The sink is optional and best-effort: export failures are logged by
/// callers and must never fail a request.
#[async_trait]
pub trait ObservabilityAdapter: PluginAdapter {
    /// Records a metric or telemetry event.
    async fn record(&self, event: MetricEvent) -> Result<(), ParleyError>;
}
