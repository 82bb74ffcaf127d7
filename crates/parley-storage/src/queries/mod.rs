// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per durable entity.

pub mod memories;
pub mod messages;
pub mod state;

use parley_core::error::ParleyError;

/// Wraps a serialization or parse failure as a storage error.
pub(crate) fn codec_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> ParleyError {
    ParleyError::Storage { source: Box::new(e) }
}
