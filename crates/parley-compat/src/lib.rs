// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dual-protocol compatibility layer for the Parley pipeline.
//!
//! Old clients speak a flat `{ agentId, message }` shape; current
//! clients speak a versioned structured shape. This crate normalizes
//! inbound traffic to the structured shape (filling explicit defaults),
//! validates it against the versioned contract, and denormalizes
//! responses for legacy callers. A deployment-wide feature-flag table
//! and a global rollback switch gate new behaviors.

pub mod legacy;
pub mod schema;
pub mod version;

pub use legacy::{LegacyRequest, LegacyResponse};
pub use schema::{
    PROTOCOL_VERSION, RequestMessage, RequestOptions, ResponseData, ResponseError, ResponseStatus,
    StructuredRequest, StructuredResponse, validate,
};
pub use version::{VersionAdapter, WireVersion};
