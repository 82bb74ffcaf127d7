// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as value ranges and non-empty paths. Collects all
//! errors instead of failing fast.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with every collected validation error.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.provider.context_window == 0 {
        errors.push(validation("provider.context_window must be positive"));
    }

    if config.provider.completion_reserve >= config.provider.context_window {
        errors.push(validation(format!(
            "provider.completion_reserve ({}) must be smaller than provider.context_window ({})",
            config.provider.completion_reserve, config.provider.context_window
        )));
    }

    if !(0.0..=1.0).contains(&config.memory.min_relevance) {
        errors.push(validation(format!(
            "memory.min_relevance must be in [0, 1], got {}",
            config.memory.min_relevance
        )));
    }

    if config.memory.max_results == 0 {
        errors.push(validation("memory.max_results must be positive"));
    }

    if !(0.0..=1.0).contains(&config.memory.decay_factor) {
        errors.push(validation(format!(
            "memory.decay_factor must be in [0, 1], got {}",
            config.memory.decay_factor
        )));
    }

    if !(0.0..=1.0).contains(&config.memory.promotion_threshold) {
        errors.push(validation(format!(
            "memory.promotion_threshold must be in [0, 1], got {}",
            config.memory.promotion_threshold
        )));
    }

    if config.memory.consolidation_interval_turns <= 0 {
        errors.push(validation(
            "memory.consolidation_interval_turns must be positive",
        ));
    }

    if !(0.0..=1.0).contains(&config.context.max_candidate_share) {
        errors.push(validation(format!(
            "context.max_candidate_share must be in [0, 1], got {}",
            config.context.max_candidate_share
        )));
    }

    if config.context.source_timeout_ms == 0 {
        errors.push(validation("context.source_timeout_ms must be positive"));
    }

    if config.pipeline.request_timeout_secs == 0 {
        errors.push(validation("pipeline.request_timeout_secs must be positive"));
    }

    if config.pipeline.max_tool_depth == 0 {
        errors.push(validation("pipeline.max_tool_depth must be positive"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(validation("storage.database_path must not be empty"));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParleyConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error_instead_of_failing_fast() {
        let mut config = ParleyConfig::default();
        config.memory.min_relevance = 1.5;
        config.memory.max_results = 0;
        config.pipeline.max_tool_depth = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn completion_reserve_must_fit_in_window() {
        let mut config = ParleyConfig::default();
        config.provider.context_window = 1_000;
        config.provider.completion_reserve = 1_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn min_relevance_bounds() {
        let mut config = ParleyConfig::default();
        config.memory.min_relevance = -0.1;
        assert!(validate_config(&config).is_err());
        config.memory.min_relevance = 1.0;
        assert!(validate_config(&config).is_ok());
    }
}
