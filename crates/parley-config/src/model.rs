// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject
//! unrecognized config keys at startup with actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to
/// sensible values. A request reads exactly one immutable snapshot of
/// this struct for its whole lifetime.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Agent identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// LLM provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Context engine settings.
    #[serde(default)]
    pub context: ContextConfig,

    /// Memory system settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// State manager settings.
    #[serde(default)]
    pub state: StateConfig,

    /// Message processor pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Version adapter compatibility settings and feature flags.
    #[serde(default)]
    pub compat: CompatConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Agent identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// LLM provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Default model to use for LLM requests.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// The target model's full context window in tokens.
    #[serde(default = "default_context_window")]
    pub context_window: u32,

    /// Tokens reserved for the completion; the context budget is
    /// `context_window - completion_reserve`.
    #[serde(default = "default_completion_reserve")]
    pub completion_reserve: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            context_window: default_context_window(),
            completion_reserve: default_completion_reserve(),
        }
    }
}

impl ProviderConfig {
    /// Token budget available for the assembled context window.
    pub fn context_budget(&self) -> u32 {
        self.context_window.saturating_sub(self.completion_reserve)
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_context_window() -> u32 {
    200_000
}

fn default_completion_reserve() -> u32 {
    4_096
}

/// Context engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Maximum conversation-history turns offered as candidates.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Per-source retrieval timeout in milliseconds. A slow source is
    /// dropped with a degraded-mode marker rather than blocking the
    /// request.
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    /// Maximum share of the total budget a single compressed candidate
    /// may occupy (0.0-1.0).
    #[serde(default = "default_max_candidate_share")]
    pub max_candidate_share: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            source_timeout_ms: default_source_timeout_ms(),
            max_candidate_share: default_max_candidate_share(),
        }
    }
}

fn default_history_window() -> usize {
    50
}

fn default_source_timeout_ms() -> u64 {
    500
}

fn default_max_candidate_share() -> f64 {
    0.5
}

/// Memory system configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Master switch for memory enrichment.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Default cap on retrieved memory items.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Default minimum relevance score for retrieved items (0.0-1.0).
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,

    /// Consolidate after this many user turns.
    #[serde(default = "default_consolidation_interval")]
    pub consolidation_interval_turns: i64,

    /// Model used for consolidation summarization calls.
    #[serde(default = "default_consolidation_model")]
    pub consolidation_model: String,

    /// Importance above which episodic items are promoted to semantic.
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: f64,

    /// Multiplier applied to untouched items' importance each
    /// consolidation pass (0.0-1.0).
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    /// Items decayed below this importance are pruned.
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_results: default_max_results(),
            min_relevance: default_min_relevance(),
            consolidation_interval_turns: default_consolidation_interval(),
            consolidation_model: default_consolidation_model(),
            promotion_threshold: default_promotion_threshold(),
            decay_factor: default_decay_factor(),
            prune_threshold: default_prune_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> usize {
    10
}

fn default_min_relevance() -> f64 {
    0.3
}

fn default_consolidation_interval() -> i64 {
    10
}

fn default_consolidation_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_promotion_threshold() -> f64 {
    0.7
}

fn default_decay_factor() -> f64 {
    0.9
}

fn default_prune_threshold() -> f64 {
    0.05
}

/// State manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Default for `options.state.save_checkpoint` on legacy requests.
    #[serde(default)]
    pub checkpoint_on_save: bool,

    /// Default for `options.state.include_shared`.
    #[serde(default = "default_true")]
    pub include_shared: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            checkpoint_on_save: false,
            include_shared: default_true(),
        }
    }
}

/// Message processor pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Overall request deadline in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bounded retry attempts for transient provider failures.
    #[serde(default = "default_provider_retries")]
    pub provider_retries: u32,

    /// Initial backoff in milliseconds between provider retries
    /// (doubles each attempt).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum provider<->tool round-trips for tool-call content.
    #[serde(default = "default_max_tool_depth")]
    pub max_tool_depth: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            provider_retries: default_provider_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_tool_depth: default_max_tool_depth(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_provider_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_max_tool_depth() -> u32 {
    5
}

/// Version adapter compatibility settings and feature flags.
///
/// Flags are checked once per request against the immutable config
/// snapshot; a disabled flag forces the corresponding option off before
/// the request enters the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CompatConfig {
    /// Global rollback: when set, 100% of traffic is routed through the
    /// legacy-compatible path regardless of the caller's declared
    /// version. Checked before version detection.
    #[serde(default)]
    pub rollback_to_legacy: bool,

    /// Enables memory enrichment for requests that ask for it.
    #[serde(default = "default_true")]
    pub memory_enrichment: bool,

    /// Enables state checkpoint-on-save.
    #[serde(default = "default_true")]
    pub state_checkpoints: bool,

    /// Enables the `processing_details` trace in responses.
    #[serde(default = "default_true")]
    pub processing_details: bool,

    /// Enables streaming responses.
    #[serde(default = "default_true")]
    pub streaming: bool,
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            rollback_to_legacy: false,
            memory_enrichment: default_true(),
            state_checkpoints: default_true(),
            processing_details: default_true(),
            streaming: default_true(),
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_true(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .into_owned()
}
