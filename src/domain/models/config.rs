//! Search configuration.
//!
//! Read-only settings supplied by the orchestrator. Configuration problems
//! (an unknown fixed field, a predicted field missing from the encoder set)
//! are programmer errors and abort the search at construction time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{SearchError, SearchResult};

/// Flavor of search being run. Determines how sprint 0 is seeded and which
/// sprint the field-contribution baseline comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Temporal prediction search. Sprint 0 holds one single-encoder swarm
    /// per known encoder.
    Temporal,
    /// Classification search. Seeded like temporal.
    Classification,
    /// Legacy temporal search. Sprint 0 holds only the predicted field;
    /// sprint 1 pairs it with each other encoder.
    LegacyTemporal,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temporal => "temporal",
            Self::Classification => "classification",
            Self::LegacyTemporal => "legacy_temporal",
        }
    }
}

/// Settings for the per-swarm early-termination heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminatorConfig {
    /// Number of generations a swarm must run before it can be judged, and
    /// the span over which a flat best-so-far score means a plateau.
    pub maturity_window: usize,
    /// Hard generation cutoff; swarms past it are terminated outright.
    pub max_generations: Option<usize>,
    /// Whether cross-swarm comparison is applied at each generation.
    pub termination_enabled: bool,
    /// Per-generation relative tolerances for cross-swarm comparison.
    /// Must cover every generation the search can reach; indexing past the
    /// end is a hard error, not an extrapolation.
    pub milestones: Vec<f64>,
}

impl TerminatorConfig {
    /// Default tolerance sequence: `1 / (g + 1)` for generation `g`, so the
    /// allowed spread over the best swarm shrinks as the search matures.
    pub fn default_milestones(count: usize) -> Vec<f64> {
        (0..count).map(|g| 1.0 / (g as f64 + 1.0)).collect()
    }
}

impl Default for TerminatorConfig {
    fn default() -> Self {
        Self {
            maturity_window: 10,
            max_generations: None,
            termination_enabled: true,
            milestones: Self::default_milestones(30),
        }
    }
}

/// Read-only configuration for one hyperparameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Names of every encoder field available to the search.
    pub encoder_names: BTreeSet<String>,
    /// The designated predicted-field encoder.
    pub predicted_field: String,
    /// Search flavor.
    pub search_mode: SearchMode,
    /// When set, run a fast search over exactly this field combination;
    /// only sprint 0 is ever created.
    pub fixed_fields: Option<Vec<String>>,
    /// Maximum number of fields considered when branching into the next
    /// sprint. `None` means unlimited.
    pub max_branching: Option<usize>,
    /// Minimum percent contribution a field must show to stay eligible for
    /// new combinations. `None` disables contribution pruning.
    pub min_field_contribution: Option<f64>,
    /// Whether sprints may be explored speculatively before their
    /// predecessors complete.
    pub speculative_particles: bool,
    /// Particle count below which a swarm is considered to still have room.
    pub min_particles_per_swarm: usize,
    /// At sprint 2, generate every 3-field combination instead of extending
    /// the best 2-field swarm one encoder at a time.
    pub try_all_3_field_combinations: bool,
    /// Variant of the above requiring a timestamp-derived encoder in every
    /// combination.
    pub try_all_3_field_combinations_w_timestamps: bool,
    /// Encoder names derived from timestamp fields.
    pub timestamp_encoders: BTreeSet<String>,
    /// Early-termination settings.
    pub terminator: TerminatorConfig,
}

impl SearchConfig {
    /// Minimal configuration for the given encoders and predicted field.
    pub fn new<I, S>(encoders: I, predicted_field: impl Into<String>, mode: SearchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            encoder_names: encoders.into_iter().map(Into::into).collect(),
            predicted_field: predicted_field.into(),
            search_mode: mode,
            fixed_fields: None,
            max_branching: None,
            min_field_contribution: None,
            speculative_particles: true,
            min_particles_per_swarm: 5,
            try_all_3_field_combinations: false,
            try_all_3_field_combinations_w_timestamps: false,
            timestamp_encoders: BTreeSet::new(),
            terminator: TerminatorConfig::default(),
        }
    }

    /// Restrict the search to exactly these fields (fast-search mode).
    pub fn with_fixed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fixed_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the branching limit.
    pub fn with_max_branching(mut self, limit: usize) -> Self {
        self.max_branching = Some(limit);
        self
    }

    /// Set the minimum field contribution threshold (percent).
    pub fn with_min_field_contribution(mut self, pct: f64) -> Self {
        self.min_field_contribution = Some(pct);
        self
    }

    /// Disable speculative sprint exploration.
    pub fn without_speculation(mut self) -> Self {
        self.speculative_particles = false;
        self
    }

    /// Whether branching is limited by count or contribution threshold.
    pub fn limits_branching(&self) -> bool {
        self.max_branching.is_some() || self.min_field_contribution.is_some()
    }

    /// Whether this is a fixed-fields fast search.
    pub fn is_fixed_fields(&self) -> bool {
        self.fixed_fields.is_some()
    }

    /// Check internal consistency. Violations are fatal.
    pub fn validate(&self) -> SearchResult<()> {
        if self.encoder_names.is_empty() {
            return Err(SearchError::InvalidConfig(
                "no encoder fields configured".to_string(),
            ));
        }
        if !self.encoder_names.contains(&self.predicted_field) {
            return Err(SearchError::InvalidConfig(format!(
                "predicted field '{}' is not among the known encoders",
                self.predicted_field
            )));
        }
        if let Some(fields) = &self.fixed_fields {
            if fields.is_empty() {
                return Err(SearchError::InvalidConfig(
                    "fixed field list is empty".to_string(),
                ));
            }
            for field in fields {
                if !self.encoder_names.contains(field) {
                    return Err(SearchError::InvalidConfig(format!(
                        "fixed field '{field}' is not among the known encoders"
                    )));
                }
            }
        }
        if self.terminator.maturity_window == 0 {
            return Err(SearchError::InvalidConfig(
                "maturity window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
