//! Shared lifecycle state machine for the swarm search.
//!
//! `SwarmStateStore` decides which sprints and swarms should be explored,
//! when swarms and sprints complete, and when the overall search has
//! converged. Multiple worker processes each hold their own instance; the
//! single shared `SearchState` document lives in the external record store
//! and is synchronized through full-document compare-and-swap. There is no
//! merging: a worker that loses a write race adopts the winner's document
//! wholesale and recomputes its intended change from scratch, so every
//! mutating operation here is a recompute-and-retry loop with the
//! conditional write at the loop's edge.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{SearchError, SearchResult};
use crate::domain::models::{SearchConfig, SearchMode, SearchState, SwarmId, SwarmStatus};
use crate::domain::ports::{RecordStore, ResultsIndex, StoreError, WorkCanceller};

/// Job-record field under which the shared state blob is stored.
const SEARCH_STATE_FIELD: &str = "search_worker_state";

/// Floor applied to the contribution baseline so a near-zero best score
/// does not blow up the percent formula.
const BASELINE_EPSILON: f64 = 0.000_01;

/// Outcome of one non-writing pass over a sprint's lifecycle.
enum SprintCheck {
    /// The question was answered without touching shared state.
    Decided { active: bool, no_more_sprints: bool },
    /// New swarms were appended locally; a conditional write is required.
    Created,
}

/// Per-worker handle on the shared search lifecycle state.
#[derive(Debug)]
pub struct SwarmStateStore<R, I, C>
where
    R: RecordStore,
    I: ResultsIndex,
    C: WorkCanceller,
{
    record_store: Arc<R>,
    results: Arc<I>,
    canceller: Arc<C>,
    config: SearchConfig,
    job_id: Uuid,
    state: SearchState,
    /// Serialized text of the last fetched document, kept verbatim so the
    /// next conditional write can prove it is not stale.
    prior_text: Option<String>,
    dirty: bool,
}

impl<R, I, C> SwarmStateStore<R, I, C>
where
    R: RecordStore,
    I: ResultsIndex,
    C: WorkCanceller,
{
    /// Validate the configuration, then fetch (or lazily create) the
    /// shared state document for `job_id`.
    pub async fn connect(
        record_store: Arc<R>,
        results: Arc<I>,
        canceller: Arc<C>,
        job_id: Uuid,
        config: SearchConfig,
    ) -> SearchResult<Self> {
        config.validate()?;
        let mut store = Self {
            record_store,
            results,
            canceller,
            config,
            job_id,
            state: SearchState::new(),
            prior_text: None,
            dirty: false,
        };
        store.read_state().await?;
        Ok(store)
    }

    /// The current in-memory snapshot. May be briefly stale relative to
    /// other workers until the next `read_state`/`write_state`.
    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Whether the overall search has converged.
    pub fn is_search_over(&self) -> bool {
        self.state.search_over
    }

    /// Fetch the current shared document, creating the initial one if no
    /// worker has persisted anything yet.
    ///
    /// Creation is itself a conditional write ("only if absent"): if
    /// another worker wins that race, the just-built document is discarded
    /// and the now-present one is adopted instead.
    pub async fn read_state(&mut self) -> SearchResult<()> {
        if let Some(text) = self
            .record_store
            .get_field(self.job_id, SEARCH_STATE_FIELD)
            .await?
        {
            return self.adopt(text);
        }

        let state = self.initial_state();
        let text = serde_json::to_string(&state)?;
        if self
            .record_store
            .set_field_if_equal(self.job_id, SEARCH_STATE_FIELD, &text, None)
            .await?
        {
            info!(job = %self.job_id, swarms = state.swarms.len(), "created initial search state");
            self.state = state;
            self.prior_text = Some(text);
            self.dirty = false;
            return Ok(());
        }

        // Another worker created the document first; use theirs.
        let text = self
            .record_store
            .get_field(self.job_id, SEARCH_STATE_FIELD)
            .await?
            .ok_or_else(|| {
                StoreError::RecordNotFound(format!(
                    "search state for job {} vanished after creation race",
                    self.job_id
                ))
            })?;
        self.adopt(text)
    }

    /// Persist local changes with a full-document compare-and-swap.
    ///
    /// Returns `Ok(true)` when nothing needed writing or the write won.
    /// Returns `Ok(false)` when the write lost a race; the local state has
    /// then already been replaced by the store's current document and the
    /// caller must recompute its intended change.
    pub async fn write_state(&mut self) -> SearchResult<bool> {
        if !self.dirty {
            return Ok(true);
        }
        self.state.last_update_time = Utc::now();
        let new_text = serde_json::to_string(&self.state)?;
        let won = self
            .record_store
            .set_field_if_equal(
                self.job_id,
                SEARCH_STATE_FIELD,
                &new_text,
                self.prior_text.as_deref(),
            )
            .await?;
        if won {
            self.prior_text = Some(new_text);
            self.dirty = false;
            return Ok(true);
        }

        debug!(job = %self.job_id, "conditional write lost a race; adopting fresh state");
        let text = self
            .record_store
            .get_field(self.job_id, SEARCH_STATE_FIELD)
            .await?
            .ok_or_else(|| {
                StoreError::RecordNotFound(format!(
                    "search state for job {} vanished during write race",
                    self.job_id
                ))
            })?;
        self.adopt(text)?;
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Pure queries over the in-memory snapshot
    // -----------------------------------------------------------------------

    /// All swarm ids in a sprint, regardless of status.
    pub fn get_all_swarms(&self, sprint_idx: usize) -> Vec<SwarmId> {
        self.state.swarms_in_sprint(sprint_idx)
    }

    /// Currently active swarm ids, optionally restricted to one sprint.
    ///
    /// Cache entries without a backing swarm record are skipped rather
    /// than trusted; a tampered stored document must not panic a worker.
    pub fn get_active_swarms(&self, sprint_idx: Option<usize>) -> Vec<SwarmId> {
        self.state
            .active_swarms
            .iter()
            .filter(|id| {
                self.state
                    .swarms
                    .get(*id)
                    .is_some_and(|info| sprint_idx.is_none_or(|idx| info.sprint_idx == idx))
            })
            .cloned()
            .collect()
    }

    /// Swarms of a sprint that have not been killed.
    pub fn get_non_killed_swarms(&self, sprint_idx: usize) -> Vec<SwarmId> {
        self.state
            .swarms_with_status(sprint_idx, |status| status != SwarmStatus::Killed)
    }

    /// Every completed swarm across all sprints.
    pub fn get_completed_swarms(&self) -> Vec<SwarmId> {
        self.state
            .swarms
            .iter()
            .filter(|(_, info)| info.status == SwarmStatus::Completed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every completing swarm across all sprints.
    pub fn get_completing_swarms(&self) -> Vec<SwarmId> {
        self.state
            .swarms
            .iter()
            .filter(|(_, info)| info.status == SwarmStatus::Completing)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Best model recorded for a completed swarm, if it finished with a
    /// finite score.
    pub fn best_model_in_completed_swarm(&self, swarm_id: &SwarmId) -> Option<(String, f64)> {
        let info = self.state.swarms.get(swarm_id)?;
        if info.status != SwarmStatus::Completed {
            return None;
        }
        match (&info.best_model_id, info.best_err_score) {
            (Some(model), Some(score)) => Some((model.clone(), score)),
            _ => None,
        }
    }

    /// Best model recorded for a completed sprint, if any swarm in it
    /// finished with a finite score.
    pub fn best_model_in_completed_sprint(&self, sprint_idx: usize) -> Option<(String, f64)> {
        let sprint = self.state.sprints.get(sprint_idx)?;
        if sprint.status != SwarmStatus::Completed {
            return None;
        }
        match (&sprint.best_model_id, sprint.best_err_score) {
            (Some(model), Some(score)) => Some((model.clone(), score)),
            _ => None,
        }
    }

    /// Best model so far across all swarms of a sprint, completed or not.
    /// Swarms without a final score are looked up in the results index.
    pub async fn best_model_in_sprint(
        &self,
        sprint_idx: usize,
    ) -> SearchResult<Option<(String, f64)>> {
        let mut best: Option<(String, f64)> = None;
        for id in self.state.swarms_in_sprint(sprint_idx) {
            let info = &self.state.swarms[&id];
            let (model, score) = if info.status == SwarmStatus::Completed {
                (info.best_model_id.clone(), info.best_err_score)
            } else {
                self.results.best_model_id_and_err_score(&id).await?
            };
            if let (Some(model), Some(score)) = (model, score) {
                if best.as_ref().is_none_or(|(_, b)| score < *b) {
                    best = Some((model, score));
                }
            }
        }
        Ok(best)
    }

    // -----------------------------------------------------------------------
    // Field contributions
    // -----------------------------------------------------------------------

    /// Estimate each field's marginal value, as percent and absolute error
    /// improvement over the contribution baseline. Fields with no score
    /// yet contribute 0/0. Supports pruning low-value fields from later
    /// sprints.
    pub async fn get_field_contributions(
        &self,
    ) -> SearchResult<(BTreeMap<String, f64>, BTreeMap<String, f64>)> {
        let (field_scores, baseline) = match self.config.search_mode {
            SearchMode::LegacyTemporal => self.legacy_field_scores().await?,
            SearchMode::Temporal | SearchMode::Classification => {
                self.single_field_scores().await?
            }
        };

        let mut pct = BTreeMap::new();
        let mut abs = BTreeMap::new();
        for field in &self.config.encoder_names {
            let (p, a) = match (baseline, field_scores.get(field).copied().flatten()) {
                (Some(base), Some(score)) => {
                    let denom = if base.abs() < BASELINE_EPSILON {
                        BASELINE_EPSILON
                    } else {
                        base
                    };
                    ((base - score) * 100.0 / denom, base - score)
                }
                _ => (0.0, 0.0),
            };
            pct.insert(field.clone(), p);
            abs.insert(field.clone(), a);
        }
        Ok((pct, abs))
    }

    /// Best score observed for a swarm: the recorded final score when
    /// completed, otherwise whatever the results index has seen so far.
    async fn observed_score(&self, swarm_id: &SwarmId) -> SearchResult<Option<f64>> {
        let info = &self.state.swarms[swarm_id];
        if info.status == SwarmStatus::Completed {
            return Ok(info.best_err_score);
        }
        let (_, score) = self.results.best_model_id_and_err_score(swarm_id).await?;
        Ok(score)
    }

    /// Modern searches: one score per single-encoder swarm. The baseline
    /// is the worst score within the top `max_branching + 1`, or simply
    /// the best score when branching is unlimited.
    async fn single_field_scores(
        &self,
    ) -> SearchResult<(BTreeMap<String, Option<f64>>, Option<f64>)> {
        let single_ids: Vec<SwarmId> = self
            .state
            .swarms
            .keys()
            .filter(|id| id.is_single_field())
            .cloned()
            .collect();
        let mut field_scores = BTreeMap::new();
        for id in single_ids {
            let score = self.observed_score(&id).await?;
            field_scores.insert(id.encoders()[0].to_string(), score);
        }

        let mut scores: Vec<f64> = field_scores.values().filter_map(|s| *s).collect();
        scores.sort_by(f64::total_cmp);
        let baseline = match self.config.max_branching {
            _ if scores.is_empty() => None,
            Some(limit) => Some(scores[limit.min(scores.len() - 1)]),
            None => Some(scores[0]),
        };
        Ok((field_scores, baseline))
    }

    /// Legacy temporal searches: the baseline is the lone sprint-0 swarm
    /// (the predicted field by itself) and each field is scored by the
    /// sprint-1 swarm that adds exactly that field to it.
    async fn legacy_field_scores(
        &self,
    ) -> SearchResult<(BTreeMap<String, Option<f64>>, Option<f64>)> {
        let base_swarm = SwarmId::from_encoders([self.config.predicted_field.clone()]);
        let baseline = if self.state.swarms.contains_key(&base_swarm) {
            self.observed_score(&base_swarm).await?
        } else {
            None
        };

        let mut field_scores = BTreeMap::new();
        for id in self.state.swarms_in_sprint(1) {
            if id.len() != 2 || !id.contains(&self.config.predicted_field) {
                continue;
            }
            let added = id
                .encoders()
                .into_iter()
                .find(|e| *e != self.config.predicted_field)
                .map(ToString::to_string);
            if let Some(field) = added {
                let score = self.observed_score(&id).await?;
                field_scores.insert(field, score);
            }
        }
        Ok((field_scores, baseline))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Transition a swarm to a new status, recomputing its sprint's
    /// aggregate status and the search-over condition, and persist the
    /// result. Retries from scratch against a freshly-read document if the
    /// conditional write loses a race.
    pub async fn set_swarm_state(
        &mut self,
        swarm_id: &SwarmId,
        new_status: SwarmStatus,
    ) -> SearchResult<()> {
        loop {
            if !self.apply_swarm_transition(swarm_id, new_status).await? {
                return Ok(());
            }
            if self.write_state().await? {
                return Ok(());
            }
            // Lost the race; local state now holds the winner's document.
        }
    }

    /// Exclude an encoder from all future combinations.
    pub async fn blacklist_encoder(&mut self, encoder: &str) -> SearchResult<()> {
        loop {
            if !self
                .state
                .blacklisted_encoders
                .insert(encoder.to_string())
            {
                return Ok(());
            }
            info!(job = %self.job_id, encoder, "blacklisting encoder");
            self.dirty = true;
            if self.write_state().await? {
                return Ok(());
            }
        }
    }

    /// Whether the given sprint exists and has outstanding work, creating
    /// the sprint and its swarms lazily when needed.
    ///
    /// Returns `(active, no_more_sprints)`. Creation is retried from
    /// scratch whenever the conditional write loses a race.
    pub async fn is_sprint_active(&mut self, sprint_idx: usize) -> SearchResult<(bool, bool)> {
        loop {
            match self.plan_sprint(sprint_idx).await? {
                SprintCheck::Decided {
                    active,
                    no_more_sprints,
                } => return Ok((active, no_more_sprints)),
                SprintCheck::Created => {
                    if self.write_state().await? {
                        return Ok((true, false));
                    }
                }
            }
        }
    }

    /// Kill active exploration that can no longer win: any swarm in a
    /// later sprint that dropped an encoder of the best swarm of the prior
    /// completed sprint.
    pub async fn kill_useless_swarms(&mut self) -> SearchResult<()> {
        let num_sprints = self.state.sprints.len();
        let min_required = match self.config.search_mode {
            SearchMode::LegacyTemporal => 3,
            SearchMode::Temporal | SearchMode::Classification => 2,
        };
        if num_sprints < min_required {
            return Ok(());
        }

        for sprint_idx in 1..num_sprints {
            // Sprint 2 is exhaustive when 3-field combinations are on;
            // nothing there is "useless" relative to sprint 1's best.
            if sprint_idx == 2 && self.tries_all_3_field_combinations() {
                continue;
            }
            let prev_idx = sprint_idx - 1;
            let Some((best_model, _)) = self.best_model_in_completed_sprint(prev_idx) else {
                continue;
            };
            let Some(best_particle) = self.results.particle_info(&best_model).await? else {
                continue;
            };
            let best_swarm = best_particle.swarm_id;

            let doomed: Vec<SwarmId> = self
                .state
                .swarms_with_status(sprint_idx, |status| {
                    matches!(status, SwarmStatus::Active | SwarmStatus::Completing)
                })
                .into_iter()
                .filter(|id| !id.is_superset_of(&best_swarm))
                .collect();
            for id in doomed {
                info!(
                    job = %self.job_id,
                    swarm = %id,
                    best_prior = %best_swarm,
                    "killing swarm that dropped a winning encoder"
                );
                self.set_swarm_state(&id, SwarmStatus::Killed).await?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn tries_all_3_field_combinations(&self) -> bool {
        self.config.try_all_3_field_combinations
            || self.config.try_all_3_field_combinations_w_timestamps
    }

    /// Replace the local snapshot with a freshly fetched document.
    fn adopt(&mut self, text: String) -> SearchResult<()> {
        self.state = serde_json::from_str(&text)?;
        self.prior_text = Some(text);
        self.dirty = false;
        Ok(())
    }

    /// Sprint 0 as seeded by the search mode: exactly the fixed fields for
    /// a fast search, the predicted field alone for legacy temporal, one
    /// single-encoder swarm per known encoder otherwise.
    fn initial_state(&self) -> SearchState {
        let mut state = SearchState::new();
        if let Some(fixed) = &self.config.fixed_fields {
            state.add_active_swarm(SwarmId::from_encoders(fixed.clone()), 0);
        } else {
            match self.config.search_mode {
                SearchMode::LegacyTemporal => {
                    state.add_active_swarm(
                        SwarmId::from_encoders([self.config.predicted_field.clone()]),
                        0,
                    );
                }
                SearchMode::Temporal | SearchMode::Classification => {
                    for encoder in &self.config.encoder_names {
                        state.add_active_swarm(SwarmId::from_encoders([encoder.clone()]), 0);
                    }
                }
            }
        }
        state
    }

    /// Apply one swarm status transition to the local snapshot. Returns
    /// whether anything changed. Re-running this against the same
    /// document yields the same intended mutation, which is what makes the
    /// surrounding retry loop safe.
    async fn apply_swarm_transition(
        &mut self,
        swarm_id: &SwarmId,
        new_status: SwarmStatus,
    ) -> SearchResult<bool> {
        let info = self
            .state
            .swarms
            .get(swarm_id)
            .ok_or_else(|| SearchError::SwarmNotFound(swarm_id.to_string()))?;
        if info.status == new_status {
            return Ok(false);
        }
        // Stale signals are ignored: a completed swarm reported as merely
        // completing, or any other backward transition.
        if !info.status.can_transition_to(new_status) {
            debug!(
                swarm = %swarm_id,
                from = info.status.as_str(),
                to = new_status.as_str(),
                "ignoring stale status transition"
            );
            return Ok(false);
        }
        let sprint_idx = info.sprint_idx;

        let best = if new_status == SwarmStatus::Completed {
            self.results.best_model_id_and_err_score(swarm_id).await?
        } else {
            (None, None)
        };

        debug!(
            job = %self.job_id,
            swarm = %swarm_id,
            to = new_status.as_str(),
            "swarm status transition"
        );
        let info = self
            .state
            .swarms
            .get_mut(swarm_id)
            .ok_or_else(|| SearchError::SwarmNotFound(swarm_id.to_string()))?;
        info.status = new_status;
        if new_status == SwarmStatus::Completed {
            info.best_model_id = best.0;
            info.best_err_score = best.1;
        }
        self.dirty = true;

        if new_status != SwarmStatus::Active {
            self.state.active_swarms.remove(swarm_id);
        }

        if new_status == SwarmStatus::Killed {
            // Best effort; evaluation results from a killed swarm are
            // ignored anyway.
            if let Err(err) = self.canceller.kill_swarm_particles(swarm_id).await {
                warn!(swarm = %swarm_id, error = %err, "failed to cancel swarm particles");
            }
        }

        // Make sure every swarm this sprint can still discover exists
        // before the sprint may be judged complete.
        self.plan_sprint(sprint_idx).await?;
        self.recompute_sprint_status(sprint_idx);
        Ok(true)
    }

    /// Recompute a sprint's aggregate status from its member swarms, and
    /// when the sprint just completed, the sprint best, the search peak,
    /// and the search-over condition.
    fn recompute_sprint_status(&mut self, sprint_idx: usize) {
        let mut active = 0usize;
        let mut completing = 0usize;
        let mut best_score = f64::INFINITY;
        let mut best_model: Option<String> = None;
        for info in self.state.swarms.values() {
            if info.sprint_idx != sprint_idx {
                continue;
            }
            match info.status {
                SwarmStatus::Active => active += 1,
                SwarmStatus::Completing => completing += 1,
                SwarmStatus::Completed => {
                    if let (Some(model), Some(score)) = (&info.best_model_id, info.best_err_score)
                    {
                        // Strict comparison keeps the first minimum on ties.
                        if score < best_score {
                            best_score = score;
                            best_model = Some(model.clone());
                        }
                    }
                }
                SwarmStatus::Killed | SwarmStatus::Unset => {}
            }
        }

        let status = if active > 0 {
            SwarmStatus::Active
        } else if completing > 0 {
            SwarmStatus::Completing
        } else {
            SwarmStatus::Completed
        };
        self.state.sprints[sprint_idx].status = status;
        if status != SwarmStatus::Completed {
            return;
        }

        // Absent best means the sprint contributed nothing; it compares as
        // positive infinity below.
        let sprint_score = if best_model.is_some() {
            best_score
        } else {
            f64::INFINITY
        };
        self.state.sprints[sprint_idx].best_err_score = best_model.as_ref().map(|_| best_score);
        self.state.sprints[sprint_idx].best_model_id = best_model;
        info!(
            job = %self.job_id,
            sprint = sprint_idx,
            best_score = sprint_score,
            "sprint completed"
        );

        // Did the search peak? Compare against the running best of all
        // earlier completed sprints (incomplete ones count as infinity).
        if self.state.last_good_sprint.is_none() {
            let mut best_prior = f64::INFINITY;
            for sprint in &self.state.sprints[..sprint_idx] {
                if sprint.status == SwarmStatus::Completed {
                    let err = sprint.best_err_score.unwrap_or(f64::INFINITY);
                    if err < best_prior {
                        best_prior = err;
                    }
                }
            }
            if sprint_score >= best_prior {
                let last_good = sprint_idx.saturating_sub(1);
                info!(
                    job = %self.job_id,
                    sprint = sprint_idx,
                    last_good_sprint = last_good,
                    "search peaked; no further sprints will be created"
                );
                self.state.last_good_sprint = Some(last_good);
            }
        }

        if self.state.last_good_sprint.is_some() && !self.any_good_sprints_active() {
            if !self.state.search_over {
                info!(job = %self.job_id, "search is over");
            }
            self.state.search_over = true;
        }
    }

    /// Whether any sprint at or before the peak still has active work.
    fn any_good_sprints_active(&self) -> bool {
        let Some(last_good) = self.state.last_good_sprint else {
            return false;
        };
        self.state
            .sprints
            .iter()
            .take(last_good + 1)
            .any(|sprint| sprint.status == SwarmStatus::Active)
    }

    /// One non-writing pass of the sprint lifecycle check: answer whether
    /// the sprint has outstanding work, or extend the local snapshot with
    /// the swarms the sprint is still missing. All side effects (the
    /// conditional write) stay with the caller.
    async fn plan_sprint(&mut self, sprint_idx: usize) -> SearchResult<SprintCheck> {
        if sprint_idx > self.state.sprints.len() {
            return Err(SearchError::SprintOutOfRange {
                requested: sprint_idx,
                existing: self.state.sprints.len(),
            });
        }

        if sprint_idx < self.state.sprints.len() {
            let active = self.state.sprints[sprint_idx].status == SwarmStatus::Active;
            if !self.config.speculative_particles || !active {
                return Ok(SprintCheck::Decided {
                    active,
                    no_more_sprints: false,
                });
            }
            // With speculation on, only spill into a new swarm once every
            // active swarm already has its minimum particles.
            let active_ids = self.get_active_swarms(Some(sprint_idx));
            let particle_sets = try_join_all(
                active_ids
                    .iter()
                    .map(|id| self.results.particle_infos(id, false)),
            )
            .await?;
            let any_room = particle_sets
                .iter()
                .any(|infos| infos.len() < self.config.min_particles_per_swarm);
            if any_room {
                return Ok(SprintCheck::Decided {
                    active: true,
                    no_more_sprints: false,
                });
            }
            // Fall through and try to discover one more swarm.
        }

        if self.state.last_good_sprint.is_some() {
            return Ok(SprintCheck::Decided {
                active: false,
                no_more_sprints: true,
            });
        }
        // A fixed-fields fast search only ever has sprint 0.
        if self.config.is_fixed_fields() {
            return Ok(SprintCheck::Decided {
                active: false,
                no_more_sprints: true,
            });
        }
        if sprint_idx == 0 {
            // Sprint 0 is fully seeded at creation; there is nothing to
            // extend below it.
            return Ok(SprintCheck::Decided {
                active: true,
                no_more_sprints: false,
            });
        }

        let new_ids = self.discover_new_swarms(sprint_idx).await?;
        if new_ids.is_empty() {
            if self.state.swarms_in_sprint(sprint_idx).is_empty() {
                // Nothing left to combine; the search space is exhausted.
                return Ok(SprintCheck::Decided {
                    active: false,
                    no_more_sprints: true,
                });
            }
            return Ok(SprintCheck::Decided {
                active: true,
                no_more_sprints: false,
            });
        }

        info!(
            job = %self.job_id,
            sprint = sprint_idx,
            count = new_ids.len(),
            "creating swarms"
        );
        for id in new_ids {
            debug!(job = %self.job_id, sprint = sprint_idx, swarm = %id, "new swarm");
            self.state.add_active_swarm(id, sprint_idx);
        }
        self.state.refresh_active_swarms();
        self.dirty = true;
        Ok(SprintCheck::Created)
    }

    /// Swarm ids this sprint should contain but does not yet.
    async fn discover_new_swarms(&self, sprint_idx: usize) -> SearchResult<BTreeSet<SwarmId>> {
        let prev_idx = sprint_idx - 1;
        let prev_completed = self.state.sprints[prev_idx].status == SwarmStatus::Completed;

        // Base combinations to extend: the winner of a completed
        // predecessor, or every non-killed swarm of a speculative one.
        let base_sets: Vec<BTreeSet<String>> = if prev_completed {
            match self.best_model_in_completed_sprint(prev_idx) {
                Some((model_id, _)) => {
                    let particle =
                        self.results.particle_info(&model_id).await?.ok_or_else(|| {
                            StoreError::RecordNotFound(format!(
                                "results index has no particle for model {model_id}"
                            ))
                        })?;
                    vec![particle.swarm_id.encoder_set()]
                }
                // The predecessor completed without a single finite score;
                // there is nothing worth extending.
                None => Vec::new(),
            }
        } else {
            self.get_non_killed_swarms(prev_idx)
                .iter()
                .map(SwarmId::encoder_set)
                .collect()
        };

        let candidates = self.candidate_encoders().await?;

        if sprint_idx == 2 && self.tries_all_3_field_combinations() {
            return Ok(self.all_3_field_combinations(&candidates));
        }

        // While the predecessor is still speculative and active, bound the
        // fan-out: at most one new swarm per base set per pass.
        let only_first =
            !prev_completed && !self.get_active_swarms(Some(prev_idx)).is_empty();

        let mut new_ids = BTreeSet::new();
        for base in &base_sets {
            let mut added = false;
            for encoder in &candidates {
                if base.contains(encoder)
                    || self.state.blacklisted_encoders.contains(encoder)
                {
                    continue;
                }
                let mut encoders = base.clone();
                encoders.insert(encoder.clone());
                let id = SwarmId::from_encoders(encoders);
                if self.state.swarms.contains_key(&id) || new_ids.contains(&id) {
                    continue;
                }
                new_ids.insert(id);
                added = true;
                if only_first && added {
                    break;
                }
            }
        }
        Ok(new_ids)
    }

    /// Encoders eligible to be added to a base combination. Unlimited
    /// searches consider every known encoder; limited ones only the
    /// top-contributing fields above the contribution threshold.
    async fn candidate_encoders(&self) -> SearchResult<BTreeSet<String>> {
        if !self.config.limits_branching() {
            return Ok(self.config.encoder_names.clone());
        }
        let (pct, _) = self.get_field_contributions().await?;
        let mut ranked: Vec<(String, f64)> = pct.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let limit = self.config.max_branching.unwrap_or(ranked.len());
        let min_contribution = self.config.min_field_contribution;
        Ok(ranked
            .into_iter()
            .take(limit)
            .filter(|(_, contribution)| {
                min_contribution.is_none_or(|min| *contribution >= min)
            })
            .map(|(field, _)| field)
            .collect())
    }

    /// Sprint 2 exhaustive mode: every 2-combination of the candidate
    /// encoders plus the predicted field. The timestamp variant requires a
    /// timestamp-derived encoder in each pair.
    fn all_3_field_combinations(&self, candidates: &BTreeSet<String>) -> BTreeSet<SwarmId> {
        let pool: Vec<&String> = candidates
            .iter()
            .filter(|e| {
                **e != self.config.predicted_field
                    && !self.state.blacklisted_encoders.contains(*e)
            })
            .collect();

        let mut new_ids = BTreeSet::new();
        for (i, first) in pool.iter().enumerate() {
            for second in &pool[i + 1..] {
                if self.config.try_all_3_field_combinations_w_timestamps
                    && !self.config.timestamp_encoders.contains(*first)
                    && !self.config.timestamp_encoders.contains(*second)
                {
                    continue;
                }
                let id = SwarmId::from_encoders([
                    (*first).clone(),
                    (*second).clone(),
                    self.config.predicted_field.clone(),
                ]);
                if !self.state.swarms.contains_key(&id) {
                    new_ids.insert(id);
                }
            }
        }
        new_ids
    }
}
