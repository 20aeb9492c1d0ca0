//! Early termination of underperforming swarms.
//!
//! The terminator tracks per-swarm error scores generation by generation
//! and flags swarms that have stopped improving (plateau), run too long
//! (generation cutoff), or fallen too far behind the best swarm of their
//! generation (cross-swarm comparison). It is in-process state owned by
//! whichever process drives the authoritative results index; it is not
//! shared across workers and is rebuilt from scratch on restart.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::domain::errors::{SearchError, SearchResult};
use crate::domain::models::{SwarmId, TerminatorConfig};

/// Per-swarm, per-generation score tracker with early-termination
/// heuristics.
#[derive(Debug)]
pub struct SwarmTerminator {
    config: TerminatorConfig,
    /// Raw error score per generation, per swarm.
    swarm_scores: HashMap<SwarmId, Vec<f64>>,
    /// Running best-so-far (cumulative minimum) per generation, per swarm.
    swarm_bests: HashMap<SwarmId, Vec<f64>>,
    /// Every swarm ever flagged dead. Accumulates; never shrinks.
    terminated_swarms: HashSet<SwarmId>,
}

impl SwarmTerminator {
    /// Create a terminator with the given settings.
    pub fn new(config: TerminatorConfig) -> Self {
        Self {
            config,
            swarm_scores: HashMap::new(),
            swarm_bests: HashMap::new(),
            terminated_swarms: HashSet::new(),
        }
    }

    /// Record the error score a swarm achieved at a generation and return
    /// the set of swarms newly flagged for termination by this call.
    ///
    /// Generations for a given swarm must arrive strictly in order
    /// (0, 1, 2, ...). That is a caller obligation; violating it is a
    /// programmer error and aborts.
    pub fn record_data_point(
        &mut self,
        swarm_id: &SwarmId,
        generation: usize,
        err_score: f64,
    ) -> SearchResult<HashSet<SwarmId>> {
        let scores = self.swarm_scores.entry(swarm_id.clone()).or_default();
        assert_eq!(
            scores.len(),
            generation,
            "generations for swarm {swarm_id} must arrive strictly in order"
        );
        scores.push(err_score);

        let bests = self.swarm_bests.entry(swarm_id.clone()).or_default();
        let best = bests
            .last()
            .map_or(err_score, |prev| err_score.min(*prev));
        bests.push(best);

        // Too early to judge anything.
        if generation + 1 < self.config.maturity_window {
            return Ok(HashSet::new());
        }

        let mut flagged = HashSet::new();

        if let Some(max_generations) = self.config.max_generations {
            if generation > max_generations {
                info!(
                    swarm = %swarm_id,
                    generation,
                    max_generations,
                    "swarm exceeded generation cutoff"
                );
                flagged.insert(swarm_id.clone());
            }
        }

        if self.config.termination_enabled {
            flagged.extend(self.cross_swarm_terminations(generation)?);
        }

        // Plateau: best-so-far unchanged across the maturity window. Only
        // defined once the swarm has crossed the window.
        if generation >= self.config.maturity_window {
            let bests = &self.swarm_bests[swarm_id];
            if bests[generation] == bests[generation - self.config.maturity_window] {
                debug!(swarm = %swarm_id, generation, "swarm best score plateaued");
                flagged.insert(swarm_id.clone());
            }
        }

        let newly_flagged: HashSet<SwarmId> = flagged
            .difference(&self.terminated_swarms)
            .cloned()
            .collect();
        self.terminated_swarms.extend(flagged);
        Ok(newly_flagged)
    }

    /// Number of generations recorded for a swarm; 0 if unknown.
    pub fn num_data_points(&self, swarm_id: &SwarmId) -> usize {
        self.swarm_scores.get(swarm_id).map_or(0, Vec::len)
    }

    /// All swarms ever flagged for termination.
    pub fn terminated_swarms(&self) -> &HashSet<SwarmId> {
        &self.terminated_swarms
    }

    /// Compare every swarm with a score at this exact generation against
    /// the generation's best, flagging those outside the milestone
    /// tolerance.
    fn cross_swarm_terminations(&self, generation: usize) -> SearchResult<HashSet<SwarmId>> {
        let contenders: Vec<(&SwarmId, f64)> = self
            .swarm_scores
            .iter()
            .filter(|(id, scores)| {
                scores.len() > generation && !self.terminated_swarms.contains(*id)
            })
            .map(|(id, scores)| (id, scores[generation]))
            .collect();

        let Some(best_score) = contenders
            .iter()
            .map(|(_, score)| *score)
            .min_by(f64::total_cmp)
        else {
            return Ok(HashSet::new());
        };

        let tolerance = *self.config.milestones.get(generation).ok_or(
            SearchError::MilestoneOverrun {
                generation,
                available: self.config.milestones.len(),
            },
        )?;

        let cutoff = best_score * (1.0 + tolerance);
        let flagged: HashSet<SwarmId> = contenders
            .into_iter()
            .filter(|(_, score)| *score > cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        if !flagged.is_empty() {
            debug!(
                generation,
                best_score,
                tolerance,
                count = flagged.len(),
                "cross-swarm comparison flagged laggards"
            );
        }
        Ok(flagged)
    }
}
