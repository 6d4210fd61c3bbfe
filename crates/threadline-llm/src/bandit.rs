//! Contextual bandit policies for arm selection.
//!
//! Four pluggable policies share a [`BanditPolicy`] trait: ε-greedy and
//! UCB1 over a scalar mean reward, LinUCB-diagonal over context features,
//! and the deterministic QUALITY_FIRST shortlist (handled one layer up in
//! [`crate::router`], since it is a pre-filter rather than a scoring rule).

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use threadline_types::routing::ArmId;

/// Per-arm running statistics shared by the scalar-reward policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArmStats {
    /// Number of pulls.
    pub count: u64,
    /// Running mean of the composite reward.
    pub mean_reward: f64,
}

impl ArmStats {
    fn update(&mut self, reward: f64) {
        self.count += 1;
        self.mean_reward += (reward - self.mean_reward) / self.count as f64;
    }
}

/// Per-arm LinUCB-diagonal state: diagonal approximation of `A` (a vector of
/// per-feature precision) and the `b` accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinUcbArmState {
    /// Diagonal of `A` (initialized to the identity, i.e. all-ones).
    pub a_diag: Vec<f64>,
    /// The `b` vector.
    pub b: Vec<f64>,
}

impl LinUcbArmState {
    fn new(dim: usize) -> Self {
        Self {
            a_diag: vec![1.0; dim],
            b: vec![0.0; dim],
        }
    }

    fn theta(&self) -> Vec<f64> {
        self.a_diag
            .iter()
            .zip(self.b.iter())
            .map(|(a, b)| b / a)
            .collect()
    }

    fn update(&mut self, features: &[f32], reward: f64) {
        for (i, &x) in features.iter().enumerate() {
            let x = x as f64;
            self.a_diag[i] += x * x;
            self.b[i] += reward * x;
        }
    }

    fn ucb(&self, features: &[f32], alpha: f64) -> f64 {
        let theta = self.theta();
        let mean: f64 = theta
            .iter()
            .zip(features.iter())
            .map(|(t, &x)| t * x as f64)
            .sum();
        let variance: f64 = features
            .iter()
            .zip(self.a_diag.iter())
            .map(|(&x, a)| (x as f64).powi(2) / a)
            .sum();
        mean + alpha * variance.sqrt()
    }
}

/// Full persisted state for one policy across all arms: snapshotted on
/// interval and on shutdown, restored on startup. Restoring includes the
/// RNG seed so exploration resumes reproducibly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditState {
    /// Scalar stats, used by ε-greedy and UCB1.
    pub stats: HashMap<String, ArmStats>,
    /// LinUCB per-arm state, used only by the LinUCB policy.
    pub linucb: HashMap<String, LinUcbArmState>,
    /// Total pulls across all arms (UCB1's `N`).
    pub total_pulls: u64,
    /// RNG seed, restored verbatim so exploration is reproducible in tests.
    pub rng_seed: u64,
}

impl BanditState {
    /// A fresh, empty state seeded deterministically.
    pub fn new(rng_seed: u64) -> Self {
        Self {
            stats: HashMap::new(),
            linucb: HashMap::new(),
            total_pulls: 0,
            rng_seed,
        }
    }

    /// Record a reward observation for `arm`.
    pub fn record(&mut self, arm: &ArmId, reward: f64, features: &[f32]) {
        self.total_pulls += 1;
        let key = arm.key();
        self.stats.entry(key.clone()).or_default().update(reward);
        if !features.is_empty() {
            self.linucb
                .entry(key)
                .or_insert_with(|| LinUcbArmState::new(features.len()))
                .update(features, reward);
        }
    }
}

/// A pluggable arm-selection policy over a candidate set.
pub trait BanditPolicy: Send + Sync {
    /// Policy name, used in [`threadline_types::routing::RouteDecision::policy_name`].
    fn name(&self) -> &'static str;

    /// Select one arm from `candidates` given the current `state`.
    fn select<'a>(
        &self,
        candidates: &'a [ArmId],
        state: &BanditState,
        context_features: &[f32],
    ) -> Option<&'a ArmId>;

    /// If this policy explores randomly rather than exploiting the
    /// highest-scoring arm, return the chosen arm here. The default never
    /// explores; only ε-greedy overrides it.
    fn explore<'a>(&self, _candidates: &'a [ArmId], _state: &BanditState) -> Option<&'a ArmId> {
        None
    }

    /// The deterministic score `select` maximizes when not exploring.
    /// Higher is better. Exposed separately from `select` so a caller
    /// choosing among several arms with equal top score -- the router's
    /// cost/p95-latency tie-break -- can compute per-arm scores directly
    /// instead of depending on `select`'s own (candidate-order) tie-break.
    fn score(&self, arm: &ArmId, state: &BanditState, context_features: &[f32]) -> f64;
}

/// ε-greedy over mean reward: explore uniformly at random with probability
/// `epsilon`, otherwise exploit the best-known arm.
pub struct EpsilonGreedy {
    /// Exploration probability in `[0, 1]`.
    pub epsilon: f64,
}

impl BanditPolicy for EpsilonGreedy {
    fn name(&self) -> &'static str {
        "epsilon_greedy"
    }

    fn select<'a>(
        &self,
        candidates: &'a [ArmId],
        state: &BanditState,
        context_features: &[f32],
    ) -> Option<&'a ArmId> {
        if candidates.is_empty() {
            return None;
        }
        if let Some(arm) = self.explore(candidates, state) {
            return Some(arm);
        }
        candidates.iter().max_by(|a, b| {
            self.score(a, state, context_features)
                .partial_cmp(&self.score(b, state, context_features))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    fn explore<'a>(&self, candidates: &'a [ArmId], state: &BanditState) -> Option<&'a ArmId> {
        if candidates.is_empty() {
            return None;
        }
        // Derive the RNG from state.rng_seed and total_pulls rather than the
        // thread-global generator, so selection is a pure function of state
        // (repeated select on identical state and seed is
        // idempotent; the arm only changes once `record` advances the state).
        let mut rng = StdRng::seed_from_u64(state.rng_seed ^ state.total_pulls);
        if rng.gen_bool(self.epsilon.clamp(0.0, 1.0)) {
            let idx = rng.gen_range(0..candidates.len());
            Some(&candidates[idx])
        } else {
            None
        }
    }

    fn score(&self, arm: &ArmId, state: &BanditState, _context_features: &[f32]) -> f64 {
        state.stats.get(&arm.key()).map(|s| s.mean_reward).unwrap_or(0.0)
    }
}

/// UCB1: `mean_i + c * sqrt(ln(N) / n_i)`. Unpulled arms are prioritized
/// (treated as having infinite upper confidence bound).
pub struct Ucb1 {
    /// Exploration constant `c`.
    pub c: f64,
}

impl BanditPolicy for Ucb1 {
    fn name(&self) -> &'static str {
        "ucb1"
    }

    fn select<'a>(
        &self,
        candidates: &'a [ArmId],
        state: &BanditState,
        context_features: &[f32],
    ) -> Option<&'a ArmId> {
        if candidates.is_empty() {
            return None;
        }
        candidates.iter().max_by(|a, b| {
            self.score(a, state, context_features)
                .partial_cmp(&self.score(b, state, context_features))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    fn score(&self, arm: &ArmId, state: &BanditState, _context_features: &[f32]) -> f64 {
        let total = (state.total_pulls.max(1)) as f64;
        match state.stats.get(&arm.key()) {
            None => f64::INFINITY,
            Some(stats) if stats.count == 0 => f64::INFINITY,
            Some(stats) => stats.mean_reward + self.c * (total.ln() / stats.count as f64).sqrt(),
        }
    }
}

/// LinUCB-diagonal: contextual bandit using per-arm diagonal `(A, b)` state.
pub struct LinUcbDiagonal {
    /// Exploration constant `alpha`.
    pub alpha: f64,
}

impl BanditPolicy for LinUcbDiagonal {
    fn name(&self) -> &'static str {
        "linucb_diagonal"
    }

    fn select<'a>(
        &self,
        candidates: &'a [ArmId],
        state: &BanditState,
        context_features: &[f32],
    ) -> Option<&'a ArmId> {
        if candidates.is_empty() || context_features.is_empty() {
            return None;
        }
        candidates.iter().max_by(|a, b| {
            self.score(a, state, context_features)
                .partial_cmp(&self.score(b, state, context_features))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    fn score(&self, arm: &ArmId, state: &BanditState, context_features: &[f32]) -> f64 {
        if context_features.is_empty() {
            return f64::NEG_INFINITY;
        }
        state
            .linucb
            .get(&arm.key())
            .map(|s| s.ucb(context_features, self.alpha))
            .unwrap_or(f64::INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm(n: &str) -> ArmId {
        ArmId::new("p", n)
    }

    #[test]
    fn epsilon_greedy_exploits_best_known_arm_when_epsilon_zero() {
        let mut state = BanditState::new(1);
        state.record(&arm("a"), 0.2, &[]);
        state.record(&arm("b"), 0.9, &[]);
        let policy = EpsilonGreedy { epsilon: 0.0 };
        let candidates = vec![arm("a"), arm("b")];
        let picked = policy.select(&candidates, &state, &[]).unwrap();
        assert_eq!(picked.model, "b");
    }

    #[test]
    fn ucb1_prefers_unpulled_arm() {
        let mut state = BanditState::new(1);
        state.record(&arm("a"), 0.5, &[]);
        state.total_pulls = 1;
        let policy = Ucb1 { c: 1.0 };
        let candidates = vec![arm("a"), arm("b")];
        let picked = policy.select(&candidates, &state, &[]).unwrap();
        assert_eq!(picked.model, "b");
    }

    #[test]
    fn linucb_prefers_higher_theta_dot_features() {
        let mut state = BanditState::new(1);
        state.record(&arm("a"), 1.0, &[1.0, 0.0]);
        state.record(&arm("b"), 0.0, &[1.0, 0.0]);
        let policy = LinUcbDiagonal { alpha: 0.1 };
        let candidates = vec![arm("a"), arm("b")];
        let picked = policy.select(&candidates, &state, &[1.0, 0.0]).unwrap();
        assert_eq!(picked.model, "a");
    }

    #[test]
    fn linucb_returns_none_without_context_features() {
        let state = BanditState::new(1);
        let policy = LinUcbDiagonal { alpha: 0.1 };
        let candidates = vec![arm("a")];
        assert!(policy.select(&candidates, &state, &[]).is_none());
    }

    #[test]
    fn ucb1_score_ties_on_cold_start() {
        // Every arm is unpulled, so `score` must report the same sentinel
        // for all of them -- callers like the router rely on this to detect
        // a genuine tie rather than treating `max_by`'s pick as decisive.
        let state = BanditState::new(1);
        let policy = Ucb1 { c: 1.0 };
        assert_eq!(policy.score(&arm("a"), &state, &[]), f64::INFINITY);
        assert_eq!(policy.score(&arm("b"), &state, &[]), f64::INFINITY);
    }

    #[test]
    fn epsilon_greedy_explore_is_none_at_zero_epsilon() {
        let state = BanditState::new(1);
        let candidates = vec![arm("a"), arm("b")];
        assert!(EpsilonGreedy { epsilon: 0.0 }.explore(&candidates, &state).is_none());
    }

    #[test]
    fn non_exploring_policies_never_explore() {
        let state = BanditState::new(1);
        let candidates = vec![arm("a")];
        assert!(Ucb1 { c: 1.0 }.explore(&candidates, &state).is_none());
        assert!(LinUcbDiagonal { alpha: 0.1 }.explore(&candidates, &state).is_none());
    }

    #[test]
    fn empty_candidates_yields_none() {
        let state = BanditState::new(1);
        assert!(EpsilonGreedy { epsilon: 0.1 }.select(&[], &state, &[]).is_none());
        assert!(Ucb1 { c: 1.0 }.select(&[], &state, &[]).is_none());
    }

    #[test]
    fn state_record_tracks_total_pulls_and_mean() {
        let mut state = BanditState::new(7);
        state.record(&arm("a"), 1.0, &[]);
        state.record(&arm("a"), 0.0, &[]);
        assert_eq!(state.total_pulls, 2);
        let stats = state.stats.get("p:a").unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.mean_reward - 0.5).abs() < 1e-9);
    }

    #[test]
    fn epsilon_greedy_select_is_idempotent_on_identical_state() {
        let state = BanditState::new(99);
        let policy = EpsilonGreedy { epsilon: 0.5 };
        let candidates = vec![arm("a"), arm("b"), arm("c")];
        let first = policy.select(&candidates, &state, &[]).unwrap().clone();
        for _ in 0..5 {
            let again = policy.select(&candidates, &state, &[]).unwrap();
            assert_eq!(again.model, first.model);
        }
    }

    #[test]
    fn state_preserves_rng_seed_across_clone() {
        let state = BanditState::new(42);
        let cloned = state.clone();
        assert_eq!(cloned.rng_seed, 42);
    }
}
