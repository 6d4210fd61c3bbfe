//! The LLM router: arm filtering, bandit-driven selection, the
//! deterministic high-stakes backstop, and reward feedback.

use std::collections::HashMap;
use std::sync::Arc;

use threadline_types::config::RouterConfig;
use threadline_types::routing::{ArmId, ArmProfile, RouteDecision, RouteRequest, Reward, TaskStakes};
use tokio::sync::RwLock;

use crate::bandit::{BanditPolicy, BanditState, EpsilonGreedy, LinUcbDiagonal, Ucb1};
use crate::error::{ProviderError, Result};
use crate::provider::{ChatRequest, ChatResponse, ProviderAdapter};

/// Reward weights for the composite score. Weights depend on the active
/// policy; QUALITY_FIRST weighs quality much more heavily than the default.
#[derive(Debug, Clone, Copy)]
pub struct RewardWeights {
    /// Weight on caller-supplied quality.
    pub w_quality: f32,
    /// Weight on `1 - normalized cost`.
    pub w_cost: f32,
    /// Weight on `1 - normalized latency`.
    pub w_latency: f32,
}

impl RewardWeights {
    /// Default balanced weights used by cost/latency-aware policies.
    pub const DEFAULT: RewardWeights = RewardWeights {
        w_quality: 0.5,
        w_cost: 0.3,
        w_latency: 0.2,
    };

    /// QUALITY_FIRST weighting.
    pub const QUALITY_FIRST: RewardWeights = RewardWeights {
        w_quality: 0.8,
        w_cost: 0.1,
        w_latency: 0.1,
    };
}

/// One attempt made while resolving a single logical request -- either the
/// sole attempt, or (under the high-stakes backstop) one of exactly two.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// The arm used for this attempt.
    pub arm_id: ArmId,
    /// Quality observed for this attempt.
    pub quality: f32,
    /// Whether the call succeeded.
    pub success: bool,
}

/// The full outcome of routing + calling + recording a reward for one
/// logical request.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    /// The arm ultimately chosen (the better of the two attempts, under the backstop).
    pub decision: RouteDecision,
    /// The response from the chosen attempt.
    pub response: ChatResponse,
    /// The reward recorded for the chosen attempt.
    pub reward: Reward,
    /// Whether the high-stakes backstop retry fired.
    pub retried: bool,
    /// Every attempt made, in order.
    pub attempts: Vec<AttemptRecord>,
}

/// Evaluates response quality in `[0, 1]`. Supplied by the caller; `None`
/// means unknown.
pub trait QualityEvaluator: Send + Sync {
    /// Score a response.
    fn evaluate(&self, response: &ChatResponse) -> Option<f32>;
}

impl<F> QualityEvaluator for F
where
    F: Fn(&ChatResponse) -> Option<f32> + Send + Sync,
{
    fn evaluate(&self, response: &ChatResponse) -> Option<f32> {
        self(response)
    }
}

fn build_policy(config: &RouterConfig) -> Box<dyn BanditPolicy> {
    use threadline_types::config::RouterPolicyName;
    match config.policy {
        RouterPolicyName::QualityFirst => Box::new(Ucb1 { c: 1.0 }),
        RouterPolicyName::CostAware => Box::new(EpsilonGreedy { epsilon: 0.1 }),
        RouterPolicyName::LatencyAware => Box::new(LinUcbDiagonal { alpha: 0.5 }),
    }
}

/// Selects among provider/model arms via a contextual bandit, invokes the
/// chosen provider, and feeds outcomes back into the learner.
pub struct LlmRouter {
    profiles: Vec<ArmProfile>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    policy: Box<dyn BanditPolicy>,
    state: RwLock<BanditState>,
    config: RouterConfig,
    weights: RewardWeights,
}

impl LlmRouter {
    /// Construct a router over a static arm registry and adapter set.
    pub fn new(
        profiles: Vec<ArmProfile>,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        config: RouterConfig,
        rng_seed: u64,
    ) -> Self {
        let weights = match config.policy {
            threadline_types::config::RouterPolicyName::QualityFirst => RewardWeights::QUALITY_FIRST,
            _ => RewardWeights::DEFAULT,
        };
        Self {
            policy: build_policy(&config),
            profiles,
            adapters,
            state: RwLock::new(BanditState::new(rng_seed)),
            config,
            weights,
        }
    }

    /// Restore a previously persisted bandit state ("restore
    /// must include RNG seed to preserve reproducibility").
    pub async fn restore_state(&self, state: BanditState) {
        *self.state.write().await = state;
    }

    /// Snapshot the current bandit state for persistence.
    pub async fn snapshot_state(&self) -> BanditState {
        self.state.read().await.clone()
    }

    /// Step 1+2 of selection order: filter by capability and
    /// budget, then -- for QUALITY_FIRST tasks -- restrict to the curated
    /// shortlist, falling through to the full filtered set if that's empty.
    fn eligible_arms(&self, request: &RouteRequest) -> Vec<&ArmProfile> {
        let mut eligible: Vec<&ArmProfile> = self
            .profiles
            .iter()
            .filter(|p| {
                request
                    .required_capabilities
                    .iter()
                    .all(|cap| p.capabilities.contains(cap))
            })
            .filter(|p| {
                let est = estimate_cost(p, &request.prompt);
                est <= request.budget_usd
            })
            .filter(|p| {
                self.config.provider_allowlist.is_empty()
                    || self.config.provider_allowlist.contains(&p.arm.provider)
            })
            .collect();

        if self.config.quality_first_tasks.contains(&request.task_type) {
            let shortlist: Vec<&ArmProfile> =
                eligible.iter().copied().filter(|p| p.quality_tier).collect();
            if !shortlist.is_empty() {
                eligible = shortlist;
            }
        }
        eligible
    }

    /// Step 3+4: query the bandit policy over the eligible set. If the
    /// policy explores (ε-greedy's random branch), take that arm outright;
    /// otherwise score every eligible arm, gather every arm tied at the
    /// max score, and break ties by lower cost, then lower p95 latency --
    /// computed directly over the candidate scores rather than relying on
    /// the policy's `select` returning `None`, since `max_by` always
    /// returns an arm for a non-empty candidate set (e.g. every unpulled
    /// arm scoring `f64::INFINITY` on cold start).
    async fn select(&self, request: &RouteRequest, eligible: &[&ArmProfile]) -> Option<ArmId> {
        if eligible.is_empty() {
            return None;
        }
        let candidates: Vec<ArmId> = eligible.iter().map(|p| p.arm.clone()).collect();
        let features = context_features(request);
        let state = self.state.read().await;

        if let Some(explored) = self.policy.explore(&candidates, &state) {
            return Some(explored.clone());
        }

        let scores: Vec<f64> = eligible
            .iter()
            .map(|p| self.policy.score(&p.arm, &state, &features))
            .collect();
        drop(state);

        const TIE_EPSILON: f64 = 1e-9;
        let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        eligible
            .iter()
            .zip(scores.iter())
            .filter(|(_, &score)| scores_tied(score, max_score, TIE_EPSILON))
            .map(|(p, _)| *p)
            .min_by(|a, b| {
                estimate_cost(a, &request.prompt)
                    .partial_cmp(&estimate_cost(b, &request.prompt))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.p95_latency_ms.cmp(&b.p95_latency_ms))
            })
            .map(|p| p.arm.clone())
    }

    /// The deterministic top-tier shortlist pick used by the high-stakes
    /// backstop: lowest-cost quality-tier arm, excluding the
    /// arm already tried.
    fn deterministic_top_tier(&self, request: &RouteRequest, exclude: &ArmId) -> Option<ArmId> {
        self.profiles
            .iter()
            .filter(|p| p.quality_tier && &p.arm != exclude)
            .filter(|p| {
                request
                    .required_capabilities
                    .iter()
                    .all(|cap| p.capabilities.contains(cap))
            })
            .min_by(|a, b| {
                estimate_cost(a, &request.prompt)
                    .partial_cmp(&estimate_cost(b, &request.prompt))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|p| p.arm.clone())
    }

    fn profile_of(&self, arm: &ArmId) -> Option<&ArmProfile> {
        self.profiles.iter().find(|p| &p.arm == arm)
    }

    fn adapter_for(&self, arm: &ArmId) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&arm.provider)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(arm.provider.clone()))
    }

    async fn call_arm(
        &self,
        arm: &ArmId,
        chat: &ChatRequest,
    ) -> (Result<ChatResponse>, u64) {
        let adapter = match self.adapter_for(arm) {
            Ok(a) => a,
            Err(e) => return (Err(e), 0),
        };
        let started = std::time::Instant::now();
        let result = adapter.complete(chat).await;
        (result, started.elapsed().as_millis() as u64)
    }

    fn composite_reward(&self, profile: &ArmProfile, quality: f32, latency_ms: u64, success: bool) -> f32 {
        if !success {
            return -1.0;
        }
        let norm_cost = (profile.cost_per_1k_in / 0.1).min(1.0) as f32;
        let norm_latency = (latency_ms as f32 / 10_000.0).min(1.0);
        let w = self.weights;
        (w.w_quality * quality + w.w_cost * (1.0 - norm_cost) + w.w_latency * (1.0 - norm_latency))
            .clamp(-1.0, 1.0)
    }

    async fn record(&self, request: &RouteRequest, arm: &ArmId, reward: &Reward) {
        let features = context_features(request);
        let mut state = self.state.write().await;
        state.record(arm, reward.composite as f64, &features);
        metrics::histogram!("router_reward", "arm" => arm.key()).record(reward.composite as f64);
    }

    fn route_decision(&self, request: &RouteRequest, arm: &ArmId) -> RouteDecision {
        let profile = self.profile_of(arm);
        RouteDecision {
            arm_id: arm.clone(),
            policy_name: self.policy.name().to_string(),
            context_features: context_features(request),
            estimated_cost_usd: profile
                .map(|p| estimate_cost(p, &request.prompt))
                .unwrap_or(0.0),
            capability_tags: request.required_capabilities.clone(),
        }
    }

    /// Route `request`, execute `chat` against the chosen arm, score the
    /// response with `evaluator`, and record a reward. Applies the
    /// deterministic high-stakes backstop ("if a high-stakes task
    /// returns quality < 0.7 once, the router retries exactly once with a
    /// deterministic shortlisted top-tier arm; both attempts are recorded
    /// and the better one returned").
    pub async fn route_and_call(
        &self,
        request: &RouteRequest,
        chat: ChatRequest,
        evaluator: &dyn QualityEvaluator,
    ) -> Result<RouteOutcome> {
        let eligible = self.eligible_arms(request);
        let first_arm = self
            .select(request, &eligible)
            .await
            .ok_or_else(|| ProviderError::NoEligibleArm(request.task_type.clone()))?;

        let (first_result, first_latency) = self.call_arm(&first_arm, &chat).await;
        let first_success = first_result.is_ok();
        let first_quality = first_result
            .as_ref()
            .ok()
            .and_then(|r| evaluator.evaluate(r))
            .unwrap_or(if first_success { 0.5 } else { 0.0 });

        let mut attempts = vec![AttemptRecord {
            arm_id: first_arm.clone(),
            quality: first_quality,
            success: first_success,
        }];

        let needs_backstop =
            request.stakes == TaskStakes::HighStakes && first_success && first_quality < 0.7;

        if !needs_backstop {
            let response = first_result?;
            let profile = self.profile_of(&first_arm).cloned();
            let composite = profile
                .as_ref()
                .map(|p| self.composite_reward(p, first_quality, first_latency, first_success))
                .unwrap_or(if first_success { first_quality } else { -1.0 });
            let cost_usd = profile
                .as_ref()
                .map(|p| estimate_cost(p, &chat_text_len(&chat)))
                .unwrap_or(0.0);
            let reward = Reward {
                arm_id: first_arm.clone(),
                quality: first_quality,
                cost_usd,
                latency_ms: first_latency,
                success: first_success,
                composite,
            };
            self.record(request, &first_arm, &reward).await;
            return Ok(RouteOutcome {
                decision: self.route_decision(request, &first_arm),
                response,
                reward,
                retried: false,
                attempts,
            });
        }

        tracing::info!(
            arm = %first_arm,
            quality = first_quality,
            "high-stakes backstop triggered, retrying with deterministic top-tier arm"
        );

        let backstop_arm = match self.deterministic_top_tier(request, &first_arm) {
            Some(a) => a,
            None => {
                // No alternative arm available; fall through with the first attempt.
                let response = first_result?;
                let profile = self.profile_of(&first_arm).cloned();
                let composite = profile
                    .as_ref()
                    .map(|p| self.composite_reward(p, first_quality, first_latency, first_success))
                    .unwrap_or(first_quality);
                let reward = Reward {
                    arm_id: first_arm.clone(),
                    quality: first_quality,
                    cost_usd: 0.0,
                    latency_ms: first_latency,
                    success: first_success,
                    composite,
                };
                self.record(request, &first_arm, &reward).await;
                return Ok(RouteOutcome {
                    decision: self.route_decision(request, &first_arm),
                    response,
                    reward,
                    retried: false,
                    attempts,
                });
            }
        };

        let (second_result, second_latency) = self.call_arm(&backstop_arm, &chat).await;
        let second_success = second_result.is_ok();
        let second_quality = second_result
            .as_ref()
            .ok()
            .and_then(|r| evaluator.evaluate(r))
            .unwrap_or(if second_success { 0.5 } else { 0.0 });

        attempts.push(AttemptRecord {
            arm_id: backstop_arm.clone(),
            quality: second_quality,
            success: second_success,
        });

        // Both attempts are recorded; the better one is returned.
        let first_profile = self.profile_of(&first_arm).cloned();
        let first_composite = first_profile
            .as_ref()
            .map(|p| self.composite_reward(p, first_quality, first_latency, first_success))
            .unwrap_or(if first_success { first_quality } else { -1.0 });
        let first_reward = Reward {
            arm_id: first_arm.clone(),
            quality: first_quality,
            cost_usd: 0.0,
            latency_ms: first_latency,
            success: first_success,
            composite: first_composite,
        };
        self.record(request, &first_arm, &first_reward).await;

        let second_profile = self.profile_of(&backstop_arm).cloned();
        let second_composite = second_profile
            .as_ref()
            .map(|p| self.composite_reward(p, second_quality, second_latency, second_success))
            .unwrap_or(if second_success { second_quality } else { -1.0 });
        let second_reward = Reward {
            arm_id: backstop_arm.clone(),
            quality: second_quality,
            cost_usd: 0.0,
            latency_ms: second_latency,
            success: second_success,
            composite: second_composite,
        };
        self.record(request, &backstop_arm, &second_reward).await;

        if second_quality >= first_quality && second_result.is_ok() {
            Ok(RouteOutcome {
                decision: self.route_decision(request, &backstop_arm),
                response: second_result?,
                reward: second_reward,
                retried: true,
                attempts,
            })
        } else {
            Ok(RouteOutcome {
                decision: self.route_decision(request, &first_arm),
                response: first_result?,
                reward: first_reward,
                retried: true,
                attempts,
            })
        }
    }
}

fn chat_text_len(chat: &ChatRequest) -> String {
    chat.messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rough token-count-based cost estimate: ~4 chars per token, input only
/// (the router estimates before the call completes, so output cost is
/// unknown).
fn estimate_cost(profile: &ArmProfile, prompt: &str) -> f64 {
    let tokens = (prompt.len() as f64 / 4.0).max(1.0);
    (tokens / 1000.0) * profile.cost_per_1k_in
}

/// Context feature vector for LinUCB: `[prompt_len_norm, budget_norm]`.
fn context_features(request: &RouteRequest) -> Vec<f32> {
    vec![
        (request.prompt.len() as f32 / 4000.0).min(1.0),
        (request.budget_usd as f32 / 1.0).min(1.0),
    ]
}

/// Whether `score` ties the max for the purposes of the cost/p95-latency
/// tie-break. Exact equality is checked first so two arms both scoring
/// `f64::INFINITY` (every arm unpulled at cold start) tie correctly --
/// `INFINITY - INFINITY` is `NaN`, which an epsilon comparison alone would
/// never treat as within range.
fn scores_tied(score: f64, max_score: f64, epsilon: f64) -> bool {
    score == max_score || (score - max_score).abs() <= epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProviderAdapter;
    use std::collections::HashSet;

    fn profile(provider: &str, model: &str, cost: f64, quality_tier: bool) -> ArmProfile {
        ArmProfile {
            arm: ArmId::new(provider, model),
            capabilities: HashSet::new(),
            cost_per_1k_in: cost,
            cost_per_1k_out: cost,
            context_window: 8000,
            quality_tier,
            p95_latency_ms: 500,
        }
    }

    fn router_with(profiles: Vec<ArmProfile>) -> LlmRouter {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        for p in &profiles {
            adapters
                .entry(p.arm.provider.clone())
                .or_insert_with(|| Arc::new(MockProviderAdapter::new(p.arm.provider.clone(), "ok")));
        }
        LlmRouter::new(profiles, adapters, RouterConfig::default(), 7)
    }

    fn request(task_type: &str, stakes: TaskStakes) -> RouteRequest {
        RouteRequest {
            prompt: "hello world".into(),
            task_type: task_type.into(),
            required_capabilities: HashSet::new(),
            budget_usd: 10.0,
            stakes,
        }
    }

    #[tokio::test]
    async fn routes_and_records_reward_for_normal_task() {
        let router = router_with(vec![profile("openai", "gpt-4o", 0.01, false)]);
        let chat = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![],
            max_tokens: None,
        };
        let outcome = router
            .route_and_call(&request("chat", TaskStakes::Normal), chat, &(|_: &ChatResponse| Some(0.9)))
            .await
            .unwrap();
        assert!(!outcome.retried);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.decision.arm_id.provider, "openai");
    }

    #[tokio::test]
    async fn high_stakes_low_quality_triggers_exactly_one_retry() {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(
            "weak".into(),
            Arc::new(MockProviderAdapter::new("weak", "meh")),
        );
        adapters.insert(
            "strong".into(),
            Arc::new(MockProviderAdapter::new("strong", "great")),
        );
        let profiles = vec![profile("weak", "m", 0.01, false), profile("strong", "m", 0.05, true)];
        let router = LlmRouter::new(profiles, adapters, RouterConfig::default(), 1);
        let chat = ChatRequest {
            model: "m".into(),
            messages: vec![],
            max_tokens: None,
        };
        let eval = |r: &ChatResponse| {
            if r.content == "meh" {
                Some(0.4)
            } else {
                Some(0.95)
            }
        };
        // Force the first pick by restricting eligibility: only "weak" passes
        // required_capabilities trivially so either could be picked by the
        // bandit on an empty state; assert on the outcome shape instead of
        // the specific arm.
        let outcome = router
            .route_and_call(&request("verification", TaskStakes::HighStakes), chat, &eval)
            .await
            .unwrap();
        assert!(outcome.attempts.len() <= 2);
        if outcome.attempts[0].quality < 0.7 {
            assert!(outcome.retried);
            assert_eq!(outcome.attempts.len(), 2);
            assert!(outcome.reward.quality >= outcome.attempts[0].quality);
        }
    }

    #[tokio::test]
    async fn no_eligible_arm_when_budget_too_low() {
        let router = router_with(vec![profile("openai", "gpt-4o", 100.0, false)]);
        let chat = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![],
            max_tokens: None,
        };
        let mut req = request("chat", TaskStakes::Normal);
        req.budget_usd = 0.0001;
        let result = router.route_and_call(&req, chat, &(|_: &ChatResponse| Some(0.9))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn quality_first_task_restricts_to_shortlist() {
        let profiles = vec![
            profile("cheap", "m", 0.001, false),
            profile("premium", "m", 0.05, true),
        ];
        let mut config = RouterConfig::default();
        config.quality_first_tasks = vec!["verification".into()];
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert("cheap".into(), Arc::new(MockProviderAdapter::new("cheap", "x")));
        adapters.insert("premium".into(), Arc::new(MockProviderAdapter::new("premium", "y")));
        let router = LlmRouter::new(profiles, adapters, config, 3);
        let eligible = router.eligible_arms(&request("verification", TaskStakes::Normal));
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].arm.provider, "premium");
    }

    #[tokio::test]
    async fn cold_start_tie_breaks_by_cost_then_p95_latency() {
        // Every arm is unpulled, so UCB1's score is `f64::INFINITY` for all
        // three -- a genuine tie, not a `None` from the policy. The cheapest
        // arm must win; among arms tied on cost too, the lower-p95 one must.
        let mut expensive = profile("costly", "m", 0.05, false);
        expensive.p95_latency_ms = 100;
        let mut cheap_slow = profile("cheap-slow", "m", 0.01, false);
        cheap_slow.p95_latency_ms = 900;
        let mut cheap_fast = profile("cheap-fast", "m", 0.01, false);
        cheap_fast.p95_latency_ms = 200;

        let mut config = RouterConfig::default();
        config.policy = threadline_types::config::RouterPolicyName::QualityFirst;
        let router = router_with_config(vec![expensive, cheap_slow, cheap_fast], config);

        let req = request("chat", TaskStakes::Normal);
        let eligible = router.eligible_arms(&req);
        let picked = router.select(&req, &eligible).await.unwrap();
        assert_eq!(picked.provider, "cheap-fast");
    }

    fn router_with_config(profiles: Vec<ArmProfile>, config: RouterConfig) -> LlmRouter {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        for p in &profiles {
            adapters
                .entry(p.arm.provider.clone())
                .or_insert_with(|| Arc::new(MockProviderAdapter::new(p.arm.provider.clone(), "ok")));
        }
        LlmRouter::new(profiles, adapters, config, 7)
    }
}
