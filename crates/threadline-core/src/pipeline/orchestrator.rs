//! The staged pipeline orchestrator: acquire, transcribe,
//! quality-gate, fan out to analysis, persist, notify -- or bypass to the
//! lightweight finalize path. Every stage wraps its collaborator call with
//! timing, tenancy stamping, and the `pipeline_failures_total{stage,category}`
//! counter; the whole request is driven by one cancellation token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use threadline_types::error::{ErrorCategory, PipelineError, Result as PipelineResult};
use threadline_types::step_result::{StepMetadata, StepResult};
use threadline_types::tenant::TenantContext;
use threadline_types::transcript::Transcript;

use crate::pipeline::checkpoint::CheckpointOutcome;
use crate::pipeline::quality;
use crate::pipeline::traits::{AcquiredMedia, AnalysisContext, AnalysisTool};
use crate::runtime::PipelineRuntime;
use crate::tenancy::{self, RequestLifecycle};

/// Pipeline mode ("Depth"), governing which optional stages participate
/// and the overall request deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Standard,
    Deep,
    Experimental,
}

impl Depth {
    /// The string form used as a checkpoint-table depth key.
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Standard => "standard",
            Depth::Deep => "deep",
            Depth::Experimental => "experimental",
        }
    }

    fn default_budget(self) -> Duration {
        match self {
            Depth::Standard => Duration::from_secs(120),
            Depth::Deep => Duration::from_secs(240),
            Depth::Experimental => Duration::from_secs(600),
        }
    }

    fn runs_graph_memory(self) -> bool {
        matches!(self, Depth::Deep | Depth::Experimental)
    }

    fn runs_perspective_synthesis(self) -> bool {
        matches!(self, Depth::Deep | Depth::Experimental)
    }

    /// At `experimental` depth a graph-memory failure is treated with the
    /// same severity as a stage 1-5 failure (fails the pipeline, skips
    /// Notify); other depths only warn and let the pipeline finish.
    fn graph_memory_failure_is_fatal(self) -> bool {
        matches!(self, Depth::Experimental)
    }
}

fn stamp(step: &str, tc: &TenantContext, start: Instant) -> StepMetadata {
    StepMetadata {
        step: step.to_string(),
        latency_ms: start.elapsed().as_millis() as u64,
        tenant: tc.tenant_id.clone(),
        workspace: tc.workspace_id.clone(),
        ..Default::default()
    }
}

fn record_failure(stage: &str, err: &PipelineError) {
    let category = format!("{:?}", err.category).to_lowercase();
    metrics::counter!("pipeline_failures_total", "stage" => stage.to_string(), "category" => category)
        .increment(1);
    tracing::warn!(stage, category = ?err.category, message = %err.message, "pipeline stage failed");
}

fn tenancy_tag(err: PipelineError, tc: &TenantContext) -> PipelineError {
    err.with_tenancy(&tc.tenant_id, &tc.workspace_id, &tc.request_id)
}

fn cancelled_result(stage: &str, tc: &TenantContext, start: Instant) -> StepResult {
    let err = tenancy_tag(
        PipelineError::new(ErrorCategory::Cancelled, "request cancelled", stage).with_retryable(false),
        tc,
    );
    record_failure(stage, &err);
    StepResult::fail(stamp(stage, tc, start), err)
}

/// Deadline exceeded at any point surfaces as `error.category=timeout`,
/// `retryable=false`.
fn deadline_exceeded_result(stage: &str, tc: &TenantContext, start: Instant) -> StepResult {
    let err = tenancy_tag(
        PipelineError::new(ErrorCategory::Timeout, "request budget exceeded", stage).with_retryable(false),
        tc,
    );
    record_failure(stage, &err);
    StepResult::fail(stamp(stage, tc, start), err)
}

/// Run the staged pipeline for `url` under `tc`, to completion, cancellation,
/// or bypass. This is the crate's one public entry point (/// `Run(ctx, url, depth) -> StepResult`).
pub async fn run(
    runtime: &PipelineRuntime,
    tc: TenantContext,
    url: &str,
    depth: Depth,
    cancel: CancellationToken,
) -> StepResult {
    let request_start = Instant::now();
    let lifecycle = RequestLifecycle::new(tc.request_id.clone());
    lifecycle.activate();

    let budget = runtime
        .config
        .pipeline
        .request_budget_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| depth.default_budget());

    macro_rules! bail_if_cancelled {
        ($stage:expr) => {
            if cancel.is_cancelled() {
                lifecycle.fail();
                return cancelled_result($stage, &tc, request_start);
            }
            if request_start.elapsed() > budget {
                lifecycle.fail();
                return deadline_exceeded_result($stage, &tc, request_start);
            }
        };
    }

    bail_if_cancelled!("acquire");

    // Stage 1: Acquire.
    let acquire_start = Instant::now();
    let acquired = match runtime.tools.acquirer.acquire(url).await {
        Ok(media) => media,
        Err(err) => {
            let err = tenancy_tag(err, &tc);
            record_failure("acquire", &err);
            lifecycle.fail();
            return StepResult::fail(stamp("acquire", &tc, acquire_start), err);
        }
    };
    let acquire_result = StepResult::ok(stamp("acquire", &tc, acquire_start), acquired_media_json(&acquired));

    bail_if_cancelled!("checkpoint_a");

    // Stage 2: Early-exit checkpoint A (post-download).
    let mut fields = HashMap::new();
    fields.insert("duration_s".to_string(), acquired.duration_s);
    let outcome = runtime.checkpoints.evaluate("acquire", depth.as_str(), &fields);
    crate::pipeline::checkpoint::log_checkpoint(&tc, "checkpoint_a", &outcome);
    match outcome {
        CheckpointOutcome::Proceed => {}
        CheckpointOutcome::Skip { reason } => {
            let score = 0.0;
            lifecycle.complete();
            return lightweight_finalize(
                runtime,
                &tc,
                request_start,
                depth,
                score,
                &reason,
                acquired.title.as_deref(),
                "",
            )
            .await;
        }
        CheckpointOutcome::Fail { reason } => {
            let err = tenancy_tag(PipelineError::new(ErrorCategory::Processing, reason, "checkpoint_a"), &tc);
            record_failure("checkpoint_a", &err);
            lifecycle.fail();
            return StepResult::fail(stamp("checkpoint_a", &tc, request_start), err);
        }
    }

    bail_if_cancelled!("transcribe");

    // Stage 3: Transcribe.
    let transcribe_start = Instant::now();
    let transcript = match runtime.tools.transcriber.transcribe(&acquired.local_path, None).await {
        Ok(t) => t,
        Err(err) => {
            let err = tenancy_tag(err, &tc);
            record_failure("transcribe", &err);
            lifecycle.fail();
            return StepResult::fail(stamp("transcribe", &tc, transcribe_start), err);
        }
    };
    let transcribe_result = StepResult::ok(stamp("transcribe", &tc, transcribe_start), transcript_json(&transcript));

    bail_if_cancelled!("checkpoint_b");

    // Stage 4: Early-exit checkpoint B (post-transcription).
    if transcript.is_degenerate() {
        lifecycle.complete();
        return lightweight_finalize(
            runtime,
            &tc,
            request_start,
            depth,
            0.0,
            "degenerate transcript",
            acquired.title.as_deref(),
            &transcript.full_text(),
        )
        .await;
    }

    bail_if_cancelled!("quality");

    // Stage 5: Quality assess.
    let quality_start = Instant::now();
    let assessment = quality::assess(&transcript.full_text(), &runtime.config.quality);
    let quality_result = StepResult::ok(
        stamp("quality", &tc, quality_start),
        serde_json::to_value(&assessment).unwrap_or(Value::Null),
    );

    if runtime.config.quality.enable_quality_filtering && !assessment.should_process_fully {
        lifecycle.complete();
        let reason = assessment.bypass_reason.clone().unwrap_or_else(|| "quality gate".to_string());
        return lightweight_finalize(
            runtime,
            &tc,
            request_start,
            depth,
            assessment.overall_score,
            &reason,
            acquired.title.as_deref(),
            &transcript.full_text(),
        )
        .await;
    }

    bail_if_cancelled!("analysis");

    // Stage 6: Content-type route. May alter subsequent stage parameters
    // but never the DAG topology. The only parameter this crate currently
    // threads through is the content-type label itself, carried for
    // observability; no additional threshold profile is defined beyond
    // what quality/checkpoint already evaluate.
    let content_type = acquired
        .metadata
        .get("content_type")
        .and_then(Value::as_str)
        .unwrap_or(acquired.platform.as_str())
        .to_string();
    tracing::debug!(content_type, "content-type route resolved");

    // Stage 7: Analysis fan-out.
    let (analysis_json, fatal) = run_analysis_fanout(runtime, &tc, depth, &transcript, &acquired.metadata, &cancel).await;
    if fatal {
        lifecycle.fail();
        let err = tenancy_tag(
            PipelineError::new(ErrorCategory::Fatal, "analysis fan-out reported a fatal error", "analysis"),
            &tc,
        );
        record_failure("analysis", &err);
        return StepResult::fail(stamp("analysis", &tc, request_start), err);
    }

    bail_if_cancelled!("persist");

    // Stage 8: Persist.
    let persist_start = Instant::now();
    let persist_outcome = persist(runtime, &tc, depth, &transcript, &analysis_json).await;
    let memory_json = match persist_outcome {
        Ok(memory_json) => memory_json,
        Err(err) => {
            let err = tenancy_tag(err, &tc);
            record_failure("persist", &err);
            lifecycle.fail();
            return StepResult::fail(stamp("persist", &tc, persist_start), err);
        }
    };
    let memory_result = StepResult::ok(stamp("persist", &tc, persist_start), memory_json);

    // Stage 9: Notify. Failures are logged but never fail the pipeline.
    let notify_start = Instant::now();
    let notify_result = notify(runtime, &tc, &acquired, &assessment).await;
    let _ = notify_start;

    lifecycle.complete();

    StepResult::ok(
        stamp("pipeline", &tc, request_start),
        json!({
            "acquire": acquire_result,
            "transcribe": transcribe_result,
            "quality": quality_result,
            "analysis": analysis_json,
            "memory": memory_result,
            "notify": notify_result,
        }),
    )
}

fn acquired_media_json(media: &AcquiredMedia) -> Value {
    json!({
        "platform": media.platform,
        "local_path": media.local_path,
        "title": media.title,
        "uploader": media.uploader,
        "duration_s": media.duration_s,
        "metadata": media.metadata,
    })
}

fn transcript_json(transcript: &Transcript) -> Value {
    json!({
        "language": transcript.language,
        "source_url": transcript.source_url,
        "duration_s": transcript.duration_s,
        "segment_count": transcript.segments.len(),
    })
}

/// Run the stage-7 lanes concurrently, bounded by `max_parallel_analysis`
///. Claim extraction and fact-check form one serial lane;
/// sentiment, fallacy, and (at `depth >= deep`) perspective synthesis each
/// run independently. Returns the merged `{tool_name: StepResult}` map and
/// whether any lane reported a `fatal` error (which cancels its siblings).
async fn run_analysis_fanout(
    runtime: &PipelineRuntime,
    tc: &TenantContext,
    depth: Depth,
    transcript: &Transcript,
    media_metadata: &Value,
    cancel: &CancellationToken,
) -> (Value, bool) {
    let base_ctx = AnalysisContext {
        transcript_text: transcript.full_text(),
        media_metadata: media_metadata.clone(),
        upstream: HashMap::new(),
    };

    let sem = Arc::new(Semaphore::new(runtime.config.pipeline.max_parallel_analysis.max(1)));
    let mut lanes: JoinSet<Vec<(String, StepResult)>> = JoinSet::new();

    for name in ["sentiment", "fallacy"] {
        if let Some(tool) = runtime.tools.analysis_tools.get(name).cloned() {
            let sem = sem.clone();
            let ctx = base_ctx.clone();
            let name = name.to_string();
            lanes.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let result = tool.run(&ctx).await;
                vec![(name, result)]
            });
        }
    }

    if let Some(claims_tool) = runtime.tools.analysis_tools.get("claims").cloned() {
        let factcheck_tool = runtime.tools.analysis_tools.get("factcheck").cloned();
        let sem = sem.clone();
        let ctx = base_ctx.clone();
        lanes.spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            let claims_result = claims_tool.run(&ctx).await;
            let mut out = Vec::new();
            let claims_ok = claims_result.is_ok();
            let claims_data = claims_result.data.clone();
            out.push(("claims".to_string(), claims_result));
            if claims_ok {
                if let Some(factcheck_tool) = factcheck_tool {
                    let mut fc_ctx = ctx;
                    fc_ctx.upstream.insert("claims".to_string(), claims_data);
                    let factcheck_result = factcheck_tool.run(&fc_ctx).await;
                    out.push(("factcheck".to_string(), factcheck_result));
                }
            }
            out
        });
    }

    if depth.runs_perspective_synthesis() {
        if let Some(tool) = runtime.tools.analysis_tools.get("perspective").cloned() {
            let sem = sem.clone();
            let ctx = base_ctx.clone();
            lanes.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let result = tool.run(&ctx).await;
                vec![("perspective".to_string(), result)]
            });
        }
    }

    let mut merged = serde_json::Map::new();
    let mut fatal = false;
    while let Some(joined) = lanes.join_next().await {
        if cancel.is_cancelled() {
            lanes.abort_all();
            break;
        }
        let Ok(lane_results) = joined else {
            continue;
        };
        for (name, result) in lane_results {
            let is_fatal =
                matches!(&result.error, Some(err) if err.category == ErrorCategory::Fatal);
            if is_fatal {
                record_failure(&name, result.error.as_ref().unwrap());
                fatal = true;
            } else if result.is_fail() {
                record_failure(&name, result.error.as_ref().unwrap());
            }
            merged.insert(name, serde_json::to_value(&result).unwrap_or(Value::Null));
        }
        if fatal {
            lanes.abort_all();
            break;
        }
    }

    (Value::Object(merged), fatal)
}

async fn persist(
    runtime: &PipelineRuntime,
    tc: &TenantContext,
    depth: Depth,
    transcript: &Transcript,
    analysis_json: &Value,
) -> PipelineResult<Value> {
    let vector_ns = tenancy::namespace(tc, "vectors");
    let embedding = runtime
        .tools
        .embedder
        .embed(&transcript.full_text())
        .await
        .unwrap_or_default();
    let record = crate::pipeline::traits::VectorRecord {
        id: format!("{}:analysis", tc.request_id),
        embedding,
        payload: analysis_json.clone(),
    };
    runtime.tools.vector_memory.upsert(&vector_ns, vec![record]).await?;

    let mut memory = json!({ "vector": { "namespace": vector_ns, "records": 1 } });

    if depth.runs_graph_memory() {
        let graph_ns = tenancy::namespace(tc, "graph");
        let add_result = runtime
            .tools
            .graph_memory
            .add_node(&graph_ns, &tc.request_id, &["content".to_string()], analysis_json.clone())
            .await;
        match add_result {
            Ok(()) => {
                memory["graph"] = json!({ "namespace": graph_ns, "node": tc.request_id });
            }
            Err(err) => {
                if depth.graph_memory_failure_is_fatal() {
                    return Err(err);
                }
                tracing::warn!(error = %err.message, "graph memory write failed, continuing");
                memory["graph"] = json!({ "error": err.message });
            }
        }
    }

    Ok(memory)
}

async fn notify(
    runtime: &PipelineRuntime,
    tc: &TenantContext,
    acquired: &AcquiredMedia,
    assessment: &threadline_types::transcript::QualityAssessment,
) -> Value {
    let payload = json!({
        "tenant": tc.tenant_id,
        "workspace": tc.workspace_id,
        "request_id": tc.request_id,
        "title": acquired.title,
        "quality_score": assessment.overall_score,
    });
    match runtime.tools.notifier.send("pipeline.completed", payload.clone()).await {
        Ok(()) => json!({ "sent": true }),
        Err(err) => {
            tracing::warn!(error = %err.message, "notify failed, continuing");
            json!({ "sent": false, "error": err.message })
        }
    }
}

/// The lightweight-finalize bypass path: produces
/// `{processing_type, quality_score, bypass_reason, summary, memory_stored,
/// time_saved_estimate}` and persists only a minimal memory record.
async fn lightweight_finalize(
    runtime: &PipelineRuntime,
    tc: &TenantContext,
    request_start: Instant,
    depth: Depth,
    quality_score: f64,
    bypass_reason: &str,
    title: Option<&str>,
    text: &str,
) -> StepResult {
    const SUMMARY_WORDS: usize = 40;
    let first_n: String = text.split_whitespace().take(SUMMARY_WORDS).collect::<Vec<_>>().join(" ");
    let summary = match title {
        Some(t) if !t.is_empty() => format!("{t}: {first_n}"),
        _ => first_n,
    };

    let vector_ns = tenancy::namespace(tc, "vectors");
    let embedding = runtime.tools.embedder.embed(&summary).await.unwrap_or_default();
    let record = crate::pipeline::traits::VectorRecord {
        id: format!("{}:lightweight", tc.request_id),
        embedding,
        payload: json!({ "summary": summary, "bypass_reason": bypass_reason }),
    };
    let memory_stored = runtime.tools.vector_memory.upsert(&vector_ns, vec![record]).await.is_ok();

    // A rough, documented heuristic: the full fan-out costs roughly one
    // second of wall-clock per 20 words of transcript at `standard` depth,
    // scaled up for deeper depths that run more analysis lanes.
    let depth_factor = match depth {
        Depth::Standard => 1.0,
        Depth::Deep => 1.5,
        Depth::Experimental => 2.0,
    };
    let time_saved_estimate = (text.split_whitespace().count() as f64 / 20.0) * depth_factor;

    StepResult::ok(
        stamp("pipeline", tc, request_start),
        json!({
            "processing_type": "lightweight",
            "quality_score": quality_score,
            "bypass_reason": bypass_reason,
            "summary": summary,
            "memory_stored": memory_stored,
            "time_saved_estimate": time_saved_estimate,
        }),
    )
}
