//! Collaborator interfaces consumed by the orchestrator.
//!
//! Everything in here is deliberately out of scope for this crate's own
//! business logic ("deliberately out of scope"): transcription
//! engines, specific analysis tools, vector/graph stores, and notification
//! channels are implemented elsewhere and wired in through these traits.
//! Each trait ships a deterministic in-memory mock used by the
//! orchestrator's own tests.

use std::collections::HashMap;

use async_trait::async_trait;
use threadline_types::error::Result;
use threadline_types::step_result::StepResult;
use threadline_types::transcript::Transcript;

/// Result of resolving a URL to a platform and downloading its media.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AcquiredMedia {
    /// Detected source platform (`"youtube"`, `"podcast"`, ...).
    pub platform: String,
    /// Local filesystem path to the downloaded media.
    pub local_path: String,
    /// Media title, when available.
    pub title: Option<String>,
    /// Uploader/channel name, when available.
    pub uploader: Option<String>,
    /// Media duration in seconds.
    pub duration_s: f64,
    /// Platform-specific extra metadata.
    pub metadata: serde_json::Value,
}

/// Resolves a URL to its platform and downloads the media. Shares the same
/// "deliberately out of scope" boundary as [`Transcriber`] -- platform-
/// specific download logic lives outside this crate.
#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    /// Acquire the media at `url`. Fails fast on private/removed content
    /// with `error.category = policy` or `validation`.
    async fn acquire(&self, url: &str) -> Result<AcquiredMedia>;
}

/// Produces a [`Transcript`] from a local media path.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the media at `media_path`. `language` is a BCP-47 hint,
    /// not a requirement -- the transcriber may detect a different one.
    async fn transcribe(&self, media_path: &str, language: Option<&str>) -> Result<Transcript>;
}

/// Shared, read-only context passed into an [`AnalysisTool`]: the
/// transcript, acquire-stage metadata, and upstream analysis results.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// Full transcript text.
    pub transcript_text: String,
    /// Acquire-stage metadata (title, uploader, platform, ...).
    pub media_metadata: serde_json::Value,
    /// Results already produced by sibling analysis tasks, keyed by stage
    /// name. Populated only for tools that declare a dependency (e.g.
    /// fact-check depends on claims); siblings running concurrently see an
    /// empty map for peers that haven't finished.
    pub upstream: HashMap<String, serde_json::Value>,
}

/// One named analysis capability run inside the stage-7 fan-out.
#[async_trait]
pub trait AnalysisTool: Send + Sync {
    /// The tool's registry name (`"sentiment"`, `"fallacy"`, `"claims"`,
    /// `"factcheck"`, `"perspective"`, ...).
    fn name(&self) -> &str;

    /// Run the tool against `ctx`, returning its own `StepResult`.
    async fn run(&self, ctx: &AnalysisContext) -> StepResult;
}

/// A vector record to upsert (`{id, embedding, payload}`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorRecord {
    /// Record identifier, unique within the namespace.
    pub id: String,
    /// Embedding vector; dimensionality fixed per namespace.
    pub embedding: Vec<f32>,
    /// Opaque payload returned alongside matches.
    pub payload: serde_json::Value,
}

/// A vector similarity match.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorMatch {
    /// Matched record id.
    pub id: String,
    /// Cosine similarity score.
    pub score: f32,
    /// The record's payload.
    pub payload: serde_json::Value,
}

/// Vector-store collaborator (`VectorMemory.Upsert` / `Query`).
#[async_trait]
pub trait VectorMemory: Send + Sync {
    /// Write `records` into `namespace`, fixed-dimensionality per namespace.
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Return the top-`k` nearest records to `query` in `namespace`.
    async fn query(&self, namespace: &str, query: &[f32], k: usize) -> Result<Vec<VectorMatch>>;
}

/// Graph-store collaborator (`GraphMemory.AddNode / AddEdge /
/// Query(timeline|subgraph)`).
#[async_trait]
pub trait GraphMemory: Send + Sync {
    /// Add a node to `namespace`'s graph.
    async fn add_node(
        &self,
        namespace: &str,
        id: &str,
        labels: &[String],
        properties: serde_json::Value,
    ) -> Result<()>;

    /// Add a directed edge between two existing nodes.
    async fn add_edge(
        &self,
        namespace: &str,
        from: &str,
        to: &str,
        kind: &str,
        properties: serde_json::Value,
    ) -> Result<()>;

    /// Run a named query kind (`"timeline"` or `"subgraph"`) scoped to an
    /// anchor node.
    async fn query(&self, namespace: &str, kind: &str, anchor: &str) -> Result<serde_json::Value>;
}

/// Outbound notification collaborator. Failures are logged but never fail
/// the pipeline -- notification is always best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `payload` to `channel`. `Ok(())` on success; any `Err` is
    /// swallowed by the orchestrator and surfaced only as a warning.
    async fn send(&self, channel: &str, payload: serde_json::Value) -> Result<()>;
}

/// Text-embedding collaborator (`Embedder.Embed(text)`, "fixed
/// dim per model; deterministic given same input + model").
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, used to validate dimensionality against a
    /// namespace's fixed dimension.
    fn model(&self) -> &str;

    /// Embed `text`, returning a fixed-length vector for this model.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[cfg(test)]
pub mod mocks {
    //! Deterministic in-memory implementations of every collaborator trait,
    //! used by the orchestrator's own test suite.

    use super::*;
    use dashmap::DashMap;
    use threadline_types::error::ErrorCategory;
    use threadline_types::error::PipelineError;
    use threadline_types::transcript::TranscriptSegment;

    /// An acquirer that returns a fixed [`AcquiredMedia`], or fails with a
    /// given error category when constructed via `MockMediaAcquirer::failing`.
    pub struct MockMediaAcquirer {
        media: AcquiredMedia,
        fail: Option<ErrorCategory>,
    }

    impl MockMediaAcquirer {
        pub fn new(media: AcquiredMedia) -> Self {
            Self { media, fail: None }
        }

        pub fn failing(category: ErrorCategory) -> Self {
            Self {
                media: AcquiredMedia {
                    platform: "unknown".into(),
                    local_path: String::new(),
                    title: None,
                    uploader: None,
                    duration_s: 0.0,
                    metadata: serde_json::json!({}),
                },
                fail: Some(category),
            }
        }
    }

    #[async_trait]
    impl MediaAcquirer for MockMediaAcquirer {
        async fn acquire(&self, _url: &str) -> Result<AcquiredMedia> {
            if let Some(category) = self.fail {
                return Err(PipelineError::new(category, "mock acquire failure", "acquire"));
            }
            Ok(self.media.clone())
        }
    }

    /// A transcriber that returns a fixed transcript regardless of input,
    /// or fails when constructed with `MockTranscriber::failing`.
    pub struct MockTranscriber {
        text: String,
        fail: bool,
    }

    impl MockTranscriber {
        pub fn new(text: impl Into<String>) -> Self {
            Self {
                text: text.into(),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                text: String::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(&self, media_path: &str, language: Option<&str>) -> Result<Transcript> {
            if self.fail {
                return Err(PipelineError::new(
                    ErrorCategory::Processing,
                    "mock transcription failure",
                    "transcribe",
                ));
            }
            Ok(Transcript {
                segments: vec![TranscriptSegment {
                    text: self.text.clone(),
                    start_s: 0.0,
                    end_s: 1.0,
                    confidence: Some(0.95),
                }],
                language: language.map(str::to_string),
                source_url: media_path.to_string(),
                duration_s: 1.0,
            })
        }
    }

    /// An analysis tool that echoes a fixed payload under its own name.
    pub struct MockAnalysisTool {
        name: String,
        payload: serde_json::Value,
    }

    impl MockAnalysisTool {
        pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
            Self {
                name: name.into(),
                payload,
            }
        }
    }

    #[async_trait]
    impl AnalysisTool for MockAnalysisTool {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _ctx: &AnalysisContext) -> StepResult {
            StepResult::ok(
                threadline_types::step_result::StepMetadata::new(self.name.clone()),
                self.payload.clone(),
            )
        }
    }

    /// An in-memory vector store keyed by namespace.
    #[derive(Default)]
    pub struct MockVectorMemory {
        store: DashMap<String, Vec<VectorRecord>>,
    }

    impl MockVectorMemory {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na * nb)
        }
    }

    #[async_trait]
    impl VectorMemory for MockVectorMemory {
        async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
            self.store.entry(namespace.to_string()).or_default().extend(records);
            Ok(())
        }

        async fn query(&self, namespace: &str, query: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
            let mut matches: Vec<VectorMatch> = self
                .store
                .get(namespace)
                .map(|records| {
                    records
                        .iter()
                        .map(|r| VectorMatch {
                            id: r.id.clone(),
                            score: cosine(query, &r.embedding),
                            payload: r.payload.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            matches.truncate(k);
            Ok(matches)
        }
    }

    /// An in-memory graph store; queries return the accumulated nodes/edges
    /// touching the anchor, not a real traversal.
    #[derive(Default)]
    pub struct MockGraphMemory {
        nodes: DashMap<String, Vec<serde_json::Value>>,
        edges: DashMap<String, Vec<serde_json::Value>>,
        fail_on_add: bool,
    }

    impl MockGraphMemory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail_on_add: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl GraphMemory for MockGraphMemory {
        async fn add_node(
            &self,
            namespace: &str,
            id: &str,
            labels: &[String],
            properties: serde_json::Value,
        ) -> Result<()> {
            if self.fail_on_add {
                return Err(PipelineError::new(
                    ErrorCategory::Processing,
                    "graph add_node failed",
                    "persist",
                ));
            }
            self.nodes.entry(namespace.to_string()).or_default().push(serde_json::json!({
                "id": id, "labels": labels, "properties": properties,
            }));
            Ok(())
        }

        async fn add_edge(
            &self,
            namespace: &str,
            from: &str,
            to: &str,
            kind: &str,
            properties: serde_json::Value,
        ) -> Result<()> {
            if self.fail_on_add {
                return Err(PipelineError::new(
                    ErrorCategory::Processing,
                    "graph add_edge failed",
                    "persist",
                ));
            }
            self.edges.entry(namespace.to_string()).or_default().push(serde_json::json!({
                "from": from, "to": to, "kind": kind, "properties": properties,
            }));
            Ok(())
        }

        async fn query(&self, namespace: &str, kind: &str, anchor: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!({
                "kind": kind,
                "anchor": anchor,
                "nodes": self.nodes.get(namespace).map(|v| v.clone()).unwrap_or_default(),
                "edges": self.edges.get(namespace).map(|v| v.clone()).unwrap_or_default(),
            }))
        }
    }

    /// A notifier that records every send, optionally always failing.
    #[derive(Default)]
    pub struct MockNotifier {
        pub sent: DashMap<String, Vec<serde_json::Value>>,
        fail: bool,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, channel: &str, payload: serde_json::Value) -> Result<()> {
            if self.fail {
                return Err(PipelineError::new(
                    ErrorCategory::ProviderError,
                    "notifier unreachable",
                    "notify",
                ));
            }
            self.sent.entry(channel.to_string()).or_default().push(payload);
            Ok(())
        }
    }

    /// An embedder producing a fixed-dimension deterministic hash-based
    /// vector -- not semantically meaningful, but stable given the same
    /// input, which is all the contract requires.
    pub struct MockEmbedder {
        model: String,
        dim: usize,
    }

    impl MockEmbedder {
        pub fn new(model: impl Into<String>, dim: usize) -> Self {
            Self {
                model: model.into(),
                dim,
            }
        }
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        fn model(&self) -> &str {
            &self.model
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut out = Vec::with_capacity(self.dim);
            for i in 0..self.dim {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                let bits = (hasher.finish() % 2000) as f32 / 1000.0 - 1.0;
                out.push(bits);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::*;
    use super::*;

    #[tokio::test]
    async fn mock_media_acquirer_returns_fixed_media() {
        let acquirer = MockMediaAcquirer::new(AcquiredMedia {
            platform: "youtube".into(),
            local_path: "/tmp/a.mp4".into(),
            title: Some("Title".into()),
            uploader: Some("Uploader".into()),
            duration_s: 120.0,
            metadata: serde_json::json!({}),
        });
        let media = acquirer.acquire("https://example.com/v/1").await.unwrap();
        assert_eq!(media.platform, "youtube");
    }

    #[tokio::test]
    async fn mock_media_acquirer_can_fail_with_category() {
        let acquirer = MockMediaAcquirer::failing(ErrorCategory::Policy);
        let err = acquirer.acquire("https://example.com/v/1").await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Policy);
    }

    #[tokio::test]
    async fn mock_transcriber_round_trips_text() {
        let t = MockTranscriber::new("hello world");
        let transcript = t.transcribe("/tmp/media.mp4", Some("en")).await.unwrap();
        assert_eq!(transcript.full_text(), "hello world");
        assert_eq!(transcript.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn mock_transcriber_can_fail() {
        let t = MockTranscriber::failing();
        assert!(t.transcribe("/tmp/x.mp4", None).await.is_err());
    }

    #[tokio::test]
    async fn mock_vector_memory_upsert_and_query() {
        let mem = MockVectorMemory::new();
        mem.upsert(
            "t:w:claims",
            vec![VectorRecord {
                id: "a".into(),
                embedding: vec![1.0, 0.0],
                payload: serde_json::json!({"text": "a"}),
            }],
        )
        .await
        .unwrap();
        let matches = mem.query("t:w:claims", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }

    #[tokio::test]
    async fn mock_graph_memory_failing_reports_processing_error() {
        let graph = MockGraphMemory::failing();
        let result = graph.add_node("t:w:graph", "n1", &[], serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_notifier_records_sends() {
        let notifier = MockNotifier::new();
        notifier.send("summary", serde_json::json!({"ok": true})).await.unwrap();
        assert_eq!(notifier.sent.get("summary").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new("mock-v1", 8);
        let a = embedder.embed("hello").await.unwrap();
        let b = embedder.embed("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[tokio::test]
    async fn mock_analysis_tool_returns_named_result() {
        let tool = MockAnalysisTool::new("sentiment", serde_json::json!({"polarity": 0.2}));
        let ctx = AnalysisContext {
            transcript_text: "x".into(),
            media_metadata: serde_json::json!({}),
            upstream: Default::default(),
        };
        let result = tool.run(&ctx).await;
        assert!(result.is_ok());
        assert_eq!(result.data["polarity"], 0.2);
    }
}
