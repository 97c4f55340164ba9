use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type NodeId = Uuid;

/// Hard bounds on the configurable tree depth.
pub const MIN_TREE_DEPTH: u32 = 1;
pub const MAX_TREE_DEPTH: u32 = 5;
pub const DEFAULT_TREE_DEPTH: u32 = 3;

/// Maximum number of sources attached to any single node.
pub const MAX_SOURCES_PER_NODE: usize = 5;

/// Lifecycle of a node inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

/// A single piece of research evidence.
///
/// Equality is by normalized URL; the researcher additionally deduplicates
/// by hostname to keep source sets diverse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl Source {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            relevance_score: None,
        }
    }

    /// URL with scheme/host lowercased and any trailing slash removed.
    pub fn normalized_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => parsed.to_string().trim_end_matches('/').to_string(),
            Err(_) => self.url.trim_end_matches('/').to_string(),
        }
    }

    /// Lowercased hostname without a leading `www.`, when the URL parses.
    pub fn hostname(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_url() == other.normalized_url()
    }
}

impl Eq for Source {}

/// A vertex in the probability tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNode {
    pub id: NodeId,
    pub event: String,
    /// Real in [0,1]; the root is exactly 1.0 and siblings sum to 1.0 ± 1e-3.
    pub probability: f64,
    pub justification: String,
    /// Integer in [-100, 100]; 0 for the root and for synthesized children.
    pub sentiment: i32,
    /// Distance from the root; the root is depth 0.
    pub depth: u32,
    pub sources: Vec<Source>,
    pub children: Vec<EventNode>,
    pub parent_id: Option<NodeId>,
    pub created_at: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
}

impl EventNode {
    /// Construct the root node for a seed event.
    pub fn root(event: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: event.into(),
            probability: 1.0,
            justification: "User-provided seed event".to_string(),
            sentiment: 0,
            depth: 0,
            sources: Vec::new(),
            children: Vec::new(),
            parent_id: None,
            created_at: Utc::now(),
            processing_status: ProcessingStatus::Pending,
        }
    }

    /// Construct a pending child of `parent` with the given event text and
    /// (already normalized) probability.
    pub fn child_of(parent: &EventNode, event: impl Into<String>, probability: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: event.into(),
            probability,
            justification: String::new(),
            sentiment: 0,
            depth: parent.depth + 1,
            sources: Vec::new(),
            children: Vec::new(),
            parent_id: Some(parent.id),
            created_at: Utc::now(),
            processing_status: ProcessingStatus::Pending,
        }
    }

    /// Total number of nodes in the subtree rooted here, including self.
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(EventNode::subtree_size).sum::<usize>()
    }
}

/// User-provided input that roots a tree build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedInput {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

fn default_max_depth() -> u32 {
    DEFAULT_TREE_DEPTH
}

impl SeedInput {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            context: None,
            timeframe: None,
            max_depth: DEFAULT_TREE_DEPTH,
            domain: None,
        }
    }

    /// The configured depth is authoritative but always clamped to [1,5].
    pub fn effective_depth(&self) -> u32 {
        self.max_depth.clamp(MIN_TREE_DEPTH, MAX_TREE_DEPTH)
    }
}

/// One candidate outcome emitted by probability synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbabilityOutput {
    pub event: String,
    pub probability: f64,
}

/// Minimum length of a synthesized outcome description.
pub const MIN_OUTCOME_LEN: usize = 10;

/// Bounds on outcomes per synthesis call.
pub const MIN_OUTCOMES: usize = 1;
pub const MAX_OUTCOMES: usize = 5;

impl ProbabilityOutput {
    pub fn validate(&self) -> crate::Result<()> {
        if self.event.trim().len() < MIN_OUTCOME_LEN {
            return Err(crate::PsychoHistoryError::Schema(format!(
                "outcome description too short ({} chars): {:?}",
                self.event.trim().len(),
                self.event
            )));
        }
        if !(0.0..=1.0).contains(&self.probability) || !self.probability.is_finite() {
            return Err(crate::PsychoHistoryError::Schema(format!(
                "probability {} out of [0,1] for outcome {:?}",
                self.probability, self.event
            )));
        }
        Ok(())
    }
}

/// Validate a full synthesis payload: 1..=5 outcomes, each well-formed.
pub fn validate_outputs(outputs: &[ProbabilityOutput]) -> crate::Result<()> {
    if outputs.len() < MIN_OUTCOMES || outputs.len() > MAX_OUTCOMES {
        return Err(crate::PsychoHistoryError::Schema(format!(
            "synthesis returned {} outcomes, expected {}..={}",
            outputs.len(),
            MIN_OUTCOMES,
            MAX_OUTCOMES
        )));
    }
    for output in outputs {
        output.validate()?;
    }
    Ok(())
}

/// Self-reported confidence of a research pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(format!("unknown confidence level: {other}")),
        }
    }
}

/// Outcome of one agentic research invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub sources: Vec<Source>,
    pub summary: String,
    pub confidence: Confidence,
    pub iterations: usize,
    pub queries: Vec<String>,
}

impl ResearchResult {
    /// An empty low-confidence result, used when research never got anywhere.
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            summary: String::new(),
            confidence: Confidence::Low,
            iterations: 0,
            queries: Vec::new(),
        }
    }
}

/// Wire events streamed to the client while a tree is being built.
///
/// Serialized as `{"type": ..., "data": ...}` records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TreeStreamEvent {
    #[serde(rename_all = "camelCase")]
    TreeStarted { seed: EventNode },
    #[serde(rename_all = "camelCase")]
    NodeProcessing {
        node_id: NodeId,
        depth: u32,
        event: String,
    },
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node: EventNode,
        children: Vec<EventNode>,
    },
    #[serde(rename_all = "camelCase")]
    DepthCompleted { depth: u32, nodes_processed: usize },
    #[serde(rename_all = "camelCase")]
    TreeCompleted { total_nodes: usize, duration: u64 },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<NodeId>,
    },
}

impl TreeStreamEvent {
    /// Short tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TreeStreamEvent::TreeStarted { .. } => "tree_started",
            TreeStreamEvent::NodeProcessing { .. } => "node_processing",
            TreeStreamEvent::NodeCompleted { .. } => "node_completed",
            TreeStreamEvent::DepthCompleted { .. } => "depth_completed",
            TreeStreamEvent::TreeCompleted { .. } => "tree_completed",
            TreeStreamEvent::Error { .. } => "error",
        }
    }
}
