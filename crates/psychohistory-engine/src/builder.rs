use crate::events::EventSink;
use crate::processor::NodePipeline;
use psychohistory_core::{
    probability, EventNode, NodeId, ProcessingStatus, PsychoHistoryError, Result, SeedInput,
    TreeStreamEvent,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct TreeBuilderConfig {
    /// Levels below the root to expand; clamped to [1,5] upstream.
    pub max_depth: u32,
    /// Node pipelines dispatched in parallel per batch.
    pub max_concurrent: usize,
    /// Optional wall-clock budget wrapped around each node pipeline.
    pub node_timeout: Option<Duration>,
}

impl Default for TreeBuilderConfig {
    fn default() -> Self {
        Self {
            max_depth: psychohistory_core::DEFAULT_TREE_DEPTH,
            max_concurrent: 20,
            node_timeout: None,
        }
    }
}

/// The tree under construction: nodes indexed by id, children as id lists,
/// insertion order preserved so frontiers are deterministic.
struct TreeState {
    slots: HashMap<NodeId, NodeSlot>,
    order: Vec<NodeId>,
    root: NodeId,
}

struct NodeSlot {
    /// The node record; its `children` vector stays empty here, the edge
    /// list below is authoritative.
    node: EventNode,
    children: Vec<NodeId>,
}

impl TreeState {
    fn new(root: EventNode) -> Self {
        let root_id = root.id;
        let mut slots = HashMap::new();
        slots.insert(
            root_id,
            NodeSlot {
                node: root,
                children: Vec::new(),
            },
        );
        Self {
            slots,
            order: vec![root_id],
            root: root_id,
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn node(&self, id: NodeId) -> &EventNode {
        &self.slots[&id].node
    }

    fn node_mut(&mut self, id: NodeId) -> &mut EventNode {
        &mut self.slots.get_mut(&id).expect("node registered").node
    }

    /// Pending nodes at `depth`, in insertion order.
    fn frontier(&self, depth: u32) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                let node = self.node(*id);
                node.depth == depth && node.processing_status == ProcessingStatus::Pending
            })
            .collect()
    }

    /// Install `children` under `parent`, registering each as pending.
    fn install_children(&mut self, parent: NodeId, children: Vec<EventNode>) {
        for child in children {
            let child_id = child.id;
            self.slots.insert(
                child_id,
                NodeSlot {
                    node: child,
                    children: Vec::new(),
                },
            );
            self.order.push(child_id);
            self.slots
                .get_mut(&parent)
                .expect("parent registered")
                .children
                .push(child_id);
        }
    }

    /// Event chain from the root to `id`, inclusive.
    fn path_events(&self, id: NodeId) -> Vec<String> {
        let mut events = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            events.push(node.event.clone());
            cursor = node.parent_id;
        }
        events.reverse();
        events
    }

    /// Node value with one level of children attached (grandchildren empty).
    fn snapshot(&self, id: NodeId) -> EventNode {
        let slot = &self.slots[&id];
        let mut node = slot.node.clone();
        node.children = slot
            .children
            .iter()
            .map(|child| self.slots[child].node.clone())
            .collect();
        node
    }

    /// Fully nested subtree rooted at `id`.
    fn materialize(&self, id: NodeId) -> EventNode {
        let slot = &self.slots[&id];
        let mut node = slot.node.clone();
        node.children = slot
            .children
            .iter()
            .map(|child| self.materialize(*child))
            .collect();
        node
    }

    /// Structural invariants that must hold after every scheduler step.
    fn check_invariants(&self, max_depth: u32) -> Result<()> {
        let mut roots = 0usize;
        for id in &self.order {
            let slot = &self.slots[id];
            let node = &slot.node;

            match node.parent_id {
                None => roots += 1,
                Some(parent_id) => {
                    let parent = self
                        .slots
                        .get(&parent_id)
                        .ok_or_else(|| {
                            PsychoHistoryError::Scheduler(format!(
                                "node {} references unknown parent {parent_id}",
                                node.id
                            ))
                        })?;
                    if node.depth != parent.node.depth + 1 {
                        return Err(PsychoHistoryError::Scheduler(format!(
                            "node {} at depth {} under parent at depth {}",
                            node.id, node.depth, parent.node.depth
                        )));
                    }
                }
            }

            if node.depth > max_depth {
                return Err(PsychoHistoryError::Scheduler(format!(
                    "node {} exceeds max depth {max_depth}",
                    node.id
                )));
            }

            if !slot.children.is_empty() {
                let weights: Vec<f64> = slot
                    .children
                    .iter()
                    .map(|child| self.slots[child].node.probability)
                    .collect();
                if !probability::is_normalized(&weights, probability::SIBLING_SUM_TOLERANCE) {
                    return Err(PsychoHistoryError::Scheduler(format!(
                        "children of {} sum to {}",
                        node.id,
                        weights.iter().sum::<f64>()
                    )));
                }
            }
        }

        if roots != 1 {
            return Err(PsychoHistoryError::Scheduler(format!(
                "expected exactly one root, found {roots}"
            )));
        }
        Ok(())
    }
}

/// Builds a complete tree from a seed with depth-synchronous wave
/// scheduling: one depth level at a time, batched parallelism within a
/// level, a barrier between levels.
///
/// The builder is the sole owner and mutator of the tree. Pipelines receive
/// immutable snapshots and return child lists; every mutation happens here,
/// between dispatches, which is what makes path reconstruction race-free.
pub struct TreeBuilder {
    config: TreeBuilderConfig,
    pipeline: Arc<dyn NodePipeline>,
    cancel: CancellationToken,
}

impl TreeBuilder {
    pub fn new(config: TreeBuilderConfig, pipeline: Arc<dyn NodePipeline>) -> Self {
        Self {
            config,
            pipeline,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle the caller can use to abort the build, typically wired to
    /// client disconnection. Cancellation stops in-flight pipelines at their
    /// next suspension point instead of letting upstream calls run dry.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build the full tree, emitting lifecycle events as it goes. Failed
    /// nodes are isolated (no children, `error` event, build continues);
    /// only sink closure or an invariant violation aborts the build.
    pub async fn build(&self, seed: &SeedInput, sink: &dyn EventSink) -> Result<EventNode> {
        let started = Instant::now();
        let max_depth = self.config.max_depth;

        let mut state = TreeState::new(EventNode::root(seed.event.clone()));
        info!(
            seed = %seed.event,
            max_depth,
            max_concurrent = self.config.max_concurrent,
            "tree build started"
        );
        sink.emit(TreeStreamEvent::TreeStarted {
            seed: state.snapshot(state.root),
        })
        .await
        .map_err(sink_closed)?;

        let mut depth = 0;
        while depth < max_depth {
            if self.cancel.is_cancelled() {
                return Err(PsychoHistoryError::Scheduler("tree build cancelled".into()));
            }
            let frontier = state.frontier(depth);
            if frontier.is_empty() {
                depth += 1;
                continue;
            }
            debug!(depth, nodes = frontier.len(), "processing frontier");

            let mut processed = 0usize;
            for batch in frontier.chunks(self.config.max_concurrent) {
                processed += self.run_batch(batch, seed, &mut state, sink).await?;
            }

            // Invariants must hold after every wave; a violation aborts
            // before the next depth is dispatched.
            state.check_invariants(max_depth)?;

            sink.emit(TreeStreamEvent::DepthCompleted {
                depth,
                nodes_processed: processed,
            })
            .await
            .map_err(sink_closed)?;
            depth += 1;
        }

        let duration = started.elapsed().as_millis() as u64;
        info!(total_nodes = state.len(), duration_ms = duration, "tree build completed");
        sink.emit(TreeStreamEvent::TreeCompleted {
            total_nodes: state.len(),
            duration,
        })
        .await
        .map_err(sink_closed)?;

        Ok(state.materialize(state.root))
    }

    /// Dispatch one batch in parallel, wait for all of it, then commit the
    /// results. Returns the number of nodes drained.
    async fn run_batch(
        &self,
        batch: &[NodeId],
        seed: &SeedInput,
        state: &mut TreeState,
        sink: &dyn EventSink,
    ) -> Result<usize> {
        for &id in batch {
            let event = {
                let node = state.node_mut(id);
                node.processing_status = ProcessingStatus::Processing;
                TreeStreamEvent::NodeProcessing {
                    node_id: id,
                    depth: node.depth,
                    event: node.event.clone(),
                }
            };
            sink.emit(event).await.map_err(sink_closed)?;
        }

        let handles: Vec<_> = batch
            .iter()
            .map(|&id| {
                let node = state.node(id).clone();
                let path = state.path_events(id);
                let seed = seed.clone();
                let pipeline = self.pipeline.clone();
                let node_timeout = self.config.node_timeout;
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    let expansion = async {
                        let expansion = pipeline.expand(&node, &seed, &path);
                        match node_timeout {
                            Some(budget) => match tokio::time::timeout(budget, expansion).await {
                                Ok(result) => result,
                                Err(_) => Err(PsychoHistoryError::Pipeline(format!(
                                    "node pipeline exceeded {}s budget",
                                    budget.as_secs()
                                ))),
                            },
                            None => expansion.await,
                        }
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            Err(PsychoHistoryError::Pipeline("node pipeline cancelled".into()))
                        }
                        result = expansion => result,
                    }
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        for (&id, joined) in batch.iter().zip(results) {
            let result = joined.unwrap_or_else(|e| {
                Err(PsychoHistoryError::Pipeline(format!(
                    "node pipeline task failed: {e}"
                )))
            });
            match result {
                Ok(children) => {
                    state.install_children(id, children);
                    state.node_mut(id).processing_status = ProcessingStatus::Completed;
                    let snapshot = state.snapshot(id);
                    let children = snapshot.children.clone();
                    sink.emit(TreeStreamEvent::NodeCompleted {
                        node: snapshot,
                        children,
                    })
                    .await
                    .map_err(sink_closed)?;
                }
                Err(e) => {
                    warn!(node_id = %id, error = %e, "node pipeline failed");
                    state.node_mut(id).processing_status = ProcessingStatus::Failed;
                    sink.emit(TreeStreamEvent::Error {
                        message: e.to_string(),
                        node_id: Some(id),
                    })
                    .await
                    .map_err(sink_closed)?;
                }
            }
        }
        Ok(batch.len())
    }
}

fn sink_closed(_: crate::events::SinkError) -> PsychoHistoryError {
    PsychoHistoryError::Scheduler("event sink closed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelEventSink, SinkError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that records every event for later inspection.
    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<TreeStreamEvent>>,
    }

    impl CollectingSink {
        fn events(&self) -> Vec<TreeStreamEvent> {
            self.events.lock().clone()
        }

        fn kinds(&self) -> Vec<&'static str> {
            self.events.lock().iter().map(|e| e.kind()).collect()
        }
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn emit(&self, event: TreeStreamEvent) -> std::result::Result<(), SinkError> {
            self.events.lock().push(event);
            Ok(())
        }
    }

    /// Pipeline producing a fixed fan-out at each depth, with optional delay
    /// and concurrency accounting.
    struct FanoutPipeline {
        fanout: Vec<usize>,
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FanoutPipeline {
        fn new(fanout: Vec<usize>) -> Self {
            Self {
                fanout,
                delay: Duration::from_millis(50),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NodePipeline for FanoutPipeline {
        async fn expand(
            &self,
            node: &EventNode,
            _seed: &SeedInput,
            _path: &[String],
        ) -> Result<Vec<EventNode>> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let count = self
                .fanout
                .get(node.depth as usize)
                .copied()
                .unwrap_or(0);
            let probability = 1.0 / count.max(1) as f64;
            Ok((0..count)
                .map(|i| {
                    EventNode::child_of(
                        node,
                        format!("{} / outcome {i}", node.event),
                        probability,
                    )
                })
                .collect())
        }
    }

    /// Pipeline that fails on events containing a marker substring.
    struct FailingPipeline {
        marker: &'static str,
    }

    #[async_trait]
    impl NodePipeline for FailingPipeline {
        async fn expand(
            &self,
            node: &EventNode,
            _seed: &SeedInput,
            _path: &[String],
        ) -> Result<Vec<EventNode>> {
            if node.event.contains(self.marker) {
                return Err(PsychoHistoryError::Pipeline("induced failure".into()));
            }
            Ok(vec![
                EventNode::child_of(node, format!("{} / poisoned ok", node.event), 0.5),
                EventNode::child_of(node, format!("{} / fine", node.event), 0.5),
            ])
        }
    }

    fn seed(max_depth: u32) -> SeedInput {
        SeedInput {
            event: "X".into(),
            context: None,
            timeframe: None,
            max_depth,
            domain: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn depth_one_happy_path_emits_ordered_events() {
        let pipeline = Arc::new(FanoutPipeline::new(vec![2]));
        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 1,
                ..Default::default()
            },
            pipeline,
        );
        let sink = CollectingSink::default();

        let root = builder.build(&seed(1), &sink).await.unwrap();

        assert_eq!(
            sink.kinds(),
            vec![
                "tree_started",
                "node_processing",
                "node_completed",
                "depth_completed",
                "tree_completed",
            ]
        );
        assert_eq!(root.children.len(), 2);
        let sum: f64 = root.children.iter().map(|c| c.probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);

        match sink.events().last().unwrap() {
            TreeStreamEvent::TreeCompleted { total_nodes, .. } => assert_eq!(*total_nodes, 3),
            other => panic!("expected tree_completed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batches_respect_max_concurrent_and_depth_barrier() {
        // Root fans out into 25 children; at depth 1 they all process with
        // max_concurrent 20, so the peak is exactly 20.
        let pipeline = Arc::new(FanoutPipeline::new(vec![25, 1]));
        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 2,
                max_concurrent: 20,
                node_timeout: None,
            },
            pipeline.clone(),
        );
        let sink = CollectingSink::default();

        builder.build(&seed(2), &sink).await.unwrap();
        assert_eq!(pipeline.peak.load(Ordering::SeqCst), 20);

        // depth_completed(0) precedes every node_processing at depth 1, and
        // depth_completed(1) precedes any processing at depth 2.
        let events = sink.events();
        let depth0_done = events
            .iter()
            .position(|e| matches!(e, TreeStreamEvent::DepthCompleted { depth: 0, .. }))
            .unwrap();
        for (i, event) in events.iter().enumerate() {
            if let TreeStreamEvent::NodeProcessing { depth: 1, .. } = event {
                assert!(i > depth0_done, "depth-1 processing before depth 0 barrier");
            }
        }
        match &events[depth0_done] {
            TreeStreamEvent::DepthCompleted {
                nodes_processed, ..
            } => assert_eq!(*nodes_processed, 1),
            _ => unreachable!(),
        }
        let depth1_done = events
            .iter()
            .position(|e| matches!(e, TreeStreamEvent::DepthCompleted { depth: 1, .. }))
            .unwrap();
        match &events[depth1_done] {
            TreeStreamEvent::DepthCompleted {
                nodes_processed, ..
            } => assert_eq!(*nodes_processed, 25),
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn every_completion_has_a_preceding_processing_event() {
        let pipeline = Arc::new(FanoutPipeline::new(vec![3, 2]));
        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 2,
                ..Default::default()
            },
            pipeline,
        );
        let sink = CollectingSink::default();
        builder.build(&seed(2), &sink).await.unwrap();

        let events = sink.events();
        for (i, event) in events.iter().enumerate() {
            if let TreeStreamEvent::NodeCompleted { node, .. } = event {
                let processing_seen = events[..i].iter().any(|earlier| {
                    matches!(earlier, TreeStreamEvent::NodeProcessing { node_id, .. } if *node_id == node.id)
                });
                assert!(processing_seen, "node_completed without node_processing");
            }
        }

        // Completions plus node-scoped errors account for every non-leaf
        // node: 1 at depth 0 and 3 at depth 1.
        let completions = events
            .iter()
            .filter(|e| matches!(e, TreeStreamEvent::NodeCompleted { .. }))
            .count();
        let node_errors = events
            .iter()
            .filter(|e| matches!(e, TreeStreamEvent::Error { node_id: Some(_), .. }))
            .count();
        assert_eq!(completions + node_errors, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_node_is_isolated_and_build_continues() {
        let pipeline = Arc::new(FailingPipeline { marker: "poisoned" });
        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 2,
                ..Default::default()
            },
            pipeline,
        );
        let sink = CollectingSink::default();

        let root = builder.build(&seed(2), &sink).await.unwrap();

        // Depth 1 has one poisoned child (failed, no children) and one fine
        // child (expanded).
        assert_eq!(root.children.len(), 2);
        let poisoned = root
            .children
            .iter()
            .find(|c| c.event.contains("poisoned"))
            .unwrap();
        assert_eq!(poisoned.processing_status, ProcessingStatus::Failed);
        assert!(poisoned.children.is_empty());

        let fine = root
            .children
            .iter()
            .find(|c| !c.event.contains("poisoned"))
            .unwrap();
        assert_eq!(fine.processing_status, ProcessingStatus::Completed);
        assert_eq!(fine.children.len(), 2);

        let error_events: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, TreeStreamEvent::Error { node_id: Some(_), .. }))
            .collect();
        assert_eq!(error_events.len(), 1);
        assert_eq!(sink.kinds().last(), Some(&"tree_completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn invariant_violation_aborts_before_the_next_depth() {
        /// Installs a sibling cohort whose probabilities do not sum to 1.
        struct SkewedPipeline;

        #[async_trait]
        impl NodePipeline for SkewedPipeline {
            async fn expand(
                &self,
                node: &EventNode,
                _seed: &SeedInput,
                _path: &[String],
            ) -> Result<Vec<EventNode>> {
                Ok(vec![
                    EventNode::child_of(node, "first skewed outcome", 0.9),
                    EventNode::child_of(node, "second skewed outcome", 0.3),
                ])
            }
        }

        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 2,
                ..Default::default()
            },
            Arc::new(SkewedPipeline),
        );
        let sink = CollectingSink::default();

        let result = builder.build(&seed(2), &sink).await;
        assert!(matches!(result, Err(PsychoHistoryError::Scheduler(_))));

        // The depth-0 wave never completes and no depth-1 node starts.
        let events = sink.events();
        assert!(!events
            .iter()
            .any(|e| matches!(e, TreeStreamEvent::DepthCompleted { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, TreeStreamEvent::NodeProcessing { depth: 1, .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, TreeStreamEvent::TreeCompleted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn nodes_at_max_depth_are_never_processed() {
        let pipeline = Arc::new(FanoutPipeline::new(vec![2, 2, 2, 2, 2]));
        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 2,
                ..Default::default()
            },
            pipeline,
        );
        let sink = CollectingSink::default();
        let root = builder.build(&seed(2), &sink).await.unwrap();

        fn assert_depths(node: &EventNode, max_depth: u32) {
            assert!(node.depth <= max_depth);
            if node.depth == max_depth {
                assert!(node.children.is_empty());
                assert_eq!(node.processing_status, ProcessingStatus::Pending);
            } else {
                assert_eq!(node.processing_status, ProcessingStatus::Completed);
            }
            for child in &node.children {
                assert_eq!(child.depth, node.depth + 1);
                assert_depths(child, max_depth);
            }
        }
        assert_depths(&root, 2);
        assert_eq!(root.subtree_size(), 1 + 2 + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn node_timeout_fails_slow_pipelines() {
        let pipeline = Arc::new(FanoutPipeline {
            fanout: vec![2],
            delay: Duration::from_secs(120),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 1,
                max_concurrent: 20,
                node_timeout: Some(Duration::from_secs(30)),
            },
            pipeline,
        );
        let sink = CollectingSink::default();

        let root = builder.build(&seed(1), &sink).await.unwrap();
        assert_eq!(root.processing_status, ProcessingStatus::Failed);
        assert!(root.children.is_empty());
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, TreeStreamEvent::Error { node_id: Some(_), .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_sink_aborts_the_build() {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        drop(rx);
        let sink = ChannelEventSink::new(tx);
        let builder = TreeBuilder::new(
            TreeBuilderConfig::default(),
            Arc::new(FanoutPipeline::new(vec![2])),
        );

        let result = builder.build(&seed(1), &sink).await;
        assert!(matches!(result, Err(PsychoHistoryError::Scheduler(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_aborts_before_the_first_wave() {
        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 2,
                ..Default::default()
            },
            Arc::new(FanoutPipeline::new(vec![2, 2])),
        );
        builder.cancellation_token().cancel();
        let sink = CollectingSink::default();

        let result = builder.build(&seed(2), &sink).await;
        assert!(matches!(result, Err(PsychoHistoryError::Scheduler(_))));
        assert_eq!(sink.kinds(), vec!["tree_started"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_in_flight_pipelines() {
        let pipeline = Arc::new(FanoutPipeline {
            fanout: vec![2],
            delay: Duration::from_secs(600),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 1,
                ..Default::default()
            },
            pipeline,
        );
        let token = builder.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        let sink = CollectingSink::default();

        // The root pipeline is cut off long before its 600s sleep ends; the
        // node fails and the tree still finishes cleanly.
        let root = builder.build(&seed(1), &sink).await.unwrap();
        assert_eq!(root.processing_status, ProcessingStatus::Failed);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, TreeStreamEvent::Error { node_id: Some(_), .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn pipelines_see_the_full_root_path() {
        struct PathAssertingPipeline;

        #[async_trait]
        impl NodePipeline for PathAssertingPipeline {
            async fn expand(
                &self,
                node: &EventNode,
                _seed: &SeedInput,
                path: &[String],
            ) -> Result<Vec<EventNode>> {
                assert_eq!(path.len() as u32, node.depth + 1);
                assert_eq!(path.last(), Some(&node.event));
                Ok(vec![EventNode::child_of(
                    node,
                    format!("{} then more", node.event),
                    1.0,
                )])
            }
        }

        let builder = TreeBuilder::new(
            TreeBuilderConfig {
                max_depth: 3,
                ..Default::default()
            },
            Arc::new(PathAssertingPipeline),
        );
        let sink = CollectingSink::default();
        let root = builder.build(&seed(3), &sink).await.unwrap();
        assert_eq!(root.subtree_size(), 4);
    }
}
