// Flowgraph Scheduler
// Layer-by-layer execution of a runtime flowgraph with bounded concurrency

use crate::error::{ServiceError, ServiceResult};
use crate::execution::checks::{check_flowgraph_io, TaskTable};
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::flowgraph::{Flowgraph, NodeId, RunOptions, RuntimeFlowgraph};
use crate::record::{Record, RecordStore};
use crate::status::NodeStatus;
use crate::tasks::{Metrics, NodeContext, SelectionContext, Task, TaskError, TaskRegistry};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for flowgraph runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum nodes executing at once (0 = available parallelism)
    pub max_parallel_nodes: usize,
    /// Per-node limit covering setup, run and post-processing
    pub node_timeout_secs: Option<u64>,
    /// Reuse nodes that completed in a previous run with the same configuration
    pub resume: bool,
    /// Stop launching further layers once a node fails
    pub fail_fast: bool,
}

impl SchedulerConfig {
    fn parallelism(&self) -> usize {
        if self.max_parallel_nodes > 0 {
            self.max_parallel_nodes
        } else {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        }
    }

    fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_secs.map(Duration::from_secs)
    }
}

/// Result of one scheduler pass
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub flow: String,
    /// Final status of every node in the run view
    pub statuses: BTreeMap<NodeId, NodeStatus>,
    pub exit_nodes: Vec<NodeId>,
    pub duration: Duration,
    pub success: bool,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn status(&self, node: &NodeId) -> NodeStatus {
        self.statuses.get(node).copied().unwrap_or_default()
    }

    /// Nodes that ended in ERROR or TIMEOUT
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.statuses
            .iter()
            .filter(|(_, status)| status.is_error())
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Exit steps where no index completed
    fn unreached_exit_steps(&self) -> BTreeSet<&str> {
        let mut steps: BTreeSet<&str> = self.exit_nodes.iter().map(|n| n.step.as_str()).collect();
        for node in &self.exit_nodes {
            if self.status(node).is_success() {
                steps.remove(node.step.as_str());
            }
        }
        steps
    }

    /// Fail when any final step of the run was not reached
    pub fn check(&self) -> ServiceResult<()> {
        let unreached = self.unreached_exit_steps();
        if unreached.is_empty() {
            return Ok(());
        }

        let steps = unreached.into_iter().collect::<Vec<_>>().join(", ");
        let failed = self.failed_nodes();
        let message = if failed.is_empty() {
            format!("Could not run final steps: {}", steps)
        } else {
            let errors = failed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Could not run final steps ({}) due to errors in: {}",
                steps, errors
            )
        };
        Err(ServiceError::RunFailed(message))
    }
}

/// What a worker reports back for one node
#[derive(Debug)]
struct NodeOutcome {
    status: NodeStatus,
    metrics: Metrics,
    exit_code: Option<i32>,
    error: Option<String>,
    duration: Duration,
}

impl NodeOutcome {
    fn from_result(result: Result<(i32, Metrics), TaskError>, duration: Duration) -> Self {
        match result {
            Ok((exit_code, metrics)) => Self {
                status: NodeStatus::Success,
                metrics,
                exit_code: Some(exit_code),
                error: None,
                duration,
            },
            Err(TaskError::Skipped(reason)) => Self {
                status: NodeStatus::Skipped,
                metrics: Metrics::new(),
                exit_code: None,
                error: Some(reason),
                duration,
            },
            Err(err) => Self {
                status: NodeStatus::Error,
                metrics: Metrics::new(),
                exit_code: match err {
                    TaskError::ExitCode(code) => Some(code),
                    _ => None,
                },
                error: Some(err.to_string()),
                duration,
            },
        }
    }

    fn timed_out(limit: Duration, duration: Duration) -> Self {
        Self {
            status: NodeStatus::Timeout,
            metrics: Metrics::new(),
            exit_code: None,
            error: Some(format!("Timed out after {}s", limit.as_secs())),
            duration,
        }
    }
}

/// Drives one task through setup, run and post-processing
async fn drive_task(task: &dyn Task, ctx: &NodeContext) -> Result<(i32, Metrics), TaskError> {
    task.setup(ctx).await?;
    let exit_code = task.run(ctx).await?;
    if exit_code != 0 {
        return Err(TaskError::ExitCode(exit_code));
    }
    let metrics = task.post_process(ctx).await?;
    Ok((exit_code, metrics))
}

async fn execute_node(
    task: Arc<dyn Task>,
    ctx: NodeContext,
    timeout: Option<Duration>,
) -> NodeOutcome {
    let start = Instant::now();
    let work = drive_task(task.as_ref(), &ctx);

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => return NodeOutcome::timed_out(limit, start.elapsed()),
        },
        None => work.await,
    };
    NodeOutcome::from_result(result, start.elapsed())
}

/// Configuration fingerprint of a node, including its input wiring
fn fingerprint(flow: &Flowgraph, node: &NodeId) -> Option<String> {
    let attributes = flow.get(node)?;
    let encoded = serde_json::to_vec(attributes).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Some(format!("{:x}", hasher.finalize()))
}

/// Flowgraph scheduler
///
/// Walks the execution order of a run view one layer at a time. Nodes of a
/// layer run concurrently on worker tasks; their statuses are only written
/// by the control loop, which waits for the whole layer before moving on.
pub struct Scheduler {
    flow: Flowgraph,
    registry: TaskRegistry,
    config: SchedulerConfig,
    event_tx: Option<ProgressSender>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(flow: Flowgraph, registry: TaskRegistry) -> Self {
        Self {
            flow,
            registry,
            config: SchedulerConfig::default(),
            event_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the scheduler from launching further nodes
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn flow(&self) -> &Flowgraph {
        &self.flow
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every pre-run check without executing anything
    pub fn check_flow(&self, options: &RunOptions, record: Option<&dyn RecordStore>) -> ServiceResult<()> {
        self.prepare(options, record).map(|_| ())
    }

    fn invalid(&self, diagnostics: Vec<String>) -> ServiceError {
        for problem in &diagnostics {
            error!(flow = %self.flow.name(), "{}", problem);
        }
        ServiceError::InvalidFlow {
            flow: self.flow.name().to_string(),
            diagnostics,
        }
    }

    /// Validate the flow and selection, then bind a task to every node
    fn prepare(&self, options: &RunOptions, record: Option<&dyn RecordStore>) -> ServiceResult<TaskTable> {
        let mut diagnostics = self.flow.diagnostics();
        if diagnostics.is_empty() {
            diagnostics = RuntimeFlowgraph::diagnostics(&self.flow, options);
        }
        if !diagnostics.is_empty() {
            return Err(self.invalid(diagnostics));
        }

        // Each identifier is resolved once per run
        let mut resolved: HashMap<String, Arc<dyn Task>> = HashMap::new();
        let mut tasks = TaskTable::new();
        for node in self.flow.get_nodes() {
            let Some(attributes) = self.flow.get(node) else {
                continue;
            };
            let identifier = attributes.task.identifier();
            let task = match resolved.get(&identifier) {
                Some(task) => Arc::clone(task),
                None => match self.registry.resolve(&attributes.task) {
                    Ok(task) => {
                        resolved.insert(identifier, Arc::clone(&task));
                        task
                    }
                    Err(err) => {
                        diagnostics.push(format!("{}: {}", node, err));
                        continue;
                    }
                },
            };
            tasks.insert(node.clone(), task);
        }
        if !diagnostics.is_empty() {
            return Err(self.invalid(diagnostics));
        }

        let runtime = RuntimeFlowgraph::new(&self.flow, options.clone());
        let diagnostics = check_flowgraph_io(&runtime, &tasks, record);
        if !diagnostics.is_empty() {
            return Err(self.invalid(diagnostics));
        }

        Ok(tasks)
    }

    /// Decide which nodes keep their previous result and clear the rest
    fn prepare_record(&self, runtime: &RuntimeFlowgraph<'_>, record: &mut Record) -> HashSet<NodeId> {
        let mut reused = HashSet::new();

        if self.config.resume {
            let completed: HashSet<NodeId> = runtime
                .get_completed_nodes(Some(&*record as &dyn RecordStore))
                .into_iter()
                .collect();

            for node in runtime.get_execution_order(false).iter().flatten() {
                let current = fingerprint(&self.flow, node);
                let unchanged = current.is_some() && record.fingerprint(node) == current.as_deref();
                let inputs_reused = self
                    .flow
                    .get_inputs(node)
                    .iter()
                    .filter(|input| runtime.contains(input))
                    .all(|input| reused.contains(input));

                if completed.contains(node) && unchanged && inputs_reused {
                    reused.insert(node.clone());
                }
            }
        }

        for node in runtime.get_nodes() {
            if !reused.contains(node) {
                record.clear_node(node);
            }
        }
        reused
    }

    fn fail_node(&self, record: &mut Record, node: &NodeId, message: String) {
        warn!(node = %node, "{}", message);
        record.set_status(node, NodeStatus::Error);
        record.set_error(node, Some(message.clone()));
        self.event_tx
            .send_event(ExecutionEvent::error(message.clone(), Some(node.clone())));
        self.event_tx.send_event(ExecutionEvent::node_completed(
            node.clone(),
            NodeStatus::Error,
            Duration::ZERO,
            Some(message),
        ));
    }

    fn record_outcome(&self, record: &mut Record, node: &NodeId, outcome: NodeOutcome) {
        record.set_status(node, outcome.status);
        for (metric, value) in &outcome.metrics {
            record.set_metric(node, metric, *value);
        }
        record.set_exit_code(node, outcome.exit_code);

        if outcome.status.is_success() {
            if let Some(attributes) = self.flow.get(node) {
                for (metric, goal) in &attributes.goals {
                    record.set_goal(node, metric, *goal);
                }
            }
            record.set_fingerprint(node, fingerprint(&self.flow, node));
        }

        match outcome.status {
            NodeStatus::Skipped => {
                let reason = outcome.error.unwrap_or_default();
                info!(node = %node, "Skipped: {}", reason);
                self.event_tx.send_event(ExecutionEvent::NodeSkipped {
                    node: node.clone(),
                    reason,
                });
            }
            status => {
                if let Some(message) = &outcome.error {
                    warn!(node = %node, %status, "{}", message);
                    self.event_tx
                        .send_event(ExecutionEvent::warning(message.clone(), Some(node.clone())));
                } else {
                    info!(node = %node, "Completed in {:.2}s", outcome.duration.as_secs_f64());
                }
                record.set_error(node, outcome.error.clone());
                self.event_tx.send_event(ExecutionEvent::node_completed(
                    node.clone(),
                    status,
                    outcome.duration,
                    outcome.error,
                ));
            }
        }
    }

    /// Resolve a node's inputs, or explain why it cannot run
    ///
    /// Inputs come from the whole unpruned flow rather than the run view, so
    /// a node at the `from` boundary still sees results of earlier runs.
    fn select_inputs<'v>(
        &self,
        runtime: &'v RuntimeFlowgraph<'v>,
        selection: &'v RuntimeFlowgraph<'v>,
        record: &Record,
        task: &dyn Task,
        node: &NodeId,
    ) -> Result<Vec<NodeId>, String> {
        let selection = if selection.contains(node) { selection } else { runtime };
        let inputs = selection
            .get_node_inputs(&node.step, &node.index, Some(record as &dyn RecordStore))
            .map_err(|e| e.message)?;

        if task.is_builtin() {
            let any_success = inputs
                .iter()
                .any(|input| record.get_status(input) == NodeStatus::Success);
            if !inputs.is_empty() && !any_success {
                return Err(format!("{} has no successful input", node));
            }
        } else if let Some(input) = inputs.iter().find(|input| !record.get_status(input).is_success()) {
            return Err(format!(
                "{} cannot run: input {} finished with {}",
                node,
                input,
                record.get_status(input)
            ));
        }

        let ctx = SelectionContext::new(node, selection, record);
        let selected = task.select_input_nodes(&ctx).map_err(|e| e.to_string())?;

        let has_view_inputs = self
            .flow
            .get_inputs(node)
            .iter()
            .any(|input| selection.contains(input));
        if selected.is_empty() && has_view_inputs {
            return Err(format!("{} received no inputs", node));
        }
        Ok(selected)
    }

    /// Execute the selected part of the flow
    ///
    /// Definition problems abort before any node runs. Node failures are
    /// recorded and reported through the summary instead.
    pub async fn run(&self, options: &RunOptions, record: &mut Record) -> ServiceResult<RunSummary> {
        let start = Instant::now();
        let tasks = self.prepare(options, Some(&*record as &dyn RecordStore))?;

        let runtime = RuntimeFlowgraph::new(&self.flow, options.clone());
        let selection = RuntimeFlowgraph::new(
            &self.flow,
            RunOptions::new().with_prune(options.prune.iter().cloned()),
        );
        let layers = runtime.get_execution_order(false);
        let name = self.flow.name().to_string();

        info!(
            flow = %name,
            nodes = runtime.get_nodes().len(),
            layers = layers.len(),
            "Starting flowgraph run"
        );
        self.event_tx.send_event(ExecutionEvent::run_started(
            &name,
            runtime.get_nodes().len(),
            layers.len(),
        ));

        let reused = self.prepare_record(&runtime, record);
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism()));
        let timeout = self.config.node_timeout();
        let mut failed = false;

        for (layer_index, layer) in layers.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            if failed && self.config.fail_fast {
                let message = format!("Stopping after failure at layer {}", layer_index);
                warn!(flow = %name, "{}", message);
                self.event_tx.send_event(ExecutionEvent::warning(message, None));
                break;
            }

            debug!(layer = layer_index, nodes = layer.len(), "Scheduling layer");
            self.event_tx.send_event(ExecutionEvent::LayerStarted {
                layer: layer_index,
                nodes: layer.clone(),
            });

            let mut workers = JoinSet::new();
            let (started_tx, mut started_rx) = mpsc::unbounded_channel::<NodeId>();
            let mut launched = Vec::new();

            for node in layer {
                if self.cancel.is_cancelled() {
                    break;
                }

                if reused.contains(node) {
                    debug!(node = %node, "Reusing previous result");
                    self.event_tx.send_event(ExecutionEvent::NodeReused {
                        node: node.clone(),
                        status: record.get_status(node),
                    });
                    continue;
                }

                let Some(task) = tasks.get(node) else {
                    self.fail_node(record, node, format!("{} has no task", node));
                    failed = true;
                    continue;
                };

                let inputs = match self.select_inputs(&runtime, &selection, record, task.as_ref(), node) {
                    Ok(inputs) => inputs,
                    Err(message) => {
                        self.fail_node(record, node, message);
                        failed = true;
                        continue;
                    }
                };
                self.event_tx.send_event(ExecutionEvent::InputsSelected {
                    node: node.clone(),
                    inputs: inputs.clone(),
                });

                record.set_status(node, NodeStatus::Queued);
                self.event_tx
                    .send_event(ExecutionEvent::NodeQueued { node: node.clone() });

                let ctx = NodeContext {
                    flow: name.clone(),
                    node: node.clone(),
                    args: self
                        .flow
                        .get(node)
                        .map(|attributes| attributes.args.clone())
                        .unwrap_or_default(),
                    inputs,
                };
                let task = Arc::clone(task);
                let semaphore = Arc::clone(&semaphore);
                let cancel = self.cancel.clone();
                let started_tx = started_tx.clone();
                let node = node.clone();

                launched.push(node.clone());
                workers.spawn(async move {
                    let permit = tokio::select! {
                        permit = semaphore.acquire_owned() => permit,
                        _ = cancel.cancelled() => return (node, None),
                    };
                    let Ok(_permit) = permit else {
                        return (node, None);
                    };

                    let _ = started_tx.send(node.clone());
                    let outcome = execute_node(task, ctx, timeout).await;
                    (node, Some(outcome))
                });
            }
            drop(started_tx);

            let mut reported = HashSet::new();
            loop {
                tokio::select! {
                    biased;

                    Some(node) = started_rx.recv() => {
                        record.set_status(&node, NodeStatus::Running);
                        let task = tasks.get(&node).map(|task| task.task_name()).unwrap_or_default();
                        debug!(node = %node, task = %task, "Node started");
                        self.event_tx.send_event(ExecutionEvent::NodeStarted { node, task });
                    }

                    joined = workers.join_next() => {
                        let Some(joined) = joined else {
                            break;
                        };
                        match joined {
                            Ok((node, Some(outcome))) => {
                                failed |= outcome.status.is_error();
                                self.record_outcome(record, &node, outcome);
                                reported.insert(node);
                            }
                            Ok((node, None)) => {
                                debug!(node = %node, "Not launched before cancellation");
                                reported.insert(node);
                            }
                            Err(err) => {
                                error!(flow = %name, "Node worker failed: {}", err);
                            }
                        }
                    }
                }
            }

            for node in launched.iter().filter(|node| !reported.contains(*node)) {
                self.fail_node(record, node, format!("Worker for {} panicked", node));
                failed = true;
            }
        }

        let cancelled = self.cancel.is_cancelled();
        let statuses = runtime
            .get_nodes()
            .iter()
            .map(|node| (node.clone(), record.get_status(node)))
            .collect();

        let mut summary = RunSummary {
            flow: name.clone(),
            statuses,
            exit_nodes: runtime.get_exit_nodes().to_vec(),
            duration: start.elapsed(),
            success: false,
            cancelled,
        };
        let reached = summary.unreached_exit_steps().is_empty();
        summary.success = !cancelled && reached;

        if cancelled {
            warn!(flow = %name, "Run cancelled");
            self.event_tx
                .send_event(ExecutionEvent::info(format!("Run of {} cancelled", name), None));
        }
        info!(
            flow = %name,
            success = summary.success,
            "Finished flowgraph run in {:.2}s",
            summary.duration.as_secs_f64()
        );
        self.event_tx.send_event(ExecutionEvent::run_completed(
            &name,
            summary.success,
            cancelled,
            summary.duration,
        ));

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::{progress_channel, LogLevel};
    use crate::tasks::NopTask;

    use async_trait::async_trait;

    /// Ordinary task reporting a fixed metric
    #[derive(Debug, Clone, Default)]
    struct EchoTask;

    #[async_trait]
    impl Task for EchoTask {
        fn tool(&self) -> &str {
            "test"
        }

        fn task(&self) -> &str {
            "echo"
        }

        async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
            Ok(0)
        }

        async fn post_process(&self, ctx: &NodeContext) -> Result<Metrics, TaskError> {
            let mut metrics = Metrics::new();
            metrics.insert("inputs".to_string(), ctx.inputs.len() as f64);
            Ok(metrics)
        }
    }

    /// Ordinary task exiting with code 2
    #[derive(Debug, Clone, Default)]
    struct FailTask;

    #[async_trait]
    impl Task for FailTask {
        fn tool(&self) -> &str {
            "test"
        }

        fn task(&self) -> &str {
            "fail"
        }

        async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
            Ok(2)
        }
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::with_builtins()
            .with_task::<EchoTask>()
            .with_task::<FailTask>()
    }

    /// a -> b -> c using the echo task
    fn chain() -> Flowgraph {
        let mut flow = Flowgraph::new("chain");
        for step in ["a", "b", "c"] {
            flow.node(step, "test/echo", 0).unwrap();
        }
        flow.edge("a", "b", 0, 0).unwrap();
        flow.edge("b", "c", 0, 0).unwrap();
        flow
    }

    #[test]
    fn test_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_parallel_nodes, 0);
        assert!(config.parallelism() >= 1);
        assert_eq!(config.node_timeout(), None);
        assert!(!config.resume);
        assert!(!config.fail_fast);

        let config: SchedulerConfig = serde_json::from_str(r#"{"node_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.node_timeout(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_simple_run() {
        let scheduler = Scheduler::new(chain(), registry());
        let mut record = Record::new();

        let summary = scheduler.run(&RunOptions::default(), &mut record).await.unwrap();

        assert!(summary.success);
        assert!(summary.check().is_ok());
        for step in ["a", "b", "c"] {
            assert_eq!(summary.status(&NodeId::new(step, 0)), NodeStatus::Success);
        }
        assert_eq!(record.get_metric(&NodeId::new("a", 0), "inputs"), Some(0.0));
        assert_eq!(record.get_metric(&NodeId::new("c", 0), "inputs"), Some(1.0));
        assert!(record.fingerprint(&NodeId::new("c", 0)).is_some());
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let mut flow = chain();
        flow.node("a", "test/fail", 0).unwrap();
        let scheduler = Scheduler::new(flow, registry());
        let mut record = Record::new();

        let summary = scheduler.run(&RunOptions::default(), &mut record).await.unwrap();

        assert!(!summary.success);
        assert_eq!(summary.status(&NodeId::new("a", 0)), NodeStatus::Error);
        assert_eq!(record.node(&NodeId::new("a", 0)).unwrap().exit_code, Some(2));
        assert_eq!(summary.status(&NodeId::new("b", 0)), NodeStatus::Error);
        assert_eq!(summary.status(&NodeId::new("c", 0)), NodeStatus::Error);

        let err = summary.check().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Run failed: Could not run final steps (c) due to errors in: a/0, b/0, c/0"
        );
    }

    #[tokio::test]
    async fn test_fail_fast_leaves_later_layers_pending() {
        let mut flow = chain();
        flow.node("a", "test/fail", 0).unwrap();
        let config = SchedulerConfig {
            fail_fast: true,
            ..Default::default()
        };
        let scheduler = Scheduler::new(flow, registry()).with_config(config);
        let mut record = Record::new();

        let summary = scheduler.run(&RunOptions::default(), &mut record).await.unwrap();

        assert_eq!(summary.status(&NodeId::new("a", 0)), NodeStatus::Error);
        assert_eq!(summary.status(&NodeId::new("b", 0)), NodeStatus::Pending);
        assert_eq!(
            summary.check().unwrap_err().to_string(),
            "Run failed: Could not run final steps (c) due to errors in: a/0"
        );
    }

    #[tokio::test]
    async fn test_invalid_flow_aborts() {
        let mut flow = chain();
        flow.node("d", "test/missing", 0).unwrap();
        let scheduler = Scheduler::new(flow, registry());
        let mut record = Record::new();

        let err = scheduler
            .run(&RunOptions::default(), &mut record)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidFlow { .. }));
        assert_eq!(err.diagnostics().len(), 1);
        assert!(err.diagnostics()[0].starts_with("d/0"));
        assert_eq!(record.nodes().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_selection_aborts() {
        let scheduler = Scheduler::new(chain(), registry());
        let options = RunOptions::new().with_from(["z"]);

        let err = scheduler.check_flow(&options, None).unwrap_err();
        assert_eq!(
            err.diagnostics(),
            &["From z is not defined in the chain flowgraph".to_string()]
        );
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let (tx, mut rx) = progress_channel();
        let scheduler = Scheduler::new(chain(), registry()).with_progress(tx);
        let mut record = Record::new();

        scheduler.run(&RunOptions::default(), &mut record).await.unwrap();
        drop(scheduler);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(
            events.first(),
            Some(ExecutionEvent::RunStarted { total_nodes: 3, total_layers: 3, .. })
        ));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::RunCompleted { success: true, .. })
        ));
        let started = events
            .iter()
            .filter(|event| matches!(event, ExecutionEvent::NodeStarted { .. }))
            .count();
        assert_eq!(started, 3);
    }

    #[tokio::test]
    async fn test_failures_reported_as_log_events() {
        let mut flow = chain();
        flow.node("a", "test/fail", 0).unwrap();
        let (tx, mut rx) = progress_channel();
        let scheduler = Scheduler::new(flow, registry()).with_progress(tx);
        let mut record = Record::new();

        scheduler.run(&RunOptions::default(), &mut record).await.unwrap();
        drop(scheduler);

        let mut logs = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ExecutionEvent::Log { level, message, node } = event {
                logs.push((level, message, node));
            }
        }

        assert!(logs.contains(&(
            LogLevel::Warning,
            "Task exited with code 2".to_string(),
            Some(NodeId::new("a", 0))
        )));
        assert!(logs
            .iter()
            .any(|(level, _, node)| *level == LogLevel::Error && node.as_ref() == Some(&NodeId::new("b", 0))));
    }

    #[test]
    fn test_fingerprint_tracks_configuration() {
        let mut flow = chain();
        let node = NodeId::new("b", 0);

        let first = fingerprint(&flow, &node).unwrap();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fingerprint(&flow, &node).as_deref(), Some(first.as_str()));

        flow.add_arg("b", 0, "effort=high").unwrap();
        assert_ne!(fingerprint(&flow, &node).unwrap(), first);
        assert_eq!(fingerprint(&flow, &NodeId::new("z", 0)), None);
    }

    #[tokio::test]
    async fn test_builtin_registry_runs_nop() {
        let mut flow = Flowgraph::new("nops");
        flow.node("a", "builtin/nop", 0).unwrap();
        flow.node("b", "builtin/nop", 0).unwrap();
        flow.edge("a", "b", 0, 0).unwrap();
        let registry = TaskRegistry::new().with_task::<NopTask>();
        let scheduler = Scheduler::new(flow, registry);
        let mut record = Record::new();

        let summary = scheduler.run(&RunOptions::default(), &mut record).await.unwrap();
        assert!(summary.success);
    }

    #[test]
    fn test_check_without_errors() {
        let summary = RunSummary {
            flow: "f".to_string(),
            statuses: BTreeMap::from([
                (NodeId::new("a", 0), NodeStatus::Success),
                (NodeId::new("b", 0), NodeStatus::Pending),
            ]),
            exit_nodes: vec![NodeId::new("b", 0)],
            duration: Duration::ZERO,
            success: false,
            cancelled: true,
        };
        assert_eq!(
            summary.check().unwrap_err().to_string(),
            "Run failed: Could not run final steps: b"
        );
    }

    #[test]
    fn test_check_any_index_completes_step() {
        let summary = RunSummary {
            flow: "f".to_string(),
            statuses: BTreeMap::from([
                (NodeId::new("b", 0), NodeStatus::Error),
                (NodeId::new("b", 1), NodeStatus::Success),
            ]),
            exit_nodes: vec![NodeId::new("b", 0), NodeId::new("b", 1)],
            duration: Duration::ZERO,
            success: true,
            cancelled: false,
        };
        assert!(summary.check().is_ok());
        assert_eq!(summary.failed_nodes(), vec![NodeId::new("b", 0)]);
    }
}
