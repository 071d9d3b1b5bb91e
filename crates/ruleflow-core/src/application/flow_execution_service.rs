use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::application::interpreter::RuleInterpreter;
use crate::domain::context::ExecutionContext;
use crate::domain::flow_graph::{FlowGraph, NodeBody};
use crate::domain::job::VisitedNode;
use crate::domain::rule::Catalog;
use crate::CoreError;

/// Shared flag checked before every node
pub type CancelFlag = Arc<AtomicBool>;

/// Where a branch of the traversal ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchEnd {
    /// Terminal node
    pub node_id: String,
    /// Whether the terminal node succeeded
    pub success: bool,
}

/// Summary of a traversal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalReport {
    /// Visited nodes; branch order after a fan-out
    pub visited: Vec<VisitedNode>,
    /// Terminal nodes of every branch
    pub branches: Vec<BranchEnd>,
    /// At least one branch ended successfully
    pub success: bool,
}

/// A finished traversal
#[derive(Debug, Clone)]
pub struct Execution {
    /// Final context with merged branches
    pub context: ExecutionContext,
    /// Traversal summary
    pub report: TraversalReport,
}

/// Service that runs compiled flow graphs
#[derive(Clone, Debug)]
pub struct FlowExecutionService {
    interpreter: Arc<RuleInterpreter>,
}

impl FlowExecutionService {
    /// Create a new flow execution service
    pub fn new(interpreter: Arc<RuleInterpreter>) -> Self {
        Self { interpreter }
    }

    /// The interpreter used for rule and rule group nodes
    pub fn interpreter(&self) -> &Arc<RuleInterpreter> {
        &self.interpreter
    }

    /// Traverse `graph` from its start nodes
    ///
    /// Node-level failures are recorded in the context and routed along
    /// FAILURE or DEFAULT edges. Graph errors and cancellation abort the
    /// traversal and are returned as `Err`.
    #[instrument(skip_all, fields(flow_id = %graph.id, version = %graph.version))]
    pub async fn execute(
        &self,
        graph: Arc<FlowGraph>,
        catalog: Arc<Catalog>,
        ctx: ExecutionContext,
        cancel: CancelFlag,
    ) -> Result<Execution, CoreError> {
        let traversal = Traversal {
            graph: graph.clone(),
            catalog,
            interpreter: self.interpreter.clone(),
            cancel,
        };

        let starts = graph.start_nodes().to_vec();
        debug!(start_nodes = ?starts, "Starting traversal");
        let branch = traversal.fan_out(starts, Vec::new(), ctx).await?;

        let success = branch.ends.iter().any(|end| end.success);
        info!(
            visited = branch.visited.len(),
            branches = branch.ends.len(),
            success,
            "Traversal finished"
        );

        Ok(Execution {
            context: branch.ctx,
            report: TraversalReport {
                visited: branch.visited,
                branches: branch.ends,
                success,
            },
        })
    }
}

struct Branch {
    ctx: ExecutionContext,
    visited: Vec<VisitedNode>,
    ends: Vec<BranchEnd>,
}

struct Traversal {
    graph: Arc<FlowGraph>,
    catalog: Arc<Catalog>,
    interpreter: Arc<RuleInterpreter>,
    cancel: CancelFlag,
}

impl Traversal {
    /// Run each target on its own copy of `ctx` and merge the results
    fn fan_out<'a>(
        &'a self,
        targets: Vec<String>,
        path: Vec<String>,
        ctx: ExecutionContext,
    ) -> BoxFuture<'a, Result<Branch, CoreError>> {
        async move {
            if targets.len() == 1 {
                let target = targets.into_iter().next().unwrap_or_default();
                return self.walk(target, path, ctx).await;
            }

            debug!(targets = ?targets, "Fanning out");
            let branches = join_all(
                targets
                    .into_iter()
                    .map(|target| self.walk(target, path.clone(), ctx.clone())),
            )
            .await;

            let mut merged = Branch {
                ctx,
                visited: Vec::new(),
                ends: Vec::new(),
            };
            let mut contexts = Vec::with_capacity(branches.len());
            for branch in branches {
                let branch = branch?;
                merged.visited.extend(branch.visited);
                merged.ends.extend(branch.ends);
                contexts.push(branch.ctx);
            }
            merged.ctx.merge_branches(contexts);
            Ok(merged)
        }
        .boxed()
    }

    /// Follow a single path until it ends or fans out
    fn walk<'a>(
        &'a self,
        start: String,
        mut path: Vec<String>,
        mut ctx: ExecutionContext,
    ) -> BoxFuture<'a, Result<Branch, CoreError>> {
        async move {
            let mut visited = Vec::new();
            let mut node_id = start;

            loop {
                if self.cancel.load(Ordering::SeqCst) {
                    return Err(CoreError::Cancelled(format!(
                        "Traversal stopped before node '{}'",
                        node_id
                    )));
                }
                if path.contains(&node_id) {
                    return Err(CoreError::GraphError(format!(
                        "Cycle detected: node '{}' revisited via {}",
                        node_id,
                        path.join(" -> ")
                    )));
                }

                let success = self.dispatch(&node_id, &mut ctx).await?;
                let kind = self
                    .graph
                    .node(&node_id)
                    .map(|n| n.kind)
                    .ok_or_else(|| CoreError::GraphError(format!("Unknown node: {}", node_id)))?;
                visited.push(VisitedNode {
                    node_id: node_id.clone(),
                    kind,
                    success,
                    timestamp: Utc::now(),
                });

                let targets: Vec<String> = self
                    .graph
                    .select_edges(&node_id, success, &ctx)
                    .into_iter()
                    .map(|edge| edge.target.clone())
                    .collect();
                debug!(node_id = %node_id, success, next = ?targets, "Edges selected");

                path.push(node_id.clone());
                match targets.len() {
                    0 => {
                        return Ok(Branch {
                            ctx,
                            visited,
                            ends: vec![BranchEnd { node_id, success }],
                        });
                    }
                    1 => {
                        node_id = targets.into_iter().next().unwrap_or_default();
                    }
                    _ => {
                        let mut rest = self.fan_out(targets, path, ctx).await?;
                        visited.append(&mut rest.visited);
                        rest.visited = visited;
                        return Ok(rest);
                    }
                }
            }
        }
        .boxed()
    }

    async fn dispatch(&self, node_id: &str, ctx: &mut ExecutionContext) -> Result<bool, CoreError> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| CoreError::GraphError(format!("Unknown node: {}", node_id)))?;
        debug!(node_id = %node_id, kind = %node.kind, "Dispatching node");

        let schema = self.catalog.schema();
        let success = match &node.body {
            NodeBody::Station(station) => {
                debug!(node_id = %node_id, station = %station.name, "Station reached");
                true
            }
            NodeBody::Rule(rule) => {
                self.interpreter
                    .execute_rule(rule, schema, ctx, Some(node_id))
                    .await?
                    .passed
            }
            NodeBody::RuleGroup { group, rules } => {
                self.interpreter
                    .execute_group(group, rules, schema, ctx, Some(node_id))
                    .await?
                    .passed
            }
        };
        Ok(success)
    }
}
