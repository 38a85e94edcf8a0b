use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{info, warn};

use artifactor_metrics::MetricsCollector;

use crate::error::BridgeError;
use crate::handler::{AgentHandler, DebuggerHandler, PyGuiHandler, PythonInternalHandler};

/// One coordinator call may fan out to sub-agents, one of which may itself be
/// a nested coordinator call; beyond that the source's unbounded recursion
/// (`agent_bridge.py::_invoke_coordinator_agent`) is cut off.
pub const MAX_COORDINATION_DEPTH: u32 = 3;

/// Result of a single `Invoke` call (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub agent: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub execution_time_ms: f64,
    pub overhead_ms: f64,
}

impl InvocationResult {
    pub fn to_json(&self) -> Value {
        if self.success {
            json!({
                "success": true,
                "result": self.result,
                "agent": self.agent,
                "execution_time": self.execution_time_ms,
                "overhead": self.overhead_ms,
            })
        } else {
            json!({
                "success": false,
                "error": self.error,
                "agent": self.agent,
            })
        }
    }
}

/// Routes named tasks to registered in-process handlers (spec.md §4.6).
pub struct AgentBridge {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
    metrics: Arc<MetricsCollector>,
    coordination_overhead_ms: f64,
}

impl AgentBridge {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        let mut handlers: HashMap<String, Arc<dyn AgentHandler>> = HashMap::new();
        handlers.insert("PYGUI".to_string(), Arc::new(PyGuiHandler));
        handlers.insert("PYTHON_INTERNAL".to_string(), Arc::new(PythonInternalHandler));
        handlers.insert("DEBUGGER".to_string(), Arc::new(DebuggerHandler));
        Self { handlers, metrics, coordination_overhead_ms: 11.3 }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn AgentHandler>) {
        self.handlers.insert(name.into().to_uppercase(), handler);
    }

    pub async fn invoke(&self, agent_name: &str, task_data: Value) -> InvocationResult {
        self.invoke_at_depth(agent_name, task_data, 0).await
    }

    fn invoke_at_depth<'a>(
        &'a self,
        agent_name: &'a str,
        task_data: Value,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = InvocationResult> + Send + 'a>> {
        Box::pin(async move {
            let started = Instant::now();
            let upper = agent_name.to_uppercase();

            let outcome = if upper == "COORDINATOR" {
                self.invoke_coordinator(&task_data, depth).await
            } else if let Some(handler) = self.handlers.get(&upper) {
                handler.handle(&task_data).await.map_err(|e| e.to_string())
            } else {
                Err(BridgeError::UnknownAgent(agent_name.to_string()).to_string())
            };

            let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            self.metrics.increment_counter(
                "agent_invocations_total",
                &[("agent", upper.as_str()), ("success", if outcome.is_ok() { "true" } else { "false" })],
            );
            self.metrics
                .add_histogram_value(&format!("agent_invoke_ms:{upper}"), execution_time_ms);

            match outcome {
                Ok(result) => {
                    info!(agent = %upper, execution_time_ms, "agent invocation completed");
                    InvocationResult {
                        agent: upper,
                        success: true,
                        result: Some(result),
                        error: None,
                        execution_time_ms,
                        overhead_ms: self.coordination_overhead_ms,
                    }
                }
                Err(err) => {
                    warn!(agent = %upper, error = %err, "agent invocation failed");
                    InvocationResult {
                        agent: upper,
                        success: false,
                        result: None,
                        error: Some(err),
                        execution_time_ms,
                        overhead_ms: self.coordination_overhead_ms,
                    }
                }
            }
        })
    }

    async fn invoke_coordinator(&self, task_data: &Value, depth: u32) -> Result<Value, String> {
        if depth >= MAX_COORDINATION_DEPTH {
            return Err(BridgeError::MaxDepthExceeded.to_string());
        }

        let agents: Vec<String> = task_data
            .get("agents")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let mut results = serde_json::Map::new();
        for agent in &agents {
            let sub = self.invoke_at_depth(agent, task_data.clone(), depth + 1).await;
            results.insert(agent.clone(), sub.to_json());
        }

        Ok(json!({
            "status": "coordinated",
            "results": results,
            "coordination_time": self.coordination_overhead_ms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> AgentBridge {
        AgentBridge::new(Arc::new(MetricsCollector::new()))
    }

    #[tokio::test]
    async fn invoke_unknown_agent_yields_error_result_not_panic() {
        let b = bridge();
        let result = b.invoke("nonsense", json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unknown agent"));
    }

    #[tokio::test]
    async fn invoke_pygui_returns_success() {
        let b = bridge();
        let result = b.invoke("pygui", json!({"task_type": "ui_operation"})).await;
        assert!(result.success);
        assert_eq!(result.result.unwrap()["status"], json!("completed"));
    }

    #[tokio::test]
    async fn coordinator_fans_out_to_listed_agents() {
        let b = bridge();
        let result = b
            .invoke(
                "COORDINATOR",
                json!({"agents": ["PYGUI", "DEBUGGER"], "task_type": "ui_operation"}),
            )
            .await;
        assert!(result.success);
        let results = &result.result.unwrap()["results"];
        assert!(results["PYGUI"]["success"].as_bool().unwrap());
        assert!(results["DEBUGGER"]["success"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn coordinator_recursion_stops_at_max_depth() {
        let b = bridge();
        let nested_task = json!({"agents": ["COORDINATOR"], "task_type": "orchestrate"});
        // Each level re-invokes COORDINATOR with the same agents list, so this
        // recurses until MAX_COORDINATION_DEPTH cuts it off three levels down.
        let result = b.invoke("COORDINATOR", nested_task).await;
        assert!(result.success, "outer call still reports success with a nested failure");
        let mut cursor = result.result.unwrap();
        for _ in 0..2 {
            cursor = cursor["results"]["COORDINATOR"]["result"].clone();
        }
        let deepest = &cursor["results"]["COORDINATOR"];
        assert_eq!(deepest["success"], json!(false));
        assert!(deepest["error"].as_str().unwrap().contains("max coordination depth exceeded"));
    }

    #[tokio::test]
    async fn invocations_increment_per_agent_counter() {
        let b = bridge();
        b.invoke("PYGUI", json!({"task_type": "ui_operation"})).await;
        b.invoke("PYGUI", json!({"task_type": "ui_operation"})).await;
        assert_eq!(
            b.metrics.get_counter("agent_invocations_total", &[("agent", "PYGUI"), ("success", "true")]),
            2
        );
    }
}
