use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{BridgeError, Result};

/// A named in-process handler invoked by the [`crate::bridge::AgentBridge`].
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn handle(&self, task_data: &Value) -> Result<Value>;
}

fn task_type(task_data: &Value) -> &str {
    task_data.get("task_type").and_then(Value::as_str).unwrap_or("ui_operation")
}

/// UI-facing operations: rendering state and progress reporting.
pub struct PyGuiHandler;

#[async_trait]
impl AgentHandler for PyGuiHandler {
    async fn handle(&self, task_data: &Value) -> Result<Value> {
        match task_type(task_data) {
            "ui_operation" => Ok(json!({
                "status": "completed",
                "ui_state": "rendered",
                "progress": 100,
            })),
            "progress_update" => {
                let progress = task_data.get("progress").cloned().unwrap_or(json!(0));
                Ok(json!({ "status": "updated", "progress": progress }))
            }
            other => Err(BridgeError::Handler(format!("unknown PYGUI task type: {other}"))),
        }
    }
}

/// Environment and dependency checks for the in-process runtime.
pub struct PythonInternalHandler;

#[async_trait]
impl AgentHandler for PythonInternalHandler {
    async fn handle(&self, task_data: &Value) -> Result<Value> {
        match task_data.get("task_type").and_then(Value::as_str).unwrap_or("environment_check") {
            "environment_check" => Ok(json!({
                "status": "healthy",
                "runtime": "rust",
            })),
            "dependency_check" => Ok(json!({
                "status": "validated",
                "missing": Vec::<String>::new(),
            })),
            other => Err(BridgeError::Handler(format!(
                "unknown PYTHON_INTERNAL task type: {other}"
            ))),
        }
    }
}

/// System validation and health scoring.
pub struct DebuggerHandler;

#[async_trait]
impl AgentHandler for DebuggerHandler {
    async fn handle(&self, task_data: &Value) -> Result<Value> {
        match task_data.get("task_type").and_then(Value::as_str).unwrap_or("health_check") {
            "health_check" => Ok(json!({
                "status": "healthy",
                "system_health": "optimal",
            })),
            "validation" => Ok(json!({
                "status": "validated",
                "validation_results": { "passed": true, "errors": Vec::<String>::new() },
            })),
            other => Err(BridgeError::Handler(format!("unknown DEBUGGER task type: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pygui_reports_progress_update() {
        let result = PyGuiHandler
            .handle(&json!({"task_type": "progress_update", "progress": 42}))
            .await
            .unwrap();
        assert_eq!(result["progress"], json!(42));
    }

    #[tokio::test]
    async fn debugger_rejects_unknown_task_type() {
        let result = DebuggerHandler.handle(&json!({"task_type": "nonsense"})).await;
        assert!(result.is_err());
    }
}
