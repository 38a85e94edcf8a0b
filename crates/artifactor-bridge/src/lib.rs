//! artifactor-bridge — the Agent Bridge described in SPEC_FULL.md §4.6: named
//! handler dispatch with per-agent timing and depth-limited coordinator fan-out.

pub mod bridge;
pub mod error;
pub mod handler;

pub use bridge::{AgentBridge, InvocationResult, MAX_COORDINATION_DEPTH};
pub use error::{BridgeError, Result};
pub use handler::{AgentHandler, DebuggerHandler, PyGuiHandler, PythonInternalHandler};
