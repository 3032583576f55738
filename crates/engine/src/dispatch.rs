//! Tool execution for one model turn.
//!
//! Recoverable [`ToolError`]s become placeholder results the model can read.
//! `ToolError::Internal` and `ToolError::InvalidSpec` are bugs, not tool
//! outcomes, and abort the completion.

use futures::{StreamExt, TryStreamExt, stream};
use personax_core::error::{Error, ToolError};
use personax_core::message::{Ledger, ToolCallRequest, ToolCallResult};
use personax_core::tool::ToolRegistry;
use std::time::Instant;
use tracing::{debug, warn};

/// Result text for a tool name the registry does not know.
pub fn not_available(name: &str) -> String {
    format!("Tool {name} not available")
}

/// Result text for a tool that failed recoverably.
pub fn execution_failed(name: &str) -> String {
    format!("Error executing tool {name}")
}

async fn execute_one(tools: &ToolRegistry, request: &ToolCallRequest) -> Result<ToolCallResult, Error> {
    let start = Instant::now();
    let outcome = tools.execute(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let content = match outcome {
        Ok(output) => {
            debug!(tool = %request.function_name, call_id = %request.call_id, duration_ms, "Tool executed");
            output.into_content()
        }
        Err(ToolError::NotFound(name)) => {
            warn!(tool = %name, "Model requested an unknown tool");
            not_available(&name).into()
        }
        Err(e) if e.is_recoverable() => {
            warn!(tool = %request.function_name, error = %e, duration_ms, "Tool execution failed");
            execution_failed(&request.function_name).into()
        }
        Err(e) => return Err(e.into()),
    };
    Ok(ToolCallResult {
        call_id: request.call_id.clone(),
        content,
    })
}

/// Execute a batch of requests, at most `concurrency` at a time.
///
/// Results come back in request order regardless of completion order.
pub async fn execute_tool_calls(
    tools: &ToolRegistry,
    requests: &[ToolCallRequest],
    concurrency: usize,
) -> Result<Vec<ToolCallResult>, Error> {
    let calls: Vec<_> = requests.iter().map(|req| execute_one(tools, req)).collect();
    stream::iter(calls)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

/// Execute a batch and append each request followed by its result.
pub async fn run_tool_calls(
    ledger: &mut Ledger,
    tools: &ToolRegistry,
    requests: Vec<ToolCallRequest>,
    concurrency: usize,
) -> Result<(), Error> {
    let results = execute_tool_calls(tools, &requests, concurrency).await?;
    for (request, result) in requests.into_iter().zip(results) {
        ledger.push_tool_request(request)?;
        ledger.push_tool_result(result)?;
    }
    Ok(())
}
