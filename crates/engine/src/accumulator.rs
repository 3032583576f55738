//! Reassembly of streamed tool calls, and call-id hygiene.

use personax_core::message::{Ledger, ToolCallRequest};
use personax_core::provider::{ToolCallDelta, WireToolCall};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Collects tool-call deltas by positional index.
///
/// The first non-empty id seen for an index wins; name and argument text are
/// concatenated in arrival order.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            if call.id.is_empty() {
                call.id = id.to_string();
            }
        }
        if let Some(name) = &delta.name_delta {
            call.name.push_str(name);
        }
        if let Some(args) = &delta.arguments_delta {
            call.arguments.push_str(args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// The assembled calls, ordered by index.
    pub fn finish(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_values()
            .map(|c| ToolCallRequest {
                call_id: c.id,
                function_name: c.name,
                arguments: c.arguments,
            })
            .collect()
    }
}

/// Convert wire calls from an atomic turn.
pub fn from_wire(calls: Vec<WireToolCall>) -> Vec<ToolCallRequest> {
    calls
        .into_iter()
        .map(|c| ToolCallRequest {
            call_id: c.id,
            function_name: c.name,
            arguments: c.arguments,
        })
        .collect()
}

/// Give every request an id the ledger can accept.
///
/// Ids that are empty, already recorded in the ledger, or repeated within the
/// batch are replaced with a fresh `call_<uuid>`.
pub fn assign_call_ids(ledger: &Ledger, requests: &mut [ToolCallRequest]) {
    let mut seen = HashSet::new();
    for req in requests.iter_mut() {
        let clash = req.call_id.is_empty() || ledger.has_call(&req.call_id) || seen.contains(&req.call_id);
        if clash {
            let fresh = format!("call_{}", uuid::Uuid::new_v4().simple());
            debug!(tool = %req.function_name, old = %req.call_id, new = %fresh, "Reassigned tool call id");
            req.call_id = fresh;
        }
        seen.insert(req.call_id.clone());
    }
}
