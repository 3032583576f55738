//! Ledger to provider wire format.

use personax_core::message::{Ledger, LedgerEntry, Role};
use personax_core::provider::{WireMessage, WireRole, WireToolCall};

fn wire_role(role: Role) -> WireRole {
    match role {
        Role::System => WireRole::System,
        Role::User => WireRole::User,
        Role::Assistant => WireRole::Assistant,
    }
}

/// Serialize the ledger into the message list sent to the provider.
///
/// A tool-call request attaches to the preceding assistant message when there
/// is one, so the calls of a single model turn travel together. Otherwise it
/// opens an assistant message with no text.
pub fn build_wire_messages(ledger: &Ledger) -> Vec<WireMessage> {
    let mut out: Vec<WireMessage> = Vec::with_capacity(ledger.len());

    for entry in ledger {
        match entry {
            LedgerEntry::Message(msg) => {
                out.push(WireMessage::text(wire_role(msg.role), msg.content.clone()));
            }
            LedgerEntry::ToolCallRequest(req) => {
                let call = WireToolCall {
                    id: req.call_id.clone(),
                    name: req.function_name.clone(),
                    arguments: req.arguments.clone(),
                };
                match out.last_mut() {
                    Some(last) if last.role == WireRole::Assistant => last.tool_calls.push(call),
                    _ => out.push(WireMessage {
                        role: WireRole::Assistant,
                        content: None,
                        tool_calls: vec![call],
                        tool_call_id: None,
                    }),
                }
            }
            LedgerEntry::ToolCallResult(result) => {
                out.push(WireMessage::tool_result(
                    result.call_id.clone(),
                    result.content.clone(),
                ));
            }
        }
    }
    out
}
