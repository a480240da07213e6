//! A2A wire protocol
//!
//! JSON-RPC envelopes for the two methods every skill agent speaks
//! (`message/send`, `tasks/get`) plus the reply-extraction chain that
//! digs the structured function response out of a completed task.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const METHOD_MESSAGE_SEND: &str = "message/send";
pub const METHOD_TASKS_GET: &str = "tasks/get";

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<P: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: P,
    pub id: String,
}

impl<P: Serialize> JsonRpcRequest<P> {
    pub fn new(method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageSendParams {
    pub message: OutboundMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub message_id: String,
    pub role: &'static str,
    pub parts: Vec<OutboundPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundPart {
    pub text: String,
}

/// Build the user message carrying a skill invocation.
///
/// Agents are prompt-driven: the skill name and the flattened input
/// record travel as text, `Use the <skill> tool with parameters: k=v, ...`.
pub fn skill_message(skill: &str, input: &Value) -> OutboundMessage {
    let prompt = match input.as_object() {
        Some(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{}={}", k, s),
                    other => format!("{}={}", k, other),
                })
                .collect();
            format!("Use the {} tool with parameters: {}", skill, pairs.join(", "))
        }
        None => format!("Use the {} tool with parameters: {}", skill, input),
    };

    OutboundMessage {
        message_id: Uuid::new_v4().to_string(),
        role: "user",
        parts: vec![OutboundPart { text: prompt }],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TasksGetParams {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Response to `message/send`; only the task id matters.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SendResponse {
    #[serde(default)]
    pub result: SendResult,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SendResult {
    #[serde(default)]
    pub id: Option<String>,
}

/// Response to `tasks/get`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PollResponse {
    #[serde(default)]
    pub result: TaskEnvelope,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskEnvelope {
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskStatus {
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub message: Option<StatusMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StatusMessage {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub metadata: Option<PartMetadata>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PartMetadata {
    #[serde(default)]
    pub adk_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Reply extraction
// ---------------------------------------------------------------------------

/// What a completed skill task produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillReply {
    /// Structured function response extracted from the task history.
    Structured(Value),
    /// Plain-text fallback taken from the terminal status message when no
    /// structured part exists. Degraded; callers must treat it as such.
    Text(String),
}

impl SkillReply {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SkillReply::Text(_))
    }
}

/// Extract the skill's reply from a completed task.
///
/// Ordered chain over the history, most recent agent entry first:
/// 1. a data part tagged `adk_type == "function_response"` whose
///    `response` wraps a `result` (typed skill outputs),
/// 2. the same part's non-empty `response` object (plain dict outputs),
/// 3. the part's own `result` key,
/// then the first text part of the terminal status message as the
/// degraded fallback. `None` means the task completed with nothing usable.
pub fn extract_reply(task: &TaskEnvelope) -> Option<SkillReply> {
    for entry in task.history.iter().rev() {
        if entry.role != "agent" {
            continue;
        }
        for part in &entry.parts {
            let Some(data) = &part.data else { continue };
            let adk_type = part
                .metadata
                .as_ref()
                .and_then(|m| m.adk_type.as_deref());
            if adk_type != Some("function_response") {
                continue;
            }

            if let Some(response) = data.get("response") {
                if let Some(result) = response.get("result") {
                    return Some(SkillReply::Structured(result.clone()));
                }
                if response.as_object().is_some_and(|o| !o.is_empty()) {
                    return Some(SkillReply::Structured(response.clone()));
                }
            }
            if let Some(result) = data.get("result") {
                return Some(SkillReply::Structured(result.clone()));
            }
        }
    }

    let message = task.status.message.as_ref()?;
    let first = message.parts.first()?;
    first.text.as_ref().map(|t| SkillReply::Text(t.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task_with_history(history: Value) -> TaskEnvelope {
        serde_json::from_value(json!({
            "status": { "state": "completed" },
            "history": history,
        }))
        .unwrap()
    }

    #[test]
    fn send_envelope_shape() {
        let msg = skill_message("get_stock_data", &json!({"asx_code": "BHP", "task_id": "t-1"}));
        let req = JsonRpcRequest::new(METHOD_MESSAGE_SEND, MessageSendParams { message: msg });
        let wire = serde_json::to_value(&req).unwrap();

        assert_eq!(wire["jsonrpc"], "2.0");
        assert_eq!(wire["method"], "message/send");
        assert_eq!(wire["params"]["message"]["role"], "user");
        assert!(wire["params"]["message"]["messageId"].is_string());
        let text = wire["params"]["message"]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Use the get_stock_data tool with parameters: "));
        assert!(text.contains("asx_code=BHP"));
        assert!(text.contains("task_id=t-1"));
    }

    #[test]
    fn extracts_wrapped_result() {
        let task = task_with_history(json!([
            { "role": "user", "parts": [{ "text": "..." }] },
            { "role": "agent", "parts": [{
                "data": { "response": { "result": { "price": 12.5 } } },
                "metadata": { "adk_type": "function_response" }
            }] }
        ]));
        assert_eq!(
            extract_reply(&task),
            Some(SkillReply::Structured(json!({ "price": 12.5 })))
        );
    }

    #[test]
    fn extracts_plain_dict_response() {
        let task = task_with_history(json!([
            { "role": "agent", "parts": [{
                "data": { "response": { "recommendation": "HOLD" } },
                "metadata": { "adk_type": "function_response" }
            }] }
        ]));
        assert_eq!(
            extract_reply(&task),
            Some(SkillReply::Structured(json!({ "recommendation": "HOLD" })))
        );
    }

    #[test]
    fn extracts_result_directly_in_data() {
        let task = task_with_history(json!([
            { "role": "agent", "parts": [{
                "data": { "result": { "ok": true } },
                "metadata": { "adk_type": "function_response" }
            }] }
        ]));
        assert_eq!(
            extract_reply(&task),
            Some(SkillReply::Structured(json!({ "ok": true })))
        );
    }

    #[test]
    fn most_recent_agent_entry_wins() {
        let task = task_with_history(json!([
            { "role": "agent", "parts": [{
                "data": { "response": { "result": { "version": 1 } } },
                "metadata": { "adk_type": "function_response" }
            }] },
            { "role": "agent", "parts": [{
                "data": { "response": { "result": { "version": 2 } } },
                "metadata": { "adk_type": "function_response" }
            }] }
        ]));
        assert_eq!(
            extract_reply(&task),
            Some(SkillReply::Structured(json!({ "version": 2 })))
        );
    }

    #[test]
    fn falls_back_to_status_text() {
        let task: TaskEnvelope = serde_json::from_value(json!({
            "status": {
                "state": "completed",
                "message": { "parts": [{ "text": "The price is around $12.50" }] }
            },
            "history": [
                { "role": "agent", "parts": [{ "text": "thinking..." }] }
            ]
        }))
        .unwrap();

        let reply = extract_reply(&task).unwrap();
        assert!(reply.is_degraded());
        assert_eq!(reply, SkillReply::Text("The price is around $12.50".to_string()));
    }

    #[test]
    fn nothing_usable_is_none() {
        let task = task_with_history(json!([
            { "role": "user", "parts": [{ "text": "..." }] }
        ]));
        assert_eq!(extract_reply(&task), None);
    }

    #[test]
    fn unknown_state_does_not_break_parsing() {
        let resp: PollResponse = serde_json::from_value(json!({
            "result": { "status": { "state": "cancelled" } }
        }))
        .unwrap();
        assert_eq!(resp.result.status.state, TaskState::Unknown);
    }
}
