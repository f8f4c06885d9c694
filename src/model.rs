use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{
    HookSpec, Message, ModelConfig, ModelError, ModelProvider, ToolInvocation, backoff_delay,
    command_spec_to_vec, env_required, parse_retry_after, run_hook_command, truncate_chars,
};

/// One model turn: text and zero or more proposed tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct AssistantReply {
    pub(crate) content: String,
    pub(crate) tool_calls: Vec<ToolInvocation>,
}

/// Messages in, exactly one assistant reply out.
pub(crate) trait InferenceStep {
    fn infer(&self, messages: &[Message], tools: &[Value]) -> Result<AssistantReply, ModelError>;
}

pub(crate) fn build_model(config: &ModelConfig) -> Result<Box<dyn InferenceStep>, ModelError> {
    match config.provider {
        ModelProvider::Gemini => Ok(Box::new(GeminiClient::from_config(config)?)),
        ModelProvider::Hook => {
            let spec = config.hook.clone().ok_or_else(|| {
                ModelError::MissingConfig("provider is \"hook\" but model.hook is not set".into())
            })?;
            Ok(Box::new(HookModel::new(spec)))
        }
    }
}

fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

// ── Gemini wire format ──────────────────────────────────────────────

/// Split out the system instruction and convert history to Gemini `contents`.
/// Tool calls without a result (rejected batches) become plain text, since the
/// API refuses a functionCall that is not followed by its functionResponse.
pub(crate) fn to_gemini_contents(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let answered: HashSet<&str> = messages
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
        .collect();

    let mut system = None;
    let mut contents: Vec<Value> = Vec::new();
    for msg in messages {
        let (role, parts) = match msg {
            Message::System { content, .. } => {
                system = Some(content.clone());
                continue;
            }
            Message::Human { content, .. } => ("user", vec![json!({ "text": content })]),
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut parts = Vec::new();
                if !content.is_empty() {
                    parts.push(json!({ "text": content }));
                }
                for call in tool_calls {
                    if answered.contains(call.id.as_str()) {
                        let args = if call.args.is_object() {
                            call.args.clone()
                        } else {
                            json!({})
                        };
                        parts.push(json!({
                            "functionCall": { "name": call.name, "args": args }
                        }));
                    } else {
                        parts.push(json!({
                            "text": format!("[proposed {} {} was not executed]", call.name, call.args)
                        }));
                    }
                }
                ("model", parts)
            }
            Message::ToolResult {
                content, tool_name, ..
            } => {
                let response = match serde_json::from_str::<Value>(content) {
                    Ok(Value::Object(map)) => Value::Object(map),
                    _ => json!({ "content": content }),
                };
                (
                    "user",
                    vec![json!({
                        "functionResponse": { "name": tool_name, "response": response }
                    })],
                )
            }
        };
        if parts.is_empty() {
            continue;
        }
        match contents.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(existing) = last["parts"].as_array_mut() {
                    existing.extend(parts);
                }
            }
            _ => contents.push(json!({ "role": role, "parts": parts })),
        }
    }
    (system, contents)
}

pub(crate) fn to_gemini_tools(tools: &[Value]) -> Vec<Value> {
    let declarations: Vec<Value> = tools
        .iter()
        .filter_map(|tool| {
            let name = tool.get("name")?.as_str()?;
            let mut decl = json!({
                "name": name,
                "description": tool.get("description").and_then(|d| d.as_str()).unwrap_or_default(),
            });
            let schema = tool.get("inputSchema").cloned().unwrap_or(Value::Null);
            let has_props = schema
                .get("properties")
                .and_then(|p| p.as_object())
                .is_some_and(|p| !p.is_empty());
            if has_props {
                let mut params = schema;
                let empty_required = params
                    .get("required")
                    .and_then(|r| r.as_array())
                    .is_some_and(|r| r.is_empty());
                if empty_required {
                    if let Some(obj) = params.as_object_mut() {
                        obj.remove("required");
                    }
                }
                decl["parameters"] = params;
            }
            Some(decl)
        })
        .collect();
    if declarations.is_empty() {
        Vec::new()
    } else {
        vec![json!({ "functionDeclarations": declarations })]
    }
}

pub(crate) fn build_gemini_payload(messages: &[Message], tools: &[Value], config: &ModelConfig) -> Value {
    let (system, contents) = to_gemini_contents(messages);
    let mut generation = json!({ "temperature": config.temperature });
    if let Some(max) = config.max_output_tokens {
        generation["maxOutputTokens"] = json!(max);
    }
    let mut payload = json!({
        "contents": contents,
        "generationConfig": generation,
    });
    if let Some(system) = system {
        payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    let tools = to_gemini_tools(tools);
    if !tools.is_empty() {
        payload["tools"] = json!(tools);
    }
    payload
}

pub(crate) fn parse_gemini_response(payload: &Value) -> Result<AssistantReply, ModelError> {
    let Some(candidate) = payload.pointer("/candidates/0") else {
        let reason = payload
            .pointer("/promptFeedback/blockReason")
            .and_then(|v| v.as_str())
            .map(|r| format!(" (blocked: {r})"))
            .unwrap_or_default();
        return Err(ModelError::Malformed(format!("response has no candidates{reason}")));
    };
    let Some(parts) = candidate.pointer("/content/parts").and_then(|v| v.as_array()) else {
        let finish = candidate
            .get("finishReason")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        return Err(ModelError::Malformed(format!(
            "candidate has no content (finishReason: {finish})"
        )));
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(new_call_id);
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            tool_calls.push(ToolInvocation { id, name, args });
            continue;
        }
        if part.get("thought").and_then(|v| v.as_bool()).unwrap_or(false) {
            continue;
        }
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                text_parts.push(text.to_string());
            }
        }
    }
    Ok(AssistantReply {
        content: text_parts.join("\n"),
        tool_calls,
    })
}

// ── Gemini client ───────────────────────────────────────────────────

pub(crate) struct GeminiClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    config: ModelConfig,
}

impl GeminiClient {
    pub(crate) fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = env_required(&config.api_key_env)
            .map_err(|e| ModelError::MissingConfig(e.to_string()))?;
        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Ok(Self {
            agent,
            endpoint,
            api_key,
            config: config.clone(),
        })
    }
}

impl InferenceStep for GeminiClient {
    fn infer(&self, messages: &[Message], tools: &[Value]) -> Result<AssistantReply, ModelError> {
        let payload = build_gemini_payload(messages, tools, &self.config);
        let retryable = |status: u16| matches!(status, 429 | 500 | 502 | 503 | 504);
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let response = self
                .agent
                .post(&self.endpoint)
                .set("content-type", "application/json")
                .set("x-goog-api-key", &self.api_key)
                .send_json(payload.clone());
            match response {
                Ok(resp) => {
                    let body: Value = resp
                        .into_json()
                        .map_err(|e| ModelError::Malformed(format!("invalid JSON: {e}")))?;
                    return parse_gemini_response(&body);
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let retry_after = parse_retry_after(&resp);
                    let text = resp.into_string().unwrap_or_default();
                    if attempt < max_retries && retryable(code) {
                        let delay = backoff_delay(
                            attempt,
                            self.config.retry_base_secs,
                            self.config.retry_max_secs,
                            retry_after,
                        );
                        tracing::warn!(status = code, attempt, ?delay, "model API error; retrying");
                        thread::sleep(delay);
                        continue;
                    }
                    return Err(ModelError::Http {
                        status: code,
                        body: truncate_chars(text.trim(), 500),
                    });
                }
                Err(ureq::Error::Transport(err)) => {
                    if attempt < max_retries {
                        let delay = backoff_delay(
                            attempt,
                            self.config.retry_base_secs,
                            self.config.retry_max_secs,
                            None,
                        );
                        tracing::warn!(error = %err, attempt, ?delay, "model transport error; retrying");
                        thread::sleep(delay);
                        continue;
                    }
                    return Err(ModelError::Transport(err.to_string()));
                }
            }
        }
        Err(ModelError::Transport("retries exhausted".into()))
    }
}

// ── External command model ──────────────────────────────────────────

#[derive(Serialize)]
struct HookRequest<'a> {
    messages: &'a [Message],
    tools: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct HookResponse {
    message: HookMessage,
}

#[derive(Debug, Deserialize)]
struct HookMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<HookToolCall>,
}

#[derive(Debug, Deserialize)]
struct HookToolCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

/// Delegates inference to an external program speaking JSON over stdio.
pub(crate) struct HookModel {
    spec: HookSpec,
}

impl HookModel {
    pub(crate) fn new(spec: HookSpec) -> Self {
        Self { spec }
    }
}

pub(crate) fn parse_hook_output(raw: &str) -> Result<AssistantReply, ModelError> {
    let response: HookResponse =
        serde_json::from_str(raw).map_err(|e| ModelError::Malformed(format!("hook output: {e}")))?;
    let tool_calls = response
        .message
        .tool_calls
        .into_iter()
        .map(|call| ToolInvocation {
            id: call.id.filter(|id| !id.is_empty()).unwrap_or_else(new_call_id),
            name: call.name,
            args: if call.args.is_null() { json!({}) } else { call.args },
        })
        .collect();
    Ok(AssistantReply {
        content: response.message.content.unwrap_or_default(),
        tool_calls,
    })
}

impl InferenceStep for HookModel {
    fn infer(&self, messages: &[Message], tools: &[Value]) -> Result<AssistantReply, ModelError> {
        let cmd = command_spec_to_vec(&self.spec.command);
        let input = serde_json::to_value(HookRequest { messages, tools })
            .map_err(|e| ModelError::Hook(format!("hook input: {e}")))?;
        let timeout = self.spec.timeout_ms.unwrap_or(u64::MAX);
        let raw = run_hook_command(&cmd, &input, timeout, "model").map_err(ModelError::Hook)?;
        parse_hook_output(&raw)
    }
}
