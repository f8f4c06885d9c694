use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use serde_json::{Map, Value};

use super::{
    Mailbox, Outcome, PathResolver, email_executor, file_executor, is_mutating, parse_bool,
    tool_definitions_json,
};

pub(crate) type Executor = fn(&ToolContext, Value) -> Result<Outcome, String>;

/// What executors may touch. Nothing outside this reaches a tool.
pub(crate) struct ToolContext {
    pub(crate) paths: PathResolver,
    mailbox: Option<Box<dyn Mailbox>>,
    mailbox_unavailable: String,
}

impl ToolContext {
    pub(crate) fn new(paths: PathResolver, mailbox: Option<Box<dyn Mailbox>>) -> Self {
        Self {
            paths,
            mailbox,
            mailbox_unavailable: "no mailbox connected".to_string(),
        }
    }

    pub(crate) fn with_mailbox_error(mut self, reason: impl Into<String>) -> Self {
        self.mailbox_unavailable = reason.into();
        self
    }

    pub(crate) fn mailbox(&self) -> Result<&dyn Mailbox, String> {
        self.mailbox
            .as_deref()
            .ok_or_else(|| format!("Gmail is not configured: {}", self.mailbox_unavailable))
    }
}

pub(crate) struct RegisteredTool {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) schema: Value,
    pub(crate) mutating: bool,
    pub(crate) executor: Executor,
}

pub(crate) struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
    ctx: ToolContext,
}

impl ToolRegistry {
    /// Registry with every file and email tool.
    pub(crate) fn new(ctx: ToolContext) -> Self {
        let mut tools = Vec::new();
        for def in tool_definitions_json() {
            let Some(name) = def.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(executor) = file_executor(name).or_else(|| email_executor(name)) else {
                tracing::warn!(tool = name, "tool declared without an executor; skipping");
                continue;
            };
            tools.push(RegisteredTool {
                name: name.to_string(),
                description: def
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                schema: def.get("inputSchema").cloned().unwrap_or(Value::Null),
                mutating: is_mutating(name),
                executor,
            });
        }
        Self::from_tools(tools, ctx)
    }

    pub(crate) fn from_tools(tools: Vec<RegisteredTool>, ctx: ToolContext) -> Self {
        let index = tools
            .iter()
            .enumerate()
            .map(|(i, tool)| (tool.name.clone(), i))
            .collect();
        Self { tools, index, ctx }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub(crate) fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    /// Declarations handed to the model.
    pub(crate) fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.schema,
                })
            })
            .collect()
    }

    /// Never panics and never returns an error: every problem becomes a failed Outcome.
    pub(crate) fn execute(&self, name: &str, args: &Value) -> Outcome {
        let Some(tool) = self.lookup(name) else {
            tracing::warn!(tool = name, "model proposed an unknown tool");
            return Outcome::failure(format!("Unknown tool: {name}"));
        };
        let args = match coerce_args(&tool.schema, args.clone()) {
            Ok(args) => args,
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "tool arguments failed validation");
                return Outcome::failure(format!("Invalid arguments for {name}: {err}"));
            }
        };

        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| (tool.executor)(&self.ctx, args)));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => Outcome::failure(err),
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                tracing::error!(tool = name, panic = %msg, "tool executor panicked");
                Outcome::failure(format!("Internal error: tool execution panicked: {msg}"))
            }
        };
        tracing::info!(
            tool = name,
            success = outcome.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool executed"
        );
        outcome
    }
}

// ── Argument validation ─────────────────────────────────────────────

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check `args` against a tool's object schema. Nulls count as absent,
/// integral floats and numeric strings are accepted for integers, and
/// "true"/"false" strings for booleans. Unknown keys pass through.
pub(crate) fn coerce_args(schema: &Value, args: Value) -> Result<Value, String> {
    let mut map = match args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(format!(
                "expected an object of arguments, got {}",
                type_name(&other)
            ));
        }
    };
    map.retain(|_, v| !v.is_null());

    if let Some(props) = schema.get("properties").and_then(|v| v.as_object()) {
        for (key, value) in map.iter_mut() {
            let Some(expected) = props
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            *value = coerce_value(key, expected, value.take())?;
        }
    }
    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        for field in required.iter().filter_map(|v| v.as_str()) {
            if !map.contains_key(field) {
                return Err(format!("missing required field '{field}'"));
            }
        }
    }
    Ok(Value::Object(map))
}

fn coerce_value(key: &str, expected: &str, value: Value) -> Result<Value, String> {
    let mismatch = |v: &Value| format!("field '{key}' must be {expected}, got {}", type_name(v));
    match expected {
        "string" => match value {
            Value::String(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        "integer" => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Value::from(f as i64)),
                _ => Err(mismatch(&value)),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
        "number" => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
        "boolean" => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(|| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn context() -> ToolContext {
        ToolContext::new(
            PathResolver::new(PathBuf::from("/nowhere/Desktop"), None, PathBuf::from("/nowhere")),
            None,
        )
    }

    fn explode(_: &ToolContext, _: Value) -> Result<Outcome, String> {
        panic!("kaboom")
    }

    fn echo(_: &ToolContext, args: Value) -> Result<Outcome, String> {
        Ok(Outcome::ok(json!({"echo": args})))
    }

    fn fails(_: &ToolContext, _: Value) -> Result<Outcome, String> {
        Err("disk on fire".to_string())
    }

    fn tool(name: &str, executor: Executor) -> RegisteredTool {
        RegisteredTool {
            name: name.to_string(),
            description: String::new(),
            schema: json!({
                "type": "object",
                "properties": {
                    "n": { "type": "integer" },
                    "flag": { "type": "boolean" },
                    "label": { "type": "string" }
                },
                "required": ["label"]
            }),
            mutating: false,
            executor,
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::from_tools(
            vec![tool("echo", echo), tool("explode", explode), tool("fails", fails)],
            context(),
        )
    }

    #[test]
    fn full_registry_covers_catalog() {
        let registry = ToolRegistry::new(context());
        assert_eq!(registry.tools().len(), 34);
        assert!(registry.lookup("create_file_tool").is_some());
        assert!(registry.lookup("get_email_labels_tool").is_some());
        assert!(registry.lookup("rm_rf_tool").is_none());
        assert!(registry.lookup("send_email_tool").unwrap().mutating);
    }

    #[test]
    fn unknown_tool_is_a_failed_outcome() {
        let out = registry().execute("nope", &json!({}));
        assert_eq!(out.error.as_deref(), Some("Unknown tool: nope"));
    }

    #[test]
    fn missing_and_mistyped_arguments_fail_closed() {
        let reg = registry();
        let out = reg.execute("echo", &json!({}));
        assert_eq!(
            out.error.as_deref(),
            Some("Invalid arguments for echo: missing required field 'label'")
        );
        let out = reg.execute("echo", &json!({"label": 3}));
        assert!(out.error.unwrap().contains("field 'label' must be string"));
        let out = reg.execute("echo", &json!(["label"]));
        assert!(out.error.unwrap().contains("expected an object"));
        let out = reg.execute("echo", &json!({"label": "x", "n": 2.5}));
        assert!(!out.success);
    }

    #[test]
    fn lenient_scalar_coercion() {
        let out = registry().execute(
            "echo",
            &json!({"label": "x", "n": 10.0, "flag": "true", "extra": null}),
        );
        assert!(out.success);
        assert_eq!(
            out.get("echo"),
            Some(&json!({"label": "x", "n": 10, "flag": true}))
        );
    }

    #[test]
    fn executor_errors_and_panics_become_outcomes() {
        let reg = registry();
        let out = reg.execute("fails", &json!({"label": "x"}));
        assert_eq!(out.error.as_deref(), Some("disk on fire"));
        let out = reg.execute("explode", &json!({"label": "x"}));
        assert!(out.error.unwrap().contains("kaboom"));
    }

    #[test]
    fn email_tools_without_mailbox_report_configuration() {
        let registry = ToolRegistry::new(context().with_mailbox_error("token file missing"));
        let out = registry.execute("get_unread_emails_tool", &json!({}));
        assert_eq!(
            out.error.as_deref(),
            Some("Gmail is not configured: token file missing")
        );
    }
}
