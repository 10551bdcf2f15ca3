//! Line-delimited JSON-RPC 2.0 dispatcher.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};
use warden_core::{
    Arguments, CorrelationId, ErrorCode, ExecutionRequest, ExecutionResult, ExecutionStatus,
    Principal,
};

use crate::gateway::Gateway;
use crate::middleware::CallContext;

/// Protocol revision announced by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Principal recorded for calls whose parameters name none.
pub const UNKNOWN_PRINCIPAL: &str = "<unknown>";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// A JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
    data: Value,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i64, kind: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: json!({ "code": kind.as_str() }),
            }),
        }
    }

    fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            warn!(error = %e, "failed to encode response");
            String::from(
                r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal error","data":{"code":"InternalError"}}}"#,
            )
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
    principal: Principal,
    #[serde(default)]
    correlation_id: Option<CorrelationId>,
}

/// Routes JSON-RPC envelopes to the gateway.
pub struct Dispatcher {
    gateway: Arc<Gateway>,
    max_request_bytes: usize,
    /// JSON-RPC request id -> correlation id of calls still running.
    calls: Mutex<HashMap<String, CorrelationId>>,
}

impl Dispatcher {
    /// Create a dispatcher in front of `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<Gateway>, max_request_bytes: usize) -> Self {
        Self {
            gateway,
            max_request_bytes,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// The gateway behind this dispatcher.
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Longest request line accepted, in bytes.
    #[must_use]
    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// The response to a line longer than [`Self::max_request_bytes`].
    #[must_use]
    pub fn oversized_response(&self) -> String {
        RpcResponse::failure(
            Value::Null,
            INVALID_REQUEST,
            ErrorCode::ParseError,
            format!("request exceeds {} bytes", self.max_request_bytes),
        )
        .to_line()
    }

    /// Handle one request line. Returns the response line, or `None` for
    /// notifications.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        if line.len() > self.max_request_bytes {
            warn!(bytes = line.len(), "request line too large");
            return Some(self.oversized_response());
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "unparseable request");
                return Some(
                    RpcResponse::failure(Value::Null, PARSE_ERROR, ErrorCode::ParseError, e.to_string())
                        .to_line(),
                );
            },
        };
        let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
        let request: RpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(
                    RpcResponse::failure(id_hint, INVALID_REQUEST, ErrorCode::ParseError, e.to_string())
                        .to_line(),
                );
            },
        };
        if request.jsonrpc.as_deref() != Some("2.0") {
            return Some(
                RpcResponse::failure(
                    id_hint,
                    INVALID_REQUEST,
                    ErrorCode::ParseError,
                    "jsonrpc must be \"2.0\"",
                )
                .to_line(),
            );
        }

        let response = self.dispatch(request).await?;
        Some(response.to_line())
    }

    async fn dispatch(&self, request: RpcRequest) -> Option<RpcResponse> {
        let RpcRequest {
            id, method, params, ..
        } = request;
        debug!(method = %method, "dispatching");

        let result = match method.as_str() {
            "initialize" => Some(self.initialize()),
            "list_tools" | "tools/list" => Some(self.list_tools()),
            "call_tool" | "tools/call" => Some(self.call_tool(id.as_ref(), params).await),
            "notifications/cancelled" => {
                self.cancel(params.as_ref());
                None
            },
            other if other.starts_with("notifications/") => None,
            other => {
                return id.map(|id| {
                    RpcResponse::failure(
                        id,
                        METHOD_NOT_FOUND,
                        ErrorCode::MethodNotFound,
                        format!("method '{other}' not found"),
                    )
                });
            },
        };

        match (id, result) {
            (Some(id), Some(result)) => Some(RpcResponse::success(id, result)),
            _ => None,
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": {
                "name": self.gateway.name(),
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .gateway
            .list_tools()
            .iter()
            .map(|tool| tool.descriptor())
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, id: Option<&Value>, params: Option<Value>) -> Value {
        let params = params.unwrap_or(Value::Null);
        let parsed = serde_json::from_value::<CallToolParams>(params.clone())
            .map_err(|e| e.to_string())
            .and_then(|p| {
                let arguments = match p.arguments {
                    None | Some(Value::Null) => Arguments::new(),
                    Some(Value::Object(map)) => map,
                    Some(_) => return Err("arguments must be an object".to_owned()),
                };
                Ok((p.name, arguments, p.principal, p.correlation_id))
            });

        let (name, arguments, principal, correlation_id) = match parsed {
            Ok(parts) => parts,
            Err(reason) => {
                let ctx = refusal_context(&params);
                let result = ExecutionResult::refused(
                    ExecutionStatus::Rejected,
                    ErrorCode::ValidationError,
                    format!("invalid call_tool params: {reason}"),
                );
                let result = self.gateway.record_refusal(&ctx, result).await;
                return render_result(&result, &ctx.correlation_id);
            },
        };

        let mut request = ExecutionRequest::new(name, arguments, principal);
        if let Some(correlation_id) = correlation_id {
            request = request.with_correlation_id(correlation_id);
        }
        let correlation_id = request.correlation_id.clone();

        let key = id.map(Value::to_string);
        if let Some(key) = &key
            && !self.track(key, &correlation_id)
        {
            warn!(request_id = %key, %correlation_id, "request id already in flight");
            let ctx = CallContext::new(
                correlation_id.clone(),
                request.principal,
                request.tool_name,
            );
            let result = ExecutionResult::refused(
                ExecutionStatus::Rejected,
                ErrorCode::ValidationError,
                format!("request id {key} is already in flight"),
            );
            let result = self.gateway.record_refusal(&ctx, result).await;
            return render_result(&result, &correlation_id);
        }
        let result = self.gateway.call_tool(request).await;
        if let Some(key) = key {
            self.untrack(&key);
        }

        render_result(&result, &correlation_id)
    }

    /// Start tracking a running call. False if `key` is already running.
    fn track(&self, key: &str, correlation_id: &CorrelationId) -> bool {
        let mut calls = self
            .calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match calls.entry(key.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(correlation_id.clone());
                true
            },
        }
    }

    fn untrack(&self, key: &str) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }

    /// Handle `notifications/cancelled` for a running call.
    fn cancel(&self, params: Option<&Value>) {
        let Some(request_id) = params.and_then(|p| p.get("requestId")) else {
            return;
        };
        let correlation_id = self
            .calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&request_id.to_string())
            .cloned();
        match correlation_id {
            Some(correlation_id) => {
                let found = self.gateway.sandbox().cancel(&correlation_id);
                debug!(%correlation_id, found, "cancel notification");
            },
            None => debug!(request_id = %request_id, "cancel for unknown request"),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_request_bytes", &self.max_request_bytes)
            .finish_non_exhaustive()
    }
}

/// Best-effort identity for a call whose parameters did not parse.
fn refusal_context(params: &Value) -> CallContext {
    let principal = params
        .get("principal")
        .and_then(|p| serde_json::from_value::<Principal>(p.clone()).ok())
        .unwrap_or_else(|| Principal::new(UNKNOWN_PRINCIPAL));
    let tool = params
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_PRINCIPAL)
        .to_owned();
    let correlation_id = params
        .get("correlationId")
        .and_then(Value::as_str)
        .map_or_else(CorrelationId::new, CorrelationId::from_string);
    CallContext::new(correlation_id, principal, tool)
}

/// Caller-visible form of a call outcome.
///
/// Outcomes that never executed are `{status: "error", code, message}`;
/// executed outcomes are `{status, result}` and, unless completed, also
/// carry `code` and `message`. Raw output never appears.
#[must_use]
pub fn render_result(result: &ExecutionResult, correlation_id: &CorrelationId) -> Value {
    let code = result.code.unwrap_or(ErrorCode::InternalError);
    let message = result.error.clone().unwrap_or_default();

    if result.status.is_pre_execution() {
        return json!({
            "status": "error",
            "code": code.as_str(),
            "message": message,
            "correlationId": correlation_id,
        });
    }

    let mut body = json!({
        "status": result.status.as_str(),
        "correlationId": correlation_id,
        "result": {
            "content": [{ "type": "text", "text": result.sanitized_output }],
            "isError": !result.is_success(),
            "exitCode": result.exit_code,
            "truncated": result.truncated,
            "redactionCount": result.redaction_count,
            "durationMs": result.duration_ms,
        },
    });
    if !result.is_success()
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert("code".to_owned(), json!(code.as_str()));
        obj.insert("message".to_owned(), json!(message));
    }
    body
}
