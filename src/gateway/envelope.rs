//! JSON-RPC 2.0 framing

use crate::dispatcher::ExecutionResult;
use crate::Error;
use serde::Serialize;
use serde_json::{json, Value};

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    /// A dispatched intent that ended in failure; the full result rides along
    pub fn execution_failed(result: &ExecutionResult) -> Self {
        let (kind, reason, message) = match &result.error {
            Some(e) => (e.kind, e.reason, e.message.clone()),
            None => ("Internal", None, "execution failed".to_string()),
        };
        Self {
            code: INTERNAL_ERROR,
            message: message.clone(),
            data: Some(json!({
                "kind": kind,
                "reason": reason,
                "message": message,
                "execution": result,
            })),
        }
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: err.to_string(),
            data: Some(json!({
                "kind": err.kind(),
                "reason": err.reason(),
                "message": err.to_string(),
            })),
        }
    }
}

/// One response object; exactly one of `result` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn parse_error(detail: &str) -> Self {
        Self::failure(
            Value::Null,
            RpcError::new(PARSE_ERROR, format!("Parse error: {}", detail)),
        )
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "error": {"code": INTERNAL_ERROR, "message": e.to_string()},
                "id": self.id,
            })
        })
    }
}

/// Fields of one request object, before the method is looked up
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: Option<String>,
    pub params: Value,
    pub id: Value,
}

impl RpcRequest {
    /// Read a request object; `None` when `item` is not an object
    pub fn from_value(item: Value) -> Option<Self> {
        let Value::Object(mut fields) = item else {
            return None;
        };
        let id = fields.remove("id").unwrap_or(Value::Null);
        let method = fields
            .remove("method")
            .and_then(|m| m.as_str().map(str::to_string));
        let params = match fields.remove("params") {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(params) => params,
        };
        Some(Self { method, params, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_omits_error() {
        let response = RpcResponse::success(json!(7), json!({"ok": true}));
        let value = response.to_value();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_null_result_is_kept() {
        let value = RpcResponse::success(json!("a"), Value::Null).to_value();
        assert!(value.as_object().unwrap().contains_key("result"));
    }

    #[test]
    fn test_core_error_carries_kind() {
        let error = RpcError::from(Error::unsupported("compound is not configured on polygon"));
        assert_eq!(error.code, INTERNAL_ERROR);
        let data = error.data.unwrap();
        assert_eq!(data["kind"], "UnsupportedRoute");
        assert!(data["message"].as_str().unwrap().contains("polygon"));
    }

    #[test]
    fn test_request_fields() {
        let request = RpcRequest::from_value(json!({
            "jsonrpc": "2.0", "method": "defi.chains", "id": "abc"
        }))
        .unwrap();
        assert_eq!(request.method.as_deref(), Some("defi.chains"));
        assert_eq!(request.id, json!("abc"));
        assert!(request.params.is_object());

        let request = RpcRequest::from_value(json!({"params": {}})).unwrap();
        assert_eq!(request.method, None);
        assert_eq!(request.id, Value::Null);

        assert!(RpcRequest::from_value(json!(42)).is_none());
    }
}
