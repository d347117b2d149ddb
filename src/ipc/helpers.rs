use crate::error::{CoreError, CoreResult};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

/// Handler outcome: both arms are complete responses.
pub type Reply = Result<serde_json::Value, serde_json::Value>;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<T, serde_json::Value> {
    let Some(raw) = req.params.get(key) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("invalid {}: {}", key, e),
            Some(json!({ "param": key })),
        )
    })
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn core_err(id: &str, e: CoreError) -> serde_json::Value {
    match &e {
        CoreError::Storage(inner) => log::error!("request {} failed: {}", id, inner),
        other => log::warn!("request {} rejected: {}", id, other),
    }
    err(id, e.code(), e.to_string(), None)
}

/// Wraps a core result under `key` in the success payload.
pub fn reply_as<T: Serialize>(req: &Request, key: &str, res: CoreResult<T>) -> Reply {
    let value = res.map_err(|e| core_err(&req.id, e))?;
    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), json!(value));
    Ok(ok(&req.id, serde_json::Value::Object(body)))
}

/// Uses a serialized core value directly as the success payload.
pub fn reply_with<T: Serialize>(req: &Request, res: CoreResult<T>) -> Reply {
    let value = res.map_err(|e| core_err(&req.id, e))?;
    Ok(ok(&req.id, json!(value)))
}
