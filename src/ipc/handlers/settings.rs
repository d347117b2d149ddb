use crate::forecast::ForecastConfig;
use crate::ipc::helpers::{db_conn, parse_param, reply_as, Reply};
use crate::ipc::types::{AppState, Request};

fn handle_forecast_get(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    reply_as(req, "config", ForecastConfig::load(conn))
}

/// Missing fields take their default values.
fn handle_forecast_update(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let cfg: ForecastConfig = parse_param(req, "config")?;
    reply_as(req, "config", cfg.save(conn).map(|()| cfg))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "settings.forecast.get" => handle_forecast_get(state, req),
        "settings.forecast.update" => handle_forecast_update(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
