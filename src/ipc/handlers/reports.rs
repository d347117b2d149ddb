use crate::ipc::helpers::{db_conn, reply_as, required_str, Reply};
use crate::ipc::types::{AppState, Request};
use crate::report;

fn handle_reports_assemble(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let group_name = required_str(req, "groupName")?;
    reply_as(
        req,
        "report",
        report::assemble_report(conn, &course_id, &group_name),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.assemble" => Some(handle_reports_assemble(state, req).unwrap_or_else(|e| e)),
        _ => None,
    }
}
