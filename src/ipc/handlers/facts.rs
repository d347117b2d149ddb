use crate::ipc::error::ok;
use crate::ipc::helpers::{core_err, db_conn, reply_as, required_str, Reply};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, AttendanceStatus};
use serde_json::json;

fn handle_attendance_get(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let group_name = required_str(req, "groupName")?;
    reply_as(req, "rows", store::get_attendance(conn, &lesson_id, &group_name))
}

fn handle_attendance_upsert(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let lesson_id = required_str(req, "lessonId")?;
    let raw_status = required_str(req, "status")?;
    let status = AttendanceStatus::parse(&raw_status).map_err(|e| core_err(&req.id, e))?;
    store::upsert_attendance(conn, &student_id, &lesson_id, status)
        .map_err(|e| core_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "status": status })))
}

fn handle_grades_get(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let group_name = required_str(req, "groupName")?;
    reply_as(req, "rows", store::get_grades(conn, &lesson_id, &group_name))
}

fn handle_grades_upsert(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let lesson_id = required_str(req, "lessonId")?;
    let value = required_str(req, "value")?;
    store::upsert_grade(conn, &student_id, &lesson_id, &value)
        .map_err(|e| core_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "value": value.trim() })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "attendance.get" => handle_attendance_get(state, req),
        "attendance.upsert" => handle_attendance_upsert(state, req),
        "grades.get" => handle_grades_get(state, req),
        "grades.upsert" => handle_grades_upsert(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
