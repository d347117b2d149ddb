use crate::error::CoreError;
use crate::import;
use crate::ipc::error::ok;
use crate::ipc::helpers::{core_err, db_conn, parse_param, reply_as, reply_with, required_str, Reply};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, StudentInput};
use serde_json::json;
use std::path::PathBuf;

fn handle_students_list(state: &AppState, req: &Request) -> Reply {
    let Some(conn) = state.db.as_ref() else {
        return Ok(ok(&req.id, json!({ "students": [] })));
    };
    let group_name = required_str(req, "groupName")?;
    reply_as(req, "students", store::list_students_by_group(conn, &group_name))
}

fn handle_students_get(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    reply_as(req, "student", store::get_student(conn, &student_id))
}

fn handle_students_create(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let input: StudentInput = parse_param(req, "student")?;
    reply_as(req, "student", store::create_student(conn, &input))
}

fn handle_students_update(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let input: StudentInput = parse_param(req, "student")?;
    reply_as(req, "student", store::update_student(conn, &student_id, &input))
}

fn handle_students_delete(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    store::delete_student(conn, &student_id).map_err(|e| core_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

/// Accepts either structured `records` or a `path` to a CSV file.
fn handle_students_import(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let records: Vec<StudentInput> = if req.params.get("records").is_some() {
        parse_param(req, "records")?
    } else if let Some(path) = req.params.get("path").and_then(|v| v.as_str()) {
        import::read_import_file(&PathBuf::from(path)).map_err(|e| core_err(&req.id, e))?
    } else {
        return Err(core_err(
            &req.id,
            CoreError::validation("missing records or path"),
        ));
    };
    reply_with(req, store::import_students(conn, &records))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.import" => handle_students_import(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
