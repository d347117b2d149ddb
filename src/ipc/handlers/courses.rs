use crate::ipc::error::ok;
use crate::ipc::helpers::{core_err, db_conn, parse_param, reply_as, required_str, Reply};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, CourseInput};
use serde_json::json;

fn handle_courses_list(state: &AppState, req: &Request) -> Reply {
    let Some(conn) = state.db.as_ref() else {
        return Ok(ok(&req.id, json!({ "courses": [] })));
    };
    reply_as(req, "courses", store::list_courses(conn))
}

fn handle_courses_create(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let input: CourseInput = parse_param(req, "course")?;
    reply_as(req, "course", store::create_course(conn, &input))
}

fn handle_courses_update(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let input: CourseInput = parse_param(req, "course")?;
    reply_as(req, "course", store::update_course(conn, &course_id, &input))
}

fn handle_courses_delete(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    store::delete_course(conn, &course_id).map_err(|e| core_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "courses.list" => handle_courses_list(state, req),
        "courses.create" => handle_courses_create(state, req),
        "courses.update" => handle_courses_update(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
