use crate::ipc::error::ok;
use crate::ipc::helpers::{core_err, db_conn, parse_param, reply_as, required_str, Reply};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, LessonInput};
use serde_json::json;

fn handle_lessons_list(state: &AppState, req: &Request) -> Reply {
    let Some(conn) = state.db.as_ref() else {
        return Ok(ok(&req.id, json!({ "lessons": [] })));
    };
    let course_id = required_str(req, "courseId")?;
    reply_as(req, "lessons", store::list_lessons(conn, &course_id))
}

fn handle_lessons_get(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    reply_as(req, "lesson", store::get_lesson(conn, &lesson_id))
}

fn handle_lessons_create(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let input: LessonInput = parse_param(req, "lesson")?;
    reply_as(req, "lesson", store::create_lesson(conn, &input))
}

fn handle_lessons_update(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    let input: LessonInput = parse_param(req, "lesson")?;
    reply_as(req, "lesson", store::update_lesson(conn, &lesson_id, &input))
}

fn handle_lessons_delete(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let lesson_id = required_str(req, "lessonId")?;
    store::delete_lesson(conn, &lesson_id).map_err(|e| core_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "ok": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "lessons.list" => handle_lessons_list(state, req),
        "lessons.get" => handle_lessons_get(state, req),
        "lessons.create" => handle_lessons_create(state, req),
        "lessons.update" => handle_lessons_update(state, req),
        "lessons.delete" => handle_lessons_delete(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
