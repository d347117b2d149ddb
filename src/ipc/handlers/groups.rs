use crate::groups;
use crate::ipc::error::ok;
use crate::ipc::helpers::{core_err, db_conn, optional_str, reply_as, required_str, Reply};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_groups_list(state: &AppState, req: &Request) -> Reply {
    let Some(conn) = state.db.as_ref() else {
        return Ok(ok(&req.id, json!({ "groups": [] })));
    };
    let course_id = optional_str(req, "courseId");
    reply_as(req, "groups", groups::list_group_names(conn, course_id.as_deref()))
}

fn handle_groups_list_with_counts(state: &AppState, req: &Request) -> Reply {
    let Some(conn) = state.db.as_ref() else {
        return Ok(ok(&req.id, json!({ "groups": [] })));
    };
    reply_as(req, "groups", groups::list_groups_with_counts(conn))
}

fn handle_groups_create(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let name = required_str(req, "name")?;
    reply_as(req, "group", groups::create_group(conn, &name))
}

fn handle_groups_rename(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let old_name = required_str(req, "oldName")?;
    let new_name = required_str(req, "newName")?;
    reply_as(req, "group", groups::rename_group(conn, &old_name, &new_name))
}

fn handle_groups_delete(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let name = required_str(req, "name")?;
    let removed = groups::delete_group(conn, &name).map_err(|e| core_err(&req.id, e))?;
    Ok(ok(&req.id, json!({ "removedStudents": removed })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "groups.list" => handle_groups_list(state, req),
        "groups.listWithCounts" => handle_groups_list_with_counts(state, req),
        "groups.create" => handle_groups_create(state, req),
        "groups.rename" => handle_groups_rename(state, req),
        "groups.delete" => handle_groups_delete(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
