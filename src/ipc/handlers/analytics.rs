use crate::calc;
use crate::forecast::{self, ForecastConfig};
use crate::ipc::helpers::{core_err, db_conn, reply_as, reply_with, required_str, Reply};
use crate::ipc::types::{AppState, Request};

fn handle_weighted_average(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let course_id = required_str(req, "courseId")?;
    reply_as(
        req,
        "average",
        calc::weighted_average(conn, &student_id, &course_id),
    )
}

fn handle_forecast(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let course_id = required_str(req, "courseId")?;
    let cfg = ForecastConfig::load(conn).map_err(|e| core_err(&req.id, e))?;
    reply_as(
        req,
        "forecast",
        forecast::forecast(conn, &student_id, &course_id, &cfg),
    )
}

fn handle_attendance_rate(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let course_id = required_str(req, "courseId")?;
    reply_as(
        req,
        "attendanceRate",
        forecast::attendance_rate(conn, &student_id, &course_id),
    )
}

fn handle_group_forecast(state: &AppState, req: &Request) -> Reply {
    let conn = db_conn(state, req)?;
    let course_id = required_str(req, "courseId")?;
    let group_name = required_str(req, "groupName")?;
    let cfg = ForecastConfig::load(conn).map_err(|e| core_err(&req.id, e))?;
    reply_with(
        req,
        forecast::group_forecast(conn, &course_id, &group_name, &cfg),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "analytics.weightedAverage" => handle_weighted_average(state, req),
        "analytics.attendanceRate" => handle_attendance_rate(state, req),
        "analytics.forecast" => handle_forecast(state, req),
        "analytics.groupForecast" => handle_group_forecast(state, req),
        _ => return None,
    };
    Some(res.unwrap_or_else(|e| e))
}
