use crate::calc::{self, GradePoint};
use crate::error::{CoreError, CoreResult};
use crate::groups;
use crate::store::{self, AttendanceStatus};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCourse {
    pub id: String,
    pub name: String,
    pub semester: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLesson {
    pub id: String,
    pub date: String,
    pub topic: String,
}

/// One student line of a course report. Only lessons with a recorded fact
/// appear in `grades` / `attendance`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStudent {
    pub student_id: String,
    pub full_name: String,
    pub record_book_number: String,
    pub grades: BTreeMap<String, String>,
    pub attendance: BTreeMap<String, AttendanceStatus>,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub course: ReportCourse,
    pub group_name: String,
    pub lessons: Vec<ReportLesson>,
    pub students: Vec<ReportStudent>,
}

struct FactRow {
    student_id: String,
    lesson_id: String,
    value: String,
}

fn group_facts(
    conn: &Connection,
    table: &str,
    value_column: &str,
    course_id: &str,
    group_id: &str,
) -> CoreResult<Vec<FactRow>> {
    let sql = format!(
        "SELECT f.student_id, f.lesson_id, f.{value_column}
         FROM {table} f
         JOIN lessons l ON l.id = f.lesson_id
         JOIN students s ON s.id = f.student_id
         WHERE l.course_id = ? AND s.group_id = ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((course_id, group_id), |r| {
            Ok(FactRow {
                student_id: r.get(0)?,
                lesson_id: r.get(1)?,
                value: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Joins a group's students with a course's lessons, grades and attendance
/// into the structure consumed by the exporters.
pub fn assemble_report(conn: &Connection, course_id: &str, group_name: &str) -> CoreResult<ReportData> {
    let course = store::get_course(conn, course_id)?;
    let group_name = group_name.trim();
    let Some(group_id) = groups::group_id_by_name(conn, group_name)? else {
        return Err(CoreError::not_found(format!("group {} not found", group_name)));
    };

    let lessons = store::list_lessons(conn, course_id)?;
    let lesson_index: HashMap<&str, &store::Lesson> =
        lessons.iter().map(|l| (l.id.as_str(), l)).collect();

    let mut grades: HashMap<String, BTreeMap<String, String>> = HashMap::new();
    for f in group_facts(conn, "grades", "value", course_id, &group_id)? {
        grades.entry(f.student_id).or_default().insert(f.lesson_id, f.value);
    }
    let mut attendance: HashMap<String, BTreeMap<String, AttendanceStatus>> = HashMap::new();
    for f in group_facts(conn, "attendance", "status", course_id, &group_id)? {
        if let Some(status) = AttendanceStatus::from_code(&f.value) {
            attendance.entry(f.student_id).or_default().insert(f.lesson_id, status);
        }
    }

    let students = store::list_students_by_group(conn, group_name)?
        .into_iter()
        .map(|s| {
            let student_grades = grades.remove(&s.id).unwrap_or_default();
            let points: Vec<GradePoint> = student_grades
                .iter()
                .filter_map(|(lesson_id, value)| {
                    lesson_index.get(lesson_id.as_str()).map(|l| {
                        GradePoint::new(lesson_id, value, Some(l.weight))
                    })
                })
                .collect();
            ReportStudent {
                average: calc::weighted_mean(&points),
                attendance: attendance.remove(&s.id).unwrap_or_default(),
                grades: student_grades,
                student_id: s.id,
                full_name: s.full_name,
                record_book_number: s.record_book_number,
            }
        })
        .collect();

    Ok(ReportData {
        course: ReportCourse {
            id: course.id,
            name: course.name,
            semester: course.semester,
        },
        group_name: group_name.to_string(),
        lessons: lessons
            .iter()
            .map(|l| ReportLesson {
                id: l.id.clone(),
                date: l.date.clone(),
                topic: l.topic.clone(),
            })
            .collect(),
        students,
    })
}
