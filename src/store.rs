use crate::db::now_timestamp;
use crate::error::{CoreError, CoreResult};
use crate::groups;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

const MAX_GRADE_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub full_name: String,
    pub group_name: String,
    pub record_book_number: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Student fields as supplied by the UI or an import source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    #[serde(default, alias = "full_name")]
    pub full_name: String,
    #[serde(default, alias = "group_name")]
    pub group_name: String,
    #[serde(default, alias = "record_book_number")]
    pub record_book_number: String,
}

impl StudentInput {
    pub fn new(full_name: &str, group_name: &str, record_book_number: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            group_name: group_name.to_string(),
            record_book_number: record_book_number.to_string(),
        }
    }

    fn normalized(&self) -> CoreResult<StudentInput> {
        let out = StudentInput {
            full_name: self.full_name.trim().to_string(),
            group_name: self.group_name.trim().to_string(),
            record_book_number: self.record_book_number.trim().to_string(),
        };
        if out.full_name.is_empty() {
            return Err(CoreError::validation("full name must not be empty"));
        }
        if out.group_name.is_empty() {
            return Err(CoreError::validation("group name must not be empty"));
        }
        if out.record_book_number.is_empty() {
            return Err(CoreError::validation(
                "record book number must not be empty",
            ));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub semester: String,
    pub lesson_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub semester: String,
}

impl CourseInput {
    #[cfg(test)]
    pub fn new(name: &str, semester: &str) -> Self {
        Self {
            name: name.to_string(),
            semester: semester.to_string(),
        }
    }

    fn normalized(&self) -> CoreResult<CourseInput> {
        let out = CourseInput {
            name: self.name.trim().to_string(),
            semester: self.semester.trim().to_string(),
        };
        if out.name.is_empty() {
            return Err(CoreError::validation("course name must not be empty"));
        }
        if out.semester.is_empty() {
            return Err(CoreError::validation("semester must not be empty"));
        }
        Ok(out)
    }
}

/// Lesson kind. Stored as a free-form tag; the known kinds get their own
/// variants and anything else is carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonType {
    Lecture,
    Practice,
    Seminar,
    Test,
    Exam,
    Other(String),
}

impl LessonType {
    pub fn from_tag(raw: &str) -> Self {
        let t = raw.trim().to_lowercase();
        match t.as_str() {
            "" | "lecture" => LessonType::Lecture,
            "practice" => LessonType::Practice,
            "seminar" => LessonType::Seminar,
            "test" => LessonType::Test,
            "exam" => LessonType::Exam,
            _ => LessonType::Other(t),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LessonType::Lecture => "lecture",
            LessonType::Practice => "practice",
            LessonType::Seminar => "seminar",
            LessonType::Test => "test",
            LessonType::Exam => "exam",
            LessonType::Other(tag) => tag.as_str(),
        }
    }
}

impl Serialize for LessonType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub course_id: String,
    pub date: String,
    pub topic: String,
    pub homework: Option<String>,
    pub homework_deadline: Option<String>,
    #[serde(rename = "type")]
    pub lesson_type: LessonType,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonInput {
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub homework: Option<String>,
    #[serde(default)]
    pub homework_deadline: Option<String>,
    #[serde(default, rename = "type")]
    pub lesson_type: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

struct LessonFields {
    date: String,
    topic: String,
    homework: Option<String>,
    homework_deadline: Option<String>,
    lesson_type: LessonType,
    weight: f64,
}

impl LessonInput {
    #[cfg(test)]
    pub fn on(course_id: &str, date: &str) -> Self {
        Self {
            course_id: Some(course_id.to_string()),
            date: date.to_string(),
            ..Self::default()
        }
    }

    fn validated(&self) -> CoreResult<LessonFields> {
        let date = parse_iso_date("date", &self.date)?;
        let homework_deadline = match trimmed_opt(self.homework_deadline.as_deref()) {
            Some(d) => Some(parse_iso_date("homework deadline", &d)?),
            None => None,
        };
        let weight = match self.weight {
            None => 1.0,
            Some(w) if w.is_finite() && w > 0.0 => w,
            Some(w) => {
                return Err(CoreError::validation(format!(
                    "lesson weight must be a positive number, got {}",
                    w
                )))
            }
        };
        Ok(LessonFields {
            date,
            topic: trimmed_opt(self.topic.as_deref()).unwrap_or_default(),
            homework: trimmed_opt(self.homework.as_deref()),
            homework_deadline,
            lesson_type: LessonType::from_tag(self.lesson_type.as_deref().unwrap_or("")),
            weight,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceStatus {
    Present,
    Excused,
    Absent,
}

impl AttendanceStatus {
    pub fn code(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "п",
            AttendanceStatus::Excused => "у",
            AttendanceStatus::Absent => "н",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "п" => Some(AttendanceStatus::Present),
            "у" => Some(AttendanceStatus::Excused),
            "н" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }

    /// Accepts the stored codes as well as their English names.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let t = raw.trim().to_lowercase();
        if let Some(s) = Self::from_code(&t) {
            return Ok(s);
        }
        match t.as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "excused" => Ok(AttendanceStatus::Excused),
            "absent" => Ok(AttendanceStatus::Absent),
            _ => Err(CoreError::validation(format!(
                "attendance status must be one of п, у, н; got {:?}",
                raw
            ))),
        }
    }

    fn from_stored(code: &str) -> Self {
        Self::from_code(code).unwrap_or(AttendanceStatus::Absent)
    }
}

impl Serialize for AttendanceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub student_id: String,
    pub student_name: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRow {
    pub student_id: String,
    pub student_name: String,
    pub grade: String,
}

fn trimmed_opt(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_iso_date(field: &str, raw: &str) -> CoreResult<String> {
    let t = raw.trim();
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| CoreError::validation(format!("{} must be YYYY-MM-DD, got {:?}", field, raw)))
}

fn row_exists(conn: &Connection, sql: &str, id: &str) -> CoreResult<bool> {
    Ok(conn
        .query_row(sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

pub(crate) fn require_student(conn: &Connection, student_id: &str) -> CoreResult<()> {
    if row_exists(conn, "SELECT 1 FROM students WHERE id = ?", student_id)? {
        Ok(())
    } else {
        Err(CoreError::not_found("student not found"))
    }
}

pub(crate) fn require_course(conn: &Connection, course_id: &str) -> CoreResult<()> {
    if row_exists(conn, "SELECT 1 FROM courses WHERE id = ?", course_id)? {
        Ok(())
    } else {
        Err(CoreError::not_found("course not found"))
    }
}

pub(crate) fn require_lesson(conn: &Connection, lesson_id: &str) -> CoreResult<()> {
    if row_exists(conn, "SELECT 1 FROM lessons WHERE id = ?", lesson_id)? {
        Ok(())
    } else {
        Err(CoreError::not_found("lesson not found"))
    }
}

// ---------------------------------------------------------------------------
// Students
// ---------------------------------------------------------------------------

const STUDENT_SELECT: &str = "SELECT s.id, s.full_name, g.name, s.record_book_number, s.created_at, s.updated_at
     FROM students s
     JOIN student_groups g ON g.id = s.group_id";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        full_name: r.get(1)?,
        group_name: r.get(2)?,
        record_book_number: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

/// Students of a group ordered by full name. An unknown group has no students.
pub fn list_students_by_group(conn: &Connection, group_name: &str) -> CoreResult<Vec<Student>> {
    let sql = format!(
        "{} WHERE g.name = ? ORDER BY s.full_name, s.record_book_number",
        STUDENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([group_name.trim()], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, student_id: &str) -> CoreResult<Student> {
    let sql = format!("{} WHERE s.id = ?", STUDENT_SELECT);
    conn.query_row(&sql, [student_id], student_from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found("student not found"))
}

fn record_book_owner(conn: &Connection, record_book_number: &str) -> CoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM students WHERE record_book_number = ?",
            [record_book_number],
            |r| r.get(0),
        )
        .optional()?)
}

fn insert_student(conn: &Connection, input: &StudentInput) -> CoreResult<String> {
    let group_id = groups::ensure_group(conn, &input.group_name)?;
    let id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO students(id, full_name, group_id, record_book_number, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &input.full_name,
            &group_id,
            &input.record_book_number,
            &now,
            &now,
        ),
    )?;
    Ok(id)
}

fn write_student_identity(conn: &Connection, student_id: &str, input: &StudentInput) -> CoreResult<()> {
    let group_id = groups::ensure_group(conn, &input.group_name)?;
    conn.execute(
        "UPDATE students
         SET full_name = ?, group_id = ?, record_book_number = ?, updated_at = ?
         WHERE id = ?",
        (
            &input.full_name,
            &group_id,
            &input.record_book_number,
            now_timestamp(),
            student_id,
        ),
    )?;
    Ok(())
}

pub fn create_student(conn: &Connection, input: &StudentInput) -> CoreResult<Student> {
    let input = input.normalized()?;
    let tx = conn.unchecked_transaction()?;
    if record_book_owner(&tx, &input.record_book_number)?.is_some() {
        return Err(CoreError::conflict(format!(
            "record book number {} is already assigned",
            input.record_book_number
        )));
    }
    let id = insert_student(&tx, &input)?;
    tx.commit()?;
    log::debug!("created student {} in group {}", id, input.group_name);
    get_student(conn, &id)
}

pub fn update_student(
    conn: &Connection,
    student_id: &str,
    input: &StudentInput,
) -> CoreResult<Student> {
    let input = input.normalized()?;
    let tx = conn.unchecked_transaction()?;
    require_student(&tx, student_id)?;
    if let Some(owner) = record_book_owner(&tx, &input.record_book_number)? {
        if owner != student_id {
            return Err(CoreError::conflict(format!(
                "record book number {} is already assigned",
                input.record_book_number
            )));
        }
    }
    write_student_identity(&tx, student_id, &input)?;
    tx.commit()?;
    get_student(conn, student_id)
}

/// Removes a student together with every attendance and grade fact that
/// references it.
pub fn delete_student(conn: &Connection, student_id: &str) -> CoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    require_student(&tx, student_id)?;
    tx.execute("DELETE FROM attendance WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM grades WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    tx.commit()?;
    log::debug!("deleted student {}", student_id);
    Ok(())
}

/// Reconciles a batch of student records by record book number: matching
/// students get their name and group overwritten, the rest are inserted.
/// Incomplete records are skipped. The whole batch is one transaction.
pub fn import_students(conn: &Connection, records: &[StudentInput]) -> CoreResult<ImportSummary> {
    let rows: Vec<StudentInput> = records
        .iter()
        .filter_map(|r| r.normalized().ok())
        .collect();
    if rows.is_empty() {
        return Err(CoreError::format("no complete student records to import"));
    }

    let tx = conn.unchecked_transaction()?;
    let mut imported = 0;
    let mut updated = 0;
    for row in &rows {
        match record_book_owner(&tx, &row.record_book_number)? {
            Some(existing) => {
                write_student_identity(&tx, &existing, row)?;
                updated += 1;
            }
            None => {
                insert_student(&tx, row)?;
                imported += 1;
            }
        }
    }
    tx.commit()?;

    log::info!(
        "student import: {} new, {} updated, {} total",
        imported,
        updated,
        rows.len()
    );
    Ok(ImportSummary {
        imported,
        updated,
        total: rows.len(),
    })
}

// ---------------------------------------------------------------------------
// Courses
// ---------------------------------------------------------------------------

const COURSE_SELECT: &str = "SELECT c.id, c.name, c.semester,
       (SELECT COUNT(*) FROM lessons l WHERE l.course_id = c.id) AS lesson_count,
       c.created_at, c.updated_at
     FROM courses c";

fn course_from_row(r: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: r.get(0)?,
        name: r.get(1)?,
        semester: r.get(2)?,
        lesson_count: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

pub fn list_courses(conn: &Connection) -> CoreResult<Vec<Course>> {
    let sql = format!("{} ORDER BY c.name, c.semester", COURSE_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_course(conn: &Connection, course_id: &str) -> CoreResult<Course> {
    let sql = format!("{} WHERE c.id = ?", COURSE_SELECT);
    conn.query_row(&sql, [course_id], course_from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found("course not found"))
}

fn course_owner(conn: &Connection, input: &CourseInput) -> CoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM courses WHERE name = ? AND semester = ?",
            (&input.name, &input.semester),
            |r| r.get(0),
        )
        .optional()?)
}

pub fn create_course(conn: &Connection, input: &CourseInput) -> CoreResult<Course> {
    let input = input.normalized()?;
    if course_owner(conn, &input)?.is_some() {
        return Err(CoreError::conflict(format!(
            "course {} ({}) already exists",
            input.name, input.semester
        )));
    }
    let id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO courses(id, name, semester, created_at, updated_at) VALUES(?, ?, ?, ?, ?)",
        (&id, &input.name, &input.semester, &now, &now),
    )?;
    get_course(conn, &id)
}

pub fn update_course(conn: &Connection, course_id: &str, input: &CourseInput) -> CoreResult<Course> {
    let input = input.normalized()?;
    require_course(conn, course_id)?;
    if let Some(owner) = course_owner(conn, &input)? {
        if owner != course_id {
            return Err(CoreError::conflict(format!(
                "course {} ({}) already exists",
                input.name, input.semester
            )));
        }
    }
    conn.execute(
        "UPDATE courses SET name = ?, semester = ?, updated_at = ? WHERE id = ?",
        (&input.name, &input.semester, now_timestamp(), course_id),
    )?;
    get_course(conn, course_id)
}

/// Removes a course, its lessons and every fact recorded against those lessons.
pub fn delete_course(conn: &Connection, course_id: &str) -> CoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    require_course(&tx, course_id)?;
    tx.execute(
        "DELETE FROM attendance
         WHERE lesson_id IN (SELECT id FROM lessons WHERE course_id = ?)",
        [course_id],
    )?;
    tx.execute(
        "DELETE FROM grades
         WHERE lesson_id IN (SELECT id FROM lessons WHERE course_id = ?)",
        [course_id],
    )?;
    tx.execute("DELETE FROM lessons WHERE course_id = ?", [course_id])?;
    tx.execute("DELETE FROM courses WHERE id = ?", [course_id])?;
    tx.commit()?;
    log::debug!("deleted course {}", course_id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Lessons
// ---------------------------------------------------------------------------

const LESSON_SELECT: &str = "SELECT id, course_id, date, topic, homework, homework_deadline, lesson_type, weight
     FROM lessons";

fn lesson_from_row(r: &Row<'_>) -> rusqlite::Result<Lesson> {
    let lesson_type: String = r.get(6)?;
    Ok(Lesson {
        id: r.get(0)?,
        course_id: r.get(1)?,
        date: r.get(2)?,
        topic: r.get(3)?,
        homework: r.get(4)?,
        homework_deadline: r.get(5)?,
        lesson_type: LessonType::from_tag(&lesson_type),
        weight: r.get(7)?,
    })
}

/// Lessons of a course by date; lessons sharing a date keep creation order.
pub fn list_lessons(conn: &Connection, course_id: &str) -> CoreResult<Vec<Lesson>> {
    require_course(conn, course_id)?;
    let sql = format!("{} WHERE course_id = ? ORDER BY date, rowid", LESSON_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([course_id], lesson_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_lesson(conn: &Connection, lesson_id: &str) -> CoreResult<Lesson> {
    let sql = format!("{} WHERE id = ?", LESSON_SELECT);
    conn.query_row(&sql, [lesson_id], lesson_from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found("lesson not found"))
}

pub fn create_lesson(conn: &Connection, input: &LessonInput) -> CoreResult<Lesson> {
    let Some(course_id) = trimmed_opt(input.course_id.as_deref()) else {
        return Err(CoreError::validation("lesson requires a course id"));
    };
    let fields = input.validated()?;
    require_course(conn, &course_id)?;

    let id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO lessons(id, course_id, date, topic, homework, homework_deadline, lesson_type, weight, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &course_id,
            &fields.date,
            &fields.topic,
            &fields.homework,
            &fields.homework_deadline,
            fields.lesson_type.as_str(),
            fields.weight,
            &now,
            &now,
        ),
    )?;
    get_lesson(conn, &id)
}

/// Rewrites a lesson's attributes. The owning course never changes.
pub fn update_lesson(conn: &Connection, lesson_id: &str, input: &LessonInput) -> CoreResult<Lesson> {
    let fields = input.validated()?;
    require_lesson(conn, lesson_id)?;
    conn.execute(
        "UPDATE lessons
         SET date = ?, topic = ?, homework = ?, homework_deadline = ?, lesson_type = ?, weight = ?, updated_at = ?
         WHERE id = ?",
        (
            &fields.date,
            &fields.topic,
            &fields.homework,
            &fields.homework_deadline,
            fields.lesson_type.as_str(),
            fields.weight,
            now_timestamp(),
            lesson_id,
        ),
    )?;
    get_lesson(conn, lesson_id)
}

pub fn delete_lesson(conn: &Connection, lesson_id: &str) -> CoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    require_lesson(&tx, lesson_id)?;
    tx.execute("DELETE FROM attendance WHERE lesson_id = ?", [lesson_id])?;
    tx.execute("DELETE FROM grades WHERE lesson_id = ?", [lesson_id])?;
    tx.execute("DELETE FROM lessons WHERE id = ?", [lesson_id])?;
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// Attendance of every student in a group for one lesson. Students without a
/// recorded fact are reported absent.
pub fn get_attendance(
    conn: &Connection,
    lesson_id: &str,
    group_name: &str,
) -> CoreResult<Vec<AttendanceRow>> {
    require_lesson(conn, lesson_id)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.full_name, a.status
         FROM students s
         JOIN student_groups g ON g.id = s.group_id
         LEFT JOIN attendance a ON a.student_id = s.id AND a.lesson_id = ?
         WHERE g.name = ?
         ORDER BY s.full_name, s.record_book_number",
    )?;
    let rows = stmt
        .query_map((lesson_id, group_name.trim()), |r| {
            let status: Option<String> = r.get(2)?;
            Ok(AttendanceRow {
                student_id: r.get(0)?,
                student_name: r.get(1)?,
                status: status
                    .as_deref()
                    .map(AttendanceStatus::from_stored)
                    .unwrap_or(AttendanceStatus::Absent),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn upsert_attendance(
    conn: &Connection,
    student_id: &str,
    lesson_id: &str,
    status: AttendanceStatus,
) -> CoreResult<()> {
    require_student(conn, student_id)?;
    require_lesson(conn, lesson_id)?;
    conn.execute(
        "INSERT INTO attendance(id, student_id, lesson_id, status)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, lesson_id) DO UPDATE SET status = excluded.status",
        (
            Uuid::new_v4().to_string(),
            student_id,
            lesson_id,
            status.code(),
        ),
    )?;
    Ok(())
}

/// Grades of every student in a group for one lesson; empty string where no
/// grade has been recorded.
pub fn get_grades(conn: &Connection, lesson_id: &str, group_name: &str) -> CoreResult<Vec<GradeRow>> {
    require_lesson(conn, lesson_id)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.full_name, gr.value
         FROM students s
         JOIN student_groups g ON g.id = s.group_id
         LEFT JOIN grades gr ON gr.student_id = s.id AND gr.lesson_id = ?
         WHERE g.name = ?
         ORDER BY s.full_name, s.record_book_number",
    )?;
    let rows = stmt
        .query_map((lesson_id, group_name.trim()), |r| {
            let value: Option<String> = r.get(2)?;
            Ok(GradeRow {
                student_id: r.get(0)?,
                student_name: r.get(1)?,
                grade: value.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn upsert_grade(conn: &Connection, student_id: &str, lesson_id: &str, value: &str) -> CoreResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::validation("grade value must not be empty"));
    }
    if value.chars().count() > MAX_GRADE_LEN {
        return Err(CoreError::validation(format!(
            "grade value must be at most {} characters",
            MAX_GRADE_LEN
        )));
    }
    require_student(conn, student_id)?;
    require_lesson(conn, lesson_id)?;
    conn.execute(
        "INSERT INTO grades(id, student_id, lesson_id, value)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, lesson_id) DO UPDATE SET value = excluded.value",
        (Uuid::new_v4().to_string(), student_id, lesson_id, value),
    )?;
    Ok(())
}
