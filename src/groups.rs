use crate::db::now_timestamp;
use crate::error::{CoreError, CoreResult};
use crate::store;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

const MAX_GROUP_NAME_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub name: String,
    pub student_count: i64,
}

fn normalized_name(raw: &str) -> CoreResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CoreError::validation("group name must not be empty"));
    }
    if name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(CoreError::validation(format!(
            "group name must be at most {} characters",
            MAX_GROUP_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

pub(crate) fn group_id_by_name(conn: &Connection, name: &str) -> CoreResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM student_groups WHERE name = ?",
            [name],
            |r| r.get(0),
        )
        .optional()?)
}

/// Id of the named group, creating the group when it does not exist yet.
pub(crate) fn ensure_group(conn: &Connection, name: &str) -> CoreResult<String> {
    let name = normalized_name(name)?;
    if let Some(id) = group_id_by_name(conn, &name)? {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO student_groups(id, name, created_at) VALUES(?, ?, ?)",
        (&id, &name, now_timestamp()),
    )?;
    log::debug!("created group {}", name);
    Ok(id)
}

fn summary(conn: &Connection, name: &str) -> CoreResult<GroupSummary> {
    let student_count: i64 = conn.query_row(
        "SELECT COUNT(s.id)
         FROM student_groups g
         LEFT JOIN students s ON s.group_id = g.id
         WHERE g.name = ?",
        [name],
        |r| r.get(0),
    )?;
    Ok(GroupSummary {
        name: name.to_string(),
        student_count,
    })
}

/// Group names in lexicographic order.
///
/// Groups are not tied to courses, so a course filter only checks that the
/// course exists and otherwise lists every group.
pub fn list_group_names(conn: &Connection, course_id: Option<&str>) -> CoreResult<Vec<String>> {
    if let Some(course_id) = course_id {
        store::require_course(conn, course_id)?;
    }
    let mut stmt = conn.prepare("SELECT name FROM student_groups ORDER BY name")?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

pub fn list_groups_with_counts(conn: &Connection) -> CoreResult<Vec<GroupSummary>> {
    let mut stmt = conn.prepare(
        "SELECT g.name, (SELECT COUNT(*) FROM students s WHERE s.group_id = g.id)
         FROM student_groups g
         ORDER BY g.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(GroupSummary {
                name: r.get(0)?,
                student_count: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Creates an empty group.
pub fn create_group(conn: &Connection, name: &str) -> CoreResult<GroupSummary> {
    let name = normalized_name(name)?;
    if group_id_by_name(conn, &name)?.is_some() {
        return Err(CoreError::conflict(format!("group {} already exists", name)));
    }
    ensure_group(conn, &name)?;
    summary(conn, &name)
}

/// Renames a group. Students follow automatically since they reference the
/// group row, so the rename is a single statement.
pub fn rename_group(conn: &Connection, old_name: &str, new_name: &str) -> CoreResult<GroupSummary> {
    let old_name = old_name.trim();
    let new_name = normalized_name(new_name)?;
    let Some(group_id) = group_id_by_name(conn, old_name)? else {
        return Err(CoreError::not_found(format!("group {} not found", old_name)));
    };
    if new_name != old_name {
        if group_id_by_name(conn, &new_name)?.is_some() {
            return Err(CoreError::conflict(format!(
                "group {} already exists",
                new_name
            )));
        }
        conn.execute(
            "UPDATE student_groups SET name = ? WHERE id = ?",
            (&new_name, &group_id),
        )?;
        log::debug!("renamed group {} to {}", old_name, new_name);
    }
    summary(conn, &new_name)
}

/// Deletes a group with all of its students and their facts. Deleting a
/// group that does not exist is a no-op. Returns the number of students
/// removed.
pub fn delete_group(conn: &Connection, name: &str) -> CoreResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let Some(group_id) = group_id_by_name(&tx, name.trim())? else {
        return Ok(0);
    };
    tx.execute(
        "DELETE FROM attendance
         WHERE student_id IN (SELECT id FROM students WHERE group_id = ?)",
        [&group_id],
    )?;
    tx.execute(
        "DELETE FROM grades
         WHERE student_id IN (SELECT id FROM students WHERE group_id = ?)",
        [&group_id],
    )?;
    let removed = tx.execute("DELETE FROM students WHERE group_id = ?", [&group_id])?;
    tx.execute("DELETE FROM student_groups WHERE id = ?", [&group_id])?;
    tx.commit()?;
    log::debug!("deleted group {} ({} students)", name.trim(), removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{course, fresh, lesson, student};
    use crate::store::{self, AttendanceStatus};

    fn references_to(conn: &Connection, name: &str) -> i64 {
        conn.query_row(
            "SELECT
               (SELECT COUNT(*) FROM student_groups WHERE name = ?1)
             + (SELECT COUNT(*) FROM students s JOIN student_groups g ON g.id = s.group_id WHERE g.name = ?1)",
            [name],
            |r| r.get(0),
        )
        .expect("count references")
    }

    #[test]
    fn empty_group_is_listed_with_zero_students() {
        let conn = fresh();
        create_group(&conn, " G-201 ").expect("create");
        student(&conn, "A", "G-101", "1");
        student(&conn, "B", "G-101", "2");

        let groups = list_groups_with_counts(&conn).expect("list");
        assert_eq!(
            groups,
            vec![
                GroupSummary {
                    name: "G-101".into(),
                    student_count: 2
                },
                GroupSummary {
                    name: "G-201".into(),
                    student_count: 0
                },
            ]
        );
        assert_eq!(
            list_group_names(&conn, None).expect("names"),
            vec!["G-101", "G-201"]
        );
        assert!(store::list_students_by_group(&conn, "G-201")
            .expect("students")
            .is_empty());
    }

    #[test]
    fn create_group_conflicts_with_existing_name() {
        let conn = fresh();
        student(&conn, "A", "G-101", "1");
        assert!(matches!(create_group(&conn, "G-101"), Err(CoreError::Conflict(_))));
        assert!(matches!(create_group(&conn, "  "), Err(CoreError::Validation(_))));
    }

    #[test]
    fn adding_student_to_empty_group_fills_it() {
        let conn = fresh();
        create_group(&conn, "G-201").expect("create");
        let s = student(&conn, "A", "G-201", "1");
        let students = store::list_students_by_group(&conn, "G-201").expect("students");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, s.id);
        assert_eq!(list_groups_with_counts(&conn).expect("list")[0].student_count, 1);
    }

    #[test]
    fn rename_moves_every_student() {
        let conn = fresh();
        let a = student(&conn, "A", "A", "1");
        student(&conn, "B", "A", "2");
        let renamed = rename_group(&conn, "A", "C").expect("rename");
        assert_eq!(renamed.student_count, 2);
        assert_eq!(store::get_student(&conn, &a.id).expect("student").group_name, "C");
        assert!(store::list_students_by_group(&conn, "A").expect("old").is_empty());
    }

    #[test]
    fn rename_onto_existing_group_conflicts_and_mutates_nothing() {
        let conn = fresh();
        let a = student(&conn, "A", "A", "1");
        let b = student(&conn, "B", "B", "2");
        assert!(matches!(rename_group(&conn, "A", "B"), Err(CoreError::Conflict(_))));
        assert_eq!(store::get_student(&conn, &a.id).expect("a").group_name, "A");
        assert_eq!(store::get_student(&conn, &b.id).expect("b").group_name, "B");
        assert!(matches!(
            rename_group(&conn, "missing", "Z"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn create_then_delete_leaves_no_trace() {
        let conn = fresh();
        create_group(&conn, "Temp").expect("create");
        assert_eq!(delete_group(&conn, "Temp").expect("delete"), 0);
        assert_eq!(references_to(&conn, "Temp"), 0);
        assert_eq!(delete_group(&conn, "Temp").expect("no-op"), 0);
    }

    #[test]
    fn delete_group_cascades_to_students_and_facts() {
        let conn = fresh();
        let s = student(&conn, "A", "G", "1");
        let keep = student(&conn, "B", "H", "2");
        let c = course(&conn, "Algebra");
        let l = lesson(&conn, &c.id, "2023-09-01", 1.0);
        store::upsert_grade(&conn, &s.id, &l.id, "5").expect("grade");
        store::upsert_attendance(&conn, &s.id, &l.id, AttendanceStatus::Present).expect("att");
        store::upsert_grade(&conn, &keep.id, &l.id, "4").expect("grade");

        assert_eq!(delete_group(&conn, "G").expect("delete"), 1);

        let facts: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM grades) + (SELECT COUNT(*) FROM attendance)",
                [],
                |r| r.get(0),
            )
            .expect("facts");
        assert_eq!(facts, 1);
        assert_eq!(references_to(&conn, "G"), 0);
    }

    #[test]
    fn course_filter_requires_existing_course() {
        let conn = fresh();
        let c = course(&conn, "Algebra");
        student(&conn, "A", "G", "1");
        assert_eq!(list_group_names(&conn, Some(&c.id)).expect("names"), vec!["G"]);
        assert!(matches!(
            list_group_names(&conn, Some("ghost")),
            Err(CoreError::NotFound(_))
        ));
    }
}
