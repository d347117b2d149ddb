use crate::error::CoreResult;
use crate::store;
use rusqlite::Connection;

/// A grade cell read as a number. Grades are free text: the leading decimal
/// (with `.` or `,` as separator) is taken, so `"5-"` reads as 5. A cell that
/// does not start with a number stays `Invalid` and is left out of every
/// calculation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNumeric {
    Valid(f64),
    Invalid(String),
}

impl ParsedNumeric {
    pub fn parse(raw: &str) -> Self {
        let t = raw.trim().replace(',', ".");
        let prefix = &t[..leading_decimal_len(&t)];
        match prefix.parse::<f64>() {
            Ok(v) if v.is_finite() => ParsedNumeric::Valid(v),
            _ => ParsedNumeric::Invalid(raw.to_string()),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            ParsedNumeric::Valid(v) => Some(*v),
            ParsedNumeric::Invalid(_) => None,
        }
    }
}

/// Byte length of the longest prefix of `s` shaped like
/// `[+-]digits[.digits][e[+-]digits]`. Zero when no digit is found.
fn leading_decimal_len(s: &str) -> usize {
    let b = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let int_end = digits_from(i);
    let mut end = int_end;
    let mut seen_digit = int_end > i;
    if end < b.len() && b[end] == b'.' {
        let frac_end = digits_from(end + 1);
        if frac_end > end + 1 || seen_digit {
            seen_digit |= frac_end > end + 1;
            end = frac_end;
        }
    }
    if !seen_digit {
        return 0;
    }
    if end < b.len() && (b[end] == b'e' || b[end] == b'E') {
        let mut j = end + 1;
        if j < b.len() && (b[j] == b'+' || b[j] == b'-') {
            j += 1;
        }
        let exp_end = digits_from(j);
        if exp_end > j {
            end = exp_end;
        }
    }
    end
}

pub fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

/// Lesson weight used for averaging; missing or non-positive weights count as 1.
pub fn effective_weight(raw: Option<f64>) -> f64 {
    match raw {
        Some(w) if w.is_finite() && w > 0.0 => w,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradePoint {
    pub lesson_id: String,
    pub value: ParsedNumeric,
    pub weight: f64,
}

impl GradePoint {
    pub fn new(lesson_id: &str, raw: &str, weight: Option<f64>) -> Self {
        Self {
            lesson_id: lesson_id.to_string(),
            value: ParsedNumeric::parse(raw),
            weight: effective_weight(weight),
        }
    }
}

/// `Σ(value·weight) / Σ(weight)` over the parseable grades, rounded to two
/// decimals. `None` when no grade parses.
pub fn weighted_mean(points: &[GradePoint]) -> Option<f64> {
    let (sum, total_weight) = points
        .iter()
        .filter_map(|p| p.value.value().map(|v| (v, p.weight)))
        .fold((0.0, 0.0), |(s, w), (v, weight)| (s + v * weight, w + weight));
    if total_weight <= 0.0 {
        return None;
    }
    Some(round_to(sum / total_weight, 2))
}

/// Parseable values in the order the points are given.
pub fn valid_values(points: &[GradePoint]) -> Vec<f64> {
    points.iter().filter_map(|p| p.value.value()).collect()
}

/// Ordinary least-squares slope of `values` against their index 0..n.
/// Fewer than two values have no slope and yield 0.
pub fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }
    let n = n as f64;
    let denom = n * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

/// Every grade a student holds in a course, ordered by lesson date.
pub fn course_grade_points(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> CoreResult<Vec<GradePoint>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.weight, g.value
         FROM grades g
         JOIN lessons l ON l.id = g.lesson_id
         WHERE g.student_id = ? AND l.course_id = ?
         ORDER BY l.date, l.rowid",
    )?;
    let points = stmt
        .query_map((student_id, course_id), |r| {
            let lesson_id: String = r.get(0)?;
            let weight: Option<f64> = r.get(1)?;
            let value: String = r.get(2)?;
            Ok(GradePoint::new(&lesson_id, &value, weight))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(points)
}

pub fn weighted_average(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> CoreResult<Option<f64>> {
    store::require_student(conn, student_id)?;
    store::require_course(conn, course_id)?;
    let points = course_grade_points(conn, student_id, course_id)?;
    Ok(weighted_mean(&points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::store::tests::{course, fresh, lesson, student};

    fn points(values: &[(&str, f64)]) -> Vec<GradePoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, (v, w))| GradePoint::new(&format!("l{}", i), v, Some(*w)))
            .collect()
    }

    #[test]
    fn parse_accepts_comma_and_rejects_markers() {
        assert_eq!(ParsedNumeric::parse("4,5"), ParsedNumeric::Valid(4.5));
        assert_eq!(ParsedNumeric::parse(" 3.25 "), ParsedNumeric::Valid(3.25));
        assert_eq!(ParsedNumeric::parse("зач"), ParsedNumeric::Invalid("зач".into()));
        assert_eq!(ParsedNumeric::parse(""), ParsedNumeric::Invalid("".into()));
        assert!(ParsedNumeric::parse("NaN").value().is_none());
    }

    #[test]
    fn parse_reads_the_leading_number_of_marked_grades() {
        assert_eq!(ParsedNumeric::parse("4+"), ParsedNumeric::Valid(4.0));
        assert_eq!(ParsedNumeric::parse("5-"), ParsedNumeric::Valid(5.0));
        assert_eq!(ParsedNumeric::parse("5/5"), ParsedNumeric::Valid(5.0));
        assert_eq!(ParsedNumeric::parse("3,5 (retake)"), ParsedNumeric::Valid(3.5));
        assert_eq!(ParsedNumeric::parse(".5"), ParsedNumeric::Valid(0.5));
        assert_eq!(ParsedNumeric::parse("4."), ParsedNumeric::Valid(4.0));
        assert_eq!(ParsedNumeric::parse("2e"), ParsedNumeric::Valid(2.0));
        assert_eq!(ParsedNumeric::parse("-"), ParsedNumeric::Invalid("-".into()));
        assert_eq!(ParsedNumeric::parse("."), ParsedNumeric::Invalid(".".into()));
        assert_eq!(ParsedNumeric::parse("н/а"), ParsedNumeric::Invalid("н/а".into()));
        assert!(ParsedNumeric::parse("inf").value().is_none());
    }

    #[test]
    fn marked_grades_count_towards_the_mean() {
        let p = points(&[("5-", 1.0), ("4+", 1.0)]);
        assert_eq!(weighted_mean(&p), Some(4.5));
    }

    #[test]
    fn weighted_mean_matches_hand_computation() {
        let p = points(&[("4", 1.0), ("5", 1.0), ("3", 2.0)]);
        assert_eq!(weighted_mean(&p), Some(3.75));
    }

    #[test]
    fn weighted_mean_ignores_order_and_unparseable_values() {
        let a = points(&[("4", 1.0), ("н/а", 3.0), ("5", 1.5), ("2,5", 2.0)]);
        let b = points(&[("2,5", 2.0), ("5", 1.5), ("4", 1.0), ("н/а", 3.0)]);
        assert_eq!(weighted_mean(&a), weighted_mean(&b));
        assert_eq!(weighted_mean(&a), Some(3.67));
    }

    #[test]
    fn weighted_mean_of_nothing_is_none_not_zero() {
        assert_eq!(weighted_mean(&[]), None);
        assert_eq!(weighted_mean(&points(&[("-", 1.0)])), None);
        assert_eq!(weighted_mean(&points(&[("0", 1.0)])), Some(0.0));
    }

    #[test]
    fn invalid_weights_fall_back_to_one() {
        assert_eq!(effective_weight(None), 1.0);
        assert_eq!(effective_weight(Some(0.0)), 1.0);
        assert_eq!(effective_weight(Some(f64::NAN)), 1.0);
        assert_eq!(effective_weight(Some(2.5)), 2.5);
    }

    #[test]
    fn slope_uses_sequence_index() {
        assert_eq!(least_squares_slope(&[]), 0.0);
        assert_eq!(least_squares_slope(&[4.0]), 0.0);
        assert_eq!(least_squares_slope(&[3.0, 5.0]), 2.0);
        assert_eq!(least_squares_slope(&[5.0, 4.0, 3.0]), -1.0);
        assert_eq!(least_squares_slope(&[4.0, 4.0, 4.0, 4.0]), 0.0);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(3.14159, 2), 3.14);
        assert_eq!(round_to(66.666, 1), 66.7);
        assert_eq!(round_to(-0.125, 2), -0.13);
    }

    #[test]
    fn weighted_average_reads_only_the_course() {
        let conn = fresh();
        let s = student(&conn, "A", "G", "1");
        let c = course(&conn, "Algebra");
        let other = course(&conn, "Geometry");
        let l1 = lesson(&conn, &c.id, "2023-09-01", 1.0);
        let l2 = lesson(&conn, &c.id, "2023-09-08", 1.0);
        let l3 = lesson(&conn, &c.id, "2023-09-15", 2.0);
        let lx = lesson(&conn, &other.id, "2023-09-01", 1.0);

        assert_eq!(weighted_average(&conn, &s.id, &c.id).expect("avg"), None);

        store::upsert_grade(&conn, &s.id, &l1.id, "4").expect("g");
        store::upsert_grade(&conn, &s.id, &l2.id, "5").expect("g");
        store::upsert_grade(&conn, &s.id, &l3.id, "3").expect("g");
        store::upsert_grade(&conn, &s.id, &lx.id, "2").expect("g");

        assert_eq!(weighted_average(&conn, &s.id, &c.id).expect("avg"), Some(3.75));
        assert_eq!(weighted_average(&conn, &s.id, &other.id).expect("avg"), Some(2.0));
        assert!(matches!(
            weighted_average(&conn, "ghost", &c.id),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn grade_points_follow_lesson_dates() {
        let conn = fresh();
        let s = student(&conn, "A", "G", "1");
        let c = course(&conn, "Algebra");
        let late = lesson(&conn, &c.id, "2023-10-01", 1.0);
        let early = lesson(&conn, &c.id, "2023-09-01", 1.0);
        store::upsert_grade(&conn, &s.id, &late.id, "5").expect("g");
        store::upsert_grade(&conn, &s.id, &early.id, "3").expect("g");
        let p = course_grade_points(&conn, &s.id, &c.id).expect("points");
        assert_eq!(valid_values(&p), vec![3.0, 5.0]);
        assert_eq!(p[0].lesson_id, early.id);
    }
}
