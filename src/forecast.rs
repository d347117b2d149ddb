use crate::calc::{self, round_to, GradePoint};
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::groups;
use crate::store;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const CONFIG_KEY: &str = "forecast.config";

/// Thresholds of the forecasting model. The defaults describe a 5-point
/// grading scale where 3 is the lowest passing grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForecastConfig {
    pub scale_min: f64,
    pub scale_max: f64,
    pub passing_grade: f64,
    /// Percent of lessons attended below which attendance counts as low.
    pub attendance_threshold: f64,
    /// Trend below this value counts as a declining performance.
    pub trend_threshold: f64,
    /// How strongly the trend moves the forecast away from the average.
    pub trend_factor: f64,
    /// The trend is clamped to `[-trend_limit, trend_limit]`.
    pub trend_limit: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            scale_min: 2.0,
            scale_max: 5.0,
            passing_grade: 3.0,
            attendance_threshold: 70.0,
            trend_threshold: -0.1,
            trend_factor: 0.5,
            trend_limit: 1.0,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> CoreResult<()> {
        let all = [
            self.scale_min,
            self.scale_max,
            self.passing_grade,
            self.attendance_threshold,
            self.trend_threshold,
            self.trend_factor,
            self.trend_limit,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::validation("forecast settings must be finite numbers"));
        }
        if self.scale_min >= self.scale_max {
            return Err(CoreError::validation("scaleMin must be below scaleMax"));
        }
        if self.passing_grade < self.scale_min || self.passing_grade > self.scale_max {
            return Err(CoreError::validation("passingGrade must lie within the grading scale"));
        }
        if !(0.0..=100.0).contains(&self.attendance_threshold) {
            return Err(CoreError::validation("attendanceThreshold must be between 0 and 100"));
        }
        if self.trend_limit <= 0.0 {
            return Err(CoreError::validation("trendLimit must be positive"));
        }
        Ok(())
    }

    /// Stored configuration, or the defaults when none (or an unusable one) is stored.
    pub fn load(conn: &Connection) -> CoreResult<Self> {
        let Some(raw) = db::settings_get_json(conn, CONFIG_KEY)? else {
            return Ok(Self::default());
        };
        match serde_json::from_value::<ForecastConfig>(raw) {
            Ok(cfg) if cfg.validate().is_ok() => Ok(cfg),
            _ => {
                log::warn!("stored forecast settings are invalid; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, conn: &Connection) -> CoreResult<()> {
        self.validate()?;
        let value = serde_json::to_value(self)
            .map_err(|e| CoreError::validation(format!("forecast settings: {}", e)))?;
        db::settings_set_json(conn, CONFIG_KEY, &value)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escalation {
    ToHigh,
    OneStep,
}

impl RiskLevel {
    fn escalate(self, by: Escalation) -> Self {
        match (by, self) {
            (Escalation::ToHigh, _) => RiskLevel::High,
            (Escalation::OneStep, RiskLevel::Low) => RiskLevel::Medium,
            (Escalation::OneStep, _) => RiskLevel::High,
        }
    }
}

/// Unrounded inputs of the risk rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Indicators {
    pub forecasted_grade: f64,
    pub attendance_rate: f64,
    pub trend: f64,
}

struct RiskRule {
    triggered: fn(&Indicators, &ForecastConfig) -> bool,
    escalation: Escalation,
    reason: &'static str,
}

fn below_passing(ind: &Indicators, cfg: &ForecastConfig) -> bool {
    ind.forecasted_grade < cfg.passing_grade
}

fn low_attendance(ind: &Indicators, cfg: &ForecastConfig) -> bool {
    ind.attendance_rate < cfg.attendance_threshold
}

fn declining(ind: &Indicators, cfg: &ForecastConfig) -> bool {
    ind.trend < cfg.trend_threshold
}

// Order matters: it fixes the order of the reported reasons.
const RISK_RULES: [RiskRule; 3] = [
    RiskRule {
        triggered: below_passing,
        escalation: Escalation::ToHigh,
        reason: "forecasted grade below passing threshold",
    },
    RiskRule {
        triggered: low_attendance,
        escalation: Escalation::OneStep,
        reason: "low attendance",
    },
    RiskRule {
        triggered: declining,
        escalation: Escalation::OneStep,
        reason: "negative performance trend",
    },
];

/// Folds the risk rules over the indicators. The level only ever moves up.
pub fn classify_risk(ind: &Indicators, cfg: &ForecastConfig) -> (RiskLevel, Vec<String>) {
    RISK_RULES
        .iter()
        .filter(|rule| (rule.triggered)(ind, cfg))
        .fold((RiskLevel::Low, Vec::new()), |(level, mut reasons), rule| {
            reasons.push(rule.reason.to_string());
            (level.escalate(rule.escalation), reasons)
        })
}

/// Index-based trend: lessons are treated as equally spaced regardless of
/// the calendar gap between them.
pub fn compute_trend(values: &[f64], limit: f64) -> f64 {
    calc::least_squares_slope(values).clamp(-limit, limit)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub current_average: f64,
    pub forecasted_grade: f64,
    pub trend: f64,
    pub attendance_rate: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
}

/// Builds a forecast from already-loaded facts. `None` when the student has
/// no parseable grade in the course.
pub fn forecast_from_facts(
    points: &[GradePoint],
    lesson_count: i64,
    present_count: i64,
    cfg: &ForecastConfig,
) -> Option<Forecast> {
    let current_average = calc::weighted_mean(points)?;
    let trend = compute_trend(&calc::valid_values(points), cfg.trend_limit);
    let attendance_rate = if lesson_count > 0 {
        present_count as f64 / lesson_count as f64 * 100.0
    } else {
        0.0
    };
    let forecasted_grade =
        (current_average + trend * cfg.trend_factor).clamp(cfg.scale_min, cfg.scale_max);

    let (risk_level, risk_factors) = classify_risk(
        &Indicators {
            forecasted_grade,
            attendance_rate,
            trend,
        },
        cfg,
    );

    Some(Forecast {
        current_average,
        forecasted_grade: round_to(forecasted_grade, 2),
        trend: round_to(trend, 2),
        attendance_rate: round_to(attendance_rate, 1),
        risk_level,
        risk_factors,
    })
}

fn lesson_count(conn: &Connection, course_id: &str) -> CoreResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM lessons WHERE course_id = ?",
        [course_id],
        |r| r.get(0),
    )?)
}

fn present_count(conn: &Connection, student_id: &str, course_id: &str) -> CoreResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*)
         FROM attendance a
         JOIN lessons l ON l.id = a.lesson_id
         WHERE a.student_id = ? AND l.course_id = ? AND a.status = ?",
        (student_id, course_id, store::AttendanceStatus::Present.code()),
        |r| r.get(0),
    )?)
}

/// Percentage of the course's lessons the student attended.
pub fn attendance_rate(conn: &Connection, student_id: &str, course_id: &str) -> CoreResult<f64> {
    store::require_student(conn, student_id)?;
    store::require_course(conn, course_id)?;
    let total = lesson_count(conn, course_id)?;
    if total == 0 {
        return Ok(0.0);
    }
    let present = present_count(conn, student_id, course_id)?;
    Ok(round_to(present as f64 / total as f64 * 100.0, 1))
}

pub fn forecast(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    cfg: &ForecastConfig,
) -> CoreResult<Option<Forecast>> {
    store::require_student(conn, student_id)?;
    store::require_course(conn, course_id)?;
    let points = calc::course_grade_points(conn, student_id, course_id)?;
    if points.is_empty() {
        return Ok(None);
    }
    let total = lesson_count(conn, course_id)?;
    let present = present_count(conn, student_id, course_id)?;
    Ok(forecast_from_facts(&points, total, present, cfg))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentForecast {
    pub student_id: String,
    pub full_name: String,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskSummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupForecast {
    pub students: Vec<StudentForecast>,
    pub risk_summary: RiskSummary,
}

/// Forecasts every student of a group. Read-only; callers should not
/// interleave writes while it runs.
pub fn group_forecast(
    conn: &Connection,
    course_id: &str,
    group_name: &str,
    cfg: &ForecastConfig,
) -> CoreResult<GroupForecast> {
    store::require_course(conn, course_id)?;
    if groups::group_id_by_name(conn, group_name.trim())?.is_none() {
        return Err(CoreError::not_found(format!("group {} not found", group_name.trim())));
    }
    let total = lesson_count(conn, course_id)?;

    let mut summary = RiskSummary::default();
    let mut students = Vec::new();
    for s in store::list_students_by_group(conn, group_name)? {
        let points = calc::course_grade_points(conn, &s.id, course_id)?;
        let present = present_count(conn, &s.id, course_id)?;
        let forecast = forecast_from_facts(&points, total, present, cfg);
        match forecast.as_ref().map(|f| f.risk_level) {
            Some(RiskLevel::Low) => summary.low += 1,
            Some(RiskLevel::Medium) => summary.medium += 1,
            Some(RiskLevel::High) => summary.high += 1,
            None => {}
        }
        students.push(StudentForecast {
            student_id: s.id,
            full_name: s.full_name,
            forecast,
        });
    }

    Ok(GroupForecast {
        students,
        risk_summary: summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{course, fresh, lesson, student};
    use crate::store::AttendanceStatus;

    fn graded(values: &[&str]) -> Vec<GradePoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| GradePoint::new(&format!("l{}", i), v, None))
            .collect()
    }

    fn ind(forecasted_grade: f64, attendance_rate: f64, trend: f64) -> Indicators {
        Indicators {
            forecasted_grade,
            attendance_rate,
            trend,
        }
    }

    #[test]
    fn no_rule_triggered_is_low_without_reasons() {
        let (level, reasons) = classify_risk(&ind(4.0, 90.0, 0.0), &ForecastConfig::default());
        assert_eq!(level, RiskLevel::Low);
        assert!(reasons.is_empty());
    }

    #[test]
    fn single_step_rules_escalate_one_level_each() {
        let cfg = ForecastConfig::default();
        let (level, reasons) = classify_risk(&ind(4.0, 60.0, 0.0), &cfg);
        assert_eq!(level, RiskLevel::Medium);
        assert_eq!(reasons, vec!["low attendance"]);

        let (level, reasons) = classify_risk(&ind(4.0, 60.0, -0.5), &cfg);
        assert_eq!(level, RiskLevel::High);
        assert_eq!(reasons, vec!["low attendance", "negative performance trend"]);
    }

    #[test]
    fn failing_forecast_is_high_and_never_downgraded() {
        let (level, reasons) =
            classify_risk(&ind(2.5, 50.0, -0.5), &ForecastConfig::default());
        assert_eq!(level, RiskLevel::High);
        assert_eq!(
            reasons,
            vec![
                "forecasted grade below passing threshold",
                "low attendance",
                "negative performance trend"
            ]
        );
    }

    #[test]
    fn trend_boundary_is_strict() {
        let cfg = ForecastConfig::default();
        assert_eq!(classify_risk(&ind(4.0, 100.0, -0.1), &cfg).0, RiskLevel::Low);
        assert_eq!(classify_risk(&ind(4.0, 70.0, 0.0), &cfg).0, RiskLevel::Low);
        assert_eq!(classify_risk(&ind(3.0, 100.0, 0.0), &cfg).0, RiskLevel::Low);
    }

    #[test]
    fn two_rising_grades_clamp_trend_and_forecast() {
        let f = forecast_from_facts(&graded(&["3", "5"]), 2, 2, &ForecastConfig::default())
            .expect("forecast");
        assert_eq!(f.current_average, 4.0);
        assert_eq!(f.trend, 1.0);
        assert_eq!(f.forecasted_grade, 4.5);
        assert_eq!(f.attendance_rate, 100.0);
        assert_eq!(f.risk_level, RiskLevel::Low);
    }

    #[test]
    fn three_of_five_lessons_attended_is_medium_risk() {
        let f = forecast_from_facts(&graded(&["4", "4"]), 5, 3, &ForecastConfig::default())
            .expect("forecast");
        assert_eq!(f.attendance_rate, 60.0);
        assert_eq!(f.risk_level, RiskLevel::Medium);
        assert_eq!(f.risk_factors, vec!["low attendance"]);
    }

    #[test]
    fn forecast_is_clamped_to_scale() {
        let f = forecast_from_facts(&graded(&["5", "2"]), 2, 2, &ForecastConfig::default())
            .expect("forecast");
        assert_eq!(f.trend, -1.0);
        assert_eq!(f.forecasted_grade, 3.0);
        let f = forecast_from_facts(&graded(&["2", "2", "2"]), 3, 3, &ForecastConfig::default())
            .expect("forecast");
        assert_eq!(f.forecasted_grade, 2.0);
        assert_eq!(f.risk_level, RiskLevel::High);
    }

    #[test]
    fn unparseable_grades_are_skipped_by_trend() {
        let f = forecast_from_facts(&graded(&["3", "зач", "5"]), 0, 0, &ForecastConfig::default())
            .expect("forecast");
        assert_eq!(f.trend, 1.0);
        assert_eq!(f.attendance_rate, 0.0);
        assert!(forecast_from_facts(&graded(&["зач"]), 1, 1, &ForecastConfig::default()).is_none());
    }

    #[test]
    fn custom_scale_changes_clamp_and_passing_grade() {
        let cfg = ForecastConfig {
            scale_min: 0.0,
            scale_max: 10.0,
            passing_grade: 6.0,
            ..ForecastConfig::default()
        };
        cfg.validate().expect("valid");
        let f = forecast_from_facts(&graded(&["5", "5"]), 1, 1, &cfg).expect("forecast");
        assert_eq!(f.forecasted_grade, 5.0);
        assert_eq!(f.risk_level, RiskLevel::High);
    }

    #[test]
    fn config_validation_and_persistence() {
        let conn = fresh();
        assert_eq!(ForecastConfig::load(&conn).expect("load"), ForecastConfig::default());

        let bad = ForecastConfig {
            scale_min: 5.0,
            scale_max: 2.0,
            ..ForecastConfig::default()
        };
        assert!(matches!(bad.save(&conn), Err(CoreError::Validation(_))));

        let cfg = ForecastConfig {
            attendance_threshold: 50.0,
            ..ForecastConfig::default()
        };
        cfg.save(&conn).expect("save");
        assert_eq!(ForecastConfig::load(&conn).expect("load"), cfg);

        let partial: ForecastConfig =
            serde_json::from_value(serde_json::json!({ "passingGrade": 3.5 })).expect("partial");
        assert_eq!(partial.passing_grade, 3.5);
        assert_eq!(partial.scale_max, 5.0);
    }

    #[test]
    fn forecast_from_store() {
        let conn = fresh();
        let s = student(&conn, "A", "G", "1");
        let c = course(&conn, "Algebra");
        let cfg = ForecastConfig::default();
        let lessons: Vec<_> = ["2023-09-01", "2023-09-08", "2023-09-15", "2023-09-22", "2023-09-29"]
            .iter()
            .map(|d| lesson(&conn, &c.id, d, 1.0))
            .collect();

        assert_eq!(forecast(&conn, &s.id, &c.id, &cfg).expect("forecast"), None);

        store::upsert_grade(&conn, &s.id, &lessons[0].id, "3").expect("g");
        store::upsert_grade(&conn, &s.id, &lessons[1].id, "5").expect("g");
        for l in &lessons[..3] {
            store::upsert_attendance(&conn, &s.id, &l.id, AttendanceStatus::Present).expect("a");
        }
        store::upsert_attendance(&conn, &s.id, &lessons[3].id, AttendanceStatus::Excused)
            .expect("a");

        let f = forecast(&conn, &s.id, &c.id, &cfg).expect("forecast").expect("some");
        assert_eq!(f.current_average, 4.0);
        assert_eq!(f.forecasted_grade, 4.5);
        assert_eq!(f.attendance_rate, 60.0);
        assert_eq!(f.risk_level, RiskLevel::Medium);
        assert_eq!(attendance_rate(&conn, &s.id, &c.id).expect("rate"), 60.0);
    }

    #[test]
    fn group_forecast_counts_only_forecasted_students() {
        let conn = fresh();
        let a = student(&conn, "A", "G", "1");
        student(&conn, "B", "G", "2");
        let c = course(&conn, "Algebra");
        let l = lesson(&conn, &c.id, "2023-09-01", 1.0);
        store::upsert_grade(&conn, &a.id, &l.id, "5").expect("g");
        store::upsert_attendance(&conn, &a.id, &l.id, AttendanceStatus::Present).expect("a");

        let g = group_forecast(&conn, &c.id, "G", &ForecastConfig::default()).expect("group");
        assert_eq!(g.students.len(), 2);
        assert!(g.students[0].forecast.is_some());
        assert!(g.students[1].forecast.is_none());
        assert_eq!(
            g.risk_summary,
            RiskSummary {
                low: 1,
                medium: 0,
                high: 0
            }
        );
        assert!(matches!(
            group_forecast(&conn, &c.id, "nope", &ForecastConfig::default()),
            Err(CoreError::NotFound(_))
        ));
    }
}
