use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{AttendanceRecord, Period};
use crate::status::ResolvedModule;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleAttendance {
    pub total: usize,
    pub attended: usize,
    pub days: BTreeMap<NaiveDate, bool>,
}

impl ModuleAttendance {
    pub fn percentage(&self) -> u32 {
        percentage(self.total, self.attended)
    }
}

/// Narrows which records take part in a roll-up. The student id is mandatory.
#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter<'a> {
    pub student_id: &'a str,
    pub module_id: Option<&'a str>,
    pub module_name: Option<&'a str>,
    pub period: Option<Period>,
}

impl<'a> AttendanceFilter<'a> {
    pub fn student(student_id: &'a str) -> Self {
        AttendanceFilter {
            student_id,
            ..Default::default()
        }
    }

    fn matches(&self, record: &AttendanceRecord) -> bool {
        if record.student_id != self.student_id {
            return false;
        }
        if let Some(module_id) = self.module_id {
            if record.module_id.as_deref() != Some(module_id) {
                return false;
            }
        }
        if let Some(module_name) = self.module_name {
            if record.module_name != module_name {
                return false;
            }
        }
        if let Some(period) = self.period {
            if record.period != Some(period) {
                return false;
            }
        }
        true
    }
}

/// Merges every matching session per module name.
///
/// Sessions are folded in slice order: when two sessions carry the same date
/// the later one wins. No timestamp is consulted.
pub fn roll_up(
    records: &[AttendanceRecord],
    filter: &AttendanceFilter<'_>,
) -> BTreeMap<String, ModuleAttendance> {
    let mut merged: BTreeMap<String, BTreeMap<NaiveDate, bool>> = BTreeMap::new();

    for record in records.iter().filter(|record| filter.matches(record)) {
        let days = merged.entry(record.module_name.clone()).or_default();
        for (date, present) in &record.attendance {
            days.insert(*date, *present);
        }
    }

    merged
        .into_iter()
        .map(|(module_name, days)| {
            let attended = days.values().filter(|present| **present).count();
            (
                module_name,
                ModuleAttendance {
                    total: days.len(),
                    attended,
                    days,
                },
            )
        })
        .collect()
}

pub fn percentage(total: usize, attended: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (attended as f64 / total as f64 * 100.0).round() as u32
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestModule {
    pub module_id: String,
    pub module_name: String,
    pub percentage: u32,
    pub total: usize,
    pub attended: usize,
}

/// Picks the in-progress module with the highest attendance percentage.
/// Ties keep the module that appears first in `modules`.
pub fn best_in_progress(
    modules: &[ResolvedModule],
    rollup: &BTreeMap<String, ModuleAttendance>,
) -> Option<BestModule> {
    let mut best: Option<BestModule> = None;

    for module in modules.iter().filter(|module| module.status.is_in_progress()) {
        let attendance = rollup.get(&module.name).cloned().unwrap_or_default();
        let candidate = BestModule {
            module_id: module.id.clone(),
            module_name: module.name.clone(),
            percentage: attendance.percentage(),
            total: attendance.total,
            attended: attendance.attended,
        };

        let better = match &best {
            Some(current) => candidate.percentage > current.percentage,
            None => true,
        };
        if better {
            best = Some(candidate);
        }
    }

    best
}

/// Attendance percentage across every module of the roll-up.
pub fn overall_percentage(rollup: &BTreeMap<String, ModuleAttendance>) -> u32 {
    let (total, attended) = rollup
        .values()
        .fold((0, 0), |(total, attended), module| {
            (total + module.total, attended + module.attended)
        });
    percentage(total, attended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use proptest::prelude::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn record(module_name: &str, days: &[(&str, bool)]) -> AttendanceRecord {
        AttendanceRecord {
            student_id: "stu-1".to_string(),
            module_id: Some(format!("id-{module_name}")),
            module_name: module_name.to_string(),
            period: Some("2025-1".parse().unwrap()),
            semester: Some(1),
            attendance: days
                .iter()
                .map(|(day, present)| (date(day), *present))
                .collect(),
        }
    }

    fn week(pattern: &[bool]) -> Vec<(&'static str, bool)> {
        const DAYS: [&str; 5] = [
            "2025-01-06",
            "2025-01-07",
            "2025-01-08",
            "2025-01-09",
            "2025-01-10",
        ];
        DAYS.iter().copied().zip(pattern.iter().copied()).collect()
    }

    fn module(id: &str, name: &str, status: Status) -> ResolvedModule {
        ResolvedModule {
            id: id.to_string(),
            name: name.to_string(),
            semester: Some(1),
            status,
        }
    }

    #[test]
    fn merges_sessions_by_date_union() {
        let records = vec![
            record("Redes I", &[("2025-01-04", true)]),
            record("Redes I", &[("2025-01-11", false)]),
        ];

        let rollup = roll_up(&records, &AttendanceFilter::student("stu-1"));
        let redes = &rollup["Redes I"];
        assert_eq!(redes.total, 2);
        assert_eq!(redes.attended, 1);
        assert_eq!(redes.days.len(), 2);
    }

    #[test]
    fn later_session_wins_on_conflicting_date() {
        let records = vec![
            record("Redes I", &[("2025-01-04", true)]),
            record("Redes I", &[("2025-01-04", false)]),
        ];

        let rollup = roll_up(&records, &AttendanceFilter::student("stu-1"));
        assert_eq!(rollup["Redes I"].total, 1);
        assert_eq!(rollup["Redes I"].attended, 0);
        assert!(!rollup["Redes I"].days[&date("2025-01-04")]);
    }

    #[test]
    fn groups_by_module_name_even_without_ids() {
        let mut legacy = record("Redes I", &[("2025-02-01", true)]);
        legacy.module_id = None;
        let records = vec![record("Redes I", &[("2025-01-04", true)]), legacy];

        let rollup = roll_up(&records, &AttendanceFilter::student("stu-1"));
        assert_eq!(rollup.len(), 1);
        assert_eq!(rollup["Redes I"].attended, 2);
    }

    #[test]
    fn filter_restricts_student_module_and_period() {
        let mut other_student = record("Redes I", &[("2025-01-04", true)]);
        other_student.student_id = "stu-2".to_string();
        let mut later_period = record("Redes I", &[("2025-08-02", true)]);
        later_period.period = Some("2025-2".parse().unwrap());
        let records = vec![
            other_student,
            later_period,
            record("Redes I", &[("2025-01-11", false)]),
            record("Bases de Datos", &[("2025-01-12", true)]),
        ];

        let filter = AttendanceFilter {
            student_id: "stu-1",
            module_name: Some("Redes I"),
            period: Some("2025-1".parse().unwrap()),
            ..Default::default()
        };
        let rollup = roll_up(&records, &filter);
        assert_eq!(rollup.len(), 1);
        assert_eq!(rollup["Redes I"].total, 1);

        let by_id = AttendanceFilter {
            student_id: "stu-1",
            module_id: Some("id-Bases de Datos"),
            ..Default::default()
        };
        assert_eq!(roll_up(&records, &by_id).len(), 1);
    }

    #[test]
    fn zero_total_is_zero_percent() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(3, 2), 67);
        assert_eq!(percentage(8, 1), 13);
    }

    #[test]
    fn best_module_prefers_higher_attendance() {
        let records = vec![
            record("A", &week(&[true, true, true, true, false])),
            record("B", &week(&[true, true, true, false, false])),
        ];
        let rollup = roll_up(&records, &AttendanceFilter::student("stu-1"));
        let modules = vec![
            module("b", "B", Status::InProgress),
            module("a", "A", Status::InProgress),
        ];

        let best = best_in_progress(&modules, &rollup).unwrap();
        assert_eq!(best.module_name, "A");
        assert_eq!(best.percentage, 80);
    }

    #[test]
    fn best_module_ties_keep_first_seen() {
        let records = vec![
            record("A", &[("2025-01-01", true), ("2025-01-02", false)]),
            record("B", &[("2025-01-01", false), ("2025-01-02", true)]),
        ];
        let rollup = roll_up(&records, &AttendanceFilter::student("stu-1"));
        let modules = vec![
            module("b", "B", Status::InProgress),
            module("a", "A", Status::InProgress),
            module("c", "C", Status::Approved),
        ];

        let best = best_in_progress(&modules, &rollup).unwrap();
        assert_eq!(best.module_name, "B");
        assert_eq!(best.percentage, 50);
    }

    #[test]
    fn no_in_progress_module_yields_none() {
        let modules = vec![module("a", "A", Status::Approved)];
        assert!(best_in_progress(&modules, &BTreeMap::new()).is_none());
    }

    #[test]
    fn overall_percentage_pools_all_modules() {
        let records = vec![
            record("A", &[("2025-01-01", true), ("2025-01-02", true)]),
            record("B", &[("2025-01-01", false), ("2025-01-02", true)]),
        ];
        let rollup = roll_up(&records, &AttendanceFilter::student("stu-1"));
        assert_eq!(overall_percentage(&rollup), 75);
    }

    proptest! {
        #[test]
        fn merging_a_session_twice_is_idempotent(
            days in prop::collection::btree_map(0u32..120, any::<bool>(), 0..30)
        ) {
            let start = date("2025-01-01");
            let mut session = record("Redes I", &[]);
            session.attendance = days
                .into_iter()
                .map(|(offset, present)| (start + chrono::Duration::days(offset as i64), present))
                .collect();

            let filter = AttendanceFilter::student("stu-1");
            let once = roll_up(std::slice::from_ref(&session), &filter);
            let twice = roll_up(&[session.clone(), session], &filter);
            prop_assert_eq!(once, twice);
        }
    }
}
