use std::collections::BTreeMap;

use serde::Serialize;

use crate::attendance::{self, AttendanceFilter, BestModule, ModuleAttendance};
use crate::grades::{self, GradeBreakdown, ModuleGrades};
use crate::models::{Dataset, GradeEntry, Student};
use crate::status::{self, ResolvedModule, ResolvedSeminar};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    pub module: ResolvedModule,
    pub grades: GradeBreakdown,
    pub attendance: ModuleAttendance,
}

/// Everything the dashboard shows for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub full_name: String,
    pub career_name: Option<String>,
    pub modules: Vec<ModuleSummary>,
    pub seminars: Vec<ResolvedSeminar>,
    pub attendance: BTreeMap<String, ModuleAttendance>,
    pub best_in_progress: Option<BestModule>,
    pub recognitions: usize,
}

pub fn build_student_summary(dataset: &Dataset, student: &Student) -> StudentSummary {
    let career = student
        .career_id
        .as_deref()
        .and_then(|career_id| dataset.career(career_id));
    let (career_modules, seminar_catalog) = match career {
        Some(career) => (career.modules.as_slice(), career.seminars.as_slice()),
        None => (&[][..], &[][..]),
    };

    let (modules, seminars) = status::resolve_student(
        student,
        career_modules,
        &dataset.general_modules,
        seminar_catalog,
    );
    let rollup = attendance::roll_up(&dataset.attendance, &AttendanceFilter::student(&student.id));
    let best_in_progress = attendance::best_in_progress(&modules, &rollup);
    let recognitions = status::recognitions(&modules, &seminars);
    let (attached, _) = attach_grades(dataset, &student.id, &modules);

    let modules = modules
        .into_iter()
        .zip(attached)
        .map(|(module, entries)| ModuleSummary {
            grades: grades::breakdown(&entries),
            attendance: rollup.get(&module.name).cloned().unwrap_or_default(),
            module,
        })
        .collect();

    StudentSummary {
        student_id: student.id.clone(),
        full_name: student.full_name.clone(),
        career_name: career.map(|career| career.name.clone()),
        modules,
        seminars,
        attendance: rollup,
        best_in_progress,
        recognitions,
    }
}

/// Splits a student's grades over the resolved modules, one entry list per
/// module. A grade group joins a module by id, or by name when its id names
/// none of the modules: grades stored without a module id carry the module
/// name in its place. Groups that join nothing come back separately.
fn attach_grades(
    dataset: &Dataset,
    student_id: &str,
    modules: &[ResolvedModule],
) -> (Vec<Vec<GradeEntry>>, Vec<ModuleGrades>) {
    let mut attached: Vec<Vec<GradeEntry>> = vec![Vec::new(); modules.len()];
    let mut unattached = Vec::new();

    for graded in grades::group_by_module(dataset.grades_for(student_id)) {
        let by_id = modules.iter().position(|module| module.id == graded.module_id);
        let target = by_id.or_else(|| {
            modules
                .iter()
                .position(|module| module.name == graded.module_name)
        });

        match target {
            Some(index) => attached[index].extend(graded.entries),
            None => unattached.push(graded),
        }
    }

    (attached, unattached)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    pub student_id: String,
    pub full_name: String,
    pub average: f64,
    pub attendance_percentage: u32,
    pub recognitions: usize,
}

/// One line per student, highest average first.
pub fn roster(dataset: &Dataset, career_id: Option<&str>) -> Vec<RosterEntry> {
    let mut entries: Vec<RosterEntry> = dataset
        .students
        .iter()
        .filter(|student| match career_id {
            Some(career_id) => student.career_id.as_deref() == Some(career_id),
            None => true,
        })
        .map(|student| {
            let summary = build_student_summary(dataset, student);
            let resolved: Vec<ResolvedModule> = summary
                .modules
                .iter()
                .map(|item| item.module.clone())
                .collect();
            let (attached, mut graded) = attach_grades(dataset, &student.id, &resolved);
            graded.extend(resolved.into_iter().zip(attached).map(|(module, entries)| {
                ModuleGrades {
                    module_id: module.id,
                    module_name: module.name,
                    entries,
                }
            }));
            RosterEntry {
                student_id: student.id.clone(),
                full_name: student.full_name.clone(),
                average: grades::overall_average(&graded),
                attendance_percentage: attendance::overall_percentage(&summary.attendance),
                recognitions: summary.recognitions,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.average
            .total_cmp(&a.average)
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AttendanceRecord, Career, CatalogModule, GradeEntry, GradeGroup, ModuleAssignment, Scope,
        SeminarOverride, SeminarRecord, Status,
    };
    use chrono::NaiveDate;

    fn grade(student_id: &str, module_id: &str, group: &str, value: f64) -> GradeEntry {
        GradeEntry {
            student_id: student_id.to_string(),
            module_id: module_id.to_string(),
            module_name: module_id.to_uppercase(),
            group: GradeGroup::from_label(group),
            activity_name: "Prueba".to_string(),
            grade: value,
            date: None,
        }
    }

    fn session(student_id: &str, module_name: &str, days: &[(u32, bool)]) -> AttendanceRecord {
        AttendanceRecord {
            student_id: student_id.to_string(),
            module_id: None,
            module_name: module_name.to_string(),
            period: None,
            semester: None,
            attendance: days
                .iter()
                .map(|(day, present)| (NaiveDate::from_ymd_opt(2025, 3, *day).unwrap(), *present))
                .collect(),
        }
    }

    fn dataset() -> Dataset {
        let career = Career {
            id: "tec-redes".to_string(),
            name: "Técnico en Redes".to_string(),
            modules: vec![
                CatalogModule {
                    id: "m1".to_string(),
                    name: "Redes I".to_string(),
                    semester: Some(1),
                    scope: Scope::Career,
                },
                CatalogModule {
                    id: "m2".to_string(),
                    name: "Redes II".to_string(),
                    semester: Some(2),
                    scope: Scope::Career,
                },
            ],
            seminars: vec![SeminarRecord {
                id: "s1".to_string(),
                name: "Liderazgo".to_string(),
                teacher: None,
                hours: 16,
                semester: Some(1),
                status: None,
            }],
        };

        let ana = Student {
            id: "ana".to_string(),
            full_name: "Ana Torres".to_string(),
            email: None,
            career_id: Some("tec-redes".to_string()),
            modules: vec![
                ModuleAssignment {
                    module_id: "m1".to_string(),
                    status: Status::Approved,
                },
                ModuleAssignment {
                    module_id: "m2".to_string(),
                    status: Status::InProgress,
                },
                ModuleAssignment {
                    module_id: "retired".to_string(),
                    status: Status::Approved,
                },
            ],
            seminar_overrides: vec![SeminarOverride {
                id: Some("s1".to_string()),
                status: Some(Status::Approved),
                ..Default::default()
            }],
        };
        let bruno = Student {
            id: "bruno".to_string(),
            full_name: "Bruno Díaz".to_string(),
            email: None,
            career_id: Some("tec-redes".to_string()),
            modules: vec![ModuleAssignment {
                module_id: "m1".to_string(),
                status: Status::InProgress,
            }],
            seminar_overrides: Vec::new(),
        };

        Dataset {
            students: vec![bruno, ana],
            careers: vec![career],
            general_modules: Vec::new(),
            grades: vec![
                grade("ana", "m1", "ACTIVIDADES_1", 5.0),
                grade("ana", "m1", "ACTIVIDADES_2", 5.0),
                grade("ana", "m1", "EVALUACION_FINAL", 5.0),
                grade("bruno", "m1", "EVALUACION_FINAL", 3.0),
            ],
            attendance: vec![
                session("ana", "Redes II", &[(3, true), (10, true), (17, false), (24, true)]),
                session("bruno", "Redes I", &[(3, false), (10, true)]),
            ],
        }
    }

    #[test]
    fn summary_joins_grades_attendance_and_status() {
        let data = dataset();
        let ana = data.student("ana").unwrap();
        let summary = build_student_summary(&data, ana);

        assert_eq!(summary.career_name.as_deref(), Some("Técnico en Redes"));
        assert_eq!(summary.modules.len(), 2);
        assert!((summary.modules[0].grades.final_score - 5.0).abs() < 1e-9);
        assert_eq!(summary.modules[1].grades.final_score, 0.0);
        assert_eq!(summary.modules[1].attendance.total, 4);
        assert_eq!(summary.recognitions, 2);

        let best = summary.best_in_progress.unwrap();
        assert_eq!(best.module_name, "Redes II");
        assert_eq!(best.percentage, 75);
    }

    #[test]
    fn grades_without_module_id_join_by_name() {
        let mut data = dataset();
        let mut legacy = grade("ana", "Redes I", "EVALUACION_FINAL", 5.0);
        legacy.module_name = "Redes I".to_string();
        data.grades = vec![grade("ana", "m1", "ACTIVIDADES_1", 5.0), legacy];

        let ana = data.student("ana").unwrap();
        let summary = build_student_summary(&data, ana);
        let redes = &summary.modules[0].grades;
        assert_eq!(redes.actividades_1.count, 1);
        assert_eq!(redes.evaluacion_final.count, 1);
        assert!((redes.final_score - 3.5).abs() < 1e-9);

        let entries = roster(&data, None);
        let ana_entry = entries.iter().find(|entry| entry.student_id == "ana").unwrap();
        assert!((ana_entry.average - 3.5).abs() < 1e-9);
    }

    #[test]
    fn student_without_career_still_summarizes() {
        let mut data = dataset();
        data.students[0].career_id = None;
        let bruno = data.student("bruno").unwrap();
        let summary = build_student_summary(&data, bruno);

        assert!(summary.modules.is_empty());
        assert!(summary.seminars.is_empty());
        assert_eq!(summary.attendance["Redes I"].attended, 1);
    }

    #[test]
    fn roster_orders_by_average() {
        let data = dataset();
        let entries = roster(&data, Some("tec-redes"));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].full_name, "Ana Torres");
        assert!((entries[0].average - 5.0).abs() < 1e-9);
        assert!((entries[1].average - 1.2).abs() < 1e-9);
        assert_eq!(entries[1].attendance_percentage, 50);
        assert!(roster(&data, Some("other")).is_empty());
    }
}
