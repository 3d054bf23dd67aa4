use serde::Serialize;
use tracing::debug;

use crate::models::{
    CatalogModule, ModuleAssignment, SeminarOverride, SeminarRecord, Status, Student,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedModule {
    pub id: String,
    pub name: String,
    pub semester: Option<u8>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSeminar {
    pub id: String,
    pub name: String,
    pub teacher: Option<String>,
    pub hours: u32,
    pub semester: Option<u8>,
    pub status: Status,
}

/// Joins assignments against the career catalog plus the shared general
/// modules. Assignments pointing at a missing catalog entry are dropped.
pub fn resolve_modules(
    assignments: &[ModuleAssignment],
    career_modules: &[CatalogModule],
    general_modules: &[CatalogModule],
) -> Vec<ResolvedModule> {
    assignments
        .iter()
        .filter_map(|assignment| {
            let found = career_modules
                .iter()
                .chain(general_modules)
                .find(|module| module.id == assignment.module_id);

            match found {
                Some(module) => Some(ResolvedModule {
                    id: module.id.clone(),
                    name: module.name.clone(),
                    semester: module.semester,
                    status: assignment.status,
                }),
                None => {
                    debug!(module_id = %assignment.module_id, "dropping orphaned module assignment");
                    None
                }
            }
        })
        .collect()
}

/// Walks the career's seminar catalog and layers each student override on
/// top of the catalog defaults.
pub fn resolve_seminars(
    catalog: &[SeminarRecord],
    overrides: &[SeminarOverride],
) -> Vec<ResolvedSeminar> {
    catalog
        .iter()
        .map(|seminar| {
            let mut resolved = ResolvedSeminar {
                id: seminar.id.clone(),
                name: seminar.name.clone(),
                teacher: seminar.teacher.clone(),
                hours: seminar.hours,
                semester: seminar.semester,
                status: seminar.status.unwrap_or_default(),
            };

            if let Some(found) = find_override(seminar, overrides) {
                if let Some(name) = &found.name {
                    resolved.name = name.clone();
                }
                if let Some(teacher) = &found.teacher {
                    resolved.teacher = Some(teacher.clone());
                }
                if let Some(hours) = found.hours {
                    resolved.hours = hours;
                }
                if let Some(semester) = found.semester {
                    resolved.semester = Some(semester);
                }
                if let Some(status) = found.status {
                    resolved.status = status;
                }
            }

            resolved
        })
        .collect()
}

/// Id match first; legacy overrides only carry name and semester.
fn find_override<'a>(
    seminar: &SeminarRecord,
    overrides: &'a [SeminarOverride],
) -> Option<&'a SeminarOverride> {
    overrides
        .iter()
        .find(|entry| entry.id.as_deref() == Some(seminar.id.as_str()))
        .or_else(|| {
            overrides.iter().find(|entry| {
                entry.name.as_deref() == Some(seminar.name.as_str())
                    && entry.semester == seminar.semester
            })
        })
}

pub fn recognitions(modules: &[ResolvedModule], seminars: &[ResolvedSeminar]) -> usize {
    let approved_modules = modules.iter().filter(|m| m.status.is_approved()).count();
    let approved_seminars = seminars.iter().filter(|s| s.status.is_approved()).count();
    approved_modules + approved_seminars
}

/// Convenience wrapper resolving everything for one student.
pub fn resolve_student(
    student: &Student,
    career_modules: &[CatalogModule],
    general_modules: &[CatalogModule],
    seminar_catalog: &[SeminarRecord],
) -> (Vec<ResolvedModule>, Vec<ResolvedSeminar>) {
    let modules = resolve_modules(&student.modules, career_modules, general_modules);
    let seminars = resolve_seminars(seminar_catalog, &student.seminar_overrides);
    (modules, seminars)
}
