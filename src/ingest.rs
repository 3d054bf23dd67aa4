//! Conversion of loosely shaped database documents into typed records.
//!
//! Documents written by the admin screens over the years are inconsistent:
//! numbers stored as strings, Spanish decimal commas, status labels in either
//! language, attendance maps keyed by arbitrary strings. Every raw field is
//! optional here and the typed records come out the other side. Records that
//! cannot be salvaged are skipped and counted, never fatal.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    AttendanceRecord, Career, CatalogModule, Dataset, GradeEntry, GradeGroup, ModuleAssignment,
    Scope, SeminarOverride, SeminarRecord, Status, Student,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IngestError {
    #[error("{kind} document is missing required field `{field}`")]
    MissingField { kind: &'static str, field: &'static str },

    #[error("grade value {raw} is not a number")]
    NotANumber { raw: String },

    #[error("grade {value} is outside the 0-5 scale")]
    GradeOutOfRange { value: f64 },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawModuleAssignment {
    #[serde(alias = "id")]
    pub module_id: Option<String>,
    #[serde(alias = "estado", alias = "state")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSeminarState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub teacher: Option<String>,
    pub hours: Option<Value>,
    pub semester: Option<Value>,
    #[serde(alias = "estado", alias = "state")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStudent {
    pub id: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub career_id: Option<String>,
    #[serde(default)]
    pub modules: Vec<RawModuleAssignment>,
    #[serde(default)]
    pub seminars: Vec<RawSeminarState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCatalogModule {
    pub id: Option<String>,
    pub name: Option<String>,
    pub semester: Option<Value>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCareer {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub modules: Vec<RawCatalogModule>,
    #[serde(default)]
    pub seminars: Vec<RawSeminarState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrade {
    pub student_id: Option<String>,
    pub module_id: Option<String>,
    pub module_name: Option<String>,
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub activity_name: Option<String>,
    pub grade: Option<Value>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAttendance {
    pub student_id: Option<String>,
    pub module_id: Option<String>,
    pub module_name: Option<String>,
    pub period: Option<String>,
    pub semester: Option<Value>,
    #[serde(default)]
    pub attendance: BTreeMap<String, Value>,
}

/// Shape of a full document export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDataset {
    #[serde(default)]
    pub students: Vec<RawStudent>,
    #[serde(default)]
    pub careers: Vec<RawCareer>,
    #[serde(default)]
    pub general_modules: Vec<RawCatalogModule>,
    #[serde(default)]
    pub grades: Vec<RawGrade>,
    #[serde(default)]
    pub attendance: Vec<RawAttendance>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: usize,
    pub dropped_fields: usize,
}

impl IngestReport {
    fn reject(&mut self, kind: &str, error: &IngestError) {
        warn!(kind, %error, "rejecting document");
        self.rejected += 1;
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required(
    value: Option<&str>,
    kind: &'static str,
    field: &'static str,
) -> Result<String, IngestError> {
    non_empty(value).ok_or(IngestError::MissingField { kind, field })
}

/// Accepts JSON numbers and numeric strings with either decimal separator.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn parse_small(value: Option<&Value>) -> Option<u8> {
    value
        .and_then(parse_number)
        .filter(|number| number.fract() == 0.0 && (0.0..=u8::MAX as f64).contains(number))
        .map(|number| number as u8)
}

/// `on_unknown` is what an unrecognised label turns into.
fn parse_status(
    raw: Option<&str>,
    on_unknown: Option<Status>,
    report: &mut IngestReport,
) -> Option<Status> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    match raw.parse() {
        Ok(status) => Some(status),
        Err(error) => {
            warn!(%error, fallback = ?on_unknown, "ignoring unknown status");
            report.dropped_fields += 1;
            on_unknown
        }
    }
}

/// Prefers whichever of the two labels names a weighted bucket; `groupId`
/// is sometimes an opaque document key.
fn grade_group(group_id: Option<&str>, group_name: Option<&str>) -> GradeGroup {
    let from_id = group_id.map(GradeGroup::from_label);
    let from_name = group_name.map(GradeGroup::from_label);
    match (from_id, from_name) {
        (Some(id), _) if id.weight().is_some() => id,
        (_, Some(name)) if name.weight().is_some() => name,
        (Some(id), _) => id,
        (None, Some(name)) => name,
        (None, None) => GradeGroup::from_label(""),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Timestamps exported as full ISO datetimes keep only their date part.
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn grade(raw: &RawGrade, report: &mut IngestReport) -> Result<GradeEntry, IngestError> {
    let student_id = required(raw.student_id.as_deref(), "grade", "studentId")?;
    let module_name = non_empty(raw.module_name.as_deref());
    let module_id = non_empty(raw.module_id.as_deref())
        .or_else(|| module_name.clone())
        .ok_or(IngestError::MissingField {
            kind: "grade",
            field: "moduleId",
        })?;
    let value = raw.grade.as_ref().ok_or(IngestError::MissingField {
        kind: "grade",
        field: "grade",
    })?;
    let grade = parse_number(value).ok_or_else(|| IngestError::NotANumber {
        raw: value.to_string(),
    })?;
    if !(0.0..=5.0).contains(&grade) {
        return Err(IngestError::GradeOutOfRange { value: grade });
    }

    let date = match raw.date.as_deref() {
        Some(raw_date) => {
            let parsed = parse_date(raw_date);
            if parsed.is_none() {
                debug!(raw_date, "dropping unparseable grade date");
                report.dropped_fields += 1;
            }
            parsed
        }
        None => None,
    };

    Ok(GradeEntry {
        student_id,
        module_name: module_name.unwrap_or_else(|| module_id.clone()),
        module_id,
        group: grade_group(raw.group_id.as_deref(), raw.group_name.as_deref()),
        activity_name: non_empty(raw.activity_name.as_deref()).unwrap_or_default(),
        grade,
        date,
    })
}

pub fn attendance(
    raw: &RawAttendance,
    report: &mut IngestReport,
) -> Result<AttendanceRecord, IngestError> {
    let student_id = required(raw.student_id.as_deref(), "attendance", "studentId")?;
    let module_name = required(raw.module_name.as_deref(), "attendance", "moduleName")?;

    let mut days = BTreeMap::new();
    for (key, value) in &raw.attendance {
        match (parse_date(key), value.as_bool()) {
            (Some(date), Some(present)) => {
                days.insert(date, present);
            }
            _ => {
                debug!(key = key.as_str(), %value, "dropping malformed attendance entry");
                report.dropped_fields += 1;
            }
        }
    }

    let period = match raw.period.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(raw_period) => match raw_period.parse() {
            Ok(period) => Some(period),
            Err(error) => {
                debug!(%error, "dropping malformed period");
                report.dropped_fields += 1;
                None
            }
        },
    };

    Ok(AttendanceRecord {
        student_id,
        module_id: non_empty(raw.module_id.as_deref()),
        module_name,
        period,
        semester: parse_small(raw.semester.as_ref()),
        attendance: days,
    })
}

pub fn student(raw: &RawStudent, report: &mut IngestReport) -> Result<Student, IngestError> {
    let id = required(raw.id.as_deref(), "student", "id")?;
    let full_name = non_empty(raw.full_name.as_deref())
        .or_else(|| {
            let parts: Vec<&str> = [raw.first_name.as_deref(), raw.last_name.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        })
        .unwrap_or_else(|| id.clone());

    let mut modules: Vec<ModuleAssignment> = Vec::new();
    for assignment in &raw.modules {
        let Some(module_id) = non_empty(assignment.module_id.as_deref()) else {
            report.dropped_fields += 1;
            continue;
        };
        let status = parse_status(assignment.status.as_deref(), Some(Status::Pending), report)
            .unwrap_or_default();
        // Assignments are unique by module id; a repeated id replaces the earlier state.
        match modules.iter_mut().find(|existing| existing.module_id == module_id) {
            Some(existing) => existing.status = status,
            None => modules.push(ModuleAssignment { module_id, status }),
        }
    }

    let seminar_overrides = raw
        .seminars
        .iter()
        .map(|state| SeminarOverride {
            id: non_empty(state.id.as_deref()),
            name: non_empty(state.name.as_deref()),
            teacher: non_empty(state.teacher.as_deref()),
            hours: state
                .hours
                .as_ref()
                .and_then(parse_number)
                .filter(|hours| *hours >= 0.0)
                .map(|hours| hours.round() as u32),
            semester: parse_small(state.semester.as_ref()),
            // An unreadable override status leaves the catalog default in place.
            status: parse_status(state.status.as_deref(), None, report),
        })
        .collect();

    Ok(Student {
        id,
        full_name,
        email: non_empty(raw.email.as_deref()),
        career_id: non_empty(raw.career_id.as_deref()),
        modules,
        seminar_overrides,
    })
}

pub fn catalog_module(raw: &RawCatalogModule) -> Result<CatalogModule, IngestError> {
    let id = required(raw.id.as_deref(), "module", "id")?;
    let scope = match raw.scope.as_deref().map(str::trim) {
        Some(scope) if scope.eq_ignore_ascii_case("course") || scope.eq_ignore_ascii_case("curso") => {
            Scope::Course
        }
        _ => Scope::Career,
    };

    Ok(CatalogModule {
        name: non_empty(raw.name.as_deref()).unwrap_or_else(|| id.clone()),
        id,
        semester: parse_small(raw.semester.as_ref()),
        scope,
    })
}

pub fn seminar(raw: &RawSeminarState, report: &mut IngestReport) -> Result<SeminarRecord, IngestError> {
    let id = required(raw.id.as_deref(), "seminar", "id")?;
    Ok(SeminarRecord {
        name: non_empty(raw.name.as_deref()).unwrap_or_else(|| id.clone()),
        id,
        teacher: non_empty(raw.teacher.as_deref()),
        hours: raw
            .hours
            .as_ref()
            .and_then(parse_number)
            .filter(|hours| *hours >= 0.0)
            .map(|hours| hours.round() as u32)
            .unwrap_or(0),
        semester: parse_small(raw.semester.as_ref()),
        status: parse_status(raw.status.as_deref(), Some(Status::Pending), report),
    })
}

pub fn career(raw: &RawCareer, report: &mut IngestReport) -> Result<Career, IngestError> {
    let id = required(raw.id.as_deref(), "career", "id")?;

    let mut modules = Vec::new();
    for module in &raw.modules {
        match catalog_module(module) {
            Ok(module) => modules.push(module),
            Err(error) => report.reject("module", &error),
        }
    }

    let mut seminars = Vec::new();
    for seminar_doc in &raw.seminars {
        match seminar(seminar_doc, report) {
            Ok(record) => seminars.push(record),
            Err(error) => report.reject("seminar", &error),
        }
    }

    Ok(Career {
        name: non_empty(raw.name.as_deref()).unwrap_or_else(|| id.clone()),
        id,
        modules,
        seminars,
    })
}

fn collect<R, T>(
    raws: &[R],
    kind: &'static str,
    report: &mut IngestReport,
    mut convert: impl FnMut(&R, &mut IngestReport) -> Result<T, IngestError>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        match convert(raw, report) {
            Ok(value) => {
                report.accepted += 1;
                out.push(value);
            }
            Err(error) => report.reject(kind, &error),
        }
    }
    out
}

/// Converts a whole export. Bad documents are skipped, never fatal.
pub fn dataset(raw: &RawDataset) -> (Dataset, IngestReport) {
    let mut report = IngestReport::default();

    let dataset = Dataset {
        students: collect(&raw.students, "student", &mut report, student),
        careers: collect(&raw.careers, "career", &mut report, career),
        general_modules: collect(&raw.general_modules, "module", &mut report, |raw, _| {
            catalog_module(raw)
        }),
        grades: collect(&raw.grades, "grade", &mut report, grade),
        attendance: collect(&raw.attendance, "attendance", &mut report, attendance),
    };

    debug!(
        accepted = report.accepted,
        rejected = report.rejected,
        dropped_fields = report.dropped_fields,
        "ingested dataset"
    );
    (dataset, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_grade(value: Value) -> RawGrade {
        serde_json::from_value(json!({
            "studentId": "stu-1",
            "moduleId": "m1",
            "moduleName": "Redes I",
            "groupName": "Evaluación Final",
            "activityName": "Examen",
            "grade": value,
            "date": "2025-06-20T13:00:00Z",
        }))
        .unwrap()
    }

    #[test]
    fn grade_accepts_comma_decimals_and_group_names() {
        let mut report = IngestReport::default();
        let entry = grade(&raw_grade(json!("4,5")), &mut report).unwrap();

        assert_eq!(entry.grade, 4.5);
        assert_eq!(entry.group, GradeGroup::EvaluacionFinal);
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2025, 6, 20));
        assert_eq!(report.dropped_fields, 0);
    }

    #[test]
    fn grade_rejects_out_of_range_and_garbage() {
        let mut report = IngestReport::default();
        assert_eq!(
            grade(&raw_grade(json!(7)), &mut report),
            Err(IngestError::GradeOutOfRange { value: 7.0 })
        );
        assert!(matches!(
            grade(&raw_grade(json!("excelente")), &mut report),
            Err(IngestError::NotANumber { .. })
        ));
    }

    #[test]
    fn grade_group_id_wins_over_group_name() {
        let mut raw = raw_grade(json!(3));
        raw.group_id = Some("ACTIVIDADES_2".to_string());
        let entry = grade(&raw, &mut IngestReport::default()).unwrap();
        assert_eq!(entry.group, GradeGroup::Actividades2);
    }

    #[test]
    fn opaque_group_id_falls_back_to_group_name() {
        let mut raw = raw_grade(json!(5));
        raw.group_id = Some("grp-8fk2".to_string());
        raw.group_name = Some("EVALUACION_FINAL".to_string());
        let entry = grade(&raw, &mut IngestReport::default()).unwrap();
        assert_eq!(entry.group, GradeGroup::EvaluacionFinal);

        raw.group_name = Some("Charla".to_string());
        let entry = grade(&raw, &mut IngestReport::default()).unwrap();
        assert_eq!(entry.group, GradeGroup::Other("grp-8fk2".to_string()));
    }

    #[test]
    fn attendance_drops_malformed_keys_and_values() {
        let raw: RawAttendance = serde_json::from_value(json!({
            "studentId": "stu-1",
            "moduleName": "Redes I",
            "period": "2025-1",
            "semester": "1",
            "attendance": {
                "2025-01-04": true,
                "sábado": true,
                "2025-01-11": "yes",
                "2025-01-18": false,
            }
        }))
        .unwrap();

        let mut report = IngestReport::default();
        let record = attendance(&raw, &mut report).unwrap();
        assert_eq!(record.attendance.len(), 2);
        assert_eq!(record.semester, Some(1));
        assert_eq!(record.period.map(|p| p.to_string()).as_deref(), Some("2025-1"));
        assert_eq!(report.dropped_fields, 2);
    }

    #[test]
    fn attendance_requires_module_name() {
        let raw: RawAttendance =
            serde_json::from_value(json!({ "studentId": "stu-1", "moduleId": "m1" })).unwrap();
        assert_eq!(
            attendance(&raw, &mut IngestReport::default()),
            Err(IngestError::MissingField {
                kind: "attendance",
                field: "moduleName",
            })
        );
    }

    #[test]
    fn student_defaults_unknown_status_and_dedupes_modules() {
        let raw: RawStudent = serde_json::from_value(json!({
            "id": "stu-1",
            "firstName": "Ana",
            "lastName": "Torres",
            "modules": [
                { "moduleId": "m1", "estado": "en curso" },
                { "moduleId": "m2", "status": "graduado" },
                { "moduleId": "m1", "status": "aprobado" },
                { "status": "approved" }
            ],
            "seminars": [
                { "name": "Liderazgo", "semester": 2, "state": "Aprobado", "hours": "16" }
            ]
        }))
        .unwrap();

        let mut report = IngestReport::default();
        let student = student(&raw, &mut report).unwrap();
        assert_eq!(student.full_name, "Ana Torres");
        assert_eq!(student.modules.len(), 2);
        assert_eq!(student.modules[0].status, Status::Approved);
        assert_eq!(student.modules[1].status, Status::Pending);
        assert_eq!(student.seminar_overrides[0].status, Some(Status::Approved));
        assert_eq!(student.seminar_overrides[0].hours, Some(16));
        assert_eq!(report.dropped_fields, 2);
    }

    #[test]
    fn unknown_override_status_keeps_catalog_default() {
        let raw: RawStudent = serde_json::from_value(json!({
            "id": "stu-1",
            "fullName": "Ana Torres",
            "seminars": [{ "id": "s1", "status": "convalidado", "hours": 12 }]
        }))
        .unwrap();

        let mut report = IngestReport::default();
        let student = student(&raw, &mut report).unwrap();
        assert_eq!(student.seminar_overrides[0].status, None);
        assert_eq!(student.seminar_overrides[0].hours, Some(12));
        assert_eq!(report.dropped_fields, 1);

        let catalog = vec![SeminarRecord {
            id: "s1".to_string(),
            name: "Liderazgo".to_string(),
            teacher: None,
            hours: 16,
            semester: Some(1),
            status: Some(Status::Approved),
        }];
        let resolved = crate::status::resolve_seminars(&catalog, &student.seminar_overrides);
        assert_eq!(resolved[0].status, Status::Approved);
        assert_eq!(resolved[0].hours, 12);
    }

    #[test]
    fn dataset_skips_bad_documents() {
        let raw: RawDataset = serde_json::from_value(json!({
            "students": [{ "id": "stu-1", "fullName": "Ana Torres" }, { "fullName": "Sin Id" }],
            "careers": [{
                "id": "tec-redes",
                "name": "Técnico en Redes",
                "modules": [{ "id": "m1", "name": "Redes I", "semester": 1 }, { "name": "huérfano" }],
                "seminars": [{ "id": "s1", "name": "Liderazgo", "hours": 16 }]
            }],
            "generalModules": [{ "id": "g1", "name": "Inglés", "scope": "curso" }],
            "grades": [{ "studentId": "stu-1", "moduleId": "m1", "groupId": "ACTIVIDADES_1", "grade": 9 }],
            "attendance": []
        }))
        .unwrap();

        let (data, report) = dataset(&raw);
        assert_eq!(data.students.len(), 1);
        assert_eq!(data.careers[0].modules.len(), 1);
        assert_eq!(data.careers[0].seminars[0].hours, 16);
        assert_eq!(data.general_modules[0].scope, Scope::Course);
        assert!(data.grades.is_empty());
        assert_eq!(report.accepted, 3);
        assert_eq!(report.rejected, 3);
    }
}
