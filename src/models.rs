use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Activity group a grade belongs to. Only the first three carry weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GradeGroup {
    Actividades1,
    Actividades2,
    EvaluacionFinal,
    Other(String),
}

impl GradeGroup {
    pub fn from_label(label: &str) -> Self {
        match normalize_label(label).as_str() {
            "ACTIVIDADES_1" => GradeGroup::Actividades1,
            "ACTIVIDADES_2" => GradeGroup::Actividades2,
            "EVALUACION_FINAL" => GradeGroup::EvaluacionFinal,
            _ => GradeGroup::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            GradeGroup::Actividades1 => "ACTIVIDADES_1",
            GradeGroup::Actividades2 => "ACTIVIDADES_2",
            GradeGroup::EvaluacionFinal => "EVALUACION_FINAL",
            GradeGroup::Other(label) => label.as_str(),
        }
    }

    pub fn weight(&self) -> Option<f64> {
        match self {
            GradeGroup::Actividades1 | GradeGroup::Actividades2 => Some(0.3),
            GradeGroup::EvaluacionFinal => Some(0.4),
            GradeGroup::Other(_) => None,
        }
    }
}

/// Uppercases, strips Spanish accents and folds spaces/hyphens to `_`.
fn normalize_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'A',
            'é' | 'É' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'Ó' => 'O',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'U',
            ' ' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub student_id: String,
    pub module_id: String,
    pub module_name: String,
    pub group: GradeGroup,
    pub activity_name: String,
    pub grade: f64,
    pub date: Option<NaiveDate>,
}

/// Academic term in `YYYY-N` form, N being the half of the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub half: u8,
}

impl Period {
    pub fn containing(date: NaiveDate) -> Self {
        Period {
            year: date.year(),
            half: if date.month() <= 6 { 1 } else { 2 },
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.half)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, half) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("period '{s}' is not in YYYY-N form"))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("period '{s}' has an invalid year"))?;
        match half {
            "1" => Ok(Period { year, half: 1 }),
            "2" => Ok(Period { year, half: 2 }),
            _ => Err(format!("period '{s}' must end in -1 or -2")),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One attendance registration session for a student/module pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub module_id: Option<String>,
    pub module_name: String,
    pub period: Option<Period>,
    pub semester: Option<u8>,
    pub attendance: BTreeMap<NaiveDate, bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Approved,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in-progress",
            Status::Approved => "approved",
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Status::InProgress)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Status::Approved)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "PENDING" | "PENDIENTE" => Ok(Status::Pending),
            "IN_PROGRESS" | "INPROGRESS" | "EN_CURSO" | "EN_PROGRESO" | "CURSANDO" => {
                Ok(Status::InProgress)
            }
            "APPROVED" | "APROBADO" | "APROBADA" => Ok(Status::Approved),
            _ => Err(format!("unknown status '{s}'")),
        }
    }
}

/// Whether a catalog item belongs to a career track or a standalone course.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Career,
    Course,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAssignment {
    pub module_id: String,
    pub status: Status,
}

/// Student-level replacement for fields of a catalog seminar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeminarOverride {
    pub id: Option<String>,
    pub name: Option<String>,
    pub teacher: Option<String>,
    pub hours: Option<u32>,
    pub semester: Option<u8>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub career_id: Option<String>,
    pub modules: Vec<ModuleAssignment>,
    pub seminar_overrides: Vec<SeminarOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogModule {
    pub id: String,
    pub name: String,
    pub semester: Option<u8>,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeminarRecord {
    pub id: String,
    pub name: String,
    pub teacher: Option<String>,
    pub hours: u32,
    pub semester: Option<u8>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Career {
    pub id: String,
    pub name: String,
    pub modules: Vec<CatalogModule>,
    pub seminars: Vec<SeminarRecord>,
}

/// Every collection the aggregator reads, already materialised in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub students: Vec<Student>,
    pub careers: Vec<Career>,
    pub general_modules: Vec<CatalogModule>,
    pub grades: Vec<GradeEntry>,
    pub attendance: Vec<AttendanceRecord>,
}

impl Dataset {
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|student| student.id == id)
    }

    pub fn career(&self, id: &str) -> Option<&Career> {
        self.careers.iter().find(|career| career.id == id)
    }

    pub fn grades_for<'a>(&'a self, student_id: &'a str) -> impl Iterator<Item = &'a GradeEntry> {
        self.grades
            .iter()
            .filter(move |entry| entry.student_id == student_id)
    }
}
