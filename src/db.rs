use std::collections::BTreeMap;

use anyhow::Context;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest::{
    self, IngestReport, RawAttendance, RawCareer, RawCatalogModule, RawDataset, RawGrade,
    RawSeminarState, RawStudent,
};
use crate::models::Dataset;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO academic_record.careers (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind("tec-redes")
    .bind("Técnico en Redes y Telecomunicaciones")
    .execute(pool)
    .await?;

    let modules = vec![
        ("redes-1", Some("tec-redes"), "Redes I", 1i16, "career"),
        ("redes-2", Some("tec-redes"), "Redes II", 2, "career"),
        ("cableado", Some("tec-redes"), "Cableado Estructurado", 1, "career"),
        ("etica", None, "Ética Profesional", 1, "career"),
        ("ingles", None, "Inglés Técnico", 2, "course"),
    ];

    for (id, career_id, name, semester, scope) in modules {
        sqlx::query(
            r#"
            INSERT INTO academic_record.modules (id, career_id, name, semester, scope)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, semester = EXCLUDED.semester, scope = EXCLUDED.scope
            "#,
        )
        .bind(id)
        .bind(career_id)
        .bind(name)
        .bind(semester)
        .bind(scope)
        .execute(pool)
        .await?;
    }

    let seminars = vec![
        ("sem-lid", "Liderazgo", "Marta Rojas", 16, 1i16),
        ("sem-emp", "Emprendimiento", "Luis Pérez", 20, 2),
    ];

    for (id, name, teacher, hours, semester) in seminars {
        sqlx::query(
            r#"
            INSERT INTO academic_record.seminars (id, career_id, name, teacher, hours, semester)
            VALUES ($1, 'tec-redes', $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, teacher = EXCLUDED.teacher, hours = EXCLUDED.hours
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(teacher)
        .bind(hours as i32)
        .bind(semester)
        .execute(pool)
        .await?;
    }

    let students = vec![
        (
            "ana-torres",
            "Ana Torres",
            "ana.torres@instituto.edu",
            json!([
                { "moduleId": "redes-1", "status": "approved" },
                { "moduleId": "etica", "status": "approved" },
                { "moduleId": "redes-2", "status": "in-progress" },
                { "moduleId": "cableado", "status": "in-progress" }
            ]),
            json!([{ "id": "sem-lid", "status": "approved" }]),
        ),
        (
            "bruno-diaz",
            "Bruno Díaz",
            "bruno.diaz@instituto.edu",
            json!([
                { "moduleId": "redes-1", "status": "in-progress" },
                { "moduleId": "ingles", "status": "pending" }
            ]),
            json!([{ "name": "Emprendimiento", "semester": 2, "estado": "en curso" }]),
        ),
    ];

    for (id, full_name, email, modules, seminars) in students {
        sqlx::query(
            r#"
            INSERT INTO academic_record.students (id, full_name, email, career_id, modules, seminars)
            VALUES ($1, $2, $3, 'tec-redes', $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                modules = EXCLUDED.modules,
                seminars = EXCLUDED.seminars
            "#,
        )
        .bind(id)
        .bind(full_name)
        .bind(email)
        .bind(Json(modules))
        .bind(Json(seminars))
        .execute(pool)
        .await?;
    }

    let grades = vec![
        ("seed-g-001", "ana-torres", "redes-1", "Redes I", "ACTIVIDADES_1", "Subnetting", 4.0, (2025, 3, 15)),
        ("seed-g-002", "ana-torres", "redes-1", "Redes I", "ACTIVIDADES_1", "Laboratorio VLAN", 5.0, (2025, 4, 5)),
        ("seed-g-003", "ana-torres", "redes-1", "Redes I", "ACTIVIDADES_2", "Informe de topología", 3.0, (2025, 5, 10)),
        ("seed-g-004", "ana-torres", "redes-1", "Redes I", "EVALUACION_FINAL", "Examen final", 4.5, (2025, 6, 21)),
        ("seed-g-005", "ana-torres", "redes-2", "Redes II", "ACTIVIDADES_1", "Enrutamiento estático", 4.2, (2025, 8, 16)),
        ("seed-g-006", "bruno-diaz", "redes-1", "Redes I", "ACTIVIDADES_1", "Subnetting", 3.8, (2025, 3, 15)),
    ];

    for (source_key, student_id, module_id, module_name, group_id, activity, grade, (y, m, d)) in grades {
        let graded_on = NaiveDate::from_ymd_opt(y, m, d).context("invalid date")?;
        sqlx::query(
            r#"
            INSERT INTO academic_record.grades
            (id, student_id, module_id, module_name, group_id, activity_name, grade, graded_on, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(module_id)
        .bind(module_name)
        .bind(group_id)
        .bind(activity)
        .bind(grade)
        .bind(graded_on)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let sessions = vec![
        (
            "seed-a-001",
            "ana-torres",
            Some("redes-2"),
            "Redes II",
            "2025-2",
            2i16,
            json!({ "2025-08-02": true, "2025-08-09": true, "2025-08-16": false }),
        ),
        (
            "seed-a-002",
            "ana-torres",
            Some("redes-2"),
            "Redes II",
            "2025-2",
            2,
            json!({ "2025-08-16": true, "2025-08-23": true }),
        ),
        (
            "seed-a-003",
            "ana-torres",
            None,
            "Cableado Estructurado",
            "2025-2",
            1,
            json!({ "2025-08-04": true, "2025-08-11": false, "2025-08-18": false }),
        ),
        (
            "seed-a-004",
            "bruno-diaz",
            Some("redes-1"),
            "Redes I",
            "2025-1",
            1,
            json!({ "2025-03-01": true, "2025-03-08": false }),
        ),
    ];

    // Sessions for the same module must land in order so the later one wins.
    for (offset, (source_key, student_id, module_id, module_name, period, semester, days)) in
        sessions.into_iter().enumerate()
    {
        sqlx::query(
            r#"
            INSERT INTO academic_record.attendance
            (id, student_id, module_id, module_name, period, semester, attendance, source_key, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now() + make_interval(secs => $9))
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(module_id)
        .bind(module_name)
        .bind(period)
        .bind(semester)
        .bind(Json(days))
        .bind(source_key)
        .bind(offset as f64)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

pub async fn import_grades_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        module_id: String,
        module_name: String,
        group_id: String,
        activity_name: String,
        grade: String,
        date: Option<NaiveDate>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();
    let mut report = IngestReport::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV row {}", line + 2))?;
        let raw = RawGrade {
            student_id: Some(row.student_id),
            module_id: Some(row.module_id),
            module_name: Some(row.module_name),
            group_id: Some(row.group_id),
            group_name: None,
            activity_name: Some(row.activity_name),
            grade: Some(Value::String(row.grade)),
            date: row.date.map(|date| date.to_string()),
        };

        let entry = match ingest::grade(&raw, &mut report) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(row = line + 2, %error, "skipping grade row");
                summary.rejected += 1;
                continue;
            }
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO academic_record.grades
            (id, student_id, module_id, module_name, group_id, activity_name, grade, graded_on, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.student_id)
        .bind(&entry.module_id)
        .bind(&entry.module_name)
        .bind(entry.group.label())
        .bind(&entry.activity_name)
        .bind(entry.grade)
        .bind(entry.date)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            summary.inserted += 1;
        } else {
            summary.duplicates += 1;
        }
    }

    info!(
        path = %csv_path.display(),
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "imported grades"
    );
    Ok(summary)
}

/// Decodes a JSONB column into a raw document, tolerating garbage.
fn decode_json<T: DeserializeOwned + Default>(value: Value, column: &str, owner: &str) -> T {
    match serde_json::from_value(value) {
        Ok(decoded) => decoded,
        Err(error) => {
            warn!(column, owner, %error, "ignoring malformed JSONB column");
            T::default()
        }
    }
}

fn small_value(value: Option<i16>) -> Option<Value> {
    value.map(Value::from)
}

/// Fetches every collection needed by the aggregator, optionally narrowed to
/// one career, and runs it through the ingest boundary.
pub async fn load_dataset(
    pool: &PgPool,
    career_id: Option<&str>,
) -> anyhow::Result<(Dataset, IngestReport)> {
    let mut careers_sql = String::from("SELECT id, name FROM academic_record.careers");
    let mut students_sql = String::from(
        "SELECT id, full_name, email, career_id, modules, seminars \
         FROM academic_record.students",
    );
    let mut grades_sql = String::from(
        "SELECT student_id, module_id, module_name, group_id, activity_name, grade, graded_on \
         FROM academic_record.grades",
    );
    let mut attendance_sql = String::from(
        "SELECT student_id, module_id, module_name, period, semester, attendance \
         FROM academic_record.attendance",
    );

    if career_id.is_some() {
        careers_sql.push_str(" WHERE id = $1");
        students_sql.push_str(" WHERE career_id = $1");
        let scoped = " WHERE student_id IN \
                      (SELECT id FROM academic_record.students WHERE career_id = $1)";
        grades_sql.push_str(scoped);
        attendance_sql.push_str(scoped);
    }

    careers_sql.push_str(" ORDER BY id");
    students_sql.push_str(" ORDER BY id");
    grades_sql.push_str(" ORDER BY graded_on NULLS LAST, created_at");
    attendance_sql.push_str(" ORDER BY recorded_at, id");

    let mut careers_query = sqlx::query(&careers_sql);
    let mut students_query = sqlx::query(&students_sql);
    let mut grades_query = sqlx::query(&grades_sql);
    let mut attendance_query = sqlx::query(&attendance_sql);

    if let Some(value) = career_id {
        careers_query = careers_query.bind(value);
        students_query = students_query.bind(value);
        grades_query = grades_query.bind(value);
        attendance_query = attendance_query.bind(value);
    }

    let career_rows = careers_query
        .fetch_all(pool)
        .await
        .context("failed to fetch careers")?;
    let module_rows = sqlx::query(
        "SELECT id, career_id, name, semester, scope FROM academic_record.modules ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch modules")?;
    let seminar_rows = sqlx::query(
        "SELECT id, career_id, name, teacher, hours, semester, status \
         FROM academic_record.seminars ORDER BY semester NULLS LAST, id",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch seminars")?;

    let mut raw = RawDataset::default();
    let mut career_modules: BTreeMap<String, Vec<RawCatalogModule>> = BTreeMap::new();
    let mut career_seminars: BTreeMap<String, Vec<RawSeminarState>> = BTreeMap::new();

    for row in module_rows {
        let module = RawCatalogModule {
            id: row.get("id"),
            name: row.get("name"),
            semester: small_value(row.get("semester")),
            scope: row.get("scope"),
        };
        match row.get::<Option<String>, _>("career_id") {
            Some(owner) => career_modules.entry(owner).or_default().push(module),
            None => raw.general_modules.push(module),
        }
    }

    for row in seminar_rows {
        let owner: String = row.get("career_id");
        career_seminars.entry(owner).or_default().push(RawSeminarState {
            id: row.get("id"),
            name: row.get("name"),
            teacher: row.get("teacher"),
            hours: row.get::<Option<i32>, _>("hours").map(Value::from),
            semester: small_value(row.get("semester")),
            status: row.get("status"),
        });
    }

    for row in career_rows {
        let id: String = row.get("id");
        raw.careers.push(RawCareer {
            modules: career_modules.remove(&id).unwrap_or_default(),
            seminars: career_seminars.remove(&id).unwrap_or_default(),
            name: row.get("name"),
            id: Some(id),
        });
    }

    for row in students_query
        .fetch_all(pool)
        .await
        .context("failed to fetch students")?
    {
        let id: String = row.get("id");
        let modules: Json<Value> = row.get("modules");
        let seminars: Json<Value> = row.get("seminars");
        raw.students.push(RawStudent {
            modules: decode_json(modules.0, "modules", &id),
            seminars: decode_json(seminars.0, "seminars", &id),
            full_name: row.get("full_name"),
            first_name: None,
            last_name: None,
            email: row.get("email"),
            career_id: row.get("career_id"),
            id: Some(id),
        });
    }

    for row in grades_query
        .fetch_all(pool)
        .await
        .context("failed to fetch grades")?
    {
        raw.grades.push(RawGrade {
            student_id: row.get("student_id"),
            module_id: row.get("module_id"),
            module_name: row.get("module_name"),
            group_id: row.get("group_id"),
            group_name: None,
            activity_name: row.get("activity_name"),
            grade: row.get::<Option<f64>, _>("grade").map(Value::from),
            date: row
                .get::<Option<NaiveDate>, _>("graded_on")
                .map(|date| date.to_string()),
        });
    }

    for row in attendance_query
        .fetch_all(pool)
        .await
        .context("failed to fetch attendance")?
    {
        let student_id: String = row.get("student_id");
        let days: Json<Value> = row.get("attendance");
        raw.attendance.push(RawAttendance {
            attendance: decode_json(days.0, "attendance", &student_id),
            student_id: Some(student_id),
            module_id: row.get("module_id"),
            module_name: row.get("module_name"),
            period: row.get("period"),
            semester: small_value(row.get("semester")),
        });
    }

    Ok(ingest::dataset(&raw))
}
