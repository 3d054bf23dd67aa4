use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::Period;
use crate::summary::StudentSummary;

pub fn build_report(summary: &StudentSummary, generated_on: NaiveDate) -> String {
    let mut output = String::new();
    let career_label = summary.career_name.as_deref().unwrap_or("no career assigned");

    let _ = writeln!(output, "# Academic Record: {}", summary.full_name);
    let _ = writeln!(
        output,
        "{} ({}), generated {} during period {}",
        career_label,
        summary.student_id,
        generated_on,
        Period::containing(generated_on)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "Recognitions: {}", summary.recognitions);

    match &summary.best_in_progress {
        Some(best) => {
            let _ = writeln!(
                output,
                "Current module: {} ({}% attendance, {}/{} sessions)",
                best.module_name, best.percentage, best.attended, best.total
            );
        }
        None => {
            let _ = writeln!(output, "Current module: none in progress");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Modules");

    if summary.modules.is_empty() {
        let _ = writeln!(output, "No modules assigned.");
    } else {
        let _ = writeln!(output, "| Module | Semester | Status | Average | Attendance |");
        let _ = writeln!(output, "| --- | --- | --- | --- | --- |");
        for item in summary.modules.iter() {
            let semester = item
                .module
                .semester
                .map(|semester| semester.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.2} | {}% ({}/{}) |",
                item.module.name,
                semester,
                item.module.status,
                item.grades.final_score,
                item.attendance.percentage(),
                item.attendance.attended,
                item.attendance.total
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Seminars");

    if summary.seminars.is_empty() {
        let _ = writeln!(output, "No seminars in the career catalog.");
    } else {
        for seminar in summary.seminars.iter() {
            let _ = writeln!(
                output,
                "- {} ({} h, {}): {}",
                seminar.name,
                seminar.hours,
                seminar.teacher.as_deref().unwrap_or("teacher tbd"),
                seminar.status
            );
        }
    }

    let extras: Vec<_> = summary
        .modules
        .iter()
        .flat_map(|item| item.grades.other.iter().map(move |entry| (item, entry)))
        .collect();

    if !extras.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Other Activities");
        let _ = writeln!(output, "Not part of the weighted average.");
        for (item, entry) in extras {
            let _ = writeln!(
                output,
                "- {}: {} [{}] {:.1}",
                item.module.name,
                entry.activity_name,
                entry.group.label(),
                entry.grade
            );
        }
    }

    output
}
