use serde::Serialize;

use crate::models::{GradeEntry, GradeGroup};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketSummary {
    pub count: usize,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeBreakdown {
    pub actividades_1: BucketSummary,
    pub actividades_2: BucketSummary,
    pub evaluacion_final: BucketSummary,
    pub other: Vec<GradeEntry>,
    pub final_score: f64,
}

/// A student's entries for a single module, in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleGrades {
    pub module_id: String,
    pub module_name: String,
    pub entries: Vec<GradeEntry>,
}

pub fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weighted 30/30/40 score. Empty buckets count as 0.
pub fn final_score(entries: &[GradeEntry]) -> f64 {
    breakdown(entries).final_score
}

pub fn breakdown(entries: &[GradeEntry]) -> GradeBreakdown {
    let mut actividades_1 = Vec::new();
    let mut actividades_2 = Vec::new();
    let mut evaluacion_final = Vec::new();
    let mut other = Vec::new();

    for entry in entries {
        match entry.group {
            GradeGroup::Actividades1 => actividades_1.push(entry.grade),
            GradeGroup::Actividades2 => actividades_2.push(entry.grade),
            GradeGroup::EvaluacionFinal => evaluacion_final.push(entry.grade),
            GradeGroup::Other(_) => other.push(entry.clone()),
        }
    }

    let actividades_1 = summarize(actividades_1);
    let actividades_2 = summarize(actividades_2);
    let evaluacion_final = summarize(evaluacion_final);

    let weighted = GradeGroup::Actividades1.weight().unwrap_or(0.0) * actividades_1.mean
        + GradeGroup::Actividades2.weight().unwrap_or(0.0) * actividades_2.mean
        + GradeGroup::EvaluacionFinal.weight().unwrap_or(0.0) * evaluacion_final.mean;

    GradeBreakdown {
        actividades_1,
        actividades_2,
        evaluacion_final,
        other,
        final_score: round_2(weighted),
    }
}

fn summarize(mut grades: Vec<f64>) -> BucketSummary {
    if grades.is_empty() {
        return BucketSummary::default();
    }

    // Summed in ascending order so any permutation of the input agrees bit for bit.
    grades.sort_by(|a, b| a.total_cmp(b));
    let total: f64 = grades.iter().sum();

    BucketSummary {
        count: grades.len(),
        mean: total / grades.len() as f64,
    }
}

pub fn group_by_module<'a, I>(entries: I) -> Vec<ModuleGrades>
where
    I: IntoIterator<Item = &'a GradeEntry>,
{
    let mut modules: Vec<ModuleGrades> = Vec::new();

    for entry in entries {
        match modules
            .iter_mut()
            .find(|module| module.module_id == entry.module_id)
        {
            Some(module) => module.entries.push(entry.clone()),
            None => modules.push(ModuleGrades {
                module_id: entry.module_id.clone(),
                module_name: entry.module_name.clone(),
                entries: vec![entry.clone()],
            }),
        }
    }

    modules
}

/// Mean of the module finals that have at least one graded entry.
pub fn overall_average(modules: &[ModuleGrades]) -> f64 {
    let mut scores: Vec<f64> = modules
        .iter()
        .filter(|module| !module.entries.is_empty())
        .map(|module| final_score(&module.entries))
        .collect();

    if scores.is_empty() {
        return 0.0;
    }

    scores.sort_by(|a, b| a.total_cmp(b));
    round_2(scores.iter().sum::<f64>() / scores.len() as f64)
}
