use super::print_json;
use plant_doctor_lib::config::PipelineConfig;
use plant_doctor_lib::error::AppError;
use plant_doctor_lib::models::diagnosis_types::PredictionResult;
use plant_doctor_lib::services::fs_service;
use plant_doctor_lib::services::image_service;
use plant_doctor_lib::services::prediction_service::PredictionService;
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome for one input file. Exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct FileDiagnosis {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PredictionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AppError>,
}

impl FileDiagnosis {
    fn new(path: &std::path::Path, outcome: Result<PredictionResult, AppError>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            path: path.display().to_string(),
            result,
            error,
        }
    }
}

pub fn run(
    config: &PipelineConfig,
    paths: &[PathBuf],
    caller_id: Option<&str>,
    jsonl: bool,
) -> anyhow::Result<()> {
    let files = collect_files(paths)?;
    if files.is_empty() {
        anyhow::bail!("No image files found");
    }
    info!("Found {} images", files.len());

    let service = PredictionService::from_config(config)?;
    let started = Instant::now();
    let reports = diagnose_files(&service, &files, caller_id);

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    info!(
        "Diagnosed {} images in {:.2}s ({} failed)",
        reports.len(),
        started.elapsed().as_secs_f64(),
        failed
    );

    if jsonl {
        for report in &reports {
            println!("{}", serde_json::to_string(report)?);
        }
        Ok(())
    } else {
        print_json(&reports)
    }
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, AppError> {
    let mut files = Vec::new();
    for path in paths {
        files.extend(fs_service::list_image_files(path)?);
    }
    Ok(files)
}

/// Diagnoses every file, keeping input order. Failures are reported per file.
pub fn diagnose_files(
    service: &PredictionService,
    files: &[PathBuf],
    caller_id: Option<&str>,
) -> Vec<FileDiagnosis> {
    files
        .par_iter()
        .map(|path| {
            let outcome = image_service::load_image(path)
                .and_then(|image| service.predict_disease(&image, caller_id));
            if let Err(e) = &outcome {
                warn!("{}: {}", path.display(), e);
            }
            FileDiagnosis::new(path, outcome)
        })
        .collect()
}
