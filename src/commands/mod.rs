pub mod diagnose;
pub mod model;

use crate::args::Args;
use plant_doctor_lib::config::PipelineConfig;
use plant_doctor_lib::error::AppError;
use serde::Serialize;

/// Config file, then `PLANT_DOCTOR_*` environment, then command-line flags.
pub fn resolve_config(args: &Args) -> Result<PipelineConfig, AppError> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(model) = &args.model {
        config.model.model_path = model.clone();
    }
    if let Some(labels) = &args.labels {
        config.model.class_names_path = Some(labels.clone());
    }
    if args.allow_fallback_catalog {
        config.model.allow_fallback_catalog = true;
    }
    if args.use_gpu {
        config.model.use_gpu = true;
    }
    config.validate()?;
    Ok(config)
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "model": {{ "model_path": "from_file.onnx", "intra_threads": 2 }} }}"#
        )
        .unwrap();
        let config_path = file.path().to_string_lossy().to_string();

        let args = Args::try_parse_from([
            "plant-doctor",
            "--config",
            config_path.as_str(),
            "--labels",
            "labels.json",
            "--use-gpu",
            "plants",
        ])
        .unwrap();
        let config = resolve_config(&args).unwrap();

        assert_eq!(config.model.intra_threads, 2);
        assert_eq!(config.model.class_names_path, Some(PathBuf::from("labels.json")));
        assert!(config.model.use_gpu);

        let args = Args::try_parse_from([
            "plant-doctor",
            "--config",
            config_path.as_str(),
            "--model",
            "cli.onnx",
            "inspect",
        ])
        .unwrap();
        assert_eq!(
            resolve_config(&args).unwrap().model.model_path,
            PathBuf::from("cli.onnx")
        );
    }

    #[test]
    fn broken_config_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let config_path = file.path().to_string_lossy().to_string();
        let args = Args::try_parse_from(["plant-doctor", "--config", config_path.as_str(), "plants"]).unwrap();
        assert_eq!(resolve_config(&args).unwrap_err().kind(), "config");
    }
}
