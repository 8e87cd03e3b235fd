use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Leaf photo disease diagnosis with an ONNX classifier
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON pipeline config; built-in defaults are used when omitted
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// ONNX model file (overrides config and PLANT_DOCTOR_MODEL_PATH)
    #[arg(long, global = true, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Class label file, JSON array or `id2label` config
    #[arg(long, global = true, value_name = "FILE")]
    pub labels: Option<PathBuf>,

    /// Use the built-in label list when the label file is missing
    #[arg(long, global = true)]
    pub allow_fallback_catalog: bool,

    /// Try GPU execution providers before the CPU
    #[arg(long, global = true)]
    pub use_gpu: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Diagnose image files; directories are searched recursively
    Diagnose {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Opaque id echoed back in every result
        #[arg(long, value_name = "ID")]
        caller_id: Option<String>,

        /// Print one JSON object per line instead of a pretty array
        #[arg(long)]
        jsonl: bool,
    },
    /// List target plants with the diseases the label catalog covers
    Plants,
    /// Load the model and print its input/output contract
    Inspect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "plant-doctor",
            "diagnose",
            "a.jpg",
            "leaves/",
            "--model",
            "m.onnx",
            "--caller-id",
            "req-7",
        ])
        .unwrap();
        assert_eq!(args.model, Some(PathBuf::from("m.onnx")));
        match args.command {
            Command::Diagnose { paths, caller_id, jsonl } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(caller_id.as_deref(), Some("req-7"));
                assert!(!jsonl);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn diagnose_requires_a_path() {
        assert!(Args::try_parse_from(["plant-doctor", "diagnose"]).is_err());
    }

    #[test]
    fn args_are_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
