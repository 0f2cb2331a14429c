use anyhow::{Context, Result};
use memfit_core::{Analysis, ImageSnapshot, TargetConfig, analyze};

pub mod report;
pub mod resolve;
pub mod summary;

/// Read the target configuration and image snapshot named on the command
/// line and run the analysis pipeline over them. Analysis warnings are
/// logged here so every subcommand surfaces them the same way.
pub fn load_analysis(config_path: &str, image_path: &str) -> Result<Analysis> {
    let config: TargetConfig = read_json(config_path)?;
    let image: ImageSnapshot = read_json(image_path)?;
    let analysis = analyze(config, &image.sections, &image.symbols)?;
    for warning in &analysis.warnings {
        log::warn!("{warning}");
    }
    Ok(analysis)
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {path}"))
}
