//! Effective configuration: file and environment layers plus CLI overrides

use anyhow::{Context, Result};
use sentistream_analyzer::AnalyzerConfig;
use tracing::debug;

/// Load the layered configuration and apply command-line overrides
pub fn resolve(cli: &crate::Cli) -> Result<AnalyzerConfig> {
    let config = AnalyzerConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(config, cli)
}

fn apply_overrides(mut config: AnalyzerConfig, cli: &crate::Cli) -> Result<AnalyzerConfig> {
    if let Some(model) = &cli.model {
        config.model_name = model.clone();
    }

    if let Some(revision) = &cli.revision {
        config.revision = revision.clone();
    }

    if let Some(max_length) = cli.max_length {
        config.max_length = max_length;
    }

    if let Some(device) = cli.device {
        config.device = device;
    }

    config.validate().context("Invalid command-line override")?;
    debug!(model = %config.model_name, device = %config.device, "effective configuration");
    Ok(config)
}

/// Apply the `process --batch-size` override
pub fn with_batch_size(config: AnalyzerConfig, batch_size: Option<usize>) -> Result<AnalyzerConfig> {
    let Some(batch_size) = batch_size else {
        return Ok(config);
    };

    let config = config.with_batch_size(batch_size);
    config.validate().context("Invalid --batch-size")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;
    use sentistream_analyzer::DeviceSpec;

    #[test]
    fn test_cli_overrides_take_precedence() {
        let cli = Cli::try_parse_from([
            "sentistream",
            "--model",
            "./models/local",
            "--max-length",
            "128",
            "--device",
            "cuda:1",
            "show-config",
        ])
        .unwrap();

        let config = apply_overrides(AnalyzerConfig::default(), &cli).unwrap();
        assert_eq!(config.model_name, "./models/local");
        assert_eq!(config.max_length, 128);
        assert_eq!(config.device, DeviceSpec::Cuda(1));
        assert_eq!(config.revision, "main");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = Cli::try_parse_from(["sentistream", "--max-length", "2", "show-config"]).unwrap();
        assert!(apply_overrides(AnalyzerConfig::default(), &cli).is_err());
    }

    #[test]
    fn test_unknown_device_is_a_parse_error() {
        assert!(Cli::try_parse_from(["sentistream", "--device", "tpu", "show-config"]).is_err());
    }

    #[test]
    fn test_batch_size_override() {
        let config = with_batch_size(AnalyzerConfig::default(), Some(4)).unwrap();
        assert_eq!(config.batch_size, 4);
        assert!(with_batch_size(AnalyzerConfig::default(), Some(0)).is_err());
        assert_eq!(
            with_batch_size(AnalyzerConfig::default(), None).unwrap().batch_size,
            32
        );
    }

    #[test]
    fn test_config_file_is_layered() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "model_name: \"org/custom-model\"\nbatch_size: 8\n").unwrap();

        let cli = Cli::try_parse_from([
            "sentistream",
            "--config",
            path.to_str().unwrap(),
            "--revision",
            "v2",
            "show-config",
        ])
        .unwrap();

        let config = resolve(&cli).unwrap();
        assert_eq!(config.model_name, "org/custom-model");
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.revision, "v2");
    }
}
