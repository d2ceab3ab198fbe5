//! Pre-flight checks before expensive operations.
//!
//! Validates that required configuration is available before starting a
//! run that would otherwise fail on every unit.

use crate::config::Settings;
use crate::error::{InnsiktError, Result};
use std::path::Path;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Extraction needs an API key and readable inputs.
    Extract,
    /// Checkpoint inspection has no external requirements.
    Checkpoints,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings, inputs: &[String]) -> Result<()> {
    match operation {
        Operation::Extract => {
            check_api_key()?;
            check_inputs(inputs)?;
            if settings.checkpoint.enabled {
                check_writable_dir(&settings.checkpoint_dir())?;
            }
        }
        Operation::Checkpoints => {}
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(InnsiktError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(InnsiktError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

fn check_inputs(inputs: &[String]) -> Result<()> {
    for input in inputs {
        if !Path::new(input).is_file() {
            return Err(InnsiktError::InvalidInput(format!(
                "Episode file not found: {}",
                input
            )));
        }
    }
    Ok(())
}

fn check_writable_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        InnsiktError::Config(format!(
            "Cannot create checkpoint directory {}: {}",
            dir.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints_no_requirements() {
        assert!(check(Operation::Checkpoints, &Settings::default(), &[]).is_ok());
    }

    #[test]
    fn test_missing_input_rejected() {
        let err = check_inputs(&["/definitely/not/here.json".to_string()]).unwrap_err();
        assert!(matches!(err, InnsiktError::InvalidInput(_)));
    }

    #[test]
    fn test_checkpoint_dir_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        check_writable_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
