use eyre::WrapErr;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest is the structure of skylift.toml
///
/// Everything in it is optional, command line arguments take
/// precedence over manifest values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// [function]
    /// name = "demo"
    /// handler = "lambda_function.lambda_handler"
    #[serde(default)]
    pub function: FunctionSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionSection {
    pub name: Option<String>,
    pub handler: Option<String>,

    #[serde(default)]
    pub sources: Vec<PathBuf>,

    pub runtime: Option<String>,
    pub timeout: Option<u64>,
    pub memory_size: Option<u32>,

    /// Service categories resolved into managed policies on the
    /// execution role, e.g. ["s3", "dynamodb"]
    #[serde(default)]
    pub services: Vec<String>,

    /// Skips role provisioning entirely when set
    pub role_arn: Option<String>,

    /// Requirements file to vendor third-party packages from
    pub requirements: Option<PathBuf>,

    #[serde(default)]
    pub environment: HashMap<String, String>,
}

impl Manifest {
    /// Read skylift.toml from the given directory
    ///
    /// A missing manifest is not an error, all values can be supplied
    /// on the command line.
    pub fn from_dir(path: &Path) -> eyre::Result<Self> {
        let manifest_path = path.join("skylift.toml");

        let Ok(toml_string) = fs::read_to_string(&manifest_path) else {
            log::debug!("No skylift.toml found in {}", path.display());
            return Ok(Self::default());
        };

        toml::from_str(&toml_string).wrap_err("Failed to parse skylift.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_manifest() {
        let manifest: Manifest = toml::from_str(
            r#"
            [function]
            name = "demo"
            handler = "lambda_function.lambda_handler"
            sources = ["src", "lambda_function.py"]
            runtime = "python3.12"
            timeout = 60
            memory_size = 256
            services = ["s3", "dynamodb"]
            requirements = "requirements.txt"

            [function.environment]
            STAGE = "prod"
            "#,
        )
        .unwrap();

        let function = manifest.function;
        assert_eq!(function.name.as_deref(), Some("demo"));
        assert_eq!(function.sources.len(), 2);
        assert_eq!(function.timeout, Some(60));
        assert_eq!(function.services, ["s3", "dynamodb"]);
        assert_eq!(function.environment["STAGE"], "prod");
    }

    #[test]
    fn missing_manifest_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::from_dir(dir.path()).unwrap();

        assert!(manifest.function.name.is_none());
        assert!(manifest.function.sources.is_empty());
    }
}
