//! OpenAPI synthesis through the external `mitmproxy2swagger` transform
//!
//! The transform is treated as a black box: it reads a traffic capture and
//! writes (or updates) an OpenAPI document. On a first pass it lists every
//! candidate path under `x-path-templates` prefixed with `ignore:`; removing
//! those markers and running it again turns the paths into endpoints.

use crate::config::SynthConfig;
use serde_yaml::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;

const PATH_TEMPLATES_KEY: &str = "x-path-templates";
const IGNORE_MARKER: &str = "ignore:";

/// Format of the capture handed to the transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// HAR file recorded by the crawl session
    Har,
    /// Flow dump written by the capturing proxy
    Flow,
}

impl InputFormat {
    pub fn as_arg(&self) -> &'static str {
        match self {
            InputFormat::Har => "har",
            InputFormat::Flow => "flow",
        }
    }
}

/// Errors raised while synthesizing a spec
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("{program} is not available: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to access generated spec {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Generated spec {} is not valid YAML: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Runs the spec synthesis transform
#[derive(Debug, Clone)]
pub struct SpecSynthesizer {
    program: String,
    args: Vec<String>,
}

impl SpecSynthesizer {
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    /// Generates an OpenAPI document from a traffic capture
    ///
    /// # Arguments
    ///
    /// * `input` - HAR file or proxy flow dump
    /// * `output` - Spec file to write; updated in place if it exists
    /// * `api_prefix` - Base URL the endpoints live under
    /// * `format` - Format of `input`
    /// * `auto_approve` - Promote every discovered path template to an endpoint
    pub async fn synthesize(
        &self,
        input: &Path,
        output: &Path,
        api_prefix: &str,
        format: InputFormat,
        auto_approve: bool,
    ) -> Result<(), SynthError> {
        tracing::info!(
            "Synthesizing {} from {} (prefix {})",
            output.display(),
            input.display(),
            api_prefix
        );
        self.run(input, output, api_prefix, format).await?;

        if auto_approve {
            let approved = approve_path_templates(output)?;
            if approved > 0 {
                tracing::info!("Approved {} path templates; regenerating", approved);
                self.run(input, output, api_prefix, format).await?;
            }
        }

        tracing::info!("Spec written to {}", output.display());
        Ok(())
    }

    async fn run(
        &self,
        input: &Path,
        output: &Path,
        api_prefix: &str,
        format: InputFormat,
    ) -> Result<(), SynthError> {
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .arg("-p")
            .arg(api_prefix)
            .arg("-f")
            .arg(format.as_arg())
            .output()
            .await;

        let out = result.map_err(|source| SynthError::Unavailable {
            program: self.program.clone(),
            source,
        })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            tracing::warn!(
                exit_code = ?out.status.code(),
                stderr = %stderr,
                "{} failed",
                self.program
            );
            return Err(SynthError::Failed {
                program: self.program.clone(),
                status: out.status,
                stderr,
            });
        }
        Ok(())
    }
}

/// Strips `ignore:` markers from the spec's `x-path-templates` list
///
/// # Returns
///
/// * `Ok(n)` - Number of templates approved; the file is rewritten only when `n > 0`
/// * `Err(SynthError)` - The spec could not be read, parsed or written
pub fn approve_path_templates(spec_path: &Path) -> Result<usize, SynthError> {
    let io_err = |source| SynthError::Io {
        path: spec_path.to_path_buf(),
        source,
    };

    let content = std::fs::read_to_string(spec_path).map_err(io_err)?;
    let mut doc: Value = serde_yaml::from_str(&content).map_err(|source| SynthError::Yaml {
        path: spec_path.to_path_buf(),
        source,
    })?;

    let mut approved = 0;
    if let Some(templates) = doc
        .get_mut(PATH_TEMPLATES_KEY)
        .and_then(Value::as_sequence_mut)
    {
        for entry in templates.iter_mut() {
            if let Value::String(template) = entry {
                if let Some(path) = template.strip_prefix(IGNORE_MARKER) {
                    *template = path.to_string();
                    approved += 1;
                }
            }
        }
    }

    if approved > 0 {
        let rendered = serde_yaml::to_string(&doc).map_err(|source| SynthError::Yaml {
            path: spec_path.to_path_buf(),
            source,
        })?;
        std::fs::write(spec_path, rendered).map_err(io_err)?;
    }
    Ok(approved)
}
