//! Pipeline configuration from YAML

use crate::collaborators::CommandClientConfig;
use crate::core::{
    error::PipelineError,
    pipeline::PipelineDefinition,
    step::{StepConfig, StepConfigOverride, StepDefinition, StepKind},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Podcast pipeline shipped with the binary
pub const BUILTIN_PIPELINE: &str = include_str!("../../pipelines/podcast.yaml");

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Keys the caller supplies when starting a run
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Config applied to every step before its own overrides
    #[serde(default)]
    pub defaults: StepConfigOverride,

    /// Pipeline steps, in execution order
    pub steps: Vec<StepSpec>,

    /// External collaborator settings
    #[serde(default)]
    pub backends: BackendsConfig,
}

/// Step definition as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Unique step name
    pub name: String,

    pub kind: StepKind,

    /// Optional step description
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub produces: Vec<String>,

    /// Failure does not halt the run
    #[serde(default)]
    pub optional: bool,

    /// Prompt template for prompt steps
    #[serde(default)]
    pub prompt: Option<String>,

    /// Context key an editor step revises
    #[serde(default)]
    pub target: Option<String>,

    /// Step-specific config (overrides `defaults`)
    #[serde(default)]
    pub config: StepConfigOverride,
}

/// Where the external collaborators live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Completion command (prompt on stdin, completion on stdout)
    #[serde(default = "default_completion")]
    pub completion: CommandClientConfig,

    /// Transcription command (audio path as last argument, text on stdout)
    #[serde(default = "default_transcription")]
    pub transcription: CommandClientConfig,

    /// Directory of knowledge documents (`<id>.md` or `<id>.txt`)
    #[serde(default)]
    pub knowledge_dir: Option<PathBuf>,

    /// Directory that published documents are written to
    #[serde(default)]
    pub publish_dir: Option<PathBuf>,
}

fn default_completion() -> CommandClientConfig {
    CommandClientConfig::new("llm").with_model_flag("-m")
}

fn default_transcription() -> CommandClientConfig {
    CommandClientConfig::new("whisper-transcribe").with_timeout(3600)
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            completion: default_completion(),
            transcription: default_transcription(),
            knowledge_dir: None,
            publish_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// The built-in podcast pipeline
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_PIPELINE)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.to_definition().map(|_| ())
    }

    /// Convert config to a validated pipeline definition
    pub fn to_definition(&self) -> Result<PipelineDefinition, PipelineError> {
        let mut steps = Vec::with_capacity(self.steps.len());
        let mut configs = Vec::with_capacity(self.steps.len());

        for spec in &self.steps {
            let mut config = StepConfig::default();
            config.apply(&self.defaults);
            config.apply(&spec.config);

            steps.push(StepDefinition {
                name: spec.name.clone(),
                kind: spec.kind,
                required_inputs: spec.requires.clone(),
                produces_outputs: spec.produces.clone(),
                optional: spec.optional,
                prompt: spec.prompt.clone(),
                target: spec.target.clone(),
            });
            configs.push(config);
        }

        Ok(
            PipelineDefinition::with_configs(&self.name, self.inputs.clone(), steps, configs)?
                .with_version(self.version.clone()),
        )
    }
}

/// Load caller overrides (`step-name -> StepConfigOverride`) from a YAML file
pub fn load_overrides<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, StepConfigOverride>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read overrides file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid overrides file {}", path.display()))
}
