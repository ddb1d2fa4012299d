//! Pipeline configuration: task, label set, prompt template, endpoint and
//! generation parameters.
//!
//! The config file is JSON or YAML, picked by extension. Endpoint parameters
//! may be left out of the file and supplied through the environment instead:
//! `AZURE_OPENAI_*` for Azure OpenAI (see [`EndpointConfig::resolve`]) and
//! `CO_API_KEY` for Cohere (see [`EndpointConfig::resolve_cohere`]).

use std::fmt;
use std::path::Path;

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::to_string_pretty;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::prompt::PromptTemplate;

pub const AZURE_ENV_PREFIX: &str = "AZURE_OPENAI_";
pub const AZURE_ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";
pub const AZURE_IS_CHAT_ENV: &str = "AZURE_OPENAI_IS_CHAT";
pub const COHERE_API_KEY_ENV: &str = "CO_API_KEY";
pub const COHERE_BASE_URL: &str = "https://api.cohere.ai";

const DEFAULT_MAX_TOKENS: u32 = 16;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything a single run needs, loaded once and read-only afterwards.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Instruction placed at the top of every prompt.
    pub task_description: String,
    /// Valid labels, as a list or a comma-separated string.
    #[schemars(with = "RawLabels")]
    pub labels: LabelSet,
    /// Custom template using `{task}`, `{labels}`, `{examples}` and `{input}`.
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub generation: GenerationParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            _ => Err(PipelineError::Configuration(format!(
                "unsupported config file format for {}: expected .json, .yaml or .yml",
                path.display()
            ))),
        }
    }
}

impl PipelineConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "could not read config file {}: {e}",
                path.display()
            ))
        })?;
        debug!(path = %path.display(), ?format, "loading pipeline config");
        let config: PipelineConfig = match format {
            ConfigFormat::Json => serde_json::from_str(&contents).map_err(|e| {
                PipelineError::Configuration(format!("invalid config {}: {e}", path.display()))
            })?,
            ConfigFormat::Yaml => serde_yaml::from_str(&contents).map_err(|e| {
                PipelineError::Configuration(format!("invalid config {}: {e}", path.display()))
            })?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(contents)
            .map_err(|e| PipelineError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(contents)
            .map_err(|e| PipelineError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// The template this config renders with: its own, or the built-in default.
    pub fn template(&self) -> Result<PromptTemplate> {
        match &self.prompt_template {
            Some(template) => PromptTemplate::parse(template),
            None => Ok(PromptTemplate::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.task_description.trim().is_empty() {
            return Err(PipelineError::Configuration(String::from(
                "task_description must not be empty",
            )));
        }
        if self.generation.timeout_secs == 0 {
            return Err(PipelineError::Configuration(String::from(
                "generation.timeout_secs must be greater than zero",
            )));
        }
        self.template().map(|_| ())
    }
}

/// JSON Schema describing the config file, pretty-printed.
pub fn config_schema() -> Result<String> {
    let schema = schema_for!(PipelineConfig);
    to_string_pretty(&schema)
        .map_err(|e| PipelineError::Configuration(format!("could not render schema: {e}")))
}

/// Labels as written in a config file.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawLabels {
    List(Vec<String>),
    CommaSeparated(String),
}

/// The closed, ordered vocabulary of valid labels.
///
/// Lookups are case-insensitive and always hand back the label spelled the
/// way it was configured.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLabels")]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        LabelSet::build(labels).map_err(PipelineError::Configuration)
    }

    fn build<I, S>(labels: I) -> std::result::Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set: Vec<String> = vec![];
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() {
                return Err(String::from("labels must not contain empty entries"));
            }
            if set.iter().any(|existing| same_label(existing, label)) {
                return Err(format!("duplicate label: {label}"));
            }
            set.push(label.to_string());
        }
        if set.is_empty() {
            return Err(String::from("at least one label is required"));
        }
        Ok(LabelSet { labels: set })
    }

    /// Splits a comma-separated list such as `"INSULT, COMPLIMENT"`.
    pub fn parse_csv(labels: &str) -> Result<Self> {
        LabelSet::new(labels.split(','))
    }

    /// Whole-string, case-insensitive match after trimming.
    pub fn find(&self, candidate: &str) -> Option<&str> {
        let candidate = candidate.trim();
        self.labels
            .iter()
            .find(|label| same_label(label, candidate))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn same_label(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl TryFrom<RawLabels> for LabelSet {
    type Error = String;

    fn try_from(value: RawLabels) -> std::result::Result<Self, String> {
        match value {
            RawLabels::List(labels) => LabelSet::build(labels),
            RawLabels::CommaSeparated(labels) => LabelSet::build(labels.split(',')),
        }
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.labels.join(", "))
    }
}

/// Hosted service the completion request goes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Azure,
    Cohere,
}

/// Which Azure OpenAI route to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApiMode {
    #[default]
    Completion,
    Chat,
}

impl ApiMode {
    /// Reads an `AZURE_OPENAI_IS_CHAT` value.
    fn from_is_chat(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(ApiMode::Chat),
            "0" | "false" | "no" => Ok(ApiMode::Completion),
            _ => Err(PipelineError::Configuration(format!(
                "{AZURE_IS_CHAT_ENV} must be true or false, got `{value}`"
            ))),
        }
    }
}

/// Endpoint parameters as written in the config file. Any of them may be
/// missing here and picked up from the environment at resolution time.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    #[serde(default)]
    pub provider: Provider,
    pub resource: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub api_key: Option<String>,
    /// Replaces `https://{resource}.openai.azure.com` (`resource` is then
    /// optional) or, for Cohere, `https://api.cohere.ai`.
    pub base_url: Option<String>,
    /// Azure only. Falls back to `AZURE_OPENAI_IS_CHAT`, then `completion`.
    pub mode: Option<ApiMode>,
    /// Cohere only: the `model` field of the generate request.
    pub model: Option<String>,
}

/// Endpoint parameters after the config → environment resolution chain.
#[derive(Clone)]
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub deployment: String,
    pub api_version: String,
    pub api_key: String,
    pub mode: ApiMode,
}

impl fmt::Debug for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResolvedEndpoint")
            .field("base_url", &self.base_url)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("api_key", &"<redacted>")
            .field("mode", &self.mode)
            .finish()
    }
}

impl ResolvedEndpoint {
    pub fn url(&self) -> String {
        let route = match self.mode {
            ApiMode::Completion => "completions",
            ApiMode::Chat => "chat/completions",
        };
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.base_url.trim_end_matches('/'),
            self.deployment,
            route,
            self.api_version
        )
    }
}

impl EndpointConfig {
    /// Resolves every parameter: explicit config value first, then the
    /// environment (through `env`), otherwise [`PipelineError::MissingParameter`].
    pub fn resolve<F>(&self, env: F) -> Result<ResolvedEndpoint>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = match pick(self.base_url.as_deref(), AZURE_ENDPOINT_ENV, &env) {
            Some(base_url) => base_url,
            None => {
                let resource = require(self.resource.as_deref(), "resource", &env)?;
                format!("https://{resource}.openai.azure.com")
            }
        };
        let deployment = require(self.deployment.as_deref(), "deployment", &env)?;
        let api_version = require(self.api_version.as_deref(), "api_version", &env)?;
        let api_key = require(self.api_key.as_deref(), "api_key", &env)?;
        let mode = match self.mode {
            Some(mode) => mode,
            None => match env(AZURE_IS_CHAT_ENV).as_deref().and_then(non_empty) {
                Some(value) => ApiMode::from_is_chat(&value)?,
                None => ApiMode::default(),
            },
        };
        Ok(ResolvedEndpoint {
            base_url,
            deployment,
            api_version,
            api_key,
            mode,
        })
    }

    /// Resolves the Cohere parameters: `api_key` from config, then
    /// `CO_API_KEY`; `base_url` from config, otherwise the public API host.
    pub fn resolve_cohere<F>(&self, env: F) -> Result<ResolvedCohere>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = pick(self.api_key.as_deref(), COHERE_API_KEY_ENV, &env).ok_or_else(|| {
            PipelineError::MissingParameter {
                name: "api_key",
                env_key: COHERE_API_KEY_ENV.to_string(),
            }
        })?;
        let base_url = self
            .base_url
            .as_deref()
            .and_then(non_empty)
            .unwrap_or_else(|| COHERE_BASE_URL.to_string());
        Ok(ResolvedCohere {
            base_url,
            api_key,
            model: self.model.as_deref().and_then(non_empty),
        })
    }
}

/// Cohere parameters after resolution.
#[derive(Clone)]
pub struct ResolvedCohere {
    pub base_url: String,
    pub api_key: String,
    pub model: Option<String>,
}

impl fmt::Debug for ResolvedCohere {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResolvedCohere")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl ResolvedCohere {
    pub fn url(&self) -> String {
        format!("{}/v1/generate", self.base_url.trim_end_matches('/'))
    }
}

fn env_key(name: &str) -> String {
    format!("{AZURE_ENV_PREFIX}{}", name.to_uppercase())
}

fn pick<F>(explicit: Option<&str>, env_key: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .and_then(non_empty)
        .or_else(|| env(env_key).as_deref().and_then(non_empty))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn require<F>(explicit: Option<&str>, name: &'static str, env: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let key = env_key(name);
    pick(explicit, &key, env).ok_or(PipelineError::MissingParameter { name, env_key: key })
}

/// Generation parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub stop: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            stop: vec![String::from("\n")],
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}
