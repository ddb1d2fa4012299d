//! The pipeline driver: config → examples → prompt → one completion → label.
//!
//! Each run is a single stateless request/response cycle. Nothing is cached
//! or retried between runs.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::client::{
    AzureOpenAIBackend, ClassificationClient, ClassificationResult, CohereBackend,
    CompletionBackend,
};
use crate::config::{PipelineConfig, Provider};
use crate::error::Result;
use crate::example_store::{load_examples, LabeledExample};

/// Arguments of one run, as taken from the command line.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input_text: String,
    pub config_path: PathBuf,
    pub examples_path: Option<PathBuf>,
    /// Print the assembled prompt instead of calling the endpoint.
    pub dry_run: bool,
}

/// What a successful run reported on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Label(String),
    Unrecognized(String),
    DryRun,
}

/// Config and examples loaded for one run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    examples: Vec<LabeledExample>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, examples: Vec<LabeledExample>) -> Self {
        Pipeline { config, examples }
    }

    pub fn load(config_path: &Path, examples_path: Option<&Path>) -> Result<Self> {
        let config = PipelineConfig::from_path(config_path)?;
        let examples = load_examples(examples_path, &config.labels)?;
        Ok(Pipeline::new(config, examples))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    pub fn assemble_prompt(&self, input_text: &str) -> Result<String> {
        let template = self.config.template()?;
        let prompt = template.render(
            &self.config.task_description,
            &self.config.labels,
            &self.examples,
            input_text,
        );
        debug!(%prompt, examples = self.examples.len(), "assembled prompt");
        Ok(prompt)
    }

    pub async fn classify<B: CompletionBackend>(
        &self,
        backend: B,
        input_text: &str,
    ) -> Result<ClassificationResult> {
        let prompt = self.assemble_prompt(input_text)?;
        let client = ClassificationClient::new(
            backend,
            self.config.labels.clone(),
            self.config.generation.clone(),
        );
        client.classify(&prompt).await
    }
}

/// Runs against the configured provider, resolving endpoint parameters
/// through `env` where the config leaves them out.
pub async fn run_pipeline<F, W>(request: &RunRequest, env: F, out: &mut W) -> Result<Outcome>
where
    F: Fn(&str) -> Option<String>,
    W: Write,
{
    let pipeline = Pipeline::load(&request.config_path, request.examples_path.as_deref())?;
    if request.dry_run {
        return dry_run(&pipeline, request, out);
    }
    let endpoint = &pipeline.config().endpoint;
    match endpoint.provider {
        Provider::Azure => {
            let backend = AzureOpenAIBackend::new(endpoint.resolve(env)?)?;
            info!(endpoint = ?backend.endpoint(), "resolved Azure OpenAI endpoint");
            report(&pipeline, backend, request, out).await
        }
        Provider::Cohere => {
            let backend = CohereBackend::new(endpoint.resolve_cohere(env)?)?;
            info!(endpoint = ?backend.endpoint(), "resolved Cohere endpoint");
            report(&pipeline, backend, request, out).await
        }
    }
}

/// Runs against a caller-supplied backend; endpoint parameters are not resolved.
pub async fn run_with_backend<B, W>(request: &RunRequest, backend: B, out: &mut W) -> Result<Outcome>
where
    B: CompletionBackend,
    W: Write,
{
    let pipeline = Pipeline::load(&request.config_path, request.examples_path.as_deref())?;
    if request.dry_run {
        return dry_run(&pipeline, request, out);
    }
    report(&pipeline, backend, request, out).await
}

fn dry_run<W: Write>(pipeline: &Pipeline, request: &RunRequest, out: &mut W) -> Result<Outcome> {
    let prompt = pipeline.assemble_prompt(&request.input_text)?;
    writeln!(out, "{prompt}")?;
    Ok(Outcome::DryRun)
}

async fn report<B, W>(
    pipeline: &Pipeline,
    backend: B,
    request: &RunRequest,
    out: &mut W,
) -> Result<Outcome>
where
    B: CompletionBackend,
    W: Write,
{
    let result = pipeline.classify(backend, &request.input_text).await?;
    if result.valid {
        writeln!(out, "{}", result.label)?;
        Ok(Outcome::Label(result.label))
    } else {
        warn!(raw = %result.raw, "reporting unrecognized label");
        writeln!(out, "unrecognized label: {}", result.label)?;
        Ok(Outcome::Unrecognized(result.raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationParams;
    use crate::error::PipelineError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const ZERO_SHOT: &str = "task_description: Classify the text as an insult or a compliment.\nlabels: [INSULT, COMPLIMENT]\n";

    /// Answers with a fixed completion and records the prompt it was sent.
    struct RecordingBackend {
        answer: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        fn new(answer: &'static str) -> Self {
            RecordingBackend {
                answer,
                seen: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl<'a> CompletionBackend for &'a RecordingBackend {
        async fn send(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
            self.seen.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.to_string())
        }
    }

    fn request(dir: &tempfile::TempDir, config: &str, examples: Option<(&str, &str)>) -> RunRequest {
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, config).unwrap();
        let examples_path = examples.map(|(name, contents)| {
            let path = dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        });
        RunRequest {
            input_text: String::from("You look great today! Nice shirt!"),
            config_path,
            examples_path,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn zero_shot_run_prints_label() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(&dir, ZERO_SHOT, None);
        let backend = RecordingBackend::new("COMPLIMENT");
        let mut out = Vec::new();

        let outcome = run_with_backend(&request, &backend, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Label(String::from("COMPLIMENT")));
        assert_eq!(String::from_utf8(out).unwrap(), "COMPLIMENT\n");
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ends_with("Text: You look great today! Nice shirt!\nLabel:"));
        assert!(!seen[0].contains("Examples:"));
    }

    #[tokio::test]
    async fn few_shot_run_sends_examples() {
        let dir = tempfile::tempdir().unwrap();
        let examples = "- text: Your hair is a disaster.\n  label: INSULT\n";
        let request = request(&dir, ZERO_SHOT, Some(("examples.yaml", examples)));
        let backend = RecordingBackend::new("insult");
        let mut out = Vec::new();

        run_with_backend(&request, &backend, &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "INSULT\n");
        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].contains("Text: Your hair is a disaster.\nLabel: INSULT\n"));
    }

    #[tokio::test]
    async fn unrecognized_answer_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(&dir, ZERO_SHOT, None);
        let backend = RecordingBackend::new("Maybe?");
        let mut out = Vec::new();

        let outcome = run_with_backend(&request, &backend, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Unrecognized(String::from("Maybe?")));
        assert_eq!(String::from_utf8(out).unwrap(), "unrecognized label: Maybe?\n");
    }

    #[tokio::test]
    async fn invalid_example_stops_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let examples = "{\"text\": \"ok\", \"label\": \"NEUTRAL\"}\n";
        let request = request(&dir, ZERO_SHOT, Some(("examples.jsonl", examples)));
        let backend = RecordingBackend::new("INSULT");
        let mut out = Vec::new();

        let err = run_with_backend(&request, &backend, &mut out).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidExample { index: 0, .. }));
        assert!(backend.seen.lock().unwrap().is_empty());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = format!(
            "{ZERO_SHOT}endpoint:\n  resource: acme\n  deployment: textcat\n  api_version: '2023-05-15'\n"
        );
        let request = request(&dir, &config, None);
        let mut out = Vec::new();

        let err = run_pipeline(&request, |_| None, &mut out).await.unwrap_err();

        assert!(matches!(err, PipelineError::MissingParameter { name: "api_key", .. }));
        assert!(err.to_string().contains("api_key"));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn cohere_provider_is_called_with_env_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/generate")
            .match_header("authorization", "Bearer co-key")
            .with_status(200)
            .with_body(r#"{"generations": [{"text": "COMPLIMENT"}]}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let config = format!(
            "{ZERO_SHOT}endpoint:\n  provider: cohere\n  base_url: {}\n",
            server.url()
        );
        let request = request(&dir, &config, None);
        let mut out = Vec::new();

        let env = |key: &str| (key == "CO_API_KEY").then(|| String::from("co-key"));
        let outcome = run_pipeline(&request, env, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::Label(String::from("COMPLIMENT")));
        assert_eq!(String::from_utf8(out).unwrap(), "COMPLIMENT\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cohere_without_key_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = format!("{ZERO_SHOT}endpoint:\n  provider: cohere\n");
        let request = request(&dir, &config, None);
        let mut out = Vec::new();

        let err = run_pipeline(&request, |_| None, &mut out).await.unwrap_err();

        match &err {
            PipelineError::MissingParameter { name, env_key } => {
                assert_eq!(*name, "api_key");
                assert_eq!(env_key, "CO_API_KEY");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn dry_run_prints_prompt_without_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = request(&dir, ZERO_SHOT, None);
        request.dry_run = true;
        let mut out = Vec::new();

        let outcome = run_pipeline(&request, |_| None, &mut out).await.unwrap();

        assert_eq!(outcome, Outcome::DryRun);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("Classify the text as an insult or a compliment.\n"));
        assert!(printed.ends_with("Label:\n"));
    }
}
