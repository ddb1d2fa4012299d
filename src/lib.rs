//! Zero-shot and few-shot text classification against a hosted completion
//! endpoint.
//!
//! A run loads a [`PipelineConfig`], optionally loads labeled examples,
//! renders one prompt, sends it to an Azure OpenAI deployment or to Cohere
//! and checks the answer against the configured label set.
//!
//! ```rust,no_run
//! use llm_textcat_rs::{run_pipeline, RunRequest};
//!
//! # async fn demo() -> llm_textcat_rs::Result<()> {
//! let request = RunRequest {
//!     input_text: String::from("You look great today! Nice shirt!"),
//!     config_path: "demos/zero_shot.yaml".into(),
//!     examples_path: None,
//!     dry_run: false,
//! };
//! let mut stdout = std::io::stdout();
//! run_pipeline(&request, |key| std::env::var(key).ok(), &mut stdout).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod example_store;
pub mod logging;
pub mod pipeline;
pub mod prompt;

pub use client::{
    AzureOpenAIBackend, ClassificationClient, ClassificationResult, CohereBackend,
    CompletionBackend,
};
pub use config::{
    config_schema, ApiMode, EndpointConfig, GenerationParams, LabelSet, PipelineConfig, Provider,
};
pub use error::{PipelineError, Result};
pub use example_store::{load_examples, LabeledExample};
pub use pipeline::{run_pipeline, run_with_backend, Outcome, Pipeline, RunRequest};
pub use prompt::PromptTemplate;
