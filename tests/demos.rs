use std::path::PathBuf;

use llm_textcat_rs::{load_examples, ApiMode, Pipeline, PipelineConfig};

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[test]
fn demo_configs_load() {
    let zero_shot = PipelineConfig::from_path(demo("zero_shot.yaml")).unwrap();
    assert_eq!(zero_shot.endpoint.mode, None);
    assert_eq!(zero_shot.generation.max_tokens, 8);

    let chat = PipelineConfig::from_path(demo("few_shot_chat.json")).unwrap();
    assert_eq!(chat.endpoint.mode, Some(ApiMode::Chat));
    assert!(chat.generation.stop.is_empty());
}

#[test]
fn demo_examples_agree_across_formats() {
    let labels = PipelineConfig::from_path(demo("zero_shot.yaml")).unwrap().labels;
    let jsonl = load_examples(Some(demo("examples.jsonl").as_path()), &labels).unwrap();
    let json = load_examples(Some(demo("examples.json").as_path()), &labels).unwrap();
    let yaml = load_examples(Some(demo("examples.yaml").as_path()), &labels).unwrap();

    assert_eq!(jsonl.len(), 3);
    assert_eq!(jsonl, json);
    assert_eq!(json, yaml);
}

#[test]
fn demo_few_shot_prompt() {
    let pipeline = Pipeline::load(
        &demo("few_shot_chat.json"),
        Some(demo("examples.yaml").as_path()),
    )
    .unwrap();
    let prompt = pipeline.assemble_prompt("Nice shoes.").unwrap();

    assert!(prompt.starts_with(
        "Decide whether the text insults or compliments its subject.\nReply with one of: INSULT, COMPLIMENT.\n\nExamples:\n\n"
    ));
    assert!(prompt.contains("Text: Sam Malone has bad hair.\nLabel: INSULT\n\n"));
    assert!(prompt.ends_with("Text: Nice shoes.\nLabel:"));
    assert_eq!(prompt, pipeline.assemble_prompt("Nice shoes.").unwrap());
}
