//! Prompt assembly.
//!
//! A template is parsed once into literal and placeholder segments and then
//! rendered by substitution, so text coming from examples or the input is
//! never itself scanned for placeholders.

use std::fmt::Write;

use crate::config::LabelSet;
use crate::error::{PipelineError, Result};
use crate::example_store::LabeledExample;

pub const DEFAULT_TEMPLATE: &str = "{task}\nValid labels: {labels}. Answer with exactly one label.\n\n{examples}Text: {input}\nLabel:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Task,
    Labels,
    Examples,
    Input,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "task" => Some(Field::Task),
            "labels" => Some(Field::Labels),
            "examples" => Some(Field::Examples),
            "input" => Some(Field::Input),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Field::Task => "{task}",
            Field::Labels => "{labels}",
            Field::Examples => "{examples}",
            Field::Input => "{input}",
        }
    }
}

/// `{task}`, `{examples}` and `{input}` must each appear exactly once and in
/// this order; `{labels}` is optional and may appear anywhere, at most once.
const ORDERED_FIELDS: [Field; 3] = [Field::Task, Field::Examples, Field::Input];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Field),
}

/// A parsed prompt template.
///
/// Placeholders: `{task}`, `{labels}`, `{examples}`, `{input}`. Literal
/// braces are written `{{` and `}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl Default for PromptTemplate {
    /// The segments of [`DEFAULT_TEMPLATE`].
    fn default() -> Self {
        PromptTemplate {
            segments: vec![
                Segment::Placeholder(Field::Task),
                Segment::Literal(String::from("\nValid labels: ")),
                Segment::Placeholder(Field::Labels),
                Segment::Literal(String::from(". Answer with exactly one label.\n\n")),
                Segment::Placeholder(Field::Examples),
                Segment::Literal(String::from("Text: ")),
                Segment::Placeholder(Field::Input),
                Segment::Literal(String::from("\nLabel:")),
            ],
        }
    }
}

impl PromptTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = vec![];
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(PipelineError::Configuration(format!(
                                    "prompt_template has an unclosed placeholder `{{{name}`"
                                )))
                            }
                        }
                    }
                    let field = Field::from_name(name.trim()).ok_or_else(|| {
                        PipelineError::Configuration(format!(
                            "prompt_template has an unknown placeholder `{{{name}}}`; \
                             expected one of {{task}}, {{labels}}, {{examples}}, {{input}}"
                        ))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(field));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        check_placeholders(&segments)?;
        Ok(PromptTemplate { segments })
    }

    /// Renders the prompt. Identical arguments always give an identical string.
    pub fn render(
        &self,
        task: &str,
        labels: &LabelSet,
        examples: &[LabeledExample],
        input: &str,
    ) -> String {
        let mut prompt = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => prompt.push_str(text),
                Segment::Placeholder(Field::Task) => prompt.push_str(task.trim()),
                Segment::Placeholder(Field::Labels) => {
                    let _ = write!(prompt, "{labels}");
                }
                Segment::Placeholder(Field::Examples) => {
                    prompt.push_str(&render_examples(examples));
                }
                Segment::Placeholder(Field::Input) => prompt.push_str(input.trim()),
            }
        }
        prompt
    }
}

fn check_placeholders(segments: &[Segment]) -> Result<()> {
    let fields: Vec<Field> = segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder(field) => Some(*field),
            Segment::Literal(_) => None,
        })
        .collect();
    for field in [Field::Task, Field::Labels, Field::Examples, Field::Input] {
        let count = fields.iter().filter(|f| **f == field).count();
        if count > 1 {
            return Err(PipelineError::Configuration(format!(
                "prompt_template uses {} {count} times; it may appear only once",
                field.name()
            )));
        }
        if count == 0 && field != Field::Labels {
            return Err(PipelineError::Configuration(format!(
                "prompt_template is missing the {} placeholder",
                field.name()
            )));
        }
    }
    let order: Vec<Field> = fields
        .into_iter()
        .filter(|field| *field != Field::Labels)
        .collect();
    if order != ORDERED_FIELDS {
        return Err(PipelineError::Configuration(String::from(
            "prompt_template must place {task}, {examples} and {input} in that order",
        )));
    }
    Ok(())
}

/// The examples block, or nothing at all when there are no examples.
fn render_examples(examples: &[LabeledExample]) -> String {
    if examples.is_empty() {
        return String::new();
    }
    let mut block = String::from("Examples:\n\n");
    for example in examples {
        let _ = write!(
            block,
            "Text: {}\nLabel: {}\n\n",
            example.text(),
            example.label()
        );
    }
    block
}
