//! The agents this server ships with, built once at startup.

pub mod assistant;
pub mod creative_writer;
pub mod prd_generator;
pub mod smart_chef;
pub mod tech_blueprint;

use anyhow::bail;
use futures::FutureExt;

use super::AgentDefinition;
use crate::flows::builder::FlowBuildError;
use crate::flows::context::StepContext;
use crate::flows::{ItemOutcome, StepFuture, StepOutput, WorkItem};
use crate::llm::Completion;

pub fn build(completion: &Completion) -> Result<Vec<AgentDefinition>, FlowBuildError> {
    Ok(vec![
        assistant::definition(completion)?,
        creative_writer::definition(completion)?,
        prd_generator::definition(completion)?,
        tech_blueprint::definition(completion)?,
        smart_chef::definition(completion)?,
    ])
}

/// Sequential step body: `instructions` followed by the step input, answered under `system`.
fn prompt_step(
    completion: &Completion,
    label: &'static str,
    system: &'static str,
    instructions: &'static str,
) -> impl Fn(StepOutput, StepContext) -> StepFuture<StepOutput> + Send + Sync + 'static {
    let completion = completion.clone();
    move |input, _ctx| {
        let completion = completion.clone();
        async move {
            let user = format!("{instructions}\n\n{}", input.as_prompt());
            let text = completion.generate(label, system, &user).await?;
            Ok(StepOutput::Text(text))
        }
        .boxed()
    }
}

/// One work item per aspect, each carrying the latest output.
fn aspects(
    kinds: &'static [&'static str],
) -> impl Fn(&[StepOutput]) -> anyhow::Result<Vec<WorkItem>> + Send + Sync + 'static {
    move |prior| {
        let content = prior.last().map(StepOutput::as_prompt).unwrap_or_default();
        Ok(kinds
            .iter()
            .map(|kind| WorkItem::new(*kind, content.clone()))
            .collect())
    }
}

/// Parallel item body: instructions are looked up by the item's kind.
fn aspect_step(
    completion: &Completion,
    label: &'static str,
    system: &'static str,
    prompts: &'static [(&'static str, &'static str)],
) -> impl Fn(WorkItem, StepContext) -> StepFuture<String> + Send + Sync + 'static {
    let completion = completion.clone();
    move |item, _ctx| {
        let completion = completion.clone();
        async move {
            let Some((_, instructions)) = prompts.iter().find(|(kind, _)| *kind == item.kind) else {
                bail!("unknown aspect '{}'", item.kind);
            };
            let user = format!("{instructions}\n\n{}", item.content);
            completion.generate(label, system, &user).await
        }
        .boxed()
    }
}

/// Markdown sections, one per parallel result.
fn sections(output: &StepOutput) -> String {
    let StepOutput::Results(results) = output else {
        return output.as_prompt();
    };
    results
        .iter()
        .map(|result| match &result.outcome {
            ItemOutcome::Result(text) => format!("## {}\n\n{}", heading(&result.kind), text.trim()),
            ItemOutcome::Error(error) => format!("## {}\n\n_Not available: {error}_", heading(&result.kind)),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Every prior output as one document, parallel results expanded into sections.
fn whole_document(prior: &[StepOutput]) -> String {
    prior
        .iter()
        .map(sections)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn heading(kind: &str) -> String {
    match kind {
        "ux" => "UX".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}
