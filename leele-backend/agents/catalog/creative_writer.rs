use super::{aspect_step, aspects, prompt_step};
use crate::agents::AgentDefinition;
use crate::flows::builder::{FlowBuildError, FlowBuilder, StepBuilder};
use crate::flows::evaluate::{ask_yes_no, score_at_least};
use crate::flows::events::EventKind;
use crate::flows::{ItemResult, StepOutput};
use crate::llm::Completion;

const OUTLINE: &str = "Create a detailed outline for a short story on the topic below. Cover the \
main plot points, the key characters, the setting, and the themes worth exploring.";

const PERSPECTIVE_QUESTION: &str = "Would the story in this outline benefit from being told from \
several characters' perspectives? Weigh the plot's complexity, the number of key characters, and \
how much their viewpoints conflict.";

const PERSPECTIVES: &str = "Write the story in this outline as a sequence of segments, each told \
from a different key character's perspective. Keep every segment emotional and personal to its \
narrator's viewpoint.";

const DRAFT: &str = "Write a complete short story that follows this outline, in a strong and \
unified narrative voice.";

const REFINE: &str = "Improve this story: sharpen the descriptive language, strengthen the \
characters' motivations, and tighten the plot. Return the complete improved story.";

const RUBRIC: &str = "Grade the story's overall quality, weighing descriptive language, \
character development, and plot coherence.";

const COMPLEMENTS: &[&str] = &["title", "summary", "themes"];

const COMPLEMENT_PROMPTS: &[(&str, &str)] = &[
    ("title", "Write an engaging title for this story. Return only the title."),
    ("summary", "Write a compelling one-paragraph summary of this story."),
    ("themes", "List the main themes of this story as a bulleted list."),
];

pub fn definition(completion: &Completion) -> Result<AgentDefinition, FlowBuildError> {
    let flow = FlowBuilder::new()
        .name("Creative Writer")
        .description("Writes a short story from a topic, polishes it, and adds a title, summary, and themes")
        .step(
            StepBuilder::sequential(
                "Topic Analysis",
                "Analyze the topic and outline the story",
                prompt_step(completion, "outline story", "You are a story planner.", OUTLINE),
            )
            .status("Analyzing topic and creating outline...")
            .emits(EventKind::Plan),
        )
        .step(
            StepBuilder::conditional(
                "Perspective Check",
                "Decide whether the story needs multiple perspectives",
                ask_yes_no(
                    completion.clone(),
                    "check perspectives",
                    "You are a narrative structure consultant.",
                    PERSPECTIVE_QUESTION,
                ),
                vec![
                    StepBuilder::sequential(
                        "Multiple Perspectives",
                        "Write the story from several character viewpoints",
                        prompt_step(completion, "write perspectives", "You are an ensemble fiction writer.", PERSPECTIVES),
                    )
                    .status("Writing from multiple perspectives..."),
                ],
                vec![
                    StepBuilder::sequential(
                        "Single Narrative",
                        "Write the story in one narrative voice",
                        prompt_step(completion, "draft story", "You are a fiction writer.", DRAFT),
                    )
                    .status("Writing a single narrative..."),
                ],
            )
            .status("Determining optimal narrative structure..."),
        )
        .step(
            StepBuilder::goal_based(
                "Story Refinement",
                "Refine the story until it meets the quality bar",
                prompt_step(completion, "refine story", "You are a fiction editor.", REFINE),
                score_at_least(completion.clone(), "evaluate story", "You are a literary critic.", RUBRIC, 8.5),
                3,
            )
            .status("Refining story for optimal quality...")
            .emits(EventKind::Refinement),
        )
        .step(
            StepBuilder::parallel(
                "Complementary Content",
                "Generate a title, summary, and themes for the story",
                aspects(COMPLEMENTS),
                aspect_step(completion, "generate story extras", "You are a literary editor.", COMPLEMENT_PROMPTS),
            )
            .status("Generating complementary content...")
            .output(format_complements),
        )
        .on_error(|e| format!("Sorry, there was an error in the creative process: {e:#}"))
        .build()?;

    Ok(AgentDefinition::new("creative-writer", "Please provide a story topic!", flow))
}

/// Title, summary, then themes; failed items are left out.
fn format_complements(output: &StepOutput) -> String {
    let StepOutput::Results(results) = output else {
        return output.as_prompt();
    };

    let mut valid: Vec<&ItemResult> = results.iter().filter(|r| !r.is_error()).collect();
    if valid.is_empty() {
        return "No valid complementary content was generated.".to_string();
    }
    valid.sort_by_key(|r| {
        COMPLEMENTS
            .iter()
            .position(|kind| *kind == r.kind)
            .unwrap_or(usize::MAX)
    });

    valid
        .into_iter()
        .filter_map(|result| {
            let text = result.text()?.trim();
            Some(match result.kind.as_str() {
                "title" => format!("Title: {}", clean_title(text)),
                "summary" => format!("Summary:\n{text}"),
                "themes" => format!("Themes:\n{}", text.replace("**", "").trim()),
                other => format!("{other}:\n{text}"),
            })
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// First line without markdown emphasis, heading markers, or quotes.
fn clean_title(text: &str) -> &str {
    text.lines()
        .map(|line| line.trim_matches(|c: char| c == '*' || c == '#' || c == '"' || c.is_whitespace()))
        .find(|line| !line.is_empty())
        .unwrap_or(text)
}
