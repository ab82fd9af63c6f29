use super::{aspect_step, aspects, prompt_step, sections, whole_document};
use crate::agents::AgentDefinition;
use crate::flows::StepOutput;
use crate::flows::builder::{FlowBuildError, FlowBuilder, StepBuilder};
use crate::flows::evaluate::score_at_least;
use crate::flows::events::EventKind;
use crate::llm::Completion;

const CONCEPT: &str = "Analyze this software concept. Cover the core technical requirements, an \
architecture overview, the main technical challenges, a recommended technology stack, and the \
initial scope boundaries.";

const RESEARCH: &str = "Based on this analysis, design the system architecture: components, data \
flow, API surface, integration points, and security considerations.";

const AREAS: &[&str] = &["backend", "frontend", "infrastructure", "security", "performance"];

const AREA_PROMPTS: &[(&str, &str)] = &[
    ("backend", "Detail the backend services, data stores, and API design."),
    ("frontend", "Outline the client architecture, state management, and UI concerns."),
    ("infrastructure", "Describe deployment, scaling, observability, and operational requirements."),
    ("security", "Analyze authentication, authorization, and data protection requirements."),
    ("performance", "Identify performance targets, likely bottlenecks, and caching strategy."),
];

const DECISIONS: &str = "From these architecture analyses, record the key technical decisions \
with alternatives considered and trade-offs, then lay out development phases, dependencies, risks, \
and timeline estimates.";

const ASSEMBLY: &str = "Assemble a complete technical blueprint from the material below, with \
sections for the technical summary, system architecture, component specifications, API \
documentation, security, implementation roadmap, performance, and scalability. If the material is \
already a blueprint, return an improved version of it.";

const RUBRIC: &str = "Grade this technical blueprint's completeness and quality, weighing \
technical depth and accuracy, architectural completeness, feasibility, and security.";

pub fn definition(completion: &Completion) -> Result<AgentDefinition, FlowBuildError> {
    let flow = FlowBuilder::new()
        .name("Technical Blueprint Generator")
        .description("Turns a software concept into a reviewed technical blueprint")
        .step(
            StepBuilder::sequential(
                "Concept Analysis",
                "Analyze the concept and outline the system",
                prompt_step(completion, "analyze concept", "You are a senior software architect.", CONCEPT),
            )
            .status("Analyzing software concept and creating initial structure...")
            .emits(EventKind::Plan),
        )
        .step(
            StepBuilder::sequential(
                "Technical Research",
                "Research approaches and design the architecture",
                prompt_step(completion, "research architecture", "You are a technical architect.", RESEARCH),
            )
            .status("Researching technical approaches and best practices..."),
        )
        .step(
            StepBuilder::parallel(
                "Architecture Analysis",
                "Analyze backend, frontend, infrastructure, security, and performance",
                aspects(AREAS),
                aspect_step(completion, "analyze architecture", "You are a specialized technical architect.", AREA_PROMPTS),
            )
            .status("Analyzing different architectural aspects...")
            .output(sections),
        )
        .step(
            StepBuilder::sequential(
                "Design Decisions",
                "Record key technical decisions and the delivery plan",
                prompt_step(completion, "record design decisions", "You are a technical lead.", DECISIONS),
            )
            .status("Making and documenting key technical decisions...")
            .input(|prior| Ok(StepOutput::Text(prior.last().map(sections).unwrap_or_default()))),
        )
        .step(
            StepBuilder::goal_based(
                "Blueprint Assembly",
                "Assemble and refine the final blueprint",
                prompt_step(completion, "assemble blueprint", "You are a technical documentation specialist.", ASSEMBLY),
                score_at_least(completion.clone(), "evaluate blueprint", "You are a technical review specialist.", RUBRIC, 8.5),
                3,
            )
            .status("Assembling and refining the final technical blueprint...")
            .emits(EventKind::Refinement)
            .input(|prior| Ok(StepOutput::Text(whole_document(prior)))),
        )
        .on_error(|e| format!("Error generating technical blueprint: {e:#}"))
        .build()?;

    Ok(AgentDefinition::new("tech-blueprint", "Please provide a software concept!", flow))
}
