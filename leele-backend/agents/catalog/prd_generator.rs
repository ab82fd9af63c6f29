use super::{aspect_step, aspects, prompt_step, sections, whole_document};
use crate::agents::AgentDefinition;
use crate::flows::StepOutput;
use crate::flows::builder::{FlowBuildError, FlowBuilder, StepBuilder};
use crate::flows::evaluate::score_at_least;
use crate::flows::events::EventKind;
use crate::llm::Completion;

const ANALYSIS: &str = "Analyze these product requirements. Describe the core problem, the target \
audience, the key objectives, how success will be measured, and the initial scope boundaries.";

const MARKET: &str = "Using this requirements analysis, research the market: comparable products, \
competitors and their weaknesses, and the opportunity this product can take.";

const FEATURES: &[&str] = &["functional", "technical", "ux", "security"];

const FEATURE_PROMPTS: &[(&str, &str)] = &[
    ("functional", "Detail the core functional requirements and user flows for this product."),
    ("technical", "Outline the technical architecture, system requirements, and implementation concerns."),
    ("ux", "Describe the user experience goals, interaction patterns, and design principles."),
    ("security", "Analyze security requirements, data protection needs, and compliance obligations."),
];

const INTEGRATION: &str = "From these feature analyses, write an implementation plan covering \
development phases, resources, dependencies, risks with mitigations, and timeline estimates.";

const ASSEMBLY: &str = "Assemble a complete, professional product requirements document from the \
material below, with sections for the executive summary, problem and objectives, market analysis, \
features and requirements, technical specifications, UX requirements, security, implementation \
plan, and success metrics. If the material is already a PRD, return an improved version of it.";

const RUBRIC: &str = "Grade this PRD's completeness and quality, weighing clarity and structure, \
technical depth, business alignment, and implementation feasibility.";

pub fn definition(completion: &Completion) -> Result<AgentDefinition, FlowBuildError> {
    let flow = FlowBuilder::new()
        .name("PRD Generator")
        .description("Turns high-level product requirements into a complete PRD")
        .step(
            StepBuilder::sequential(
                "Requirements Analysis",
                "Analyze the requirements and outline the product",
                prompt_step(completion, "analyze requirements", "You are a senior product manager.", ANALYSIS),
            )
            .status("Analyzing requirements and creating initial structure...")
            .emits(EventKind::Plan),
        )
        .step(
            StepBuilder::sequential(
                "Market Research",
                "Research the market and competition",
                prompt_step(completion, "research market", "You are a market research analyst.", MARKET),
            )
            .status("Conducting market research and competitive analysis..."),
        )
        .step(
            StepBuilder::parallel(
                "Feature Analysis",
                "Analyze functional, technical, UX, and security aspects",
                aspects(FEATURES),
                aspect_step(completion, "analyze features", "You are a technical product analyst.", FEATURE_PROMPTS),
            )
            .status("Breaking down and analyzing different aspects of the product...")
            .output(sections),
        )
        .step(
            StepBuilder::sequential(
                "Integration Planning",
                "Plan implementation and timeline",
                prompt_step(completion, "plan integration", "You are a project planner.", INTEGRATION),
            )
            .status("Creating implementation plan and timeline...")
            .input(|prior| Ok(StepOutput::Text(prior.last().map(sections).unwrap_or_default()))),
        )
        .step(
            StepBuilder::goal_based(
                "PRD Assembly",
                "Assemble and refine the final PRD",
                prompt_step(completion, "assemble PRD", "You are a PRD documentation specialist.", ASSEMBLY),
                score_at_least(completion.clone(), "evaluate PRD", "You are a PRD quality analyst.", RUBRIC, 8.5),
                3,
            )
            .status("Assembling and refining the final PRD...")
            .emits(EventKind::Refinement)
            .input(|prior| Ok(StepOutput::Text(whole_document(prior)))),
        )
        .on_error(|e| format!("Error generating PRD: {e:#}"))
        .build()?;

    Ok(AgentDefinition::new("prd-generator", "Please provide product requirements!", flow))
}
