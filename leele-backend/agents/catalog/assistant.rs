use crate::agents::AgentDefinition;
use crate::flows::StepOutput;
use crate::flows::builder::{FlowBuildError, FlowBuilder, StepBuilder};
use crate::flows::context::StepContext;
use crate::flows::events::EventKind;
use crate::llm::Completion;

const PLANNER: &str = "You are a careful assistant. Before answering, lay out a short numbered plan \
describing how you will answer the user's request. Do not answer it yet.";

const RESPONDER: &str = "You are a knowledgeable assistant. Follow the plan you are given and \
write a clear, well-structured answer to the user's request.";

const REVIEWER: &str = "You are an editor. Review the draft answer against the original request, \
then return an improved final version that fixes gaps, errors, and unclear passages.";

/// General question answering: plan, answer, then a reviewed final answer, all streamed.
pub fn definition(completion: &Completion) -> Result<AgentDefinition, FlowBuildError> {
    let planner = completion.clone();
    let responder = completion.clone();
    let reviewer = completion.clone();

    let flow = FlowBuilder::new()
        .name("Assistant")
        .description("Plans, answers, and then reviews its own answer")
        .step(
            StepBuilder::sequential("Plan", "Outline how to answer", move |_input, ctx: StepContext| {
                let completion = planner.clone();
                async move {
                    let plan = ctx
                        .stream_completion(&completion, EventKind::Plan, "generate plan", PLANNER, ctx.request())
                        .await?;
                    Ok(StepOutput::Text(plan))
                }
            })
            .status("Let me analyze this request...")
            .emits(EventKind::Plan)
            .streamed(),
        )
        .step(
            StepBuilder::sequential("Answer", "Answer following the plan", move |plan: StepOutput, ctx: StepContext| {
                let completion = responder.clone();
                async move {
                    let user = format!("Request:\n{}\n\nPlan:\n{}", ctx.request(), plan.as_prompt());
                    let answer = ctx
                        .stream_completion(&completion, EventKind::Result, "generate response", RESPONDER, &user)
                        .await?;
                    Ok(StepOutput::Text(answer))
                }
            })
            .status("I'll write a comprehensive response...")
            .streamed(),
        )
        .step(
            StepBuilder::sequential("Review", "Review and improve the answer", move |draft: StepOutput, ctx: StepContext| {
                let completion = reviewer.clone();
                async move {
                    let user = format!("Request:\n{}\n\nDraft answer:\n{}", ctx.request(), draft.as_prompt());
                    let refined = ctx
                        .stream_completion(&completion, EventKind::Refinement, "refine response", REVIEWER, &user)
                        .await?;
                    Ok(StepOutput::Text(refined))
                }
            })
            .status("Finally, I'll review and improve my answer...")
            .emits(EventKind::Refinement)
            .streamed(),
        )
        .on_error(|e| format!("Sorry, I couldn't finish answering: {e:#}"))
        .build()?;

    Ok(AgentDefinition::new("agent", "Missing user prompt", flow))
}
