use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;

use super::context::StepContext;
use super::events::EventKind;
use super::{StepFuture, StepOutput};
use crate::llm::{Completion, ProviderError};

const SCORE_CONTRACT: &str =
    "Respond with a JSON object of the form {\"score\": <number from 1 to 10>} and nothing else.";

const VERDICT_CONTRACT: &str =
    "Respond with a JSON object of the form {\"answer\": true} or {\"answer\": false} and nothing else.";

#[derive(Debug, Deserialize)]
struct Score {
    score: f64,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    answer: bool,
}

/// Goal evaluator that asks the model to grade the step output against
/// `rubric` and passes once the score reaches `threshold`.
///
/// A reply that is not a valid score fails the attempt instead of the flow.
/// Transport and HTTP errors still propagate.
pub fn score_at_least(
    completion: Completion,
    label: impl Into<String>,
    system: impl Into<String>,
    rubric: impl Into<String>,
    threshold: f64,
) -> impl Fn(StepOutput, StepContext) -> StepFuture<bool> + Send + Sync + 'static {
    let label: Arc<str> = label.into().into();
    let system: Arc<str> = format!("{}\n\n{SCORE_CONTRACT}", system.into()).into();
    let rubric: Arc<str> = rubric.into().into();

    move |output, ctx| {
        let completion = completion.clone();
        let label = label.clone();
        let system = system.clone();
        let rubric = rubric.clone();

        async move {
            let user = format!("{rubric}\n\nContent to evaluate:\n{}", output.as_prompt());
            let reply = completion.generate_json::<Score>(&label, &system, &user).await;

            let score = match reply {
                Ok(Score { score }) if (0.0..=10.0).contains(&score) => score,
                Ok(Score { score }) => {
                    tracing::warn!(%label, score, "score out of range, attempt rejected");
                    return Ok(false);
                }
                Err(e) if is_unusable_reply(&e) => {
                    tracing::warn!(%label, error = %format!("{e:#}"), "unreadable score, attempt rejected");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };

            ctx.send(
                EventKind::Evaluation,
                format!("Quality score: {score:.1}/10 (target {threshold:.1})"),
                None,
            )
            .await;
            Ok(score >= threshold)
        }
        .boxed()
    }
}

/// Branch condition that puts a yes/no `question` about the step input to the model.
/// An unreadable reply counts as "no".
pub fn ask_yes_no(
    completion: Completion,
    label: impl Into<String>,
    system: impl Into<String>,
    question: impl Into<String>,
) -> impl Fn(StepOutput, StepContext) -> StepFuture<bool> + Send + Sync + 'static {
    let label: Arc<str> = label.into().into();
    let system: Arc<str> = format!("{}\n\n{VERDICT_CONTRACT}", system.into()).into();
    let question: Arc<str> = question.into().into();

    move |input, _ctx| {
        let completion = completion.clone();
        let label = label.clone();
        let system = system.clone();
        let question = question.clone();

        async move {
            let user = format!("{question}\n\n{}", input.as_prompt());
            match completion.generate_json::<Verdict>(&label, &system, &user).await {
                Ok(Verdict { answer }) => Ok(answer),
                Err(e) if is_unusable_reply(&e) => {
                    tracing::warn!(%label, error = %format!("{e:#}"), "unreadable verdict, taking no");
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        }
        .boxed()
    }
}

fn is_unusable_reply(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ProviderError>(),
        Some(ProviderError::Decode(_) | ProviderError::EmptyResponse)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::flows::builder::{FlowBuilder, StepBuilder};
    use crate::flows::events::AgentEvent;
    use crate::flows::executor::FlowExecutor;
    use crate::flows::sink::EventSink;
    use crate::llm::testing::{self, ScriptedProvider};

    /// Draft replies are numbered; JSON-mode requests get `score_reply`.
    fn grader(score_reply: &'static str) -> Arc<ScriptedProvider> {
        let drafts = AtomicUsize::new(0);
        Arc::new(ScriptedProvider::new(move |req| {
            if req.response_format.is_some() {
                Ok(score_reply.to_string())
            } else {
                let n = drafts.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("draft {n}"))
            }
        }))
    }

    async fn run_refinement(provider: Arc<ScriptedProvider>) -> Vec<AgentEvent> {
        let completion = testing::completion(provider);
        let writer = completion.clone();
        let flow = FlowBuilder::new()
            .name("Refine")
            .description("test")
            .step(StepBuilder::goal_based(
                "Story Refinement",
                "polish",
                move |input: StepOutput, _ctx| {
                    let writer = writer.clone();
                    async move {
                        let text = writer.generate("refine story", "editor", &input.as_prompt()).await?;
                        Ok(StepOutput::Text(text))
                    }
                },
                score_at_least(completion, "evaluate story", "You are a critic.", "Rate the story.", 8.5),
                3,
            ))
            .build()
            .unwrap();

        let (sink, mut rx) = EventSink::channel(64);
        FlowExecutor::new(sink).run(&flow, "a fox").await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn drafts(provider: &ScriptedProvider) -> usize {
        provider
            .requests()
            .iter()
            .filter(|r| r.response_format.is_none())
            .count()
    }

    #[tokio::test]
    async fn test_passing_score_stops_after_one_attempt() {
        let provider = grader(r#"{"score": 9.0}"#);
        let events = run_refinement(provider.clone()).await;

        assert_eq!(drafts(&provider), 1);
        let evaluation: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Evaluation).collect();
        assert_eq!(evaluation.len(), 1);
        assert_eq!(evaluation[0].message, "Quality score: 9.0/10 (target 8.5)");
        let result = events.iter().find(|e| e.kind == EventKind::Result).unwrap();
        assert_eq!(result.message, "draft 1");
    }

    #[tokio::test]
    async fn test_low_score_exhausts_attempts_and_keeps_last() {
        let provider = grader(r#"{"score": 1.0}"#);
        let events = run_refinement(provider.clone()).await;

        assert_eq!(drafts(&provider), 3);
        let result = events.iter().find(|e| e.kind == EventKind::Result).unwrap();
        assert_eq!(result.message, "draft 3");
        assert!(
            events
                .iter()
                .any(|e| e.message == "Reached maximum attempts (3). Using last result.")
        );
    }

    #[tokio::test]
    async fn test_unreadable_or_out_of_range_score_fails_attempt() {
        for reply in ["a solid nine", r#"{"score": 42}"#] {
            let provider = Arc::new(ScriptedProvider::new(move |_| Ok(reply.to_string())));
            let evaluate = score_at_least(testing::completion(provider), "evaluate", "critic", "rate", 5.0);
            let (sink, _rx) = EventSink::channel(8);
            let passed = evaluate(StepOutput::from("story"), StepContext::new(sink))
                .await
                .unwrap();
            assert!(!passed, "{reply} should not pass");
        }
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::new(|_| {
            Err(ProviderError::Status {
                status: 503,
                body: "overloaded".into(),
            })
        }));
        let evaluate = score_at_least(testing::completion(provider), "evaluate", "critic", "rate", 5.0);
        let (sink, _rx) = EventSink::channel(8);
        let err = evaluate(StepOutput::from("story"), StepContext::new(sink))
            .await
            .unwrap_err();
        assert_eq!(format!("{err:#}"), "failed to evaluate: provider returned 503: overloaded");
    }

    #[tokio::test]
    async fn test_system_prompt_carries_score_contract() {
        let provider = Arc::new(ScriptedProvider::new(|_| Ok(r#"{"score": 7}"#.to_string())));
        let evaluate = score_at_least(testing::completion(provider.clone()), "evaluate", "critic", "rate", 5.0);
        let (sink, _rx) = EventSink::channel(8);
        assert!(evaluate(StepOutput::from("x"), StepContext::new(sink)).await.unwrap());

        let request = &provider.requests()[0];
        assert!(testing::system_prompt(request).ends_with(SCORE_CONTRACT));
        assert!(testing::user_prompt(request).contains("Content to evaluate:\nx"));
    }

    #[tokio::test]
    async fn test_yes_no_reads_answer_and_defaults_to_no() {
        for (reply, expected) in [
            (r#"{"answer": true}"#, true),
            (r#"{"answer": false}"#, false),
            ("yes, definitely", false),
        ] {
            let provider = Arc::new(ScriptedProvider::new(move |_| Ok(reply.to_string())));
            let decide = ask_yes_no(testing::completion(provider.clone()), "decide", "editor", "Many voices?");
            let (sink, _rx) = EventSink::channel(8);
            let answer = decide(StepOutput::from("outline"), StepContext::new(sink)).await.unwrap();
            assert_eq!(answer, expected, "reply {reply}");

            let request = &provider.requests()[0];
            assert!(testing::system_prompt(request).ends_with(VERDICT_CONTRACT));
            assert_eq!(testing::user_prompt(request), "Many voices?\n\noutline");
        }
    }
}
