use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tracing::Instrument;
use uuid::Uuid;

use super::context::StepContext;
use super::events::EventKind;
use super::sink::EventSink;
use super::{
    EvaluatorFn, ExecuteFn, Flow, ItemExecuteFn, ItemResult, ItemsFn, RetryInput, Step, StepKind,
    StepOutput,
};

const COMPLETED_MESSAGE: &str = "Flow completed successfully!";
const DEFAULT_ERROR_MESSAGE: &str = "Error occurred during flow execution";

enum RunOutcome {
    Finished,
    Disconnected { completed_steps: usize },
}

/// Runs one flow against one sink. Every run ends with the sink closed.
pub struct FlowExecutor {
    sink: EventSink,
}

impl FlowExecutor {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub async fn run(&self, flow: &Flow, input: impl Into<String>) {
        let run_id = Uuid::new_v4().to_string();
        let short_id = &run_id[..8];
        let span = tracing::info_span!("flow_run", flow = %flow.name, run = %short_id);
        tracing::info!(parent: &span, steps = flow.steps.len(), "▶ Started");

        let start = std::time::Instant::now();
        let input: Arc<str> = input.into().into();
        let result = self.run_steps(flow, input).instrument(span.clone()).await;
        let elapsed = format!("{:.1}s", start.elapsed().as_secs_f64());

        match result {
            Ok(RunOutcome::Finished) => {
                self.sink.send(EventKind::Status, COMPLETED_MESSAGE, None).await;
                tracing::info!(parent: &span, %elapsed, "✓ Completed");
            }
            Ok(RunOutcome::Disconnected { completed_steps }) => {
                tracing::info!(parent: &span, %elapsed, completed_steps, "client disconnected, run stopped");
            }
            Err(e) => {
                let message = match &flow.on_error {
                    Some(handler) => handler(&e),
                    None => DEFAULT_ERROR_MESSAGE.to_string(),
                };
                self.sink.send(EventKind::Status, message, None).await;
                tracing::error!(parent: &span, %elapsed, error = %format!("{e:#}"), "✗ Failed");
            }
        }

        self.sink.close();
    }

    async fn run_steps(&self, flow: &Flow, request: Arc<str>) -> Result<RunOutcome> {
        let initial = StepOutput::Text(request.to_string());
        let mut outputs: Vec<StepOutput> = Vec::with_capacity(flow.steps.len());

        for (index, step) in flow.steps.iter().enumerate() {
            if self.sink.is_disconnected() {
                return Ok(RunOutcome::Disconnected {
                    completed_steps: index,
                });
            }

            tracing::debug!(step = %step.name, kind = step.kind.label(), "step started");
            if let Some(status) = &step.status_message {
                self.sink.send(EventKind::Status, status.as_str(), None).await;
            }

            let input = match &step.input {
                Some(select) => select(&outputs)
                    .with_context(|| format!("selecting input for step '{}'", step.name))?,
                None => outputs.last().cloned().unwrap_or_else(|| initial.clone()),
            };

            let ctx = StepContext::for_request(self.sink.clone(), request.clone());
            let output = AssertUnwindSafe(self.run_step(step, input, &outputs, &ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(anyhow!("panicked: {}", panic_message(&*panic))))
                .with_context(|| format!("step '{}' failed", step.name))?;

            self.publish(step, &output, &ctx).await;
            tracing::info!(step = %step.name, "✓ Step completed");
            outputs.push(output);
        }

        Ok(RunOutcome::Finished)
    }

    fn run_step<'a>(
        &'a self,
        step: &'a Step,
        input: StepOutput,
        prior: &'a [StepOutput],
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, Result<StepOutput>> {
        async move {
            match &step.kind {
                StepKind::Sequential { execute } => execute(input, ctx.clone()).await,
                StepKind::Parallel { items, execute } => self.run_parallel(items, execute, prior, ctx).await,
                StepKind::GoalBased {
                    execute,
                    evaluator,
                    max_attempts,
                    retry_input,
                } => {
                    self.run_goal_based(execute, evaluator, max_attempts.get(), *retry_input, input, ctx)
                        .await
                }
                StepKind::Conditional {
                    condition,
                    on_true,
                    on_false,
                } => {
                    let taken = condition(input.clone(), ctx.clone()).await?;
                    tracing::debug!(step = %step.name, branch = taken, "condition evaluated");
                    let branch = if taken { on_true } else { on_false };
                    self.run_branch(branch, input, prior, ctx).await
                }
            }
        }
        .boxed()
    }

    /// Nested steps of a conditional: each one's output feeds the next.
    async fn run_branch(
        &self,
        steps: &[Step],
        input: StepOutput,
        prior: &[StepOutput],
        ctx: &StepContext,
    ) -> Result<StepOutput> {
        let mut current = input;
        for step in steps {
            if let Some(status) = &step.status_message {
                self.sink.send(EventKind::Status, status.as_str(), None).await;
            }
            let step_input = match &step.input {
                Some(select) => select(prior)
                    .with_context(|| format!("selecting input for step '{}'", step.name))?,
                None => current,
            };

            let step_ctx = ctx.fork();
            let output = self
                .run_step(step, step_input, prior, &step_ctx)
                .await
                .with_context(|| format!("step '{}' failed", step.name))?;
            self.publish(step, &output, &step_ctx).await;
            current = output;
        }
        Ok(current)
    }

    async fn run_parallel(
        &self,
        items: &ItemsFn,
        execute: &ItemExecuteFn,
        prior: &[StepOutput],
        ctx: &StepContext,
    ) -> Result<StepOutput> {
        let items = items(prior)?;
        let total = items.len();
        self.sink
            .send(
                EventKind::Status,
                format!("Starting parallel execution of {total} items..."),
                None,
            )
            .await;

        let runs = items.into_iter().enumerate().map(|(i, item)| {
            let position = i + 1;
            let item_ctx = ctx.fork();
            let execute = execute.clone();
            async move {
                item_ctx
                    .send(
                        EventKind::Status,
                        format!("Processing item {position}/{total}: {}", item.kind),
                        None,
                    )
                    .await;

                let kind = item.kind.clone();
                let outcome = AssertUnwindSafe(execute(item, item_ctx.clone()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(anyhow!("panicked: {}", panic_message(&*panic))));

                match outcome {
                    Ok(text) => {
                        item_ctx
                            .send(EventKind::Status, format!("Completed item {position}/{total}"), None)
                            .await;
                        ItemResult::ok(kind, text)
                    }
                    Err(e) => {
                        let message = format!("{e:#}");
                        tracing::warn!(item = position, %kind, error = %message, "parallel item failed");
                        item_ctx
                            .send(EventKind::Error, format!("Item {position} failed: {message}"), None)
                            .await;
                        ItemResult::failed(kind, message)
                    }
                }
            }
        });

        let results = join_all(runs).await;
        let failed = results.iter().filter(|r| r.is_error()).count();
        self.sink
            .send(
                EventKind::Status,
                format!(
                    "Parallel execution completed: {} succeeded, {failed} failed",
                    total - failed
                ),
                None,
            )
            .await;

        Ok(StepOutput::Results(results))
    }

    async fn run_goal_based(
        &self,
        execute: &ExecuteFn,
        evaluator: &EvaluatorFn,
        max_attempts: u32,
        retry_input: RetryInput,
        input: StepOutput,
        ctx: &StepContext,
    ) -> Result<StepOutput> {
        let mut attempt_input = input.clone();
        let mut attempt = 1;

        loop {
            let output = execute(attempt_input, ctx.clone()).await?;
            if evaluator(output.clone(), ctx.clone()).await? {
                tracing::debug!(attempt, "goal met");
                return Ok(output);
            }

            if attempt >= max_attempts {
                self.sink
                    .send(
                        EventKind::Status,
                        format!("Reached maximum attempts ({max_attempts}). Using last result."),
                        None,
                    )
                    .await;
                return Ok(output);
            }

            self.sink
                .send(
                    EventKind::Status,
                    format!("Attempt {attempt}/{max_attempts} did not meet goal. Retrying..."),
                    None,
                )
                .await;

            attempt_input = match retry_input {
                RetryInput::PreviousAttempt => output,
                RetryInput::OriginalInput => input.clone(),
            };
            attempt += 1;
        }
    }

    /// A conditional's nested steps publish their own output, so the
    /// conditional itself never does.
    async fn publish(&self, step: &Step, output: &StepOutput, ctx: &StepContext) {
        if step.streamed || matches!(step.kind, StepKind::Conditional { .. }) {
            return;
        }
        let rendered = match &step.output_processor {
            Some(process) => Some(process(output)),
            None => output.render(),
        };
        if let Some(text) = rendered.filter(|t| !t.is_empty()) {
            ctx.send_chunk(step.emits, text).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
