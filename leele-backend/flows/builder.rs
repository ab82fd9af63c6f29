//! Fluent construction of [`Flow`]s.
//!
//! ```ignore
//! let flow = FlowBuilder::new()
//!     .name("Creative Writer")
//!     .description("Writes and polishes short stories")
//!     .step(StepBuilder::sequential("Outline", "Plan the story", outline).status("Outlining..."))
//!     .step(StepBuilder::goal_based("Refine", "Polish", refine, good_enough, 3))
//!     .on_error(|e| format!("Sorry, the story failed: {e:#}"))
//!     .build()?;
//! ```

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;

use super::context::StepContext;
use super::events::EventKind;
use super::{
    ConditionFn, EvaluatorFn, ExecuteFn, Flow, InputFn, ItemExecuteFn, ItemsFn, OutputFn,
    RetryInput, Step, StepKind, StepOutput, WorkItem,
};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FlowBuildError {
    #[error("flow name is required")]
    MissingName,

    #[error("flow description is required")]
    MissingDescription,

    #[error("flow {0:?} has no steps")]
    NoSteps(String),

    #[error("step {0:?}: max attempts must be at least 1")]
    ZeroAttempts(String),
}

#[derive(Default)]
pub struct FlowBuilder {
    name: String,
    description: String,
    steps: Vec<StepBuilder>,
    on_error: Option<super::ErrorFn>,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn step(mut self, step: StepBuilder) -> Self {
        self.steps.push(step);
        self
    }

    /// Converts a step error into the user-facing terminal message.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&anyhow::Error) -> String + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Flow, FlowBuildError> {
        if self.name.trim().is_empty() {
            return Err(FlowBuildError::MissingName);
        }
        if self.description.trim().is_empty() {
            return Err(FlowBuildError::MissingDescription);
        }
        if self.steps.is_empty() {
            return Err(FlowBuildError::NoSteps(self.name));
        }

        let steps = self
            .steps
            .into_iter()
            .map(StepBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Flow {
            name: self.name,
            description: self.description,
            steps,
            on_error: self.on_error,
        })
    }
}

enum PendingKind {
    Ready(StepKind),
    Goal {
        execute: ExecuteFn,
        evaluator: EvaluatorFn,
        max_attempts: u32,
    },
    Branch {
        condition: ConditionFn,
        on_true: Vec<StepBuilder>,
        on_false: Vec<StepBuilder>,
    },
}

pub struct StepBuilder {
    name: String,
    description: String,
    status_message: Option<String>,
    emits: EventKind,
    input: Option<InputFn>,
    output_processor: Option<OutputFn>,
    streamed: bool,
    retry_input: RetryInput,
    kind: PendingKind,
}

impl StepBuilder {
    fn with_kind(name: impl Into<String>, description: impl Into<String>, kind: PendingKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            status_message: None,
            emits: EventKind::Result,
            input: None,
            output_processor: None,
            streamed: false,
            retry_input: RetryInput::default(),
            kind,
        }
    }

    pub fn sequential<F, Fut>(name: impl Into<String>, description: impl Into<String>, execute: F) -> Self
    where
        F: Fn(StepOutput, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutput>> + Send + 'static,
    {
        Self::with_kind(
            name,
            description,
            PendingKind::Ready(StepKind::Sequential {
                execute: execute_fn(execute),
            }),
        )
    }

    /// Fan-out: `items` picks the work list from all prior outputs, `execute`
    /// runs once per item, concurrently.
    pub fn parallel<I, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        items: I,
        execute: F,
    ) -> Self
    where
        I: Fn(&[StepOutput]) -> Result<Vec<WorkItem>> + Send + Sync + 'static,
        F: Fn(WorkItem, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let items: ItemsFn = Arc::new(items);
        let execute: ItemExecuteFn = Arc::new(move |item, ctx| execute(item, ctx).boxed());
        Self::with_kind(
            name,
            description,
            PendingKind::Ready(StepKind::Parallel { items, execute }),
        )
    }

    /// Retried until `evaluator` accepts the output or `max_attempts` runs are used up.
    pub fn goal_based<F, Fut, E, EFut>(
        name: impl Into<String>,
        description: impl Into<String>,
        execute: F,
        evaluator: E,
        max_attempts: u32,
    ) -> Self
    where
        F: Fn(StepOutput, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutput>> + Send + 'static,
        E: Fn(StepOutput, StepContext) -> EFut + Send + Sync + 'static,
        EFut: Future<Output = Result<bool>> + Send + 'static,
    {
        let evaluator: EvaluatorFn = Arc::new(move |output, ctx| evaluator(output, ctx).boxed());
        Self::with_kind(
            name,
            description,
            PendingKind::Goal {
                execute: execute_fn(execute),
                evaluator,
                max_attempts,
            },
        )
    }

    /// Branch: `condition` sees the step's input, then the chosen steps run in
    /// order, each taking the previous one's output. The last output is the
    /// step's output; an empty branch passes the input through.
    pub fn conditional<C, CFut>(
        name: impl Into<String>,
        description: impl Into<String>,
        condition: C,
        on_true: Vec<StepBuilder>,
        on_false: Vec<StepBuilder>,
    ) -> Self
    where
        C: Fn(StepOutput, StepContext) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = Result<bool>> + Send + 'static,
    {
        let condition: ConditionFn = Arc::new(move |input, ctx| condition(input, ctx).boxed());
        Self::with_kind(
            name,
            description,
            PendingKind::Branch {
                condition,
                on_true,
                on_false,
            },
        )
    }

    pub fn status(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    pub fn emits(mut self, kind: EventKind) -> Self {
        self.emits = kind;
        self
    }

    pub fn input<F>(mut self, select: F) -> Self
    where
        F: Fn(&[StepOutput]) -> Result<StepOutput> + Send + Sync + 'static,
    {
        self.input = Some(Arc::new(select));
        self
    }

    pub fn output<F>(mut self, process: F) -> Self
    where
        F: Fn(&StepOutput) -> String + Send + Sync + 'static,
    {
        self.output_processor = Some(Arc::new(process));
        self
    }

    /// Output is delivered as chunks by the step itself; skip the final content event.
    pub fn streamed(mut self) -> Self {
        self.streamed = true;
        self
    }

    pub fn retry_input(mut self, policy: RetryInput) -> Self {
        self.retry_input = policy;
        self
    }

    fn build(self) -> Result<Step, FlowBuildError> {
        let kind = match self.kind {
            PendingKind::Ready(kind) => kind,
            PendingKind::Goal {
                execute,
                evaluator,
                max_attempts,
            } => StepKind::GoalBased {
                execute,
                evaluator,
                max_attempts: NonZeroU32::new(max_attempts)
                    .ok_or_else(|| FlowBuildError::ZeroAttempts(self.name.clone()))?,
                retry_input: self.retry_input,
            },
            PendingKind::Branch {
                condition,
                on_true,
                on_false,
            } => StepKind::Conditional {
                condition,
                on_true: on_true
                    .into_iter()
                    .map(StepBuilder::build)
                    .collect::<Result<_, _>>()?,
                on_false: on_false
                    .into_iter()
                    .map(StepBuilder::build)
                    .collect::<Result<_, _>>()?,
            },
        };

        Ok(Step {
            name: self.name,
            description: self.description,
            status_message: self.status_message,
            emits: self.emits,
            input: self.input,
            output_processor: self.output_processor,
            streamed: self.streamed,
            kind,
        })
    }
}

fn execute_fn<F, Fut>(execute: F) -> ExecuteFn
where
    F: Fn(StepOutput, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput>> + Send + 'static,
{
    Arc::new(move |input, ctx| execute(input, ctx).boxed())
}
