pub mod adapter;
pub mod agent;
pub mod builder;
pub mod context;
pub mod evaluate;
pub mod events;
pub mod executor;
pub mod sink;

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use serde::Serialize;

use self::context::StepContext;
use self::events::EventKind;

pub type StepFuture<T> = BoxFuture<'static, Result<T>>;

pub type ExecuteFn = Arc<dyn Fn(StepOutput, StepContext) -> StepFuture<StepOutput> + Send + Sync>;
pub type ItemExecuteFn = Arc<dyn Fn(WorkItem, StepContext) -> StepFuture<String> + Send + Sync>;
pub type ItemsFn = Arc<dyn Fn(&[StepOutput]) -> Result<Vec<WorkItem>> + Send + Sync>;
pub type InputFn = Arc<dyn Fn(&[StepOutput]) -> Result<StepOutput> + Send + Sync>;
pub type EvaluatorFn = Arc<dyn Fn(StepOutput, StepContext) -> StepFuture<bool> + Send + Sync>;
pub type ConditionFn = Arc<dyn Fn(StepOutput, StepContext) -> StepFuture<bool> + Send + Sync>;
pub type OutputFn = Arc<dyn Fn(&StepOutput) -> String + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(&anyhow::Error) -> String + Send + Sync>;

/// A complete pipeline for one agent use case. Built once, shared across requests.
pub struct Flow {
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
    pub on_error: Option<ErrorFn>,
}

pub struct Step {
    pub name: String,
    pub description: String,
    /// Sent as a `status` event before the step runs.
    pub status_message: Option<String>,
    /// Kind of the event carrying this step's output.
    pub emits: EventKind,
    /// Reads all prior outputs instead of taking the previous step's output.
    pub input: Option<InputFn>,
    pub output_processor: Option<OutputFn>,
    /// The step already streamed its text as chunks under its message id.
    pub streamed: bool,
    pub kind: StepKind,
}

pub enum StepKind {
    Sequential {
        execute: ExecuteFn,
    },
    Parallel {
        items: ItemsFn,
        execute: ItemExecuteFn,
    },
    GoalBased {
        execute: ExecuteFn,
        evaluator: EvaluatorFn,
        max_attempts: NonZeroU32,
        retry_input: RetryInput,
    },
    /// Runs one of two nested step lists, picked by `condition` on the step's input.
    Conditional {
        condition: ConditionFn,
        on_true: Vec<Step>,
        on_false: Vec<Step>,
    },
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Sequential { .. } => "sequential",
            StepKind::Parallel { .. } => "parallel",
            StepKind::GoalBased { .. } => "goal-based",
            StepKind::Conditional { .. } => "conditional",
        }
    }
}

/// What a goal-based step runs on after an attempt misses the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryInput {
    /// Feed the rejected attempt's output back in, so each attempt refines the last.
    #[default]
    PreviousAttempt,
    /// Re-run on the input the step started with.
    OriginalInput,
}

/// Value flowing between steps.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Empty,
    Text(String),
    List(Vec<String>),
    Results(Vec<ItemResult>),
}

impl StepOutput {
    /// Display form used for events. `Empty` renders nothing.
    pub fn render(&self) -> Option<String> {
        match self {
            StepOutput::Empty => None,
            StepOutput::Text(text) => Some(text.clone()),
            StepOutput::List(items) => serde_json::to_string(items).ok(),
            StepOutput::Results(results) => serde_json::to_string(results).ok(),
        }
    }

    /// Text view for prompting: `Text` as-is, everything else rendered.
    pub fn as_prompt(&self) -> String {
        match self {
            StepOutput::Text(text) => text.clone(),
            other => other.render().unwrap_or_default(),
        }
    }
}

impl From<String> for StepOutput {
    fn from(text: String) -> Self {
        StepOutput::Text(text)
    }
}

impl From<&str> for StepOutput {
    fn from(text: &str) -> Self {
        StepOutput::Text(text.to_string())
    }
}

/// One unit of work in a parallel fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl WorkItem {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// Outcome of one parallel item; failures are kept in place rather than aborting the step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemResult {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    Result(String),
    Error(String),
}

impl ItemResult {
    pub fn ok(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            outcome: ItemOutcome::Result(text.into()),
        }
    }

    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            outcome: ItemOutcome::Error(message.into()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            ItemOutcome::Result(text) => Some(text),
            ItemOutcome::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Error(_))
    }
}
