//! Script-style agent definitions (`say` / `does` / `emits`) and their
//! conversion into executable [`Flow`]s.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Result, bail};
use futures::FutureExt;
use serde::Serialize;

use super::builder::{FlowBuildError, FlowBuilder, StepBuilder};
use super::context::StepContext;
use super::events::EventKind;
use super::{ErrorFn, ExecuteFn, Flow, InputFn, OutputFn, StepOutput, WorkItem};

/// One behaviour in an agent script.
pub struct AgentStep {
    /// Status line announced before the behaviour runs.
    pub say: Option<String>,
    pub does: ExecuteFn,
    pub emits: EventKind,
    /// Run `does` once per entry of the selected list.
    pub parallel: bool,
    pub input: Option<InputFn>,
    pub process_output: Option<OutputFn>,
}

impl AgentStep {
    pub fn new<F, Fut>(emits: EventKind, does: F) -> Self
    where
        F: Fn(StepOutput, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutput>> + Send + 'static,
    {
        Self {
            say: None,
            does: Arc::new(move |input, ctx| does(input, ctx).boxed()),
            emits,
            parallel: false,
            input: None,
            process_output: None,
        }
    }

    pub fn say(mut self, message: impl Into<String>) -> Self {
        self.say = Some(message.into());
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn input<F>(mut self, select: F) -> Self
    where
        F: Fn(&[StepOutput]) -> Result<StepOutput> + Send + Sync + 'static,
    {
        self.input = Some(Arc::new(select));
        self
    }

    pub fn process_output<F>(mut self, process: F) -> Self
    where
        F: Fn(&StepOutput) -> String + Send + Sync + 'static,
    {
        self.process_output = Some(Arc::new(process));
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub name: String,
    pub description: String,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub name: String,
    pub kind: &'static str,
    pub description: String,
}

pub struct FlowAdapter;

impl FlowAdapter {
    /// Build a flow from an agent script.
    ///
    /// Parallel behaviours publish each item's (processed) result as its own
    /// message as soon as that item finishes, rather than one aggregate.
    pub fn from_agent_steps(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<AgentStep>,
        on_error: Option<ErrorFn>,
    ) -> Result<Flow, FlowBuildError> {
        let mut builder = FlowBuilder::new().name(name).description(description);
        for (i, step) in steps.into_iter().enumerate() {
            builder = builder.step(Self::adapt(i + 1, step));
        }
        if let Some(handler) = on_error {
            builder = builder.on_error(move |e| handler(e));
        }
        builder.build()
    }

    pub fn summarize(flow: &Flow) -> FlowSummary {
        FlowSummary {
            name: flow.name.clone(),
            description: flow.description.clone(),
            steps: flow
                .steps
                .iter()
                .map(|step| StepSummary {
                    name: step.name.clone(),
                    kind: step.kind.label(),
                    description: step.description.clone(),
                })
                .collect(),
        }
    }

    fn adapt(position: usize, step: AgentStep) -> StepBuilder {
        let name = format!("{} {position}", step.emits);
        let description = step.say.clone().unwrap_or_else(|| name.clone());
        let emits = step.emits;

        let mut builder = if step.parallel {
            let select = step.input.clone();
            let items = move |prior: &[StepOutput]| {
                let value = match &select {
                    Some(select) => select(prior)?,
                    None => prior.last().cloned().unwrap_or(StepOutput::Empty),
                };
                work_items(value)
            };

            let does = step.does.clone();
            let process = step.process_output.clone();
            StepBuilder::parallel(name, description, items, move |item: WorkItem, ctx: StepContext| {
                let does = does.clone();
                let process = process.clone();
                async move {
                    let output = does(StepOutput::Text(item.content), ctx.clone()).await?;
                    let shown = match &process {
                        Some(process) => process(&output),
                        None => output.as_prompt(),
                    };
                    ctx.send_chunk(emits, shown).await;
                    Ok(output.as_prompt())
                }
            })
            .streamed()
        } else {
            let does = step.does.clone();
            let mut builder = StepBuilder::sequential(name, description, move |input, ctx| does(input, ctx));
            if let Some(select) = step.input {
                builder = builder.input(move |prior| select(prior));
            }
            if let Some(process) = step.process_output {
                builder = builder.output(move |output| process(output));
            }
            builder
        };

        builder = builder.emits(emits);
        if let Some(say) = step.say {
            builder = builder.status(say);
        }
        builder
    }
}

/// `List` entries become one item each, `Results` one item per success.
fn work_items(value: StepOutput) -> Result<Vec<WorkItem>> {
    match value {
        StepOutput::List(entries) => Ok(entries
            .into_iter()
            .map(|entry| WorkItem::new(entry.clone(), entry))
            .collect()),
        StepOutput::Results(results) => Ok(results
            .into_iter()
            .filter_map(|result| {
                let text = result.text()?.to_string();
                Some(WorkItem::new(result.kind, text))
            })
            .collect()),
        StepOutput::Empty | StepOutput::Text(_) => bail!("items must return a list"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::ItemResult;
    use crate::flows::events::AgentEvent;
    use crate::flows::executor::FlowExecutor;
    use crate::flows::sink::EventSink;

    async fn run(flow: &Flow, input: &str) -> Vec<AgentEvent> {
        let (sink, mut rx) = EventSink::channel(64);
        FlowExecutor::new(sink).run(flow, input).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn chef_script() -> Vec<AgentStep> {
        vec![
            AgentStep::new(EventKind::Plan, |_dish, _ctx| async {
                Ok(StepOutput::List(vec!["rice".into(), "saffron".into()]))
            })
            .say("Chef is choosing ingredients...")
            .process_output(|output| format!("Ingredients: {}", output.as_prompt())),
            AgentStep::new(EventKind::Result, |ingredient: StepOutput, _ctx| async move {
                Ok(StepOutput::Text(format!("{} stew", ingredient.as_prompt())))
            })
            .say("Players are cooking...")
            .parallel()
            .input(|prior| Ok(prior[0].clone())),
            AgentStep::new(EventKind::Refinement, |recipes: StepOutput, _ctx| async move {
                match recipes {
                    StepOutput::Results(results) => Ok(StepOutput::Text(format!("{} recipes", results.len()))),
                    other => anyhow::bail!("unexpected input {other:?}"),
                }
            })
            .input(|prior| Ok(prior[1].clone())),
        ]
    }

    #[tokio::test]
    async fn test_script_runs_with_per_item_results() {
        let flow = FlowAdapter::from_agent_steps("Chef", "cooking game", chef_script(), None).unwrap();
        let events = run(&flow, "paella").await;

        let plan: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Plan).collect();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].message, r#"Ingredients: ["rice","saffron"]"#);

        let mut dishes: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Result)
            .map(|e| e.message.as_str())
            .collect();
        dishes.sort();
        assert_eq!(dishes, vec!["rice stew", "saffron stew"]);

        let critic: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Refinement).collect();
        assert_eq!(critic[0].message, "2 recipes");
        assert!(events.iter().any(|e| e.message == "Processing item 1/2: rice"));
        assert_eq!(events.last().unwrap().message, "Flow completed successfully!");
    }

    #[tokio::test]
    async fn test_parallel_over_text_fails_with_list_error() {
        let steps = vec![
            AgentStep::new(EventKind::Plan, |input, _ctx| async move { Ok(input) }),
            AgentStep::new(EventKind::Result, |input, _ctx| async move { Ok(input) }).parallel(),
        ];
        let on_error: ErrorFn = Arc::new(|e: &anyhow::Error| format!("{}", e.root_cause()));
        let flow = FlowAdapter::from_agent_steps("Bad", "not a list", steps, Some(on_error)).unwrap();

        let events = run(&flow, "just text").await;
        assert_eq!(events.last().unwrap().message, "items must return a list");
    }

    #[test]
    fn test_results_become_items_for_successes_only() {
        let items = work_items(StepOutput::Results(vec![
            ItemResult::ok("title", "The Fox"),
            ItemResult::failed("themes", "timeout"),
        ]))
        .unwrap();
        assert_eq!(items, vec![WorkItem::new("title", "The Fox")]);
    }

    #[test]
    fn test_summarize_lists_step_kinds() {
        let flow = FlowAdapter::from_agent_steps("Chef", "cooking game", chef_script(), None).unwrap();
        let summary = FlowAdapter::summarize(&flow);
        let kinds: Vec<_> = summary.steps.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec!["sequential", "parallel", "sequential"]);
        assert_eq!(summary.steps[0].description, "Chef is choosing ingredients...");
        assert_eq!(summary.steps[2].name, "refinement 3");
    }
}
