use std::sync::Arc;

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::agents::AgentDefinition;
use crate::flows::StepOutput;
use crate::flows::adapter::{AgentStep, FlowAdapter};
use crate::flows::builder::FlowBuildError;
use crate::flows::events::EventKind;
use crate::llm::Completion;

const CHEF: &str = "You are a master chef. Name exactly 5 main ingredients of the dish you are \
given. Respond with a JSON object of the form {\"ingredients\": [\"...\", ...]}.";

const PLAYER: &str = "You are a contestant in a cooking game. You were handed a single main \
ingredient and must guess which dish it came from. Give your guess, a creative recipe built around \
the ingredient, and why you think it is the original dish. Have fun with it.";

const CRITIC: &str = "You are a food critic writing an entertaining article. Each contestant knew \
only one ingredient of a secret dish and had to guess the dish. Celebrate each chef's creativity, \
compare their guesses, and point out interesting patterns.";

#[derive(Debug, Deserialize)]
struct Ingredients {
    ingredients: Vec<String>,
}

/// Cooking game: a chef breaks a dish into ingredients, one player per
/// ingredient guesses the dish, and a critic writes it up.
pub fn definition(completion: &Completion) -> Result<AgentDefinition, FlowBuildError> {
    let chef = completion.clone();
    let player = completion.clone();
    let critic = completion.clone();

    let steps = vec![
        AgentStep::new(EventKind::Plan, move |dish: StepOutput, _ctx| {
            let completion = chef.clone();
            async move {
                let picked: Ingredients = completion
                    .generate_json("select ingredients", CHEF, &dish.as_prompt())
                    .await?;
                if picked.ingredients.is_empty() {
                    bail!("the chef did not pick any ingredients");
                }
                Ok(StepOutput::List(picked.ingredients))
            }
        })
        .say("Chef is analyzing the dish and selecting main ingredients...")
        .process_output(|output| match output {
            StepOutput::List(ingredients) => {
                format!("Chef has selected these main ingredients: {}", ingredients.join(", "))
            }
            other => other.as_prompt(),
        }),
        AgentStep::new(EventKind::Result, move |ingredient: StepOutput, _ctx| {
            let completion = player.clone();
            async move {
                let user = format!("Your ingredient: {}", ingredient.as_prompt());
                let recipe = completion.generate("create recipe", PLAYER, &user).await?;
                Ok(StepOutput::Text(recipe))
            }
        })
        .say("Players are creating their recipes...")
        .parallel()
        .input(|prior| prior.first().cloned().context("no ingredients to hand out")),
        AgentStep::new(EventKind::Refinement, move |recipes: StepOutput, _ctx| {
            let completion = critic.clone();
            async move {
                let count = match &recipes {
                    StepOutput::Results(results) => results.len(),
                    _ => 0,
                };
                let user = format!("{count} recipes from the contestants:\n{}", recipes.as_prompt());
                let article = completion.generate("write article", CRITIC, &user).await?;
                Ok(StepOutput::Text(article))
            }
        })
        .say("Creating the final article about our chefs' creations...")
        .input(|prior| prior.get(1).cloned().context("no recipes to review")),
    ];

    let flow = FlowAdapter::from_agent_steps(
        "Smart Chef Awards",
        "A cooking game where players reconstruct a dish from a single ingredient",
        steps,
        Some(Arc::new(|e: &anyhow::Error| format!("The kitchen ran into a problem: {e:#}"))),
    )?;

    Ok(AgentDefinition::new("smart-chef-awards", "Please provide a food title!", flow))
}
