//! Fixed-round prompt optimization: feedback on the current prompt, then a
//! rewrite that takes the feedback into account.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{begin, FlowError};
use crate::invoke::{InvocationRequest, Invoker};
use crate::prompts::{Vars, PROMPT_FEEDBACK, PROMPT_OPTIMIZE};
use crate::schema::{FieldSpec, FieldType, InputContract, Shape};

pub const DEFAULT_ROUNDS: u32 = 3;
pub const MAX_ROUNDS: u32 = 10;

fn default_rounds() -> u32 {
    DEFAULT_ROUNDS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizePromptInput {
    pub initial_prompt: String,
    /// Accepted for interface compatibility; every call runs on the default model.
    #[serde(default)]
    pub model_names: Vec<String>,
    #[serde(default = "default_rounds")]
    pub optimization_rounds: u32,
}

impl OptimizePromptInput {
    pub fn new(initial_prompt: impl Into<String>) -> Self {
        Self {
            initial_prompt: initial_prompt.into(),
            model_names: Vec::new(),
            optimization_rounds: DEFAULT_ROUNDS,
        }
    }
}

pub const OPTIMIZE_PROMPT_INPUT: Shape = Shape {
    name: "OptimizePromptInput",
    fields: &[
        FieldSpec::required(
            "initialPrompt",
            FieldType::Text,
            "The initial prompt to be optimized.",
        ),
        FieldSpec::optional(
            "modelNames",
            FieldType::TextList { min_items: 0 },
            "Models named by the caller.",
        ),
        FieldSpec::optional(
            "optimizationRounds",
            FieldType::Integer {
                min: 1,
                max: MAX_ROUNDS as i64,
            },
            "Number of feedback/optimize rounds.",
        ),
    ],
};

impl InputContract for OptimizePromptInput {
    const SHAPE: &'static Shape = &OPTIMIZE_PROMPT_INPUT;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptimizationRound {
    pub round: u32,
    /// Always the initial prompt, not the prompt that round worked on.
    pub prompt: String,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizePromptOutput {
    pub optimized_prompt: String,
    pub optimization_history: Vec<OptimizationRound>,
}

#[derive(Debug, Deserialize)]
struct FeedbackReply {
    feedback: String,
}

const FEEDBACK_REPLY: Shape = Shape {
    name: "FeedbackReply",
    fields: &[FieldSpec::required(
        "feedback",
        FieldType::Text,
        "Constructive feedback on the prompt.",
    )],
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeReply {
    optimized_prompt: String,
}

const OPTIMIZE_REPLY: Shape = Shape {
    name: "OptimizeReply",
    fields: &[FieldSpec::required(
        "optimizedPrompt",
        FieldType::Text,
        "The improved prompt.",
    )],
};

/// Run exactly `optimization_rounds` rounds. There is no early exit on
/// convergence.
pub async fn optimize_prompt(
    invoker: &Invoker,
    input: &OptimizePromptInput,
) -> Result<OptimizePromptOutput, FlowError> {
    let run_id = begin("optimize", input)?;

    let mut current = input.initial_prompt.clone();
    let mut history = Vec::with_capacity(input.optimization_rounds as usize);

    for round in 1..=input.optimization_rounds {
        let feedback: FeedbackReply = invoker
            .invoke_required(
                InvocationRequest::new(
                    PROMPT_FEEDBACK,
                    Vars::new().set("prompt", &current),
                    &FEEDBACK_REPLY,
                )
                .run(run_id),
            )
            .await?;

        let rewrite: OptimizeReply = invoker
            .invoke_required(
                InvocationRequest::new(
                    PROMPT_OPTIMIZE,
                    Vars::new()
                        .set("prompt", &current)
                        .set("feedback", &feedback.feedback),
                    &OPTIMIZE_REPLY,
                )
                .run(run_id),
            )
            .await?;

        current = rewrite.optimized_prompt;
        history.push(OptimizationRound {
            round,
            prompt: input.initial_prompt.clone(),
            feedback: feedback.feedback,
        });
        debug!(%run_id, round, "optimization round complete");
    }

    info!(%run_id, rounds = history.len(), "prompt optimized");
    Ok(OptimizePromptOutput {
        optimized_prompt: current,
        optimization_history: history,
    })
}
