//! Pick the most resource-efficient model from a candidate list.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{begin, FlowError};
use crate::invoke::{InvocationRequest, Invoker};
use crate::prompts::{Vars, SELECT_MODEL};
use crate::schema::{FieldSpec, FieldType, InputContract, Shape};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectModelInput {
    pub task_description: String,
    pub available_models: Vec<String>,
}

pub const SELECT_MODEL_INPUT: Shape = Shape {
    name: "SelectModelInput",
    fields: &[
        FieldSpec::required(
            "taskDescription",
            FieldType::Text,
            "The task to be performed.",
        ),
        FieldSpec::required(
            "availableModels",
            FieldType::TextList { min_items: 1 },
            "The candidate models.",
        ),
    ],
};

impl InputContract for SelectModelInput {
    const SHAPE: &'static Shape = &SELECT_MODEL_INPUT;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionDecision {
    pub selected_model: String,
    pub reason: String,
}

impl SelectionDecision {
    /// Whether the model picked one of the offered candidates. The flow itself
    /// does not enforce this.
    pub fn is_candidate(&self, available: &[String]) -> bool {
        available.iter().any(|m| m == &self.selected_model)
    }
}

pub const SELECTION_DECISION: Shape = Shape {
    name: "SelectionDecision",
    fields: &[
        FieldSpec::required(
            "selectedModel",
            FieldType::Text,
            "The selected model, exactly as listed.",
        ),
        FieldSpec::required("reason", FieldType::Text, "Why this model was selected."),
    ],
};

pub async fn select_efficient_model(
    invoker: &Invoker,
    input: &SelectModelInput,
) -> Result<SelectionDecision, FlowError> {
    let run_id = begin("select", input)?;

    let req = InvocationRequest::new(
        SELECT_MODEL,
        Vars::new()
            .set("task_description", &input.task_description)
            .set("available_models", input.available_models.join(", ")),
        &SELECTION_DECISION,
    )
    .temperature(0.2)
    .run(run_id);

    let decision: SelectionDecision = invoker.invoke_required(req).await?;

    if !decision.is_candidate(&input.available_models) {
        warn!(
            %run_id,
            selected = %decision.selected_model,
            "selected model is not among the candidates"
        );
    }
    info!(%run_id, selected = %decision.selected_model, "model selected");
    Ok(decision)
}
