//! Collaborative refinement: N independent drafts, then N-1 critique/refine
//! rounds over a single running output.
//!
//! Each round critiques and rewrites the *running* output, not the round's own
//! draft, so later rounds review the accumulated consensus. The drafts are
//! returned untouched as `intermediate_outputs`.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{begin, FlowError};
use crate::invoke::{InvocationRequest, Invoker};
use crate::prompts::{Vars, CRITIQUE, REFINE};
use crate::schema::{FieldSpec, FieldType, InputContract, Shape};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefineInput {
    pub query: String,
    pub model_names: Vec<String>,
}

pub const REFINE_INPUT: Shape = Shape {
    name: "RefineInput",
    fields: &[
        FieldSpec::required("query", FieldType::Text, "The original query from the user."),
        FieldSpec::required(
            "modelNames",
            FieldType::TextList { min_items: 1 },
            "The models that each produce an initial output.",
        ),
    ],
};

impl InputContract for RefineInput {
    const SHAPE: &'static Shape = &REFINE_INPUT;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefineOutput {
    pub refined_output: String,
    /// One draft per input model, in input order.
    pub intermediate_outputs: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RefineOptions {
    /// Drafts requested at once. `None` requests all of them together.
    pub concurrency: Option<usize>,
    /// Run round `i` on `model_names[i]` instead of the default model.
    pub peer_review: bool,
}

#[derive(Debug, Deserialize)]
struct CritiqueReply {
    critique: String,
}

const CRITIQUE_REPLY: Shape = Shape {
    name: "CritiqueReply",
    fields: &[FieldSpec::required(
        "critique",
        FieldType::Text,
        "A concise critique of the output.",
    )],
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefineReply {
    refined_output: String,
}

const REFINE_REPLY: Shape = Shape {
    name: "RefineReply",
    fields: &[FieldSpec::required(
        "refinedOutput",
        FieldType::Text,
        "The refined output.",
    )],
};

pub async fn refine_collaboratively(
    invoker: &Invoker,
    input: &RefineInput,
    options: &RefineOptions,
) -> Result<RefineOutput, FlowError> {
    let run_id = begin("refine", input)?;

    let intermediate_outputs = collect_drafts(invoker, input, options, run_id).await?;
    let mut running = intermediate_outputs[0].clone();

    for (round, model) in input.model_names.iter().enumerate().skip(1) {
        let model = options.peer_review.then_some(model.as_str());
        running = critique_and_refine(invoker, &input.query, &running, model, run_id).await?;
        debug!(%run_id, round, "refinement round complete");
    }

    info!(
        %run_id,
        models = input.model_names.len(),
        rounds = input.model_names.len() - 1,
        "refinement finished"
    );

    Ok(RefineOutput {
        refined_output: running,
        intermediate_outputs,
    })
}

/// One plain generation per model, results in input order. The first failure
/// fails the whole collection.
async fn collect_drafts(
    invoker: &Invoker,
    input: &RefineInput,
    options: &RefineOptions,
    run_id: Uuid,
) -> Result<Vec<String>, FlowError> {
    let concurrency = options
        .concurrency
        .unwrap_or(input.model_names.len())
        .max(1);

    let drafts: Vec<String> = stream::iter(input.model_names.iter())
        .map(|model| invoker.generate(&input.query, Some(model.as_str()), Some(run_id)))
        .buffered(concurrency)
        .try_collect()
        .await?;

    Ok(drafts)
}

async fn critique_and_refine(
    invoker: &Invoker,
    query: &str,
    running: &str,
    model: Option<&str>,
    run_id: Uuid,
) -> Result<String, FlowError> {
    let mut critique_req = InvocationRequest::new(
        CRITIQUE,
        Vars::new().set("query", query).set("output", running),
        &CRITIQUE_REPLY,
    )
    .run(run_id);
    if let Some(model) = model {
        critique_req = critique_req.model(model);
    }
    let critique: CritiqueReply = invoker.invoke_required(critique_req).await?;

    let mut refine_req = InvocationRequest::new(
        REFINE,
        Vars::new()
            .set("query", query)
            .set("initial_output", running)
            .set("critique", critique.critique),
        &REFINE_REPLY,
    )
    .run(run_id);
    if let Some(model) = model {
        refine_req = refine_req.model(model);
    }
    let refined: RefineReply = invoker.invoke_required(refine_req).await?;

    Ok(refined.refined_output)
}
