//! Route a query to one of three logical models.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{begin, FlowError};
use crate::invoke::{InvocationRequest, Invoker};
use crate::prompts::{Vars, ROUTE_QUERY};
use crate::schema::{FieldSpec, FieldType, InputContract, Shape};

pub const LOGICAL_MODEL_NAMES: &[&str] = &["creativeModel", "mathematicalModel", "generalModel"];

/// A category of backing model, not a concrete provider model id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LogicalModel {
    #[serde(rename = "creativeModel")]
    Creative,
    #[serde(rename = "mathematicalModel")]
    Mathematical,
    #[serde(rename = "generalModel")]
    General,
}

impl LogicalModel {
    pub const ALL: [LogicalModel; 3] = [
        LogicalModel::Creative,
        LogicalModel::Mathematical,
        LogicalModel::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogicalModel::Creative => "creativeModel",
            LogicalModel::Mathematical => "mathematicalModel",
            LogicalModel::General => "generalModel",
        }
    }
}

impl std::fmt::Display for LogicalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteQueryInput {
    pub query: String,
}

pub const ROUTE_QUERY_INPUT: Shape = Shape {
    name: "RouteQueryInput",
    fields: &[FieldSpec::required(
        "query",
        FieldType::Text,
        "The user query to be routed.",
    )],
};

impl InputContract for RouteQueryInput {
    const SHAPE: &'static Shape = &ROUTE_QUERY_INPUT;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingDecision {
    pub model: LogicalModel,
    pub reason: String,
}

pub const ROUTING_DECISION: Shape = Shape {
    name: "RoutingDecision",
    fields: &[
        FieldSpec::required(
            "model",
            FieldType::OneOf(LOGICAL_MODEL_NAMES),
            "The name of the model to use for the query.",
        ),
        FieldSpec::required("reason", FieldType::Text, "Why this model was chosen."),
    ],
};

/// Classify `input.query`. A model name outside the closed set fails with a
/// schema violation; it is never coerced.
pub async fn route_query(
    invoker: &Invoker,
    input: &RouteQueryInput,
) -> Result<RoutingDecision, FlowError> {
    let run_id = begin("route", input)?;

    let req = InvocationRequest::new(
        ROUTE_QUERY,
        Vars::new().set("query", &input.query),
        &ROUTING_DECISION,
    )
    .temperature(0.0)
    .run(run_id);

    let decision: RoutingDecision = invoker.invoke_required(req).await?;
    info!(%run_id, model = %decision.model, "query routed");
    Ok(decision)
}
