//! The five orchestration pipelines.
//!
//! Each flow is a free async function taking the [`Invoker`](crate::invoke::Invoker)
//! and a typed input, and returning a typed output or a [`FlowError`]. Inputs
//! are checked against their contract before any model call. No flow retries
//! or masks a failed call.

pub mod optimize;
pub mod recommend;
pub mod refine;
pub mod routing;
pub mod selection;

use uuid::Uuid;

use crate::invoke::InvokeError;
use crate::schema::{InputContract, SchemaViolation};

pub use optimize::{optimize_prompt, OptimizationRound, OptimizePromptInput, OptimizePromptOutput};
pub use recommend::{recommend_tools, Recommendation, RecommendToolsInput, RecommendToolsOutput};
pub use refine::{refine_collaboratively, RefineInput, RefineOptions, RefineOutput};
pub use routing::{route_query, LogicalModel, RouteQueryInput, RoutingDecision};
pub use selection::{select_efficient_model, SelectModelInput, SelectionDecision};

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("invalid input: {0}")]
    InvalidInput(SchemaViolation),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("no output received from the model for {flow}")]
    EmptyModelOutput { flow: &'static str },
}

impl FlowError {
    /// The model produced nothing usable, whichever layer noticed.
    pub fn is_no_structured_output(&self) -> bool {
        matches!(
            self,
            FlowError::EmptyModelOutput { .. }
                | FlowError::Invoke(InvokeError::NoStructuredOutput { .. })
        )
    }

    pub fn schema_violation(&self) -> Option<&SchemaViolation> {
        match self {
            FlowError::InvalidInput(v) | FlowError::Invoke(InvokeError::Schema(v)) => Some(v),
            _ => None,
        }
    }
}

/// Split a comma-separated model list, trimming entries and dropping blanks.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Check the input contract and mint a run id for log correlation.
fn begin<T: InputContract>(flow: &'static str, input: &T) -> Result<Uuid, FlowError> {
    input.ensure_valid().map_err(FlowError::InvalidInput)?;
    let run_id = Uuid::new_v4();
    tracing::info!(flow, %run_id, "flow started");
    Ok(run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ViolationKind;

    #[test]
    fn model_list_parsing() {
        assert_eq!(
            parse_model_list(" a, b,,c ,"),
            vec!["a".to_string(), "b".into(), "c".into()]
        );
        assert!(parse_model_list(" , ").is_empty());
        assert!(parse_model_list("").is_empty());
    }

    #[test]
    fn no_structured_output_covers_both_layers() {
        let empty = FlowError::EmptyModelOutput { flow: "recommend" };
        assert!(empty.is_no_structured_output());

        let nso = FlowError::from(InvokeError::NoStructuredOutput {
            prompt: "x",
            reason: "r".into(),
        });
        assert!(nso.is_no_structured_output());

        let v = SchemaViolation {
            shape: "S",
            path: "$.a".into(),
            kind: ViolationKind::MissingField,
        };
        let invalid = FlowError::InvalidInput(v.clone());
        assert!(!invalid.is_no_structured_output());
        assert_eq!(invalid.schema_violation(), Some(&v));
    }
}
