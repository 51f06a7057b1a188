#![forbid(unsafe_code)]

//! # cogflow
//!
//! Multi-step orchestration over a hosted language model.
//!
//! Five pipelines sit on top of one structured-invocation layer:
//!
//! - [`flows::route_query`] classifies a query into a logical model.
//! - [`flows::recommend_tools`] suggests up to three external tools.
//! - [`flows::refine_collaboratively`] drafts with several models, then runs
//!   critique/refine rounds over a running answer.
//! - [`flows::optimize_prompt`] alternates feedback and rewrite for a fixed
//!   number of rounds.
//! - [`flows::select_efficient_model`] picks the cheapest adequate model from a list.
//!
//! Every pipeline receives an [`Invoker`], which wraps an injected
//! [`ChatGateway`]. Replies are checked against declared [`schema::Shape`]s and
//! a missing or malformed reply is an error, never an empty success.

pub mod config;
pub mod fakes;
pub mod flows;
pub mod gateway;
pub mod invoke;
pub mod prompts;
pub mod schema;

pub use config::Settings;
pub use flows::{
    optimize_prompt, parse_model_list, recommend_tools, refine_collaboratively, route_query,
    select_efficient_model, FlowError,
};
pub use gateway::{Attribution, ChatGateway, ProviderError, ProviderGateway};
pub use invoke::{InvocationRequest, InvocationResult, InvokeError, Invoker};
pub use schema::{validate_input, validate_output, InputContract, SchemaViolation};
