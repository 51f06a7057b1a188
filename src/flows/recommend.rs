//! Recommend external AI tools for a query's task category.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{begin, FlowError};
use crate::invoke::{InvocationRequest, Invoker};
use crate::prompts::{Vars, LOGO_PLACEHOLDER_BASE, RECOMMEND_TOOLS};
use crate::schema::{FieldSpec, FieldType, InputContract, Shape};

pub const MAX_RECOMMENDATIONS: usize = 3;
const DEFAULT_KEYWORD: &str = "abstract";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecommendToolsInput {
    pub query: String,
}

pub const RECOMMEND_TOOLS_INPUT: Shape = Shape {
    name: "RecommendToolsInput",
    fields: &[FieldSpec::required(
        "query",
        FieldType::Text,
        "The user query to analyze for tool recommendations.",
    )],
};

impl InputContract for RecommendToolsInput {
    const SHAPE: &'static Shape = &RECOMMEND_TOOLS_INPUT;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub name: String,
    pub logo_url: String,
    pub description: String,
    pub website_url: String,
    /// Blank or missing categories fall back to the `abstract` logo keyword.
    #[serde(default)]
    pub task_category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecommendToolsOutput {
    pub recommendations: Vec<Recommendation>,
}

pub const RECOMMENDATION: Shape = Shape {
    name: "Recommendation",
    fields: &[
        FieldSpec::required(
            "name",
            FieldType::Text,
            "The official name of the tool or model, e.g. 'DALL-E 3'.",
        ),
        FieldSpec::required(
            "logoUrl",
            FieldType::Url,
            "An image URL for the tool; use the placeholder base when no real logo is known.",
        ),
        FieldSpec::required(
            "description",
            FieldType::Text,
            "One or two sentences on what the tool does and why it fits the query.",
        ),
        FieldSpec::required(
            "websiteUrl",
            FieldType::Url,
            "The official website of the tool.",
        ),
        FieldSpec::optional(
            "taskCategory",
            FieldType::Text,
            "The primary task category, e.g. 'Image Generation'.",
        ),
    ],
};

pub const RECOMMEND_TOOLS_OUTPUT: Shape = Shape {
    name: "RecommendToolsOutput",
    fields: &[FieldSpec::required(
        "recommendations",
        FieldType::ObjectList {
            item: &RECOMMENDATION,
            min_items: 1,
        },
        "A list of 1 to 3 tool recommendations.",
    )],
};

/// Recommend up to three tools. A reply with nothing usable is an error,
/// never an empty list.
pub async fn recommend_tools(
    invoker: &Invoker,
    input: &RecommendToolsInput,
) -> Result<RecommendToolsOutput, FlowError> {
    let run_id = begin("recommend", input)?;

    let req = InvocationRequest::new(
        RECOMMEND_TOOLS,
        Vars::new()
            .set("query", &input.query)
            .set("logo_base", LOGO_PLACEHOLDER_BASE),
        &RECOMMEND_TOOLS_OUTPUT,
    )
    .run(run_id);

    let result = invoker.invoke::<RecommendToolsOutput>(req).await?;
    let Some(mut output) = result.parsed else {
        return Err(FlowError::EmptyModelOutput { flow: "recommend" });
    };

    output.recommendations.truncate(MAX_RECOMMENDATIONS);
    for rec in &mut output.recommendations {
        normalize_logo_url(rec);
    }

    info!(%run_id, count = output.recommendations.len(), "tools recommended");
    Ok(output)
}

/// Rebuild placeholder logo URLs as `<base>?query=<keyword>`.
fn normalize_logo_url(rec: &mut Recommendation) {
    if !rec.logo_url.starts_with(LOGO_PLACEHOLDER_BASE) {
        return;
    }
    let keyword = category_keyword(&rec.task_category);
    if let Ok(url) = url::Url::parse_with_params(LOGO_PLACEHOLDER_BASE, &[("query", keyword)]) {
        rec.logo_url = url.into();
    }
}

/// First word of the category, lower-cased, alphanumerics only.
///
/// Leading blanks are skipped, so `" Image"` gives `image` rather than an
/// empty first word and the `abstract` fallback.
pub fn category_keyword(task_category: &str) -> String {
    let keyword: String = task_category
        .split_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    if keyword.is_empty() {
        DEFAULT_KEYWORD.to_string()
    } else {
        keyword
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedGateway;
    use crate::schema::is_valid_url;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn rec(name: &str, logo: &str, category: &str) -> Value {
        json!({
            "name": name,
            "logoUrl": logo,
            "description": "Does the thing.",
            "websiteUrl": "https://example.com",
            "taskCategory": category,
        })
    }

    fn input() -> RecommendToolsInput {
        RecommendToolsInput {
            query: "generate a logo image".into(),
        }
    }

    #[test]
    fn keyword_derivation() {
        assert_eq!(category_keyword("Image Generation"), "image");
        assert_eq!(category_keyword(" Image Generation"), "image");
        assert_eq!(category_keyword("Text-Summarization tools"), "textsummarization");
        assert_eq!(category_keyword("  "), "abstract");
        assert_eq!(category_keyword("!!! Research"), "abstract");
        assert_eq!(category_keyword("Données"), "données");
    }

    #[tokio::test]
    async fn placeholder_logos_get_category_query() {
        let gw = Arc::new(ScriptedGateway::new().push_json(json!({
            "recommendations": [
                rec("DALL-E 3", "https://picsum.photos/50/50?query=AI", "Image Generation"),
                rec("Midjourney", "https://cdn.example.com/mj.png", "Image Generation"),
                rec("Odd", "https://picsum.photos/50/50", ""),
            ]
        })));
        let invoker = Invoker::new(gw.clone(), "default/model");

        let out = recommend_tools(&invoker, &input()).await.unwrap();
        let logos: Vec<&str> = out
            .recommendations
            .iter()
            .map(|r| r.logo_url.as_str())
            .collect();
        assert_eq!(
            logos,
            vec![
                "https://picsum.photos/50/50?query=image",
                "https://cdn.example.com/mj.png",
                "https://picsum.photos/50/50?query=abstract",
            ]
        );
        for r in &out.recommendations {
            assert!(is_valid_url(&r.logo_url));
            assert!(is_valid_url(&r.website_url));
        }

        let user = &gw.requests()[0].messages[1].content;
        assert!(user.contains("https://picsum.photos/50/50?query=AI"));
        assert!(user.contains("User Query: generate a logo image"));
    }

    #[tokio::test]
    async fn blank_or_missing_category_falls_back_to_abstract() {
        let mut missing = rec("NoCategory", "https://picsum.photos/50/50", "");
        missing.as_object_mut().unwrap().remove("taskCategory");
        let gw = Arc::new(ScriptedGateway::new().push_json(json!({
            "recommendations": [
                rec("Blank", "https://picsum.photos/50/50", "   "),
                missing,
            ]
        })));
        let invoker = Invoker::new(gw, "default/model");

        let out = recommend_tools(&invoker, &input()).await.unwrap();
        assert_eq!(out.recommendations.len(), 2);
        for r in &out.recommendations {
            assert_eq!(r.logo_url, "https://picsum.photos/50/50?query=abstract");
        }
        assert_eq!(out.recommendations[1].task_category, "");
    }

    #[tokio::test]
    async fn extra_recommendations_are_dropped() {
        let items: Vec<Value> = (0..5)
            .map(|i| rec(&format!("tool-{i}"), "https://example.com/l.png", "Code"))
            .collect();
        let gw = Arc::new(ScriptedGateway::new().push_json(json!({ "recommendations": items })));
        let invoker = Invoker::new(gw, "default/model");

        let out = recommend_tools(&invoker, &input()).await.unwrap();
        assert_eq!(out.recommendations.len(), MAX_RECOMMENDATIONS);
        assert_eq!(out.recommendations[2].name, "tool-2");
    }

    #[tokio::test]
    async fn empty_reply_is_an_error_not_an_empty_list() {
        for body in [json!({ "recommendations": [] }), json!({})] {
            let gw = Arc::new(ScriptedGateway::new().push_json(body));
            let invoker = Invoker::new(gw, "default/model");

            let err = recommend_tools(&invoker, &input()).await.unwrap_err();
            assert!(matches!(err, FlowError::EmptyModelOutput { flow: "recommend" }));
            assert!(err.is_no_structured_output());
        }
    }

    #[tokio::test]
    async fn malformed_website_url_is_a_schema_violation() {
        let mut bad = rec("X", "https://picsum.photos/50/50", "Code");
        bad["websiteUrl"] = json!("example dot com");
        let gw = Arc::new(ScriptedGateway::new().push_json(json!({ "recommendations": [bad] })));
        let invoker = Invoker::new(gw, "default/model");

        let err = recommend_tools(&invoker, &input()).await.unwrap_err();
        let v = err.schema_violation().expect("schema violation");
        assert_eq!(v.path, "$.recommendations[0].websiteUrl");
    }
}
