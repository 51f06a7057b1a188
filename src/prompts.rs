//! Instruction templates for every pipeline step.
//!
//! Rendering is plain textual substitution: `{name}` is replaced by the value
//! bound to `name`, verbatim and unescaped. Placeholders with no binding are
//! left as written. Conditional text is modeled as [`OptionalSection`]s that
//! are appended only when their variable is bound to a non-blank value.

use std::collections::BTreeMap;

use crate::gateway::Message;

// =============================================================================
// Variables
// =============================================================================

/// Variable bindings for one rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars(BTreeMap<&'static str, String>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.0.insert(name, value.into());
        self
    }

    /// Bind `name` only when `value` is present.
    pub fn set_opt(self, name: &'static str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.set(name, v),
            None => self,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    fn is_present(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.trim().is_empty())
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Text appended to the user part only when `var` is bound.
#[derive(Debug, Clone, Copy)]
pub struct OptionalSection {
    pub var: &'static str,
    pub text: &'static str,
}

/// Rendered prompt ready for the gateway.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub system: Option<String>,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(&self.user));
        messages
    }
}

/// A prompt template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: Option<&'static str>,
    pub user: &'static str,
    pub optional: &'static [OptionalSection],
}

impl PromptTemplate {
    pub fn render(&self, vars: &Vars) -> PromptInstance {
        let mut user = substitute(self.user, vars).trim().to_string();
        for section in self.optional {
            if vars.is_present(section.var) {
                user.push_str("\n\n");
                user.push_str(substitute(section.text, vars).trim());
            }
        }

        PromptInstance {
            template_slug: self.slug,
            system: self.system.map(|s| substitute(s, vars).trim().to_string()),
            user,
        }
    }
}

/// Single-pass `{name}` substitution. Substituted values are never rescanned,
/// so a value that itself contains `{name}` is inserted literally.
pub fn substitute(template: &str, vars: &Vars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let ident_len = after
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(after.len());
        let ident = &after[..ident_len];
        let closed = after[ident_len..].starts_with('}');

        match vars.get(ident) {
            Some(value) if closed && !ident.is_empty() => {
                out.push_str(value);
                rest = &after[ident_len + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

// =============================================================================
// Pipeline prompts
// =============================================================================

pub const ROUTE_QUERY: PromptTemplate = PromptTemplate {
    slug: "route_query",
    system: Some(
        "You are an expert AI model router. Given a user query, you determine which \
         open-source AI model is best suited to handle it.",
    ),
    user: r#"You must pick one of the following models:
- creativeModel: Best for creative tasks such as writing stories or poems.
- mathematicalModel: Best for mathematical tasks such as solving equations or calculating complex formulas.
- generalModel: Best for general knowledge questions and tasks.

Query: {query}

Decide which model is the most appropriate and explain why. Put the model name in the "model" field and your reasoning in the "reason" field. The "model" field must contain only the model name: creativeModel, mathematicalModel, or generalModel."#,
    optional: &[],
};

/// Placeholder image base the recommender is told to use for logos.
pub const LOGO_PLACEHOLDER_BASE: &str = "https://picsum.photos/50/50";

pub const RECOMMEND_TOOLS: PromptTemplate = PromptTemplate {
    slug: "recommend_tools",
    system: Some(
        "You are an AI assistant that recommends other AI tools based on a user's query.",
    ),
    user: r#"Analyze the user's query to understand the primary task they want to accomplish.
Determine the primary task category (e.g. 'Image Generation', 'Code Generation', 'Text Summarization', 'Creative Writing', 'Data Analysis', 'Translation', 'Research').
Based on that category, recommend 1 to 3 suitable, well-known AI tools or models.
For each recommendation provide:
- name: the official name of the tool or model.
- logoUrl: a placeholder image URL of the form '{logo_base}?query=AI', where 'AI' is replaced by a one-word keyword for the task category (e.g. 'image', 'code', 'text').
- description: one or two sentences on what the tool does and why it fits the query.
- websiteUrl: the official website. If a specific model has no page of its own, link the platform that offers it.
- taskCategory: the identified task category.

Example tools per category:
- Image Generation: DALL-E 3, Midjourney, Stable Diffusion
- Code Generation: GitHub Copilot, Amazon CodeWhisperer, Tabnine
- Text Summarization: ChatGPT, Claude, Gemini
- Creative Writing: Jasper, Rytr, ChatGPT
- Data Analysis: Julius AI, Wolfram Alpha
- Translation: Google Translate, DeepL
- Research: Perplexity AI, Elicit

User Query: {query}"#,
    optional: &[],
};

pub const CRITIQUE: PromptTemplate = PromptTemplate {
    slug: "refine_critique",
    system: None,
    user: "Given the original query: {query}\n\nand the output: {output}\n\n\
           Provide a concise critique of the output, focusing on accuracy, clarity, \
           and relevance to the query.",
    optional: &[],
};

pub const REFINE: PromptTemplate = PromptTemplate {
    slug: "refine_output",
    system: None,
    user: "Given the original query: {query}\n\nand an initial output: {initial_output}\n\n\
           Refine the initial output to better address the query.",
    optional: &[OptionalSection {
        var: "critique",
        text: "Take into account the following critique: {critique}",
    }],
};

pub const PROMPT_FEEDBACK: PromptTemplate = PromptTemplate {
    slug: "optimize_feedback",
    system: Some("You are a prompt feedback provider."),
    user: "Provide constructive feedback on the following prompt, focusing on how it can \
           be improved for accuracy and efficiency.\n\nPrompt: {prompt}",
    optional: &[],
};

pub const PROMPT_OPTIMIZE: PromptTemplate = PromptTemplate {
    slug: "optimize_rewrite",
    system: Some("You are an expert prompt optimizer."),
    user: "Given the current prompt and the feedback, generate an improved prompt.\n\n\
           Current Prompt: {prompt}\nFeedback: {feedback}",
    optional: &[],
};

pub const SELECT_MODEL: PromptTemplate = PromptTemplate {
    slug: "select_model",
    system: Some(
        "You are an AI system that selects the most energy-efficient AI model for a given task.",
    ),
    user: r#"You will receive a task description and a list of available AI models. Select the most energy-efficient model that can perform the task without sacrificing performance.

Task Description: {task_description}
Available Models: {available_models}

Consider the following when selecting the model:
- The energy consumption of the model.
- The performance of the model on the given task.
- The cost of using the model.

Return the selected model, exactly as written in the list above, and the reason for selecting it."#,
    optional: &[],
};

pub const PROMPTS: &[PromptTemplate] = &[
    ROUTE_QUERY,
    RECOMMEND_TOOLS,
    CRITIQUE,
    REFINE,
    PROMPT_FEEDBACK,
    PROMPT_OPTIMIZE,
    SELECT_MODEL,
];

pub fn prompt_by_slug(slug: &str) -> Option<PromptTemplate> {
    PROMPTS.iter().find(|t| t.slug == slug).copied()
}

// =============================================================================
// TESTS
// =============================================================================
