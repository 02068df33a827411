//! Prompt templates for Rosebud.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("Invalid regex"));

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub query: QueryPrompts,
    pub recommend: RecommendPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for turning free text into a structured query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPrompts {
    pub system: String,
    /// Rendered once per few-shot example.
    pub example: String,
    pub user: String,
}

impl Default for QueryPrompts {
    fn default() -> Self {
        Self {
            system: r#"Your job is to turn a user's request for films into a structured request that a filtered vector search can run.

## Output format
Reply with a markdown code block containing one JSON object:

```json
{
    "query": string,  // text to match against the film descriptions
    "filter": string  // logical condition over the film metadata
}
```

The "query" holds only what should be matched semantically against the descriptions. Anything expressed in the filter must not be repeated in the query.

## Filter syntax
A comparison statement has the form `comp(attr, val)`:
- `comp` ({{comparators}}): the comparator
- `attr` (string): the quoted name of the attribute being compared
- `val`: the value; strings are quoted, lists are written as ["a", "b"]

A logical operation has the form `op(statement1, statement2, ...)`:
- `op` ({{operators}}): the logical operator
- `statement1`, `statement2`, ...: comparison statements or logical operations

Rules:
- Use only the comparators and operators listed above.
- Refer only to attributes that exist in the data source, spelled exactly as given.
- Only make comparisons that are feasible for the attribute's type.
- Only filter when the request calls for it. If no filter applies, use "NO_FILTER" as the filter value.

## Data source
```json
{
    "content": "{{content_description}}",
    "attributes": {{attributes}}
}
```

## Examples
{{examples}}"#
                .to_string(),

            example: r#"### Example {{index}}
User query:
{{user_query}}

Structured request:
```json
{{structured_request}}
```
"#
            .to_string(),

            user: r#"User query:
{{query}}

Structured request:"#
                .to_string(),
        }
    }
}

/// Prompts for generating the recommendation from retrieved films.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendPrompts {
    pub system: String,
    pub user: String,
}

impl Default for RecommendPrompts {
    fn default() -> Self {
        Self {
            system: r#"You recommend films to users based on their request and a list of retrieved films.

Guidelines:
- Recommend only films that appear in the retrieved context. NEVER recommend a film that is not in the context.
- Leave out retrieved films that are not relevant to the request.
- Aim for three to five recommendations when relevant films exist. Never recommend more than five.
- If the context is empty or nothing in it is relevant, do not recommend anything. Tell the user you couldn't find any films that match their request.
- Each recommendation needs two to three sentences explaining why it fits the request.

Use exactly this format for each film:
- **Title of Film**:
    - **Runtime:** <minutes> minutes
    - **Release Year:** <year>
    - **Streaming:** <providers, or "Not currently streaming">
    - <your reasoning for recommending this film>"#
                .to_string(),

            user: r#"Request: {{question}}

Retrieved films:
{{context}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let query_path = custom_path.join("query.toml");
            if query_path.exists() {
                let content = std::fs::read_to_string(&query_path)?;
                prompts.query = toml::from_str(&content)?;
            }

            let recommend_path = custom_path.join("recommend.toml");
            if recommend_path.exists() {
                let content = std::fs::read_to_string(&recommend_path)?;
                prompts.recommend = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Substitution is a single pass over the template, so placeholders that
    /// appear inside substituted values are left as written. Unknown
    /// placeholders are kept.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.query.system.contains("{{attributes}}"));
        assert!(prompts.recommend.system.contains("more than five"));
        assert!(prompts.recommend.user.contains("{{context}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Request: {{question}} ({{tone}})";
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "cozy films".to_string());

        let mut prompts = Prompts::default();
        prompts.variables.insert("tone".to_string(), "casual".to_string());
        prompts.variables.insert("question".to_string(), "ignored".to_string());

        let result = prompts.render_with_custom(template, &vars);
        assert_eq!(result, "Request: cozy films (casual)");
    }

    #[test]
    fn test_placeholders_in_values_are_not_expanded() {
        let template = "Films:\n{{context}}\nRequest: {{question}} {{unknown}}";
        let mut vars = HashMap::new();
        vars.insert("context".to_string(), "A synopsis quoting {{question}}".to_string());
        vars.insert("question".to_string(), "tell me about {{context}}".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(
            result,
            "Films:\nA synopsis quoting {{question}}\nRequest: tell me about {{context}} {{unknown}}"
        );
    }

    #[test]
    fn test_custom_prompt_dir_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("recommend.toml"),
            "system = \"Be brief.\"\nuser = \"{{question}}\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.recommend.system, "Be brief.");
        assert!(prompts.query.system.contains("NO_FILTER"));
    }
}
