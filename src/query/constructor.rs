//! Query construction: free text in, [`StructuredQuery`] out.

use super::examples::{movie_examples, FewShotExample};
use super::{parse_filter, parse_structured_query, Comparator, FilterExpression, Operator, StructuredQuery};
use crate::config::Prompts;
use crate::error::{Result, RosebudError};
use crate::filter::FilterTranslator;
use crate::llm::{ChatMessage, CompletionService};
use crate::schema::MetadataSchema;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Turns a user's free-text request into a search string plus filter.
#[async_trait]
pub trait QueryConstructor: Send + Sync {
    async fn construct(&self, query: &str) -> Result<StructuredQuery>;
}

/// Everything the constructor prompt is assembled from.
#[derive(Debug, Clone)]
pub struct ConstructorConfig {
    pub schema: MetadataSchema,
    pub comparators: Vec<Comparator>,
    pub operators: Vec<Operator>,
    pub examples: Vec<FewShotExample>,
}

impl ConstructorConfig {
    /// Film schema, every comparator, `and`/`or`, and the film examples.
    pub fn movies(first_year: i32, last_year: i32) -> Self {
        Self {
            schema: MetadataSchema::movies().with_year_range(first_year, last_year),
            comparators: Comparator::ALL.to_vec(),
            operators: vec![Operator::And, Operator::Or],
            examples: movie_examples(),
        }
    }

    /// Check a parsed filter against the allowed vocabulary and the schema.
    pub fn check_filter(&self, filter: &FilterExpression) -> Result<()> {
        let mut outcome = Ok(());
        filter.walk(&mut |node| {
            if outcome.is_err() {
                return;
            }
            outcome = match node {
                FilterExpression::Comparison {
                    comparator,
                    attribute,
                    value,
                } => {
                    if self.comparators.contains(comparator) {
                        self.schema.check_comparison(*comparator, attribute, value)
                    } else {
                        Err(RosebudError::UnsupportedOperator(format!(
                            "comparator '{}' is not allowed",
                            comparator
                        )))
                    }
                }
                FilterExpression::Operation { operator, .. } => {
                    if self.operators.contains(operator) {
                        Ok(())
                    } else {
                        Err(RosebudError::UnsupportedOperator(format!(
                            "operator '{}' is not allowed",
                            operator
                        )))
                    }
                }
            };
        });
        outcome
    }

    /// Startup check that the examples, the allowed vocabulary, and the
    /// store's translator agree with each other.
    pub fn validate(&self, translator: &FilterTranslator) -> Result<()> {
        let mut used_comparators = Vec::new();
        let mut used_operators = Vec::new();

        for example in &self.examples {
            let filter = parse_filter(&example.filter).map_err(|e| {
                RosebudError::Config(format!("example '{}': {}", example.user_query, e))
            })?;
            let Some(filter) = filter else { continue };

            self.check_filter(&filter).map_err(|e| {
                RosebudError::Config(format!("example '{}': {}", example.user_query, e))
            })?;

            for c in filter.comparators() {
                if !used_comparators.contains(&c) {
                    used_comparators.push(c);
                }
            }
            for o in filter.operators() {
                if !used_operators.contains(&o) {
                    used_operators.push(o);
                }
            }
        }

        let missing: Vec<String> = self
            .comparators
            .iter()
            .filter(|c| !used_comparators.contains(c))
            .map(|c| c.to_string())
            .chain(
                self.operators
                    .iter()
                    .filter(|o| !used_operators.contains(o))
                    .map(|o| o.to_string()),
            )
            .collect();
        if !missing.is_empty() {
            return Err(RosebudError::Config(format!(
                "no example demonstrates: {}",
                missing.join(", ")
            )));
        }

        for comparator in &self.comparators {
            if !translator.supports_comparator(*comparator) {
                return Err(RosebudError::UnsupportedOperator(format!(
                    "document store cannot express comparator '{}'",
                    comparator
                )));
            }
        }
        for operator in &self.operators {
            if !translator.supports_operator(*operator) {
                return Err(RosebudError::UnsupportedOperator(format!(
                    "document store cannot express operator '{}'",
                    operator
                )));
            }
        }

        debug!(
            "Constructor config valid: {} examples, {} comparators, {} operators",
            self.examples.len(),
            self.comparators.len(),
            self.operators.len()
        );
        Ok(())
    }
}

/// Query constructor backed by a chat completion at temperature 0.
pub struct LlmQueryConstructor {
    llm: Arc<dyn CompletionService>,
    config: ConstructorConfig,
    prompts: Prompts,
    system_prompt: String,
    max_attempts: u32,
}

impl LlmQueryConstructor {
    pub fn new(llm: Arc<dyn CompletionService>, config: ConstructorConfig, prompts: Prompts) -> Self {
        let system_prompt = render_system_prompt(&config, &prompts);
        Self {
            llm,
            config,
            prompts,
            system_prompt,
            max_attempts: 2,
        }
    }

    /// Attempts made when the model's reply cannot be parsed. At least one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn config(&self) -> &ConstructorConfig {
        &self.config
    }

    /// The fully rendered system prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn messages(&self, query: &str) -> Vec<ChatMessage> {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), query.to_string());
        let user = self.prompts.render_with_custom(&self.prompts.query.user, &vars);
        vec![ChatMessage::system(self.system_prompt.clone()), ChatMessage::user(user)]
    }

    fn interpret(&self, completion: &str, query: &str) -> Result<StructuredQuery> {
        let structured = parse_structured_query(completion, query)?;
        if let Some(filter) = &structured.filter {
            self.config.check_filter(filter)?;
        }
        Ok(structured)
    }
}

fn render_system_prompt(config: &ConstructorConfig, prompts: &Prompts) -> String {
    let examples = config
        .examples
        .iter()
        .enumerate()
        .map(|(i, example)| {
            let mut vars = HashMap::new();
            vars.insert("index".to_string(), (i + 1).to_string());
            vars.insert("user_query".to_string(), example.user_query.clone());
            vars.insert("structured_request".to_string(), example.response_json());
            prompts.render_with_custom(&prompts.query.example, &vars)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let comparators = config
        .comparators
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    let operators = config
        .operators
        .iter()
        .map(|o| o.as_str())
        .collect::<Vec<_>>()
        .join(" | ");

    let mut vars = HashMap::new();
    vars.insert("comparators".to_string(), comparators);
    vars.insert("operators".to_string(), operators);
    vars.insert(
        "content_description".to_string(),
        config.schema.content_description.clone(),
    );
    vars.insert("attributes".to_string(), config.schema.attributes_json());
    vars.insert("examples".to_string(), examples);
    prompts.render_with_custom(&prompts.query.system, &vars)
}

#[async_trait]
impl QueryConstructor for LlmQueryConstructor {
    #[instrument(skip(self), fields(model = %self.llm.model()))]
    async fn construct(&self, query: &str) -> Result<StructuredQuery> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RosebudError::InvalidInput("query must not be empty".to_string()));
        }

        let messages = self.messages(query);
        let mut attempt = 1;
        loop {
            let completion = self.llm.complete(&messages, 0.0).await?;
            match self.interpret(&completion, query) {
                Ok(structured) => {
                    info!("Constructed {}", structured);
                    return Ok(structured);
                }
                Err(e @ (RosebudError::MalformedQuery(_) | RosebudError::FilterParse(_)))
                    if attempt < self.max_attempts =>
                {
                    warn!("Attempt {} produced an unusable query: {}", attempt, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Value;
    use crate::testing::ScriptedCompletion;

    fn constructor(llm: Arc<ScriptedCompletion>) -> LlmQueryConstructor {
        LlmQueryConstructor::new(llm, ConstructorConfig::movies(1950, 2024), Prompts::default())
    }

    #[test]
    fn test_movie_config_is_valid() {
        let config = ConstructorConfig::movies(1950, 2024);
        config.validate(&FilterTranslator::pinecone()).unwrap();
    }

    #[test]
    fn test_validate_rejects_undemonstrated_comparator() {
        let mut config = ConstructorConfig::movies(1950, 2024);
        config.examples.retain(|e| !e.filter.contains("lte("));
        let err = config.validate(&FilterTranslator::pinecone()).unwrap_err();
        assert!(err.to_string().contains("lte"));
    }

    #[test]
    fn test_validate_rejects_operator_the_store_cannot_express() {
        let config = ConstructorConfig::movies(1950, 2024);
        let translator = FilterTranslator::new(Comparator::ALL.to_vec(), vec![Operator::And]);
        assert!(matches!(
            config.validate(&translator),
            Err(RosebudError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn test_system_prompt_carries_schema_and_examples() {
        let c = constructor(Arc::new(ScriptedCompletion::new(&[])));
        let prompt = c.system_prompt();
        assert!(prompt.contains("\"Runtime (minutes)\""));
        assert!(prompt.contains("eq | ne | gt | gte | lt | lte | in | nin"));
        assert!(prompt.contains("### Example 7"));
        assert!(prompt.contains("Greek Weird Wave"));
        assert!(!prompt.contains("{{"));
    }

    #[tokio::test]
    async fn test_construct_conjunction() {
        let reply = r#"```json
{"query": "Highly rated drama English",
 "filter": "and(eq(\"Genre\", \"Drama\"), eq(\"Language\", \"English\"), lt(\"Runtime (minutes)\", 40))"}
```"#;
        let c = constructor(Arc::new(ScriptedCompletion::new(&[reply])));
        let structured = c
            .construct("Find me highly rated drama movies in English that are less than 40 minutes")
            .await
            .unwrap();

        assert_eq!(structured.query, "Highly rated drama English");
        assert_eq!(
            structured.filter,
            Some(FilterExpression::and(vec![
                FilterExpression::comparison(Comparator::Eq, "Genre", Value::String("Drama".into())),
                FilterExpression::comparison(Comparator::Eq, "Language", Value::String("English".into())),
                FilterExpression::comparison(Comparator::Lt, "Runtime (minutes)", Value::Integer(40)),
            ]))
        );
    }

    #[tokio::test]
    async fn test_construct_no_filter() {
        let reply = r#"{"query": "Dark comedy, absurd, Greek Weird Wave", "filter": "NO_FILTER"}"#;
        let c = constructor(Arc::new(ScriptedCompletion::new(&[reply])));
        let structured = c.construct("Films similar to Yorgos Lanthimos movies.").await.unwrap();
        assert_eq!(structured.filter, None);
    }

    #[tokio::test]
    async fn test_construct_is_deterministic_at_zero_temperature() {
        let reply = r#"{"query": "space opera", "filter": "gte(\"Rating\", 7.5)"}"#;
        let llm = Arc::new(ScriptedCompletion::always(reply));
        let c = constructor(llm.clone());

        let first = c.construct("space operas rated 7.5+").await.unwrap();
        let second = c.construct("space operas rated 7.5+").await.unwrap();
        assert_eq!(first, second);
        assert!(llm.temperatures.lock().unwrap().iter().all(|t| *t == 0.0));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_retried_once() {
        let llm = Arc::new(ScriptedCompletion::new(&[
            "Sure! Here are some dramas.",
            r#"{"query": "drama", "filter": "eq(\"Genre\", \"Drama\")"}"#,
        ]));
        let c = constructor(llm.clone());
        let structured = c.construct("dramas").await.unwrap();
        assert_eq!(structured.query, "drama");
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_attribute_fails_after_retries() {
        let reply = r#"{"query": "cheap", "filter": "lt(\"Budget\", 1000000)"}"#;
        let llm = Arc::new(ScriptedCompletion::always(reply));
        let c = constructor(llm.clone());
        assert!(matches!(
            c.construct("low budget films").await,
            Err(RosebudError::FilterParse(_))
        ));
        assert_eq!(llm.calls(), 2);

        let llm = Arc::new(ScriptedCompletion::always(reply));
        let c = constructor(llm.clone()).with_max_attempts(3);
        tokio_test::assert_err!(c.construct("low budget films").await);
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn test_not_operator_is_unsupported() {
        let reply = r#"{"query": "films", "filter": "not(eq(\"Genre\", \"Horror\"))"}"#;
        let llm = Arc::new(ScriptedCompletion::always(reply));
        let c = constructor(llm.clone());
        assert!(matches!(
            c.construct("anything but horror").await,
            Err(RosebudError::UnsupportedOperator(_))
        ));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let c = constructor(Arc::new(ScriptedCompletion::new(&[])));
        assert!(matches!(c.construct("   ").await, Err(RosebudError::InvalidInput(_))));
    }
}
