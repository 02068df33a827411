//! Worked examples embedded in the query constructor prompt.
//!
//! Every comparator and operator the prompt allows is demonstrated here at
//! least once, and nothing else is. `ConstructorConfig::validate` enforces
//! this at startup.

/// One user query with its expected structured request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FewShotExample {
    pub user_query: String,
    pub query: String,
    /// Filter in the model's grammar, or `NO_FILTER`.
    pub filter: String,
}

impl FewShotExample {
    pub fn new(user_query: &str, query: &str, filter: &str) -> Self {
        Self {
            user_query: user_query.to_string(),
            query: query.to_string(),
            filter: filter.to_string(),
        }
    }

    /// The structured request as the JSON the model is expected to emit.
    pub fn response_json(&self) -> String {
        let value = serde_json::json!({
            "query": self.query,
            "filter": self.filter,
        });
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

/// The film examples: conjunctions, negated membership, a pure similarity
/// query, numeric ranges, and a disjunction over streaming providers.
pub fn movie_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample::new(
            "Recommend some films similar to star wars movies but not part of the star wars universe.",
            "space opera, adventure, epic battles",
            r#"and(nin("Title", ["Star Wars"]), in("Genre", ["Science Fiction", "Adventure"]))"#,
        ),
        FewShotExample::new(
            "Show me critically acclaimed dramas without Tom Hanks.",
            "critically acclaimed drama",
            r#"and(eq("Genre", "Drama"), nin("Actors", ["Tom Hanks"]), gte("Rating", 7.5))"#,
        ),
        FewShotExample::new(
            "Recommend some films by Yorgos Lanthimos.",
            "Yorgos Lanthimos",
            r#"in("Directors", ["Yorgos Lanthimos"])"#,
        ),
        FewShotExample::new(
            "Films similar to Yorgos Lanthimos movies.",
            "Dark comedy, absurd, Greek Weird Wave",
            "NO_FILTER",
        ),
        FewShotExample::new(
            "Find me thrillers with a strong female lead released between 2015 and 2020.",
            "thriller strong female lead",
            r#"and(eq("Genre", "Thriller"), gte("Release Year", 2015), lte("Release Year", 2020))"#,
        ),
        FewShotExample::new(
            "Find me highly rated drama movies in English that are less than 2 hours long",
            "Highly rated drama English",
            r#"and(eq("Genre", "Drama"), eq("Language", "English"), lt("Runtime (minutes)", 120), gt("Rating", 7))"#,
        ),
        FewShotExample::new(
            "Something light to stream on Netflix or Hulu, but not a horror movie.",
            "light, feel-good, funny",
            r#"and(or(in("Stream", ["Netflix"]), in("Stream", ["Hulu"])), ne("Genre", "Horror"))"#,
        ),
    ]
}
