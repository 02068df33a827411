//! Typed film metadata, keyed by the schema's field names.

use crate::schema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata record stored alongside each film.
///
/// Deserialization is lenient: list fields accept a comma-separated string,
/// and numbers may arrive as strings, as they do in some indexes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieMetadata {
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(
        rename = "Runtime (minutes)",
        default,
        deserialize_with = "deserialize_optional_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub runtime_minutes: Option<i64>,
    #[serde(rename = "Language", default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(
        rename = "Release Year",
        default,
        deserialize_with = "deserialize_optional_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub release_year: Option<i64>,
    #[serde(rename = "Genre", default, deserialize_with = "deserialize_list")]
    pub genre: Vec<String>,
    #[serde(rename = "Actors", default, deserialize_with = "deserialize_list")]
    pub actors: Vec<String>,
    #[serde(rename = "Directors", default, deserialize_with = "deserialize_list")]
    pub directors: Vec<String>,
    #[serde(rename = "Stream", default, deserialize_with = "deserialize_list")]
    pub stream: Vec<String>,
    #[serde(rename = "Buy", default, deserialize_with = "deserialize_list")]
    pub buy: Vec<String>,
    #[serde(rename = "Rent", default, deserialize_with = "deserialize_list")]
    pub rent: Vec<String>,
    #[serde(rename = "Production Companies", default, deserialize_with = "deserialize_list")]
    pub production_companies: Vec<String>,
    #[serde(
        rename = "Rating",
        default,
        deserialize_with = "deserialize_optional_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<f64>,
}

impl MovieMetadata {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    /// The record as a JSON object, for native filter evaluation.
    pub fn to_record(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Streaming providers, or the phrase the answer format uses for none.
    pub fn streaming_summary(&self) -> String {
        if self.stream.is_empty() {
            "Not currently streaming".to_string()
        } else {
            self.stream.join(", ")
        }
    }

    /// Look up a field by its schema name, rendered for display.
    pub fn display_field(&self, name: &str) -> Option<String> {
        let list = |items: &Vec<String>| (!items.is_empty()).then(|| items.join(", "));
        match name {
            schema::TITLE => Some(self.title.clone()),
            schema::RUNTIME => self.runtime_minutes.map(|m| m.to_string()),
            schema::LANGUAGE => self.language.clone(),
            schema::RELEASE_YEAR => self.release_year.map(|y| y.to_string()),
            schema::GENRE => list(&self.genre),
            schema::ACTORS => list(&self.actors),
            schema::DIRECTORS => list(&self.directors),
            schema::STREAM => list(&self.stream),
            schema::BUY => list(&self.buy),
            schema::RENT => list(&self.rent),
            schema::PRODUCTION_COMPANIES => list(&self.production_companies),
            schema::RATING => self.rating.map(|r| r.to_string()),
            _ => None,
        }
    }
}

fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct ListVisitor;

    impl<'de> Visitor<'de> for ListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, array of strings, or null")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                let item = item.trim();
                if !item.is_empty() {
                    items.push(item.to_string());
                }
            }
            Ok(items)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![])
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![])
        }
    }

    deserializer.deserialize_any(ListVisitor)
}

fn deserialize_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct NumberVisitor;

    impl<'de> Visitor<'de> for NumberVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number, numeric string, or null")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.trim().parse::<f64>().ok())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(NumberVisitor)
}

fn deserialize_optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // Indexes built from spreadsheets store whole numbers as 2015.0.
    deserialize_optional_f64(deserializer).map(|n| n.map(|v| v.round() as i64))
}
