//! Metadata schema shared by the query constructor prompt and the document store.
//!
//! Field names are the exact metadata keys stored alongside each indexed
//! film. The same [`MetadataSchema`] value feeds the prompt description and
//! the validation of model-produced filters, so the two cannot drift apart.

use crate::error::{Result, RosebudError};
use crate::query::{Comparator, Value};
use serde::Serialize;
use std::fmt;

pub const TITLE: &str = "Title";
pub const RUNTIME: &str = "Runtime (minutes)";
pub const LANGUAGE: &str = "Language";
pub const RELEASE_YEAR: &str = "Release Year";
pub const GENRE: &str = "Genre";
pub const ACTORS: &str = "Actors";
pub const DIRECTORS: &str = "Directors";
pub const STREAM: &str = "Stream";
pub const BUY: &str = "Buy";
pub const RENT: &str = "Rent";
pub const PRODUCTION_COMPANIES: &str = "Production Companies";
pub const RATING: &str = "Rating";

/// Declared type of a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    /// A single string or a list of strings (genres, cast, providers...).
    StringOrList,
}

impl FieldType {
    fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Float => write!(f, "float"),
            FieldType::StringOrList => write!(f, "string or list[string]"),
        }
    }
}

/// A named, typed, described metadata field.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name: String,
    pub description: String,
    pub field_type: FieldType,
}

impl AttributeInfo {
    pub fn new(name: &str, description: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            field_type,
        }
    }
}

#[derive(Serialize)]
struct PromptAttribute<'a> {
    description: &'a str,
    #[serde(rename = "type")]
    field_type: String,
}

/// Ordered set of metadata fields describing an indexed document.
#[derive(Debug, Clone)]
pub struct MetadataSchema {
    /// Natural-language description of the document text itself.
    pub content_description: String,
    fields: Vec<AttributeInfo>,
}

impl MetadataSchema {
    pub fn new(content_description: &str, fields: Vec<AttributeInfo>) -> Self {
        Self {
            content_description: content_description.to_string(),
            fields,
        }
    }

    /// The film schema used by the production index.
    pub fn movies() -> Self {
        use FieldType::*;
        Self::new(
            "Brief overview of a movie, along with keywords",
            vec![
                AttributeInfo::new(TITLE, "The title of the movie", String),
                AttributeInfo::new(RUNTIME, "The runtime of the movie in minutes", Integer),
                AttributeInfo::new(LANGUAGE, "The language of the movie", String),
                AttributeInfo::new(RELEASE_YEAR, "The release year of the movie", Integer),
                AttributeInfo::new(GENRE, "The genre of the movie", StringOrList),
                AttributeInfo::new(ACTORS, "The actors in the movie", StringOrList),
                AttributeInfo::new(DIRECTORS, "The directors of the movie", StringOrList),
                AttributeInfo::new(STREAM, "The streaming platforms for the movie", StringOrList),
                AttributeInfo::new(BUY, "The platforms where the movie can be bought", StringOrList),
                AttributeInfo::new(RENT, "The platforms where the movie can be rented", StringOrList),
                AttributeInfo::new(
                    PRODUCTION_COMPANIES,
                    "The production companies of the movie",
                    StringOrList,
                ),
                AttributeInfo::new(RATING, "Rating of a film, out of 10", Float),
            ],
        )
    }

    /// Mention the indexed corpus years in the release year description.
    pub fn with_year_range(mut self, first: i32, last: i32) -> Self {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == RELEASE_YEAR) {
            field.description = format!(
                "The release year of the movie (the collection spans {} to {})",
                first, last
            );
        }
        self
    }

    pub fn fields(&self) -> &[AttributeInfo] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&AttributeInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render the attributes as the JSON object embedded in the constructor prompt.
    pub fn attributes_json(&self) -> String {
        let mut map = serde_json::Map::new();
        for field in &self.fields {
            let attr = PromptAttribute {
                description: &field.description,
                field_type: field.field_type.to_string(),
            };
            // Serializing a struct of strings cannot fail.
            if let Ok(value) = serde_json::to_value(attr) {
                map.insert(field.name.clone(), value);
            }
        }
        serde_json::to_string_pretty(&serde_json::Value::Object(map)).unwrap_or_default()
    }

    /// Check that a comparison refers to a known field with a compatible literal.
    pub fn check_comparison(&self, comparator: Comparator, attribute: &str, value: &Value) -> Result<()> {
        let field = self.field(attribute).ok_or_else(|| {
            RosebudError::FilterParse(format!("unknown attribute '{}'", attribute))
        })?;

        let compatible = match comparator {
            Comparator::Gt | Comparator::Gte | Comparator::Lt | Comparator::Lte => {
                field.field_type.is_numeric() && value.is_number()
            }
            Comparator::In | Comparator::Nin => match value {
                Value::List(items) => items.iter().all(|item| scalar_fits(field.field_type, item)),
                other => scalar_fits(field.field_type, other),
            },
            Comparator::Eq | Comparator::Ne => scalar_fits(field.field_type, value),
        };

        if compatible {
            Ok(())
        } else {
            Err(RosebudError::FilterParse(format!(
                "{}({:?}, {}) does not fit attribute type {}",
                comparator, attribute, value, field.field_type
            )))
        }
    }
}

fn scalar_fits(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String | FieldType::StringOrList => matches!(value, Value::String(_)),
        FieldType::Integer | FieldType::Float => value.is_number(),
    }
}
