//! Entity, article and alias records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Characters of article text used when an entity has no description.
pub const ARTICLE_SNIPPET_CHARS: usize = 500;

/// An entity as loaded from the store, with everything known about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Wikidata QID.
    pub id: String,
    /// Ordinal row position (1-based, assigned once at creation).
    pub row_position: i64,
    /// Canonical name.
    pub name: String,
    /// Short description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Deduplicated aliases, including name, label and article title.
    pub aliases: BTreeSet<String>,
    /// Title of the associated article.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_title: Option<String>,
    /// Text of the associated article.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_text: Option<String>,
    /// Summed occurrence count of all aliases pointing to this entity.
    pub count: u64,
}

impl Entity {
    /// Index key of this entity's vector in the embedding index.
    pub fn index_key(&self) -> u64 {
        (self.row_position - 1).max(0) as u64
    }

    /// Text used to infer this entity's embedding: name and aliases, followed
    /// by the description or, lacking one, the start of the article.
    pub fn embedding_text(&self) -> String {
        let mut names: BTreeSet<&str> = self.aliases.iter().map(String::as_str).collect();
        names.insert(self.name.as_str());
        let names = names.into_iter().collect::<Vec<_>>().join(" ");

        let context: String = match (&self.description, &self.article_text) {
            (Some(desc), _) if !desc.is_empty() => desc.clone(),
            (_, Some(text)) => text.chars().take(ARTICLE_SNIPPET_CHARS).collect(),
            _ => String::new(),
        };

        format!("{} {}", names, context)
    }
}

/// Entity as delivered by the ETL pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Wikidata QID.
    pub id: String,
    /// Canonical name.
    pub name: String,
    /// Short description.
    pub description: Option<String>,
    /// Label.
    pub label: Option<String>,
}

impl EntityRecord {
    /// Create a record with only id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            label: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Article as delivered by the ETL pipeline. One article per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// QID of the entity the article describes.
    pub entity_id: String,
    /// Article id in the wiki dump.
    pub id: String,
    pub title: String,
    pub content: String,
}

/// Observed (alias, entity) pair with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasCount {
    pub alias: String,
    pub entity_id: String,
    pub count: u64,
}

impl AliasCount {
    pub fn new(alias: impl Into<String>, entity_id: impl Into<String>, count: u64) -> Self {
        Self {
            alias: alias.into(),
            entity_id: entity_id.into(),
            count,
        }
    }
}

/// Prior probability of one entity given an alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasPrior {
    pub entity_id: String,
    pub prior_prob: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(description: Option<&str>, article_text: Option<&str>) -> Entity {
        Entity {
            id: "Q100".to_string(),
            row_position: 3,
            name: "Boston".to_string(),
            description: description.map(str::to_string),
            label: None,
            aliases: ["Beantown", "Boston"].iter().map(|s| s.to_string()).collect(),
            article_title: None,
            article_text: article_text.map(str::to_string),
            count: 11,
        }
    }

    #[test]
    fn test_index_key_is_row_position_minus_one() {
        assert_eq!(entity(None, None).index_key(), 2);
    }

    #[test]
    fn test_embedding_text_prefers_description() {
        let text = entity(Some("capital of Massachusetts"), Some("Boston is a city")).embedding_text();
        assert_eq!(text, "Beantown Boston capital of Massachusetts");
    }

    #[test]
    fn test_embedding_text_falls_back_to_article_snippet() {
        let article = "x".repeat(ARTICLE_SNIPPET_CHARS + 100);
        let text = entity(None, Some(&article)).embedding_text();
        assert_eq!(text.len(), "Beantown Boston ".len() + ARTICLE_SNIPPET_CHARS);
    }

    #[test]
    fn test_embedding_text_without_context() {
        assert_eq!(entity(None, None).embedding_text(), "Beantown Boston ");
    }
}
