//! Confirmed tag relations, as seen from the inference core.
//!
//! The relation table itself lives outside the core (see `tagrel-store`).
//! The core only reads it through [`RelationSource`], once per call, and
//! derives the expanded views it needs:
//!
//! - synonyms: `tag -> [tags]`, expanded per the directionality rule
//! - antonyms: `{(tag1, tag2, context)}`, expanded per the directionality rule
//! - unrelated pairs: `{(tag1, tag2)}`, always symmetric
//! - existing keys: `{(tag1, tag2, context)}` for every stored row, both orders
//!
//! Directionality rule: the stored `tag1 -> tag2` direction is always valid;
//! `tag2 -> tag1` is valid only when the relation is bidirectional.

use std::fmt;
use std::str::FromStr;

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TagRelError};
use crate::tag::compound_parts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Synonym,
    Antonym,
    Unrelated,
}

impl RelationType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Synonym => "synonym",
            RelationType::Antonym => "antonym",
            RelationType::Unrelated => "unrelated",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = TagRelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synonym" => Ok(RelationType::Synonym),
            "antonym" => Ok(RelationType::Antonym),
            "unrelated" => Ok(RelationType::Unrelated),
            other => Err(TagRelError::UnknownRelationType(other.to_string())),
        }
    }
}

/// A stored, human-reviewed relation between two tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedRelation {
    pub tag1: String,
    pub tag2: String,
    /// Space-separated context tags; empty for unconditional relations.
    #[serde(default)]
    pub context_tags: String,
    pub relation_type: RelationType,
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
}

fn default_bidirectional() -> bool {
    true
}

impl ConfirmedRelation {
    pub fn new(tag1: &str, tag2: &str, relation_type: RelationType) -> Self {
        Self {
            tag1: tag1.to_string(),
            tag2: tag2.to_string(),
            context_tags: String::new(),
            relation_type,
            bidirectional: true,
        }
    }

    pub fn with_context(mut self, context_tags: &str) -> Self {
        self.context_tags = context_tags.to_string();
        self
    }

    pub fn one_way(mut self) -> Self {
        self.bidirectional = false;
        self
    }
}

/// Which stored direction answered a [`RelationSource::get_relation`] lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationDirection {
    Forward,
    Reverse,
}

/// Result of a directed lookup. `tag1`/`tag2` are reported in the order the
/// caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMatch {
    pub tag1: String,
    pub tag2: String,
    pub relation_type: RelationType,
    pub context_tags: String,
    pub bidirectional: bool,
    pub direction: RelationDirection,
}

/// Read access to the confirmed-relation table.
///
/// Implementors only need [`RelationSource::relations`]; the derived views
/// are computed from it. Implementations backed by a real database may
/// override them with indexed queries.
pub trait RelationSource: Send + Sync {
    fn relations(&self) -> Result<Vec<ConfirmedRelation>>;

    fn confirmed_synonyms(&self) -> Result<AHashMap<String, Vec<String>>> {
        Ok(RelationSnapshot::from_relations(self.relations()?).synonyms)
    }

    fn confirmed_antonyms(&self) -> Result<AHashSet<AntonymKey>> {
        Ok(RelationSnapshot::from_relations(self.relations()?).antonyms)
    }

    fn unrelated_pairs(&self) -> Result<AHashSet<(String, String)>> {
        Ok(RelationSnapshot::from_relations(self.relations()?).unrelated)
    }

    fn get_relation(&self, tag1: &str, tag2: &str) -> Result<Option<RelationMatch>> {
        Ok(find_relation(&self.relations()?, tag1, tag2))
    }
}

impl<T: RelationSource + ?Sized> RelationSource for std::sync::Arc<T> {
    fn relations(&self) -> Result<Vec<ConfirmedRelation>> {
        (**self).relations()
    }

    fn confirmed_synonyms(&self) -> Result<AHashMap<String, Vec<String>>> {
        (**self).confirmed_synonyms()
    }

    fn confirmed_antonyms(&self) -> Result<AHashSet<AntonymKey>> {
        (**self).confirmed_antonyms()
    }

    fn unrelated_pairs(&self) -> Result<AHashSet<(String, String)>> {
        (**self).unrelated_pairs()
    }

    fn get_relation(&self, tag1: &str, tag2: &str) -> Result<Option<RelationMatch>> {
        (**self).get_relation(tag1, tag2)
    }
}

/// Forward match first; otherwise a reverse match, only if bidirectional.
pub fn find_relation(
    relations: &[ConfirmedRelation],
    tag1: &str,
    tag2: &str,
) -> Option<RelationMatch> {
    if let Some(r) = relations.iter().find(|r| r.tag1 == tag1 && r.tag2 == tag2) {
        return Some(RelationMatch {
            tag1: r.tag1.clone(),
            tag2: r.tag2.clone(),
            relation_type: r.relation_type,
            context_tags: r.context_tags.clone(),
            bidirectional: r.bidirectional,
            direction: RelationDirection::Forward,
        });
    }
    relations
        .iter()
        .find(|r| r.bidirectional && r.tag1 == tag2 && r.tag2 == tag1)
        .map(|r| RelationMatch {
            tag1: r.tag2.clone(),
            tag2: r.tag1.clone(),
            relation_type: r.relation_type,
            context_tags: r.context_tags.clone(),
            bidirectional: true,
            direction: RelationDirection::Reverse,
        })
}

/// `(tag1, tag2, context)` of a directed antonym.
pub type AntonymKey = (String, String, String);

/// Every view the core needs, derived from one read of the relation table.
#[derive(Debug, Clone, Default)]
pub struct RelationSnapshot {
    pub synonyms: AHashMap<String, Vec<String>>,
    pub antonyms: AHashSet<AntonymKey>,
    pub unrelated: AHashSet<(String, String)>,
    /// `(tag1, tag2, context)` of every stored row, in both orders.
    pub existing: AHashSet<(String, String, String)>,
}

impl RelationSnapshot {
    pub fn from_relations(relations: impl IntoIterator<Item = ConfirmedRelation>) -> Self {
        let mut out = RelationSnapshot::default();
        for r in relations {
            out.existing
                .insert((r.tag1.clone(), r.tag2.clone(), r.context_tags.clone()));
            out.existing
                .insert((r.tag2.clone(), r.tag1.clone(), r.context_tags.clone()));

            match r.relation_type {
                RelationType::Synonym => {
                    out.synonyms
                        .entry(r.tag1.clone())
                        .or_default()
                        .push(r.tag2.clone());
                    if r.bidirectional {
                        out.synonyms.entry(r.tag2).or_default().push(r.tag1);
                    }
                }
                RelationType::Antonym => {
                    out.antonyms
                        .insert((r.tag1.clone(), r.tag2.clone(), r.context_tags.clone()));
                    if r.bidirectional {
                        out.antonyms.insert((r.tag2, r.tag1, r.context_tags));
                    }
                }
                RelationType::Unrelated => {
                    out.unrelated.insert((r.tag1.clone(), r.tag2.clone()));
                    out.unrelated.insert((r.tag2, r.tag1));
                }
            }
        }
        out
    }

    pub fn load(source: &dyn RelationSource) -> Result<Self> {
        Ok(Self::from_relations(source.relations()?))
    }

    pub fn is_unrelated(&self, a: &str, b: &str) -> bool {
        self.unrelated.contains(&(a.to_string(), b.to_string()))
    }

    pub fn has_key(&self, tag1: &str, tag2: &str, context: &str) -> bool {
        self.existing
            .contains(&(tag1.to_string(), tag2.to_string(), context.to_string()))
    }

    /// Whether `candidate` is a confirmed antonym of any input tag.
    ///
    /// A context-qualified antonym applies only when every context tag is
    /// present in `input_tags`.
    pub fn is_antonym_of_any(&self, candidate: &str, input_tags: &[String]) -> bool {
        input_tags.iter().any(|input| {
            self.antonyms.iter().any(|(tag1, tag2, context)| {
                tag1 == candidate
                    && tag2 == input
                    && compound_parts(context).all(|c| input_tags.iter().any(|t| t == c))
            })
        })
    }

    /// Confirmed synonyms of the input tags that are not inputs themselves.
    pub fn synonyms_of(&self, input_tags: &[String]) -> AHashSet<String> {
        input_tags
            .iter()
            .filter_map(|t| self.synonyms.get(t))
            .flatten()
            .filter(|syn| !input_tags.contains(syn))
            .cloned()
            .collect()
    }
}
