//! Listing the relation table: filters, sort orders, pagination.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tagrel_core::RelationType;

use crate::error::StoreError;
use crate::model::StoredRelation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    CreatedDateAsc,
    CreatedDateDesc,
    ModifiedDateAsc,
    ModifiedDateDesc,
    Tag1CountAsc,
    Tag1CountDesc,
    Tag2CountAsc,
    Tag2CountDesc,
    /// By [`StoredRelation::overlap_gap`]; rows without a gap sort first.
    GapAsc,
    /// By [`StoredRelation::overlap_gap`]; rows without a gap sort last.
    GapDesc,
}

impl SortBy {
    pub const ALL: [SortBy; 10] = [
        SortBy::CreatedDateAsc,
        SortBy::CreatedDateDesc,
        SortBy::ModifiedDateAsc,
        SortBy::ModifiedDateDesc,
        SortBy::Tag1CountAsc,
        SortBy::Tag1CountDesc,
        SortBy::Tag2CountAsc,
        SortBy::Tag2CountDesc,
        SortBy::GapAsc,
        SortBy::GapDesc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::CreatedDateAsc => "created_date_asc",
            SortBy::CreatedDateDesc => "created_date_desc",
            SortBy::ModifiedDateAsc => "modified_date_asc",
            SortBy::ModifiedDateDesc => "modified_date_desc",
            SortBy::Tag1CountAsc => "tag1_count_asc",
            SortBy::Tag1CountDesc => "tag1_count_desc",
            SortBy::Tag2CountAsc => "tag2_count_asc",
            SortBy::Tag2CountDesc => "tag2_count_desc",
            SortBy::GapAsc => "gap_asc",
            SortBy::GapDesc => "gap_desc",
        }
    }

    /// Row order; ties fall back to the row id.
    pub(crate) fn compare(self, a: &StoredRelation, b: &StoredRelation) -> Ordering {
        let primary = match self {
            SortBy::CreatedDateAsc => a.created.cmp(&b.created),
            SortBy::CreatedDateDesc => b.created.cmp(&a.created),
            SortBy::ModifiedDateAsc => a.modified.cmp(&b.modified),
            SortBy::ModifiedDateDesc => b.modified.cmp(&a.modified),
            SortBy::Tag1CountAsc => a.tag1_count.cmp(&b.tag1_count),
            SortBy::Tag1CountDesc => b.tag1_count.cmp(&a.tag1_count),
            SortBy::Tag2CountAsc => a.tag2_count.cmp(&b.tag2_count),
            SortBy::Tag2CountDesc => b.tag2_count.cmp(&a.tag2_count),
            SortBy::GapAsc => compare_gap(a.overlap_gap(), b.overlap_gap()),
            SortBy::GapDesc => compare_gap(b.overlap_gap(), a.overlap_gap()),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

fn compare_gap(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortBy::ALL
            .into_iter()
            .find(|sort| sort.as_str() == s.trim())
            .ok_or_else(|| StoreError::InvalidQuery(format!("unknown sort order '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    /// Substring match against `tag1` or `tag2`.
    pub search: String,
    pub sort_by: SortBy,
    pub filter_type: Option<RelationType>,
    /// Either count at least this.
    pub min_count: Option<u64>,
    /// Both counts at most this.
    pub max_count: Option<u64>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 30,
            search: String::new(),
            sort_by: SortBy::default(),
            filter_type: None,
            min_count: None,
            max_count: None,
        }
    }
}

impl ListQuery {
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.page == 0 {
            return Err(StoreError::InvalidQuery("page is 1-based".to_string()));
        }
        if self.page_size == 0 {
            return Err(StoreError::InvalidQuery(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn matches(&self, r: &StoredRelation) -> bool {
        let search = self.search.trim().to_lowercase();
        if !search.is_empty() && !r.tag1.contains(&search) && !r.tag2.contains(&search) {
            return false;
        }
        if self.filter_type.is_some_and(|t| t != r.relation_type) {
            return false;
        }
        if let Some(min) = self.min_count {
            if r.tag1_count < min && r.tag2_count < min {
                return false;
            }
        }
        if let Some(max) = self.max_count {
            if r.tag1_count > max || r.tag2_count > max {
                return false;
            }
        }
        true
    }
}

/// Row counts per relation type, over the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationStats {
    pub by_type: BTreeMap<RelationType, usize>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationPage {
    pub relations: Vec<StoredRelation>,
    /// Rows matching the filters.
    pub total: usize,
    /// At least 1, even when nothing matches.
    pub total_pages: usize,
    pub current_page: usize,
    pub stats: RelationStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_names_round_trip() {
        for sort in SortBy::ALL {
            assert_eq!(sort.as_str().parse::<SortBy>().unwrap(), sort);
        }
        assert!(matches!(
            "newest".parse::<SortBy>(),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn missing_gap_sorts_first_ascending() {
        assert_eq!(compare_gap(None, Some(0.0)), Ordering::Less);
        assert_eq!(compare_gap(Some(0.5), Some(0.1)), Ordering::Greater);
        assert_eq!(compare_gap(None, None), Ordering::Equal);
    }
}
