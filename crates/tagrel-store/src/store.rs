use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tagrel_core::{
    find_relation, normalize_tag, ConfirmedRelation, RelationMatch, RelationSource, RelationType,
};

use crate::error::{Result, StoreError};
use crate::model::{ConfirmRequest, NewRelation, StoredRelation};
use crate::query::{ListQuery, RelationPage, RelationStats};

/// On-disk layout of the relation file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Table {
    next_id: u64,
    relations: Vec<StoredRelation>,
}

/// The confirmed-relation table, optionally backed by a JSON file.
///
/// Every mutation rewrites the file atomically (temp file in the same
/// directory, then rename), so a crash leaves either the old or the new table.
#[derive(Debug)]
pub struct RelationStore {
    path: Option<PathBuf>,
    table: RwLock<Table>,
}

impl RelationStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: RwLock::new(Table {
                next_id: 1,
                relations: Vec::new(),
            }),
        }
    }

    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if path.exists() {
            let reader = BufReader::new(fs::File::open(&path)?);
            let mut table: Table = serde_json::from_reader(reader)?;
            let max_id = table.relations.iter().map(|r| r.id).max().unwrap_or(0);
            if table.next_id <= max_id {
                tracing::warn!(
                    path = %path.display(),
                    next_id = table.next_id,
                    max_id,
                    "relation file id counter behind its rows; repairing"
                );
                table.next_id = max_id + 1;
            }
            tracing::info!(path = %path.display(), relations = table.relations.len(), "loaded relation store");
            table
        } else {
            Table {
                next_id: 1,
                relations: Vec::new(),
            }
        };
        Ok(Self {
            path: Some(path),
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.table.read().relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().relations.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<StoredRelation> {
        self.table.read().relations.iter().find(|r| r.id == id).cloned()
    }

    pub fn all(&self) -> Vec<StoredRelation> {
        self.table.read().relations.clone()
    }

    /// Insert, or update the row with the same `(tag1, tag2, context_tags)`.
    /// An update keeps the row id and creation time.
    pub fn add_relation(&self, relation: NewRelation) -> Result<u64> {
        let tag1 = normalize_relation_tag(&relation.tag1)?;
        let tag2 = normalize_relation_tag(&relation.tag2)?;
        let context_tags = normalize_tag(&relation.context_tags).unwrap_or_default();
        let now = Utc::now();

        self.mutate(|table| {
            if let Some(row) = table
                .relations
                .iter_mut()
                .find(|r| r.tag1 == tag1 && r.tag2 == tag2 && r.context_tags == context_tags)
            {
                row.relation_type = relation.relation_type;
                row.confidence = relation.confidence;
                row.tag1_count = relation.tag1_count;
                row.tag2_count = relation.tag2_count;
                row.bidirectional = relation.bidirectional;
                row.cooccurrence = relation.cooccurrence;
                row.calculation = relation.calculation;
                row.modified = now;
                tracing::debug!(id = row.id, %tag1, %tag2, "updated relation");
                return Ok(row.id);
            }

            let id = table.next_id;
            table.next_id += 1;
            tracing::debug!(id, %tag1, %tag2, relation_type = %relation.relation_type, "added relation");
            table.relations.push(StoredRelation {
                id,
                tag1,
                tag2,
                context_tags,
                relation_type: relation.relation_type,
                confidence: relation.confidence,
                tag1_count: relation.tag1_count,
                tag2_count: relation.tag2_count,
                bidirectional: relation.bidirectional,
                cooccurrence: relation.cooccurrence,
                calculation: relation.calculation,
                created: now,
                modified: now,
            });
            Ok(id)
        })
    }

    /// Store a reviewer-accepted relation. A one-way relation whose direction
    /// the reviewer did not choose points from the rarer tag to the broader one.
    pub fn confirm(&self, request: ConfirmRequest) -> Result<u64> {
        let mut relation = request.relation;
        if !relation.bidirectional && !request.user_swapped && relation.tag1_count > relation.tag2_count
        {
            std::mem::swap(&mut relation.tag1, &mut relation.tag2);
            std::mem::swap(&mut relation.tag1_count, &mut relation.tag2_count);
        }
        self.add_relation(relation)
    }

    /// Mark a pair as not related, in both directions.
    pub fn deny(&self, tag1: &str, tag2: &str) -> Result<u64> {
        self.add_relation(NewRelation::new(tag1, tag2, RelationType::Unrelated))
    }

    pub fn delete_relation(&self, id: u64) -> Result<StoredRelation> {
        self.mutate(|table| {
            let pos = table
                .relations
                .iter()
                .position(|r| r.id == id)
                .ok_or(StoreError::NotFound(id))?;
            Ok(table.relations.remove(pos))
        })
    }

    pub fn update_type(&self, id: u64, relation_type: RelationType) -> Result<()> {
        self.update(id, |row| row.relation_type = relation_type)
    }

    /// Set the direction flag; `swap` also exchanges `tag1` and `tag2`.
    /// A swap that would collide with another row's key is rejected.
    pub fn update_direction(&self, id: u64, bidirectional: bool, swap: bool) -> Result<()> {
        self.mutate(|table| {
            if swap {
                let row = table
                    .relations
                    .iter()
                    .find(|r| r.id == id)
                    .ok_or(StoreError::NotFound(id))?;
                let taken = table.relations.iter().any(|r| {
                    r.id != id
                        && r.tag1 == row.tag2
                        && r.tag2 == row.tag1
                        && r.context_tags == row.context_tags
                });
                if taken {
                    return Err(StoreError::InvalidRelation(format!(
                        "relation {} -> {} already exists",
                        row.tag2, row.tag1
                    )));
                }
            }
            let row = table
                .relations
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(StoreError::NotFound(id))?;
            if swap {
                std::mem::swap(&mut row.tag1, &mut row.tag2);
                std::mem::swap(&mut row.tag1_count, &mut row.tag2_count);
            }
            row.bidirectional = bidirectional;
            row.modified = Utc::now();
            Ok(())
        })
    }

    pub fn list(&self, query: &ListQuery) -> Result<RelationPage> {
        query.validate()?;
        let table = self.table.read();

        let mut matched: Vec<&StoredRelation> =
            table.relations.iter().filter(|r| query.matches(r)).collect();
        matched.sort_by(|a, b| query.sort_by.compare(a, b));

        let total = matched.len();
        let relations = matched
            .into_iter()
            .skip((query.page - 1).saturating_mul(query.page_size))
            .take(query.page_size)
            .cloned()
            .collect();

        let mut stats = RelationStats::default();
        for r in &table.relations {
            *stats.by_type.entry(r.relation_type).or_default() += 1;
        }
        stats.total = table.relations.len();

        Ok(RelationPage {
            relations,
            total,
            total_pages: total.div_ceil(query.page_size).max(1),
            current_page: query.page,
            stats,
        })
    }

    fn update(&self, id: u64, apply: impl FnOnce(&mut StoredRelation)) -> Result<()> {
        self.mutate(|table| {
            let row = table
                .relations
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(StoreError::NotFound(id))?;
            apply(row);
            row.modified = Utc::now();
            Ok(())
        })
    }

    /// Apply `f` under the write lock and persist the result. A file-backed
    /// store applies `f` to a copy and keeps it only once the save succeeds,
    /// so a failed mutation leaves rows and the id counter unchanged.
    fn mutate<T>(&self, f: impl FnOnce(&mut Table) -> Result<T>) -> Result<T> {
        let mut table = self.table.write();
        let Some(path) = &self.path else {
            return f(&mut table);
        };
        let mut next = table.clone();
        let out = f(&mut next)?;
        if let Err(err) = save(path, &next) {
            tracing::warn!(path = %path.display(), error = %err, "failed to persist relation store");
            return Err(err);
        }
        *table = next;
        Ok(out)
    }
}

fn normalize_relation_tag(raw: &str) -> Result<String> {
    normalize_tag(raw).ok_or_else(|| StoreError::InvalidRelation("tag must not be empty".to_string()))
}

fn save(path: &Path, table: &Table) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, table)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

impl RelationSource for RelationStore {
    fn relations(&self) -> tagrel_core::Result<Vec<ConfirmedRelation>> {
        Ok(self
            .table
            .read()
            .relations
            .iter()
            .map(StoredRelation::to_confirmed)
            .collect())
    }

    fn get_relation(&self, tag1: &str, tag2: &str) -> tagrel_core::Result<Option<RelationMatch>> {
        let table = self.table.read();
        let forward = table
            .relations
            .iter()
            .filter(|r| r.tag1 == tag1 && r.tag2 == tag2);
        let reverse = table
            .relations
            .iter()
            .filter(|r| r.bidirectional && r.tag1 == tag2 && r.tag2 == tag1);
        let candidates: Vec<ConfirmedRelation> =
            forward.chain(reverse).map(StoredRelation::to_confirmed).collect();
        Ok(find_relation(&candidates, tag1, tag2))
    }
}
