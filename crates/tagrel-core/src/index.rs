//! TagIndex: read-only corpus statistics.
//!
//! Built once from the per-object tag sets of a corpus snapshot:
//! - `tag -> frequency` (number of objects carrying the tag)
//! - `tag -> {object indices}` posting sets as Roaring bitmaps
//! - the total object count
//!
//! Tags are interned to dense [`TagId`]s so that pair enumeration and the
//! context graph work on `u32`s instead of strings. Objects are identified by
//! their position in the snapshot (`0..N`).

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::tag::{compound_parts, is_compound, normalize_tag};

/// Interned tag ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TagId(u32);

impl TagId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Maps normalized tag strings to compact IDs and back.
#[derive(Debug, Default, Clone)]
pub struct TagInterner {
    tag_to_id: AHashMap<String, TagId>,
    id_to_tag: Vec<String>,
}

impl TagInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an already-normalized tag, returning its ID.
    pub fn intern(&mut self, tag: &str) -> TagId {
        if let Some(&id) = self.tag_to_id.get(tag) {
            return id;
        }
        let id = TagId(self.id_to_tag.len() as u32);
        self.tag_to_id.insert(tag.to_string(), id);
        self.id_to_tag.push(tag.to_string());
        id
    }

    /// Look up an existing ID without inserting.
    pub fn id_of(&self, tag: &str) -> Option<TagId> {
        self.tag_to_id.get(tag).copied()
    }

    pub fn lookup(&self, id: TagId) -> Option<&str> {
        self.id_to_tag.get(id.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_tag.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    interner: TagInterner,
    /// `tag -> {objects}`, indexed by `TagId`.
    postings: Vec<RoaringBitmap>,
    /// `tag -> |postings|`, indexed by `TagId`.
    frequency: Vec<u64>,
    /// `object -> {tags}`, deduplicated and sorted.
    object_tags: Vec<Vec<TagId>>,
    empty: RoaringBitmap,
}

impl TagIndex {
    /// Build from one tag list per object. Tags are normalized; duplicates on
    /// the same object count once; empty tags are dropped.
    pub fn build<I, T, S>(objects: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = TagIndex::default();

        for (object, tags) in objects.into_iter().enumerate() {
            let object = object as u32;
            let mut ids: Vec<TagId> = tags
                .into_iter()
                .filter_map(|raw| normalize_tag(raw.as_ref()))
                .map(|tag| out.interner.intern(&tag))
                .collect();
            ids.sort_unstable();
            ids.dedup();

            for &id in &ids {
                if id.index() == out.postings.len() {
                    out.postings.push(RoaringBitmap::new());
                }
                out.postings[id.index()].insert(object);
            }
            out.object_tags.push(ids);
        }

        out.frequency = out.postings.iter().map(RoaringBitmap::len).collect();

        tracing::debug!(
            objects = out.object_tags.len(),
            tags = out.interner.len(),
            "built tag index"
        );
        out
    }

    pub fn total_objects(&self) -> u64 {
        self.object_tags.len() as u64
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }

    pub fn id_of(&self, tag: &str) -> Option<TagId> {
        self.interner.id_of(tag)
    }

    /// Tag string for an ID issued by this index.
    pub fn name(&self, id: TagId) -> &str {
        self.interner.lookup(id).unwrap_or_default()
    }

    pub fn tag_ids(&self) -> impl Iterator<Item = TagId> + '_ {
        (0..self.interner.len() as u32).map(TagId)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.tag_ids().map(|id| self.name(id))
    }

    /// Frequency of a tag; 0 for unknown tags.
    pub fn frequency(&self, tag: &str) -> u64 {
        self.id_of(tag).map_or(0, |id| self.frequency_of(id))
    }

    pub fn frequency_of(&self, id: TagId) -> u64 {
        self.frequency.get(id.index()).copied().unwrap_or(0)
    }

    /// Posting set of a tag; empty for unknown tags.
    pub fn postings(&self, tag: &str) -> &RoaringBitmap {
        match self.id_of(tag) {
            Some(id) => self.postings_of(id),
            None => &self.empty,
        }
    }

    pub fn postings_of(&self, id: TagId) -> &RoaringBitmap {
        self.postings.get(id.index()).unwrap_or(&self.empty)
    }

    /// `|postings(a) ∩ postings(b)|`.
    pub fn cooccurrence(&self, a: TagId, b: TagId) -> u64 {
        self.postings_of(a).intersection_len(self.postings_of(b))
    }

    pub fn object_tags(&self, object: u32) -> &[TagId] {
        self.object_tags
            .get(object as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn objects(&self) -> impl Iterator<Item = &[TagId]> + '_ {
        self.object_tags.iter().map(Vec::as_slice)
    }

    pub fn is_compound(&self, id: TagId) -> bool {
        is_compound(self.name(id))
    }

    /// All tags ordered by frequency (descending), ties by name (ascending).
    pub fn tags_by_frequency(&self) -> Vec<TagId> {
        let mut ids: Vec<TagId> = self.tag_ids().collect();
        ids.sort_by(|&a, &b| {
            self.frequency_of(b)
                .cmp(&self.frequency_of(a))
                .then_with(|| self.name(a).cmp(self.name(b)))
        });
        ids
    }

    /// Count shown for a possibly-compound tag: the sum of its parts' counts.
    pub fn display_count(&self, tag: &str) -> u64 {
        match normalize_tag(tag) {
            Some(tag) if is_compound(&tag) => compound_parts(&tag).map(|t| self.frequency(t)).sum(),
            Some(tag) => self.frequency(&tag),
            None => 0,
        }
    }
}
