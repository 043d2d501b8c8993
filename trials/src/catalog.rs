use std::collections::HashMap;

use crate::{TrialsError, TrialsResult};

/// Ordered set of unique string identifiers for one matrix axis.
///
/// Construction rejects duplicates; lookups by identifier are O(1) through
/// an internal index map. A catalog is immutable once built; `sort` and the
/// gather operations return new instances.
#[derive(Debug, Clone)]
pub struct IdCatalog {
    ids: Vec<String>,
    index: HashMap<String, usize>,
}

impl PartialEq for IdCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl IdCatalog {
    /// Builds a catalog from an ordered list of identifiers.
    /// Fails with [`TrialsError::DuplicateIdentifier`] on the first repeat.
    pub fn new<I, S>(ids: I) -> TrialsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Self::empty();
        for id in ids {
            let id = id.into();
            if out.index.contains_key(&id) {
                return Err(TrialsError::DuplicateIdentifier { id });
            }
            out.index.insert(id.clone(), out.ids.len());
            out.ids.push(id);
        }
        Ok(out)
    }

    /// Catalog with no identifiers.
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Internal constructor for identifier lists already known to be unique.
    fn from_unique(ids: Vec<String>) -> Self {
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self { ids, index }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The identifiers in catalog order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// The identifier at position `i`.
    pub fn get(&self, i: usize) -> &str {
        &self.ids[i]
    }

    /// Position of `id`, or `None` if absent.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Returns a lexically sorted copy plus the permutation mapping each
    /// sorted position back to its original position.
    pub fn sort(&self) -> (IdCatalog, Vec<usize>) {
        let mut perm: Vec<usize> = (0..self.ids.len()).collect();
        perm.sort_by(|&a, &b| self.ids[a].cmp(&self.ids[b]));
        let ids = perm.iter().map(|&i| self.ids[i].clone()).collect();
        (Self::from_unique(ids), perm)
    }

    /// Sorted, de-duplicated union of two catalogs.
    pub fn union(&self, other: &IdCatalog) -> IdCatalog {
        let mut ids: Vec<String> = self
            .ids
            .iter()
            .chain(other.ids.iter())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        Self::from_unique(ids)
    }

    /// Sorted common identifiers plus their positions in `self` and in
    /// `other` as parallel index arrays, usable to gather matching
    /// rows/columns from both sides.
    pub fn intersect(&self, other: &IdCatalog) -> (IdCatalog, Vec<usize>, Vec<usize>) {
        let mut common: Vec<&String> = self
            .ids
            .iter()
            .filter(|id| other.contains(id.as_str()))
            .collect();
        common.sort();
        let idx_a = common.iter().map(|id| self.index[id.as_str()]).collect();
        let idx_b = common.iter().map(|id| other.index[id.as_str()]).collect();
        let ids = common.into_iter().cloned().collect();
        (Self::from_unique(ids), idx_a, idx_b)
    }

    /// Sorted identifiers of `self` that are not present in `other`.
    pub fn set_difference(&self, other: &IdCatalog) -> IdCatalog {
        let mut ids: Vec<String> = self
            .ids
            .iter()
            .filter(|id| !other.contains(id.as_str()))
            .cloned()
            .collect();
        ids.sort();
        Self::from_unique(ids)
    }

    /// For each query: whether it is present, and its position (0 for
    /// absent identifiers; check the found mask first).
    pub fn membership(&self, queries: &[String]) -> (Vec<bool>, Vec<usize>) {
        let mut found = Vec::with_capacity(queries.len());
        let mut idx = Vec::with_capacity(queries.len());
        for q in queries {
            match self.position(q) {
                Some(i) => {
                    found.push(true);
                    idx.push(i);
                }
                None => {
                    found.push(false);
                    idx.push(0);
                }
            }
        }
        (found, idx)
    }

    /// Positions of every query identifier, failing with
    /// [`TrialsError::MissingIdentifier`] if any is absent.
    pub fn indices_of(&self, queries: &[String]) -> TrialsResult<Vec<usize>> {
        queries
            .iter()
            .map(|q| {
                self.position(q)
                    .ok_or_else(|| TrialsError::MissingIdentifier { id: q.clone() })
            })
            .collect()
    }

    /// Gathers a sub-catalog by position. Positions must be distinct.
    pub(crate) fn gather(&self, idx: &[usize]) -> IdCatalog {
        Self::from_unique(idx.iter().map(|&i| self.ids[i].clone()).collect())
    }
}
