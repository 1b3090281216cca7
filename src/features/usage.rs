/// Dense map from a global feature variable to its compacted index.
///
/// Entries start unused; stages mark the variables they reference, then
/// [`FeatureUsageMap::compact`] numbers the marked entries `0..n` in
/// ascending order of the original index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureUsageMap {
    entries: Vec<Option<usize>>,
}

impl FeatureUsageMap {
    pub fn new(len: usize) -> Self {
        Self {
            entries: vec![None; len],
        }
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Flags `index` as referenced. Out-of-range indices are ignored.
    pub fn mark(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            *entry = Some(0);
        }
    }

    pub fn is_used(&self, index: usize) -> bool {
        matches!(self.entries.get(index), Some(Some(_)))
    }

    pub fn compact(&mut self) {
        let mut next = 0;
        for entry in self.entries.iter_mut().flatten() {
            *entry = next;
            next += 1;
        }
    }

    /// Compacted index of `index`, `None` when unused.
    pub fn get(&self, index: usize) -> Option<usize> { self.entries.get(index).copied().flatten() }

    /// Compacted index when used, the original index otherwise.
    pub fn remap(&self, index: usize) -> usize { self.get(index).unwrap_or(index) }

    pub fn used_count(&self) -> usize { self.entries.iter().flatten().count() }

    /// Original indices of the used entries, ascending.
    pub fn used_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|_| i))
    }
}
