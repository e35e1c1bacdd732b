use indexmap::IndexMap;

use crate::types::ServerRecord;

/// Grow-only merge map keyed by `(project_name, port)`, in first-seen order.
#[derive(Debug, Default)]
pub struct MergeMap {
    records: IndexMap<(String, u16), ServerRecord>,
}

impl MergeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation in. A repeat of a known key unions its addresses
    /// and protocols; the merged record is only "starting up" if every
    /// observation was.
    pub fn merge(&mut self, record: ServerRecord) {
        let key = (record.project_name.clone(), record.port);
        match self.records.get_mut(&key) {
            Some(existing) => {
                existing.addresses.extend(record.addresses);
                existing.protocols.extend(record.protocols);
                existing.starting_up &= record.starting_up;
            }
            None => {
                self.records.insert(key, record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pick one record per project: ready beats starting up, then tcp6 beats
    /// tcp4-only, then the first seen. Projects keep first-seen order.
    pub fn rank(self) -> Vec<ServerRecord> {
        let mut groups: IndexMap<String, Vec<ServerRecord>> = IndexMap::new();
        for ((project, _), record) in self.records {
            groups.entry(project).or_default().push(record);
        }
        groups
            .into_values()
            .filter_map(|group| {
                group
                    .into_iter()
                    .min_by_key(|r| (r.starting_up, !r.has_tcp6()))
            })
            .collect()
    }
}

/// Deduplicate and rank a batch of records in one go.
pub fn aggregate(records: impl IntoIterator<Item = ServerRecord>) -> Vec<ServerRecord> {
    let mut map = MergeMap::new();
    for record in records {
        map.merge(record);
    }
    map.rank()
}
