use chrono::{DateTime, Utc};
use labeled_files_schemas::{TagOccurrence, TAG_SEPARATOR};
use std::collections::BTreeMap;
use tracing::debug;

/// Prefix tree of tag segments.
///
/// Every node carries the cumulative count and the latest access time of all
/// occurrences inserted at or beneath it, so a partial path such as
/// `project` reports the whole scope of `project/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub count: u64,
    pub last_access: DateTime<Utc>,
    pub children: BTreeMap<String, TreeNode>,
}

impl Default for TreeNode {
    fn default() -> Self {
        Self {
            count: 0,
            last_access: DateTime::<Utc>::UNIX_EPOCH,
            children: BTreeMap::new(),
        }
    }
}

impl TreeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one labelled count into the tree.
    ///
    /// An empty label only touches this node. Otherwise every `/`-separated
    /// piece is a segment, empty pieces included.
    pub fn insert(&mut self, label: &str, count: u64, last_access: DateTime<Utc>) {
        let mut node = self;
        node.touch(count, last_access);
        if label.is_empty() {
            return;
        }
        for segment in label.split(TAG_SEPARATOR) {
            node = node.children.entry(segment.to_string()).or_default();
            node.touch(count, last_access);
        }
    }

    pub fn insert_occurrence(&mut self, occurrence: &TagOccurrence) {
        self.insert(&occurrence.label, occurrence.count, occurrence.last_access);
    }

    /// Fold another tree into this one, node by node.
    pub fn merge(&mut self, other: TreeNode) {
        self.touch(other.count, other.last_access);
        for (segment, child) in other.children {
            self.children.entry(segment).or_default().merge(child);
        }
    }

    /// Look a node up by its full path. The empty path is this node.
    pub fn get(&self, path: &str) -> Option<&TreeNode> {
        if path.is_empty() {
            return Some(self);
        }
        path.split(TAG_SEPARATOR)
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes beneath this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .values()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    fn touch(&mut self, count: u64, last_access: DateTime<Utc>) {
        self.count += count;
        if last_access > self.last_access {
            self.last_access = last_access;
        }
    }
}

impl Extend<TagOccurrence> for TreeNode {
    fn extend<I: IntoIterator<Item = TagOccurrence>>(&mut self, iter: I) {
        for occurrence in iter {
            self.insert_occurrence(&occurrence);
        }
    }
}

impl<'a> Extend<&'a TagOccurrence> for TreeNode {
    fn extend<I: IntoIterator<Item = &'a TagOccurrence>>(&mut self, iter: I) {
        for occurrence in iter {
            self.insert_occurrence(occurrence);
        }
    }
}

impl FromIterator<TagOccurrence> for TreeNode {
    fn from_iter<I: IntoIterator<Item = TagOccurrence>>(iter: I) -> Self {
        let mut root = TreeNode::new();
        root.extend(iter);
        root
    }
}

/// Build a fresh tree from a flat list of occurrences.
pub fn aggregate<'a, I>(occurrences: I) -> TreeNode
where
    I: IntoIterator<Item = &'a TagOccurrence>,
{
    let mut root = TreeNode::new();
    root.extend(occurrences);

    debug!(
        "Aggregated {} tagged items into {} tag nodes",
        root.count,
        root.descendant_count()
    );
    root
}

/// Turn per-record tag lists into per-label occurrences: one count per record
/// carrying the label, stamped with the latest access among those records.
pub fn occurrences_from_file_tags<'a, I, T>(records: I) -> Vec<TagOccurrence>
where
    I: IntoIterator<Item = (T, DateTime<Utc>)>,
    T: IntoIterator<Item = &'a String>,
{
    let mut by_label: BTreeMap<&'a str, (u64, DateTime<Utc>)> = BTreeMap::new();
    for (tags, last_access) in records {
        for tag in tags {
            let entry = by_label
                .entry(tag.as_str())
                .or_insert((0, DateTime::<Utc>::UNIX_EPOCH));
            entry.0 += 1;
            entry.1 = entry.1.max(last_access);
        }
    }

    by_label
        .into_iter()
        .map(|(label, (count, last_access))| TagOccurrence::new(label, count, last_access))
        .collect()
}
