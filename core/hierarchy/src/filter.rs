use labeled_files_schemas::{FileId, TAG_SEPARATOR};
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use tracing::debug;

/// True when `tag` is `filter` itself or lies beneath it.
///
/// Matching happens on segment boundaries: `tag1/sub` matches `tag1`,
/// `tag10` does not.
pub fn tag_matches(tag: &str, filter: &str) -> bool {
    match tag.strip_prefix(filter) {
        Some("") => true,
        Some(rest) => rest.starts_with(TAG_SEPARATOR),
        None => false,
    }
}

/// Lookup from a tag filter to the records carrying a matching tag.
pub trait LabelIndex {
    type Error;

    fn files_matching(&self, filter: &str) -> Result<BTreeSet<FileId>, Self::Error>;
}

/// Intersect the matches of every active filter.
///
/// Returns `None` when no filter is active, leaving the caller to decide what
/// an unfiltered listing looks like.
pub fn compose<I: LabelIndex>(
    index: &I,
    filters: &[String],
) -> Result<Option<BTreeSet<FileId>>, I::Error> {
    let filters = reduce_filters(filters);
    let mut remaining = filters.iter();

    let Some(first) = remaining.next() else {
        return Ok(None);
    };

    let mut result = index.files_matching(first)?;
    for filter in remaining {
        if result.is_empty() {
            break;
        }
        let matches = index.files_matching(filter)?;
        result.retain(|id| matches.contains(id));
    }

    debug!(
        "Composed {} tag filters into {} matching files",
        filters.len(),
        result.len()
    );
    Ok(Some(result))
}

/// Deduplicate filters and drop any that is an ancestor of another active
/// filter. The composed result is the same with or without the ancestor.
pub fn reduce_filters(filters: &[String]) -> Vec<String> {
    let unique: BTreeSet<&str> = filters.iter().map(String::as_str).collect();
    unique
        .iter()
        .filter(|filter| {
            !unique
                .iter()
                .any(|other| other != *filter && tag_matches(other, filter))
        })
        .map(|filter| filter.to_string())
        .collect()
}

/// Remove the tags already implied by the active filters.
pub fn strip_filtered_tags(tags: &[String], filters: &[String]) -> Vec<String> {
    tags.iter()
        .filter(|tag| !filters.iter().any(|filter| tag_matches(tag, filter)))
        .cloned()
        .collect()
}

/// In-memory `FileId -> tags` index.
#[derive(Debug, Clone, Default)]
pub struct MemoryLabelIndex {
    files: BTreeMap<FileId, Vec<String>>,
}

impl MemoryLabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: FileId, tags: Vec<String>) {
        self.files.insert(id, tags);
    }

    pub fn tags_of(&self, id: FileId) -> Option<&[String]> {
        self.files.get(&id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<(FileId, Vec<String>)> for MemoryLabelIndex {
    fn from_iter<T: IntoIterator<Item = (FileId, Vec<String>)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl LabelIndex for MemoryLabelIndex {
    type Error = Infallible;

    fn files_matching(&self, filter: &str) -> Result<BTreeSet<FileId>, Self::Error> {
        Ok(self
            .files
            .iter()
            .filter(|(_, tags)| tags.iter().any(|tag| tag_matches(tag, filter)))
            .map(|(id, _)| *id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn sample_index() -> MemoryLabelIndex {
        vec![
            (FileId(1), tags(&["tag1"])),
            (FileId(2), tags(&["tag10"])),
            (FileId(3), tags(&["tag1/sub", "work"])),
            (FileId(4), tags(&["work/report", "tag1/sub/deep"])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_tag_matches_segment_boundary() {
        assert!(tag_matches("tag1", "tag1"));
        assert!(tag_matches("tag1/sub", "tag1"));
        assert!(!tag_matches("tag10", "tag1"));
        assert!(!tag_matches("tag", "tag1"));
        assert!(!tag_matches("other/tag1", "tag1"));
    }

    #[test]
    fn test_single_filter() {
        let index = sample_index();
        let result = compose(&index, &tags(&["tag1"])).unwrap().unwrap();
        assert_eq!(
            result,
            BTreeSet::from([FileId(1), FileId(3), FileId(4)])
        );
    }

    #[test]
    fn test_filters_intersect() {
        let index = sample_index();
        let result = compose(&index, &tags(&["tag1", "work"])).unwrap().unwrap();
        assert_eq!(result, BTreeSet::from([FileId(3), FileId(4)]));

        let result = compose(&index, &tags(&["tag10", "work"])).unwrap().unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_no_filters_is_unfiltered() {
        let index = sample_index();
        assert_eq!(compose(&index, &[]).unwrap(), None);
    }

    #[test]
    fn test_descendant_filter_narrows_like_alone() {
        let index = sample_index();
        let both = compose(&index, &tags(&["tag1", "tag1/sub"])).unwrap();
        let alone = compose(&index, &tags(&["tag1/sub"])).unwrap();
        assert_eq!(both, alone);
    }

    #[test]
    fn test_reduce_filters() {
        assert_eq!(
            reduce_filters(&tags(&["a", "a/b", "c", "a", "ab"])),
            tags(&["a/b", "ab", "c"])
        );
        assert!(reduce_filters(&[]).is_empty());
    }

    #[test]
    fn test_strip_filtered_tags() {
        let shown = strip_filtered_tags(
            &tags(&["tag1/sub", "tag10", "work"]),
            &tags(&["tag1", "work"]),
        );
        assert_eq!(shown, tags(&["tag10"]));
    }

    #[test]
    fn test_memory_index_lookup() {
        let index = sample_index();
        assert_eq!(index.len(), 4);
        assert_eq!(index.tags_of(FileId(2)), Some(&["tag10".to_string()][..]));
        assert!(index.tags_of(FileId(9)).is_none());
    }
}
