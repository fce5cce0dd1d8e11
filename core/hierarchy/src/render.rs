use chrono::{DateTime, Utc};
use labeled_files_schemas::TAG_SEPARATOR;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::TreeNode;

/// Auto-expand the top level when the root has fewer direct children than this.
pub const DEFAULT_EXPAND_THRESHOLD: usize = 10;

/// One row of the rendered tag tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayNode {
    /// A single segment, or a `/`-joined chain when compressed
    pub display_label: String,
    /// Full tag path down to and including this row
    pub path: String,
    pub count: u64,
    pub last_access: DateTime<Utc>,
    pub children: Vec<DisplayNode>,
    pub expand_hint: bool,
}

impl DisplayNode {
    /// Depth-first iteration over this node and everything under it.
    pub fn walk(&self) -> impl Iterator<Item = &DisplayNode> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub top_level_expand_threshold: usize,
    /// Drop nodes whose cumulative count is zero
    pub hide_empty: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            top_level_expand_threshold: DEFAULT_EXPAND_THRESHOLD,
            hide_empty: false,
        }
    }
}

impl RenderOptions {
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            top_level_expand_threshold: threshold,
            ..Self::default()
        }
    }
}

/// Render an aggregated tree into ordered, chain-compressed display rows.
///
/// Children are ordered most recently accessed first, then by higher count,
/// then by segment name. A run of single children whose count equals their
/// parent's collapses into one row labelled with the joined segments.
pub fn render(root: &TreeNode, options: &RenderOptions) -> Vec<DisplayNode> {
    let expand_top = root.children.len() < options.top_level_expand_threshold;
    let rows = render_level(root, None, expand_top, options);

    debug!(
        "Rendered {} top-level tag rows (expand: {})",
        rows.len(),
        expand_top
    );
    rows
}

pub fn render_with_threshold(root: &TreeNode, top_level_expand_threshold: usize) -> Vec<DisplayNode> {
    render(root, &RenderOptions::with_threshold(top_level_expand_threshold))
}

fn render_level(
    node: &TreeNode,
    prefix: Option<&str>,
    expand: bool,
    options: &RenderOptions,
) -> Vec<DisplayNode> {
    ordered_children(node)
        .into_iter()
        .filter(|(_, child)| !(options.hide_empty && child.count == 0))
        .map(|(segment, head)| {
            let (display_label, tail) = compress_chain(segment, head);
            // A blank segment is a real component, so only the root has no prefix
            let path = match prefix {
                None => display_label.clone(),
                Some(prefix) => format!("{}{}{}", prefix, TAG_SEPARATOR, display_label),
            };
            let children = render_level(tail, Some(&path), false, options);

            DisplayNode {
                expand_hint: expand && !children.is_empty(),
                display_label,
                path,
                count: tail.count,
                last_access: head.last_access,
                children,
            }
        })
        .collect()
}

fn ordered_children(node: &TreeNode) -> Vec<(&String, &TreeNode)> {
    let mut children: Vec<_> = node.children.iter().collect();
    children.sort_by(|(a_key, a), (b_key, b)| {
        b.last_access
            .cmp(&a.last_access)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a_key.cmp(b_key))
    });
    children
}

/// Follow single-child links while the whole count passes through.
fn compress_chain<'a>(segment: &str, head: &'a TreeNode) -> (String, &'a TreeNode) {
    let mut label = segment.to_string();
    let mut node = head;

    while let Some((next_segment, next)) = only_child(node) {
        if next.count != node.count {
            break;
        }
        label.push(TAG_SEPARATOR);
        label.push_str(next_segment);
        node = next;
    }

    (label, node)
}

fn only_child(node: &TreeNode) -> Option<(&String, &TreeNode)> {
    if node.children.len() == 1 {
        node.children.iter().next()
    } else {
        None
    }
}
