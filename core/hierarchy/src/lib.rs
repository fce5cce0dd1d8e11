pub mod aggregate;
pub mod filter;
pub mod render;
pub mod text;

pub use aggregate::{aggregate, occurrences_from_file_tags, TreeNode};
pub use filter::{
    compose, reduce_filters, strip_filtered_tags, tag_matches, LabelIndex, MemoryLabelIndex,
};
pub use render::{render, render_with_threshold, DisplayNode, RenderOptions, DEFAULT_EXPAND_THRESHOLD};
pub use text::{format_elapsed, OutlineStyle, TreeTextRenderer};
