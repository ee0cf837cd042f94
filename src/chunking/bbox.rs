// Minimal enclosing rectangle of a set of page-space boxes
use crate::types::BBox;

/// Union of every box, or `None` for an empty input.
///
/// Native and recognized boxes can be mixed freely; both are already in page
/// coordinates by the time they get here.
pub fn merge_bboxes<'a, I>(boxes: I) -> Option<BBox>
where
    I: IntoIterator<Item = &'a BBox>,
{
    boxes.into_iter().fold(None, |acc: Option<BBox>, b| match acc {
        None => Some(*b),
        Some(merged) => Some(merged.union(b)),
    })
}
