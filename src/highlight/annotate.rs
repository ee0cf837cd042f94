// Square highlight annotations written with lopdf
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use tracing::warn;

use crate::types::{BBox, Result};

// US Letter when no MediaBox can be found
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

fn rect_from(document: &Document, obj: &Object) -> Option<[f32; 4]> {
    let obj = match obj {
        Object::Reference(id) => document.get_object(*id).ok()?,
        other => other,
    };
    let Object::Array(arr) = obj else {
        return None;
    };
    let bounds: Vec<f32> = arr.iter().filter_map(number).collect();
    match bounds.as_slice() {
        [x0, y0, x1, y1] => Some([*x0, *y0, *x1, *y1]),
        _ => None,
    }
}

fn parent_of<'a>(document: &'a Document, dict: &Dictionary) -> Option<&'a Dictionary> {
    let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    document.get_object(parent_id).ok()?.as_dict().ok()
}

/// MediaBox of a page, following inheritance up the page tree.
pub fn page_media_box(document: &Document, page_id: ObjectId) -> [f32; 4] {
    let mut current = document.get_object(page_id).ok().and_then(|o| o.as_dict().ok());
    while let Some(dict) = current {
        if let Some(rect) = dict.get(b"MediaBox").ok().and_then(|mb| rect_from(document, mb)) {
            return rect;
        }
        current = parent_of(document, dict);
    }
    DEFAULT_MEDIA_BOX
}

/// Top-left page space to PDF user space (bottom-left origin).
pub fn to_pdf_rect(bbox: &BBox, media_box: [f32; 4]) -> [f32; 4] {
    let [left, _bottom, _right, top] = media_box;
    [left + bbox.x0, top - bbox.y1, left + bbox.x1, top - bbox.y0]
}

fn reals(values: &[f32]) -> Vec<Object> {
    values.iter().map(|v| Object::Real(*v)).collect()
}

fn append_annotation(document: &mut Document, page_id: ObjectId, annot_id: ObjectId) -> Result<()> {
    let existing = document
        .get_object(page_id)?
        .as_dict()?
        .get(b"Annots")
        .ok()
        .cloned();

    match existing {
        Some(Object::Reference(list_id)) => {
            if let Object::Array(list) = document.get_object_mut(list_id)? {
                list.push(Object::Reference(annot_id));
                return Ok(());
            }
            let page = document.get_object_mut(page_id)?.as_dict_mut()?;
            page.set("Annots", vec![Object::Reference(annot_id)]);
        }
        Some(Object::Array(mut list)) => {
            list.push(Object::Reference(annot_id));
            let page = document.get_object_mut(page_id)?.as_dict_mut()?;
            page.set("Annots", list);
        }
        _ => {
            let page = document.get_object_mut(page_id)?.as_dict_mut()?;
            page.set("Annots", vec![Object::Reference(annot_id)]);
        }
    }
    Ok(())
}

/// Draw a filled, semi-transparent rectangle for each `(page, bbox)`.
///
/// Pages outside the document are skipped. Returns how many were drawn.
pub fn add_highlight_rects(
    document: &mut Document,
    rects: &[(u32, BBox)],
    color: [f32; 3],
    opacity: f32,
) -> Result<usize> {
    let pages = document.get_pages();
    let mut drawn = 0;

    for (page, bbox) in rects {
        let Some(&page_id) = pages.get(&(page + 1)) else {
            warn!(page, page_count = pages.len(), "highlight page out of range, skipped");
            continue;
        };
        let rect = to_pdf_rect(bbox, page_media_box(document, page_id));
        let annot = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Square",
            "Rect" => reals(&rect),
            "C" => reals(&color),
            "IC" => reals(&color),
            "CA" => Object::Real(opacity),
            "F" => 4,
            "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
            "P" => Object::Reference(page_id),
        };
        let annot_id = document.add_object(annot);
        append_annotation(document, page_id, annot_id)?;
        drawn += 1;
    }
    Ok(drawn)
}
