//! PDF glue: local text extraction and page-level merging.
//!
//! Extraction backs the PDF chat modalities; merging collapses a multi-PDF
//! upload into one document, preserving input order, before extraction.

use lopdf::{Document, Object, ObjectId};
use medley_common::{ChatError, Result};
use std::collections::BTreeMap;

/// Extract all text from a PDF held in memory.
pub fn extract_text(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ChatError::Extraction(format!("PDF text extraction failed: {e}")))?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Extraction(
            "PDF contains no extractable text - may be image-based".into(),
        ));
    }
    Ok(trimmed.to_string())
}

fn dict_type(object: &Object) -> &[u8] {
    if let Ok(dict) = object.as_dict() {
        if let Ok(Object::Name(name)) = dict.get(b"Type") {
            return name.as_slice();
        }
    }
    b""
}

/// Merge PDF documents into one, pages in input order.
///
/// Merging [A, B] and extracting text yields extract(A) followed by
/// extract(B). Outlines and bookmarks are dropped.
pub fn merge_documents(documents: &[Vec<u8>]) -> Result<Vec<u8>> {
    if documents.is_empty() {
        return Err(ChatError::InvalidInput("no documents to merge".into()));
    }

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for bytes in documents {
        let mut doc = Document::load_mem(bytes)
            .map_err(|e| ChatError::Extraction(format!("Failed to load PDF: {e}")))?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, object_id) in doc.get_pages() {
            let object = doc
                .get_object(object_id)
                .map_err(|e| ChatError::Extraction(format!("Broken page tree: {e}")))?
                .to_owned();
            pages.push((object_id, object));
        }
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut pages_root: Option<(ObjectId, lopdf::Dictionary)> = None;

    for (object_id, object) in objects {
        match dict_type(&object) {
            // Keep the first catalog seen; later ones are redundant.
            b"Catalog" => {
                catalog.get_or_insert((object_id, object));
            }
            // Fold all page-tree roots into one dictionary.
            b"Pages" => {
                if let Ok(dict) = object.as_dict() {
                    let mut dict = dict.clone();
                    if let Some((_, ref existing)) = pages_root {
                        dict.extend(existing);
                    }
                    pages_root = Some((object_id, dict));
                }
            }
            // Pages are re-inserted below with a fixed parent.
            b"Page" => {}
            // No meaningful way to stitch outlines together; drop them.
            b"Outlines" | b"Outline" => {}
            _ => {
                merged.objects.insert(object_id, object);
            }
        }
    }

    let (pages_id, mut pages_dict) = pages_root
        .ok_or_else(|| ChatError::Extraction("No page tree found in input".into()))?;
    let (catalog_id, catalog_object) = catalog
        .ok_or_else(|| ChatError::Extraction("No catalog found in input".into()))?;

    for (object_id, object) in &pages {
        if let Ok(dict) = object.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_id);
            merged.objects.insert(*object_id, Object::Dictionary(dict));
        }
    }

    pages_dict.set("Count", pages.len() as u32);
    pages_dict.set(
        "Kids",
        pages
            .iter()
            .map(|(id, _)| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    merged
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    if let Ok(dict) = catalog_object.as_dict() {
        let mut dict = dict.clone();
        dict.set("Pages", pages_id);
        dict.remove(b"Outlines");
        merged.objects.insert(catalog_id, Object::Dictionary(dict));
    }

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();

    let mut out = Vec::new();
    merged
        .save_to(&mut out)
        .map_err(|e| ChatError::Extraction(format!("Failed to write merged PDF: {e}")))?;

    tracing::debug!(
        inputs = documents.len(),
        pages = pages.len(),
        bytes = out.len(),
        "Merged PDF documents"
    );

    Ok(out)
}

/// Build a one-page PDF containing the given text lines. Test fixture.
#[cfg(test)]
pub(crate) fn fixture_pdf(lines: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    };

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 24.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
    ];
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("Td", vec![0.into(), (-30).into()]));
        }
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
