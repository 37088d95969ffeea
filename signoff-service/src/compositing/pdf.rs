//! PDF object helpers shared by the normalizer and the compositor.
//!
//! PDF user space has its origin at the bottom-left of the page with y
//! increasing upward. Every length here is in points.

use std::collections::HashMap;

use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

use crate::config::TargetPage;
use crate::error::PdfError;

/// Used when a page (and every ancestor) lacks a usable MediaBox
const FALLBACK_PAGE: PageBox = PageBox {
    llx: 0.0,
    lly: 0.0,
    width: 595.0,
    height: 842.0,
};

/// Limit when walking up the page tree of a malformed document
const MAX_TREE_DEPTH: usize = 32;

/// A page's MediaBox as origin plus size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f32,
    pub lly: f32,
    pub width: f32,
    pub height: f32,
}

impl PageBox {
    pub fn from_size(width: f32, height: f32) -> Self {
        Self {
            llx: 0.0,
            lly: 0.0,
            width,
            height,
        }
    }

    fn from_array(values: &[Object]) -> Option<Self> {
        if values.len() != 4 {
            return None;
        }
        let coords: Vec<f32> = values.iter().filter_map(extract_number).collect();
        if coords.len() != 4 {
            return None;
        }
        // Corners may be given in any order
        let (llx, urx) = (coords[0].min(coords[2]), coords[0].max(coords[2]));
        let (lly, ury) = (coords[1].min(coords[3]), coords[1].max(coords[3]));
        Some(Self {
            llx,
            lly,
            width: urx - llx,
            height: ury - lly,
        })
    }

    pub fn to_array(self) -> Vec<Object> {
        vec![
            real(self.llx),
            real(self.lly),
            real(self.llx + self.width),
            real(self.lly + self.height),
        ]
    }
}

pub fn real(value: f32) -> Object {
    Object::Real(value)
}

pub fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

fn extract_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Give a fresh document its only page. Objects the page refers to (fonts,
/// images) must already be in `doc`.
pub fn add_only_page(
    doc: &mut Document,
    page: PageBox,
    resources: Dictionary,
    content: Content,
) -> Result<ObjectId, PdfError> {
    let pages_id = doc.new_object_id();

    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => page.to_array(),
        "Contents" => content_id,
        "Resources" => resources,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    Ok(page_id)
}

/// Serialize with compressed streams
pub fn save(doc: &mut Document) -> Result<Vec<u8>, PdfError> {
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

pub fn target_page(doc: &Document, target: TargetPage) -> Option<ObjectId> {
    let pages = doc.get_pages();
    match target {
        TargetPage::First => pages.values().next().copied(),
        TargetPage::Last => pages.values().next_back().copied(),
    }
}

/// MediaBox of a page, inherited from the page tree if needed
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let Some(id) = current else { break };
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        let media_box = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_array().ok())
            .and_then(|values| PageBox::from_array(values));
        if let Some(page_box) = media_box {
            return page_box;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    FALLBACK_PAGE
}

/// The page's effective Resources entry (possibly inherited), unresolved
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Option<Object> {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(resources) = dict.get(b"Resources") {
            return Some(resources.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Concatenated, decompressed content streams of a page
fn page_content(doc: &Document, page_id: ObjectId) -> Vec<u8> {
    let mut content = Vec::new();
    for stream_id in doc.get_page_contents(page_id) {
        if let Ok(stream) = doc.get_object(stream_id).and_then(Object::as_stream) {
            match stream.decompressed_content() {
                Ok(data) => content.extend_from_slice(&data),
                Err(_) => content.extend_from_slice(&stream.content),
            }
            content.push(b'\n');
        }
    }
    content
}

/// Working copy of a page's resource dictionary.
///
/// Names are allocated so they never collide with what the page already
/// uses. The result is written back inline on the page, so a resource
/// dictionary shared with other pages is left untouched.
pub struct PageResources {
    dict: Dictionary,
}

impl PageResources {
    pub fn load(doc: &Document, page_id: ObjectId) -> Self {
        let dict = match inherited_resources(doc, page_id) {
            Some(Object::Dictionary(dict)) => dict,
            Some(Object::Reference(id)) => doc.get_dictionary(id).cloned().unwrap_or_default(),
            _ => Dictionary::new(),
        };
        Self { dict }
    }

    pub fn add_font(&mut self, doc: &Document, prefix: &str, id: ObjectId) -> String {
        self.add(doc, "Font", prefix, id)
    }

    pub fn add_xobject(&mut self, doc: &Document, prefix: &str, id: ObjectId) -> String {
        self.add(doc, "XObject", prefix, id)
    }

    fn add(&mut self, doc: &Document, category: &str, prefix: &str, id: ObjectId) -> String {
        let mut entries = match self.dict.get(category.as_bytes()) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            Ok(Object::Reference(ref_id)) => {
                doc.get_dictionary(*ref_id).cloned().unwrap_or_default()
            }
            _ => Dictionary::new(),
        };

        let mut n = 1;
        let resource_name = loop {
            let candidate = format!("{prefix}{n}");
            if !entries.has(candidate.as_bytes()) {
                break candidate;
            }
            n += 1;
        };

        entries.set(resource_name.clone(), Object::Reference(id));
        self.dict.set(category, Object::Dictionary(entries));
        resource_name
    }

    pub fn store(self, doc: &mut Document, page_id: ObjectId) -> Result<(), PdfError> {
        let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Resources", Object::Dictionary(self.dict));
        Ok(())
    }
}

/// Append content to a page so that it runs in the default graphics state:
/// the existing streams are bracketed by `q`/`Q` and the new content follows.
pub fn append_isolated_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), PdfError> {
    let existing: Vec<Object> = {
        let page = doc.get_dictionary(page_id)?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut overlay = b"\nQ\n".to_vec();
    overlay.extend_from_slice(&content);
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(save_id));
    contents.extend(existing);
    contents.push(Object::Reference(overlay_id));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", contents);
    Ok(())
}

/// Standard Helvetica with WinAnsiEncoding
pub fn add_helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Embed a decoded image as an RGB image XObject, with a soft mask when the
/// image has any transparency
pub fn add_image_xobject(doc: &mut Document, image: &DynamicImage) -> ObjectId {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixel_count = (width as usize) * (height as usize);

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };

    if alpha.iter().any(|&a| a < u8::MAX) {
        let smask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        image_dict.set("SMask", smask_id);
    }

    doc.add_object(Stream::new(image_dict, rgb))
}

/// Copy a page of `source` into `target` as a Form XObject, pulling in every
/// object its resources reference. Returns the form and its bounding box.
pub fn import_page_as_form(
    target: &mut Document,
    source: &Document,
    page_id: ObjectId,
) -> Result<(ObjectId, PageBox), PdfError> {
    let bbox = page_box(source, page_id);
    let content = page_content(source, page_id);

    let mut form = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "FormType" => 1,
        "BBox" => bbox.to_array(),
    };

    if let Some(resources) = inherited_resources(source, page_id) {
        let mut copied = HashMap::new();
        form.set(
            "Resources",
            copy_object_deep(target, source, &resources, &mut copied)?,
        );
    }

    Ok((target.add_object(Stream::new(form, content)), bbox))
}

/// Deep copy an object from `source` into `target`, following references.
/// `copied` maps source IDs to target IDs so shared and cyclic objects are
/// copied once. `Parent` links are dropped to avoid dragging in page trees.
fn copy_object_deep(
    target: &mut Document,
    source: &Document,
    obj: &Object,
    copied: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object, PdfError> {
    match obj {
        Object::Reference(id) => {
            if let Some(&new_id) = copied.get(id) {
                return Ok(Object::Reference(new_id));
            }
            let new_id = target.new_object_id();
            copied.insert(*id, new_id);

            let referenced = source.get_object(*id)?;
            let copy = copy_object_deep(target, source, referenced, copied)?;
            target.objects.insert(new_id, copy);
            Ok(Object::Reference(new_id))
        }
        Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dictionary(
            target, source, dict, copied,
        )?)),
        Object::Array(items) => {
            let mut copy = Vec::with_capacity(items.len());
            for item in items {
                copy.push(copy_object_deep(target, source, item, copied)?);
            }
            Ok(Object::Array(copy))
        }
        Object::Stream(stream) => {
            let dict = copy_dictionary(target, source, &stream.dict, copied)?;
            Ok(Object::Stream(
                Stream::new(dict, stream.content.clone())
                    .with_compression(stream.allows_compression),
            ))
        }
        _ => Ok(obj.clone()),
    }
}

fn copy_dictionary(
    target: &mut Document,
    source: &Document,
    dict: &Dictionary,
    copied: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary, PdfError> {
    let mut copy = Dictionary::new();
    for (key, value) in dict.iter() {
        if key.as_slice() == b"Parent" {
            continue;
        }
        copy.set(key.clone(), copy_object_deep(target, source, value, copied)?);
    }
    Ok(copy)
}

/// `q <a 0 0 d e f> cm /Name Do Q`
pub fn draw_xobject(
    resource_name: &str,
    scale_x: f32,
    scale_y: f32,
    x: f32,
    y: f32,
) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(scale_x),
                real(0.0),
                real(0.0),
                real(scale_y),
                real(x),
                real(y),
            ],
        ),
        Operation::new("Do", vec![name(resource_name)]),
        Operation::new("Q", vec![]),
    ]
}

/// One line of text in a standard font, as a hex string
pub fn show_text(font: &str, size: f32, x: f32, y: f32, text: Vec<u8>) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![name(font), real(size)]),
        Operation::new("Td", vec![real(x), real(y)]),
        Operation::new("Tj", vec![Object::String(text, StringFormat::Hexadecimal)]),
        Operation::new("ET", vec![]),
    ]
}
