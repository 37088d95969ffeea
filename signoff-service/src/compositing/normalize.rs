//! Turning an uploaded source document into the base PDF that receives
//! the signature row.
//!
//! Dispatch is by the declared file extension only. Content sniffing is
//! reserved for signature artifacts, so a `.pdf` whose bytes look like
//! something else is still handled as a PDF (and rejected if it doesn't load).

use std::path::Path;

use image::ImageFormat;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, dictionary};
use tracing::debug;

use crate::artifacts::SourceDocument;
use crate::compositing::pdf::{self, PageBox};
use crate::compositing::text::encode_label;
use crate::config::NormalizeConfig;
use crate::error::NormalizationError;

const PLACEHOLDER_MARGIN: f32 = 50.0;
const PLACEHOLDER_LEADING: f32 = 1.4;

/// Normalization strategy for a source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Image(ImageFormat),
    Spreadsheet,
    Other(Option<String>),
}

impl SourceKind {
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => SourceKind::Pdf,
            Some("png") => SourceKind::Image(ImageFormat::Png),
            Some("jpg") | Some("jpeg") => SourceKind::Image(ImageFormat::Jpeg),
            Some("xlsx") | Some("xls") => SourceKind::Spreadsheet,
            _ => SourceKind::Other(extension),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizeConfig,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    /// Produce loadable PDF bytes for a source document.
    pub fn normalize(&self, source: SourceDocument) -> Result<Vec<u8>, NormalizationError> {
        let SourceDocument { bytes, file_name } = source;
        let kind = SourceKind::from_file_name(&file_name);
        debug!(%file_name, ?kind, size = bytes.len(), "Normalizing source document");

        match kind {
            SourceKind::Pdf => {
                Document::load_mem(&bytes).map_err(NormalizationError::InvalidPdf)?;
                Ok(bytes)
            }
            SourceKind::Image(format) => self.image_page(&bytes, format),
            SourceKind::Spreadsheet => self.placeholder_page(&[
                "Spreadsheet preview is not available.".to_string(),
                "Please refer to the original Excel file.".to_string(),
            ]),
            SourceKind::Other(Some(extension)) => self.placeholder_page(&[format!(
                "Preview is not available for .{extension} files."
            )]),
            SourceKind::Other(None) => {
                self.placeholder_page(&["Preview is not available for this file type.".to_string()])
            }
        }
    }

    fn page(&self) -> PageBox {
        PageBox::from_size(self.config.page_width, self.config.page_height)
    }

    /// A reference-size page with the image scaled to fit and centered
    fn image_page(&self, bytes: &[u8], format: ImageFormat) -> Result<Vec<u8>, NormalizationError> {
        let image = image::load_from_memory_with_format(bytes, format).map_err(|source| {
            NormalizationError::ImageDecode {
                format: format_name(format),
                source,
            }
        })?;

        let page = self.page();
        let scale = (page.width / image.width() as f32).min(page.height / image.height() as f32);
        let width = image.width() as f32 * scale;
        let height = image.height() as f32 * scale;

        let mut doc = Document::with_version("1.5");
        let image_id = pdf::add_image_xobject(&mut doc, &image);
        let resources = dictionary! {
            "XObject" => dictionary! { "Im1" => image_id },
        };
        let content = Content {
            operations: pdf::draw_xobject(
                "Im1",
                width,
                height,
                (page.width - width) / 2.0,
                (page.height - height) / 2.0,
            ),
        };

        pdf::add_only_page(&mut doc, page, resources, content)?;
        Ok(pdf::save(&mut doc)?)
    }

    /// A reference-size page with explanatory text near the top
    fn placeholder_page(&self, lines: &[String]) -> Result<Vec<u8>, NormalizationError> {
        let page = self.page();
        let size = self.config.placeholder_font_size;

        let mut doc = Document::with_version("1.5");
        let font_id = pdf::add_helvetica(&mut doc);
        let mut resources = Dictionary::new();
        resources.set("Font", dictionary! { "F1" => font_id });

        let mut operations: Vec<Operation> = Vec::new();
        let mut baseline = page.height - PLACEHOLDER_MARGIN - size;
        for line in lines {
            let label = encode_label(line);
            operations.extend(pdf::show_text("F1", size, PLACEHOLDER_MARGIN, baseline, label.bytes));
            baseline -= size * PLACEHOLDER_LEADING;
        }

        pdf::add_only_page(&mut doc, page, resources, Content { operations })?;
        Ok(pdf::save(&mut doc)?)
    }
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "PNG",
        ImageFormat::Jpeg => "JPEG",
        _ => "image",
    }
}
