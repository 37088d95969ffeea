//! Signature compositing.
//!
//! Every signer gets a slot with a border and their name. The signature body
//! is drawn inside the slot when the artifact resolves to a PNG, JPEG or PDF;
//! otherwise the slot is left degraded and compositing carries on with the
//! next signer.

use futures::future::join_all;
use image::ImageFormat;
use lopdf::Document;
use lopdf::content::{Content, Operation};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactStore, CallerContext, SignatureArtifact};
use crate::compositing::layout::{self, SlotRect};
use crate::compositing::pdf::{self, PageResources, real};
use crate::compositing::sniff::{self, ContentKind};
use crate::compositing::text::encode_label;
use crate::config::{LayoutConfig, TargetPage};
use crate::error::{CompositeError, PdfError, SignerEmbedError, format_error_chain};
use crate::retry::{RetryPolicy, with_retry};

const FONT_PREFIX: &str = "SoF";
const IMAGE_PREFIX: &str = "SoIm";
const FORM_PREFIX: &str = "SoX";

/// A signer together with the outcome of fetching their artifact
#[derive(Debug)]
pub struct ResolvedSignature {
    pub artifact: SignatureArtifact,
    pub content: Result<Vec<u8>, SignerEmbedError>,
}

/// How a slot ended up on the page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SlotOutcome {
    Embedded { format: ContentKind },
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotReport {
    pub index: usize,
    pub display_name: String,
    /// Name as drawn, after any encoding fallback
    pub rendered_name: String,
    pub name_degraded: bool,
    #[serde(flatten)]
    pub outcome: SlotOutcome,
}

#[derive(Debug)]
pub struct CompositeResult {
    pub bytes: Vec<u8>,
    pub slots: Vec<SlotReport>,
}

/// Fetch every signer's artifact concurrently. Results keep input order and
/// a failed fetch only affects its own signer.
pub async fn resolve_signatures<S: ArtifactStore>(
    store: &S,
    ctx: &CallerContext,
    retry: &RetryPolicy,
    signatures: Vec<SignatureArtifact>,
) -> Vec<ResolvedSignature> {
    let fetches = signatures.iter().map(|artifact| async move {
        if artifact.identifier.is_empty() {
            return Err(SignerEmbedError::MissingArtifact);
        }
        with_retry(retry, "fetch signature artifact", || {
            store.fetch_bytes(ctx, &artifact.identifier)
        })
        .await
        .map_err(SignerEmbedError::Fetch)
    });
    let contents = join_all(fetches).await;

    signatures
        .into_iter()
        .zip(contents)
        .map(|(artifact, content)| ResolvedSignature { artifact, content })
        .collect()
}

/// Draws signature slots onto a normalized PDF
#[derive(Debug, Clone)]
pub struct SignatureCompositor {
    layout: LayoutConfig,
}

impl SignatureCompositor {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    /// Draw one slot per signature, in order, on the target page.
    ///
    /// With no signatures the input is returned untouched.
    pub fn composite(
        &self,
        pdf_bytes: Vec<u8>,
        signatures: Vec<ResolvedSignature>,
    ) -> Result<CompositeResult, CompositeError> {
        if signatures.is_empty() {
            return Ok(CompositeResult {
                bytes: pdf_bytes,
                slots: Vec::new(),
            });
        }

        let mut doc = Document::load_mem(&pdf_bytes).map_err(CompositeError::Load)?;
        let page_id = pdf::target_page(&doc, self.layout.target_page).ok_or(PdfError::NoPages)?;
        let page = pdf::page_box(&doc, page_id);
        let per_row = layout::slots_per_row(self.layout.slots, signatures.len());
        let geometry = layout::plan(page, per_row, signatures.len(), &self.layout)?;
        debug!(
            page_width = geometry.page_width,
            page_height = geometry.page_height,
            horizontal_padding = geometry.horizontal_padding,
            slots_per_row = geometry.slot_count,
            slot_width = geometry.slot_width,
            slot_height = geometry.slot_height,
            origin_y = geometry.origin_y,
            signers = signatures.len(),
            "Planned signature slots"
        );

        let font_id = pdf::add_helvetica(&mut doc);
        let mut resources = PageResources::load(&doc, page_id);
        let font = resources.add_font(&doc, FONT_PREFIX, font_id);

        let mut operations = Vec::new();
        let mut slots = Vec::with_capacity(signatures.len());

        for (index, signature) in signatures.into_iter().enumerate() {
            let slot = geometry.slot_rect(index);
            operations.extend(self.border(slot));

            let label = encode_label(&signature.artifact.display_name);
            operations.extend(self.name(&font, slot, label.bytes.clone()));

            let embedded = signature.content.and_then(|bytes| {
                self.embed(&mut doc, &mut resources, &bytes, self.interior(slot))
            });

            let outcome = match embedded {
                Ok((format, draw)) => {
                    operations.extend(draw);
                    metrics::counter!("signoff_signers_total", "outcome" => "embedded")
                        .increment(1);
                    debug!(index, %format, "Embedded signature");
                    SlotOutcome::Embedded { format }
                }
                Err(error) => {
                    let reason = format_error_chain(&error);
                    metrics::counter!("signoff_signers_total", "outcome" => "degraded")
                        .increment(1);
                    warn!(
                        index,
                        signer = %signature.artifact.display_name,
                        error = %reason,
                        "Signature not embedded, leaving border and name"
                    );
                    SlotOutcome::Degraded { reason }
                }
            };

            slots.push(SlotReport {
                index,
                display_name: signature.artifact.display_name,
                rendered_name: label.text,
                name_degraded: label.degraded,
                outcome,
            });
        }

        resources.store(&mut doc, page_id)?;
        let content = Content { operations }.encode().map_err(PdfError::from)?;
        pdf::append_isolated_content(&mut doc, page_id, content)?;
        let bytes = pdf::save(&mut doc)?;

        info!(
            slots = slots.len(),
            embedded = slots
                .iter()
                .filter(|s| matches!(s.outcome, SlotOutcome::Embedded { .. }))
                .count(),
            size = bytes.len(),
            "Composited signatures"
        );
        Ok(CompositeResult { bytes, slots })
    }

    /// Signature area: the slot minus the name band at the top and padding
    /// on the other sides
    fn interior(&self, slot: SlotRect) -> SlotRect {
        let padding = self.layout.inner_padding;
        slot.inset(padding, padding, padding, self.layout.name_offset)
    }

    fn border(&self, slot: SlotRect) -> Vec<Operation> {
        let width = self.layout.border_width;
        vec![
            Operation::new("q", vec![]),
            Operation::new("w", vec![real(width)]),
            Operation::new("RG", vec![real(0.0), real(0.0), real(0.0)]),
            Operation::new(
                "re",
                vec![
                    real(slot.x + width),
                    real(slot.y),
                    real(slot.width - 2.0 * width),
                    real(slot.height),
                ],
            ),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]
    }

    /// Name near the top of the slot, clipped so long names can't spill into
    /// the neighbouring slot
    fn name(&self, font: &str, slot: SlotRect, text: Vec<u8>) -> Vec<Operation> {
        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "re",
                vec![real(slot.x), real(slot.y), real(slot.width), real(slot.height)],
            ),
            Operation::new("W", vec![]),
            Operation::new("n", vec![]),
            Operation::new("g", vec![real(0.0)]),
        ];
        operations.extend(pdf::show_text(
            font,
            self.layout.name_font_size,
            slot.x + self.layout.inner_padding,
            slot.top() - self.layout.name_offset,
            text,
        ));
        operations.push(Operation::new("Q", vec![]));
        operations
    }

    /// Add the artifact to `doc` and return the operations that draw it
    /// fitted into `area`
    fn embed(
        &self,
        doc: &mut Document,
        resources: &mut PageResources,
        bytes: &[u8],
        area: SlotRect,
    ) -> Result<(ContentKind, Vec<Operation>), SignerEmbedError> {
        let kind = sniff::classify(bytes);
        debug!(%kind, header = %sniff::header_hex(bytes), "Classified signature artifact");

        match kind {
            ContentKind::Pdf => {
                let source = Document::load_mem(bytes).map_err(SignerEmbedError::PdfLoad)?;
                let first_page = pdf::target_page(&source, TargetPage::First)
                    .ok_or(SignerEmbedError::PdfImport(PdfError::NoPages))?;
                let (form_id, bbox) = pdf::import_page_as_form(doc, &source, first_page)
                    .map_err(SignerEmbedError::PdfImport)?;
                let placement = layout::fit_within(bbox.width, bbox.height, area)
                    .ok_or(SignerEmbedError::EmptyContent)?;

                let name = resources.add_xobject(doc, FORM_PREFIX, form_id);
                // Form space starts at the page's lower-left corner
                Ok((
                    kind,
                    pdf::draw_xobject(
                        &name,
                        placement.scale,
                        placement.scale,
                        placement.x - bbox.llx * placement.scale,
                        placement.y - bbox.lly * placement.scale,
                    ),
                ))
            }
            ContentKind::Png | ContentKind::Jpeg => {
                let format = if kind == ContentKind::Png {
                    ImageFormat::Png
                } else {
                    ImageFormat::Jpeg
                };
                let image = image::load_from_memory_with_format(bytes, format)
                    .map_err(|source| SignerEmbedError::ImageDecode { format: kind, source })?;
                let placement =
                    layout::fit_within(image.width() as f32, image.height() as f32, area)
                        .ok_or(SignerEmbedError::EmptyContent)?;

                let image_id = pdf::add_image_xobject(doc, &image);
                let name = resources.add_xobject(doc, IMAGE_PREFIX, image_id);
                Ok((
                    kind,
                    pdf::draw_xobject(
                        &name,
                        placement.width,
                        placement.height,
                        placement.x,
                        placement.y,
                    ),
                ))
            }
            ContentKind::Unknown => Err(SignerEmbedError::UnknownFormat {
                header: sniff::header_hex(bytes),
            }),
        }
    }
}
