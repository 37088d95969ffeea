//! Placement planning for the signature row.

use crate::compositing::pdf::PageBox;
use crate::config::{LayoutConfig, SlotPolicy};
use crate::error::PlanError;

/// Smallest signature area height left in a slot once rows are shrunk
const MIN_SIGNATURE_HEIGHT: f32 = 20.0;

/// Slot layout for one page, computed once and shared by every signer
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub horizontal_padding: f32,
    /// Slots per row
    pub slot_count: usize,
    pub slot_width: f32,
    pub slot_height: f32,
    /// Bottom edge of the first row
    pub origin_y: f32,
    /// Left edge of the first slot
    pub origin_x: f32,
    /// Vertical distance between stacked rows
    pub row_pitch: f32,
}

/// An axis-aligned rectangle in page space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SlotRect {
    pub fn inset(&self, left: f32, right: f32, bottom: f32, top: f32) -> SlotRect {
        SlotRect {
            x: self.x + left,
            y: self.y + bottom,
            width: (self.width - left - right).max(0.0),
            height: (self.height - bottom - top).max(0.0),
        }
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }
}

/// Where scaled content lands inside an area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl PageGeometry {
    /// Rectangle of the slot at `index`. Slots fill a row left to right,
    /// then continue on the next row down.
    pub fn slot_rect(&self, index: usize) -> SlotRect {
        let column = index % self.slot_count;
        let row = index / self.slot_count;
        SlotRect {
            x: self.origin_x + column as f32 * self.slot_width,
            y: self.origin_y - row as f32 * self.row_pitch,
            width: self.slot_width,
            height: self.slot_height,
        }
    }
}

/// Divide the padded page width into `slot_count` equal slots and stack
/// enough rows for `signers`.
///
/// Rows use the configured box height when they all fit above the page
/// bottom. Otherwise every row shrinks by the same amount, as long as each
/// slot still has room for the name band and some signature area.
pub fn plan(
    page: PageBox,
    slot_count: usize,
    signers: usize,
    layout: &LayoutConfig,
) -> Result<PageGeometry, PlanError> {
    if slot_count == 0 {
        return Err(PlanError::NoSlots);
    }
    let too_small = PlanError::PageTooSmall {
        width: page.width,
        height: page.height,
    };

    let available_width = page.width - 2.0 * layout.horizontal_padding;
    // Top edge of the first row
    let row_top = page.lly + page.height - (layout.bottom_margin + layout.title_allowance);
    if available_width <= 0.0 || row_top - layout.box_height < page.lly {
        return Err(too_small);
    }

    let rows = signers.div_ceil(slot_count).max(1);
    let gaps = (rows - 1) as f32 * layout.row_gap;
    let fitted_height = (row_top - page.lly - gaps) / rows as f32;
    let slot_height = layout.box_height.min(fitted_height);
    let min_height = layout
        .box_height
        .min(layout.name_offset + layout.inner_padding + MIN_SIGNATURE_HEIGHT);
    if slot_height < min_height {
        return Err(too_small);
    }

    Ok(PageGeometry {
        page_width: page.width,
        page_height: page.height,
        horizontal_padding: layout.horizontal_padding,
        slot_count,
        slot_width: available_width / slot_count as f32,
        slot_height,
        origin_y: row_top - slot_height,
        origin_x: page.llx + layout.horizontal_padding,
        row_pitch: slot_height + layout.row_gap,
    })
}

/// Slots per row for a given number of signers
pub fn slots_per_row(policy: SlotPolicy, signers: usize) -> usize {
    match policy {
        SlotPolicy::Fixed { count } => count,
        SlotPolicy::FitSigners { max_per_row } => signers.min(max_per_row.max(1)),
    }
}

/// Scale content uniformly to fit `area` and center it. `None` when the
/// content has no area.
pub fn fit_within(content_width: f32, content_height: f32, area: SlotRect) -> Option<Placement> {
    if content_width <= 0.0 || content_height <= 0.0 {
        return None;
    }
    let scale = (area.width / content_width).min(area.height / content_height);
    let width = content_width * scale;
    let height = content_height * scale;
    Some(Placement {
        x: area.x + (area.width - width) / 2.0,
        y: area.y + (area.height - height) / 2.0,
        width,
        height,
        scale,
    })
}
