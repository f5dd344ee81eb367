use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::cv::CvDocument;
use crate::render::{self, RenderAssets};
use crate::template::Template;

/// The pixel size a surface is laid out for. The width is fixed, the height is a minimum: a
/// surface whose content is taller grows to fit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Viewport { width, height }
    }
}

/// An axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// What a run of text is for. Headings are what the omission rules are about, the rest is
/// kept apart mostly so that a frame can be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    Name,
    Profession,
    Heading,
    EntryTitle,
    Body,
    Contact,
    Bullet,
}

/// One item of the display list of a frame, painted in order.
#[derive(Debug, Clone)]
pub enum Element {
    FillRect {
        rect: Rect,
        color: Rgba<u8>,
    },
    FillCircle {
        center: (f32, f32),
        radius: f32,
        color: Rgba<u8>,
    },
    /// A single line of text, `origin` is the start of its baseline.
    Text {
        role: TextRole,
        text: String,
        origin: (f32, f32),
        size: f32,
        color: Rgba<u8>,
        bold: bool,
    },
    /// An image scaled into `rect`, optionally clipped to the inscribed circle.
    Image {
        rect: Rect,
        image: Arc<RgbaImage>,
        circular: bool,
    },
}

/// The result of a layout pass: the final pixel size of the surface and what to paint on it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub background: Rgba<u8>,
    pub elements: Vec<Element>,
}

impl Frame {
    /// The text runs of the frame with the given role, in painting order.
    pub fn texts(&self, role: TextRole) -> Vec<&str> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                Element::Text {
                    role: text_role,
                    text,
                    ..
                } if *text_role == role => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All the text runs of the frame, in painting order.
    pub fn all_texts(&self) -> Vec<&str> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                Element::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Whether a surface can be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { width: u32, height: u32 },
    /// No layout pass has run yet, or it produced an empty surface.
    Pending,
}

/// A CV rendered with a template: the live visual surface the preview shows and the export
/// captures.
///
/// It is created without dimensions. Only after `layout` has run for a non-empty viewport does
/// it report a size and become ready for capture.
#[derive(Debug, Clone)]
pub struct RenderedSurface {
    document: Arc<CvDocument>,
    template: Template,
    assets: RenderAssets,
    frame: Option<Arc<Frame>>,
}

impl RenderedSurface {
    pub(crate) fn new(document: Arc<CvDocument>, template: Template, assets: RenderAssets) -> Self {
        RenderedSurface {
            document,
            template,
            assets,
            frame: None,
        }
    }

    /// Runs the layout pass for the viewport, replacing the previous frame.
    pub fn layout(&mut self, viewport: Viewport) -> &Frame {
        let frame = render::lay_out(&self.document, self.template, &self.assets, viewport);
        log::debug!(
            "Laid out the {} template at {}x{} pixels with {} elements",
            self.template,
            frame.width,
            frame.height,
            frame.elements.len()
        );
        self.frame.insert(Arc::new(frame))
    }

    pub fn width(&self) -> u32 {
        self.frame.as_ref().map_or(0, |frame| frame.width)
    }

    pub fn height(&self) -> u32 {
        self.frame.as_ref().map_or(0, |frame| frame.height)
    }

    pub fn readiness(&self) -> Readiness {
        match self.frame.as_deref() {
            Some(frame) if frame.width > 0 && frame.height > 0 => Readiness::Ready {
                width: frame.width,
                height: frame.height,
            },
            _ => Readiness::Pending,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.readiness(), Readiness::Ready { .. })
    }

    /// The frame of the last layout pass, if any.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_deref()
    }

    pub(crate) fn shared_frame(&self) -> Option<Arc<Frame>> {
        self.frame.clone()
    }

    pub fn document(&self) -> &CvDocument {
        &self.document
    }

    pub fn template(&self) -> Template {
        self.template
    }

    pub fn assets(&self) -> &RenderAssets {
        &self.assets
    }
}
