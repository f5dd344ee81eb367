use image::{imageops, Rgba, RgbaImage};

use crate::error::{ContextError, ErrorKind};
use crate::surface::{Element, Frame, Readiness, Rect, RenderedSurface};
use crate::typeface::Typeface;

/// A one-time snapshot of the pixels of a surface, 8 bits per channel with alpha.
///
/// The buffer is owned: nothing that happens to the surface afterwards affects it.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbaImage,
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// The pixel at the given position packed as `0xAARRGGBB`.
    pub fn argb(&self, x: u32, y: u32) -> u32 {
        let Rgba([red, green, blue, alpha]) = *self.pixels.get_pixel(x, y);
        u32::from_be_bytes([alpha, red, green, blue])
    }

    /// Whether at least one pixel is not fully transparent.
    pub fn has_visible_pixels(&self) -> bool {
        self.pixels.pixels().any(|pixel| pixel[3] > 0)
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.pixels
    }
}

impl From<RgbaImage> for RasterImage {
    fn from(pixels: RgbaImage) -> Self {
        RasterImage { pixels }
    }
}

/// Captures what the surface currently displays.
///
/// The surface must have completed a layout pass with a non-empty size, otherwise the capture
/// fails with `ErrorKind::InvalidSurfaceState` instead of producing a degenerate image.
pub fn capture(surface: &RenderedSurface) -> Result<RasterImage, ContextError> {
    match (surface.readiness(), surface.frame()) {
        (Readiness::Ready { .. }, Some(frame)) => Ok(paint(frame, &surface.assets().typeface)),
        _ => Err(not_ready(surface.width(), surface.height())),
    }
}

/// Captures a frame that was shared with another thread.
pub(crate) fn capture_frame(frame: &Frame, typeface: &Typeface) -> Result<RasterImage, ContextError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(not_ready(frame.width, frame.height));
    }
    Ok(paint(frame, typeface))
}

fn not_ready(width: u32, height: u32) -> ContextError {
    ContextError::with_context(
        ErrorKind::InvalidSurfaceState,
        format!(
            "Unable to capture a surface of {}x{} pixels, it has not completed its layout pass",
            width, height
        ),
    )
}

fn paint(frame: &Frame, typeface: &Typeface) -> RasterImage {
    let mut canvas = RgbaImage::from_pixel(frame.width, frame.height, frame.background);

    for element in &frame.elements {
        match element {
            Element::FillRect { rect, color } => fill_rect(&mut canvas, rect, *color),
            Element::FillCircle {
                center,
                radius,
                color,
            } => fill_circle(&mut canvas, *center, *radius, *color),
            Element::Text {
                text,
                origin,
                size,
                color,
                bold,
                ..
            } => {
                let mut plot = |x: i32, y: i32, coverage: f32| blend(&mut canvas, x, y, *color, coverage);
                typeface.draw(text, *size, *origin, &mut plot);
                if *bold {
                    // Overstrike for the bold weight
                    let offset = (*size / 24.0).max(1.0);
                    typeface.draw(text, *size, (origin.0 + offset, origin.1), &mut plot);
                }
            }
            Element::Image {
                rect,
                image,
                circular,
            } => draw_image(&mut canvas, rect, image, *circular),
        }
    }

    RasterImage { pixels: canvas }
}

/// Blends the colour over the pixel with the given coverage, ignoring positions outside the canvas.
fn blend(canvas: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= canvas.width() || y as u32 >= canvas.height() {
        return;
    }
    let source_alpha = coverage.clamp(0.0, 1.0) * color[3] as f32 / 255.0;
    if source_alpha <= 0.0 {
        return;
    }

    let destination = canvas.get_pixel_mut(x as u32, y as u32);
    let destination_alpha = destination[3] as f32 / 255.0;
    let output_alpha = source_alpha + destination_alpha * (1.0 - source_alpha);
    for channel in 0..3 {
        let blended = (color[channel] as f32 * source_alpha
            + destination[channel] as f32 * destination_alpha * (1.0 - source_alpha))
            / output_alpha;
        destination[channel] = blended.round().clamp(0.0, 255.0) as u8;
    }
    destination[3] = (output_alpha * 255.0).round() as u8;
}

/// The pixel range covered by the span `start..start + length`, clamped to `0..limit`.
fn pixel_span(start: f32, length: f32, limit: u32) -> std::ops::Range<i32> {
    let first = start.round().max(0.0) as i32;
    let last = (start + length).round().min(limit as f32) as i32;
    first..last.max(first)
}

fn fill_rect(canvas: &mut RgbaImage, rect: &Rect, color: Rgba<u8>) {
    for y in pixel_span(rect.y, rect.height, canvas.height()) {
        for x in pixel_span(rect.x, rect.width, canvas.width()) {
            blend(canvas, x, y, color, 1.0);
        }
    }
}

/// Fills a disc, with a one pixel wide anti-aliased rim.
fn fill_circle(canvas: &mut RgbaImage, center: (f32, f32), radius: f32, color: Rgba<u8>) {
    if radius <= 0.0 {
        return;
    }
    let bounds = Rect::new(center.0 - radius - 1.0, center.1 - radius - 1.0, 2.0 * radius + 2.0, 2.0 * radius + 2.0);
    for y in pixel_span(bounds.y, bounds.height, canvas.height()) {
        for x in pixel_span(bounds.x, bounds.width, canvas.width()) {
            let coverage = disc_coverage(x, y, center, radius);
            if coverage > 0.0 {
                blend(canvas, x, y, color, coverage);
            }
        }
    }
}

fn disc_coverage(x: i32, y: i32, center: (f32, f32), radius: f32) -> f32 {
    let dx = x as f32 + 0.5 - center.0;
    let dy = y as f32 + 0.5 - center.1;
    let distance = (dx * dx + dy * dy).sqrt();
    (radius - distance + 0.5).clamp(0.0, 1.0)
}

fn draw_image(canvas: &mut RgbaImage, rect: &Rect, image: &RgbaImage, circular: bool) {
    let target_width = rect.width.round() as u32;
    let target_height = rect.height.round() as u32;
    if target_width == 0 || target_height == 0 || image.width() == 0 || image.height() == 0 {
        return;
    }

    let scaled = imageops::resize(image, target_width, target_height, imageops::FilterType::Triangle);
    let left = rect.x.round() as i32;
    let top = rect.y.round() as i32;
    let center = (rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
    let radius = rect.width.min(rect.height) / 2.0;

    for (x, y, pixel) in scaled.enumerate_pixels() {
        let (canvas_x, canvas_y) = (left + x as i32, top + y as i32);
        let coverage = if circular {
            disc_coverage(canvas_x, canvas_y, center, radius)
        } else {
            1.0
        };
        blend(canvas, canvas_x, canvas_y, *pixel, coverage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::{CvDocument, Skill};
    use crate::render::{render, RenderAssets};
    use crate::surface::Viewport;
    use crate::template::Template;

    fn jane_doe() -> CvDocument {
        CvDocument {
            full_name: "Jane Doe".into(),
            email: "jane@x.com".into(),
            skills: vec![Skill::new("Go"), Skill::new("SQL")],
            ..Default::default()
        }
    }

    #[test]
    fn capture_has_the_surface_dimensions() {
        for (width, height) in [(1080, 1920), (360, 640), (1, 1), (333, 77)] {
            let mut surface = render(jane_doe(), Template::Classic, RenderAssets::default());
            surface.layout(Viewport::new(width, height));
            let raster = capture(&surface).unwrap();

            assert_eq!(raster.dimensions(), (surface.width(), surface.height()));
            assert_eq!(raster.width(), width);
            assert!(raster.height() >= height);
        }
    }

    #[test]
    fn capture_before_layout_fails() {
        let surface = render(jane_doe(), Template::Classic, RenderAssets::default());
        let error = capture(&surface).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidSurfaceState);
    }

    #[test]
    fn capture_of_an_empty_surface_fails() {
        let mut surface = render(jane_doe(), Template::Modern, RenderAssets::default());
        surface.layout(Viewport::new(0, 1920));
        assert_eq!(surface.readiness(), Readiness::Pending);
        assert_eq!(capture(&surface).unwrap_err().kind(), ErrorKind::InvalidSurfaceState);

        let mut surface = render(CvDocument::default(), Template::Minimal, RenderAssets::default());
        surface.layout(Viewport::new(360, 0));
        assert_eq!(surface.height(), 0);
        assert_eq!(capture(&surface).unwrap_err().kind(), ErrorKind::InvalidSurfaceState);
    }

    #[test]
    fn raster_is_not_affected_by_a_later_layout() {
        let mut surface = render(jane_doe(), Template::Classic, RenderAssets::default());
        surface.layout(Viewport::new(360, 640));
        let raster = capture(&surface).unwrap();
        let snapshot = raster.clone();

        surface.layout(Viewport::new(720, 1280));
        let larger_raster = capture(&surface).unwrap();

        assert_eq!(raster, snapshot);
        assert_eq!(raster.dimensions(), (360, 640));
        assert_eq!(larger_raster.dimensions(), (720, 1280));
    }

    #[test]
    fn capture_paints_the_template_colours() {
        let mut surface = render(jane_doe(), Template::Classic, RenderAssets::default());
        surface.layout(Viewport::new(360, 640));
        let raster = capture(&surface).unwrap();

        // Sidebar at the bottom left, page background at the bottom right
        assert_eq!(raster.argb(2, 638), 0xffb28b72);
        assert_eq!(raster.argb(357, 638), 0xffffffff);
        assert!(raster.has_visible_pixels());

        let text_pixels = raster
            .as_rgba()
            .pixels()
            .filter(|pixel| pixel.0 != [0xff, 0xff, 0xff, 0xff] && pixel.0 != [0xb2, 0x8b, 0x72, 0xff])
            .count();
        assert!(text_pixels > 0);
    }

    #[test]
    fn circular_photo_is_clipped_to_the_disc() {
        let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        let photo = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        draw_image(&mut canvas, &Rect::new(0.0, 0.0, 20.0, 20.0), &photo, true);

        assert_eq!(canvas.get_pixel(10, 10).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn blending_respects_coverage() {
        let mut canvas = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]));
        blend(&mut canvas, 0, 0, Rgba([0, 0, 0, 255]), 0.5);
        let pixel = canvas.get_pixel(0, 0);
        assert!((126..=129).contains(&pixel[0]));
        assert_eq!(pixel[3], 255);

        // Out of bounds is ignored
        blend(&mut canvas, 5, -1, Rgba([0, 0, 0, 255]), 1.0);
    }
}
