use std::path::Path;

use rusttype::{point, Font, Scale};
use unicode_normalization::UnicodeNormalization as _;

use crate::error::{ContextError, ErrorKind};

/// The vertical metrics of a line of text at a given pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    /// Distance from the top of the line to the baseline.
    pub ascent: f32,
    /// Distance from the baseline to the bottom of the line (positive).
    pub descent: f32,
    pub line_gap: f32,
}

impl LineMetrics {
    pub fn line_height(&self) -> f32 {
        self.ascent + self.descent + self.line_gap
    }
}

/// The face text is measured and painted with.
///
/// An outline face rasterizes the glyphs of a TTF/OTF font. When no font is available the
/// greeked face stands in: every visible character becomes a solid block with a fixed advance,
/// so that the layout, the capture and the export still behave exactly as with real glyphs.
#[derive(Clone)]
pub enum Typeface {
    Outline(Font<'static>),
    Greeked,
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Typeface::Outline(font) => write!(formatter, "Outline({} glyphs)", font.glyph_count()),
            Typeface::Greeked => write!(formatter, "Greeked"),
        }
    }
}

impl Default for Typeface {
    fn default() -> Self {
        Typeface::Greeked
    }
}

const GREEKED_ADVANCE: f32 = 0.55;
const GREEKED_SPACE_ADVANCE: f32 = 0.3;

impl Typeface {
    /// Loads an outline face from a TTF/OTF file.
    pub fn from_path(font_path: &Path) -> Result<Typeface, ContextError> {
        let font_bytes = std::fs::read(font_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Render,
                format!("Failed to read the font {:?}", font_path),
                &error,
            )
        })?;
        Typeface::from_bytes(font_bytes)
    }

    pub fn from_bytes(font_bytes: Vec<u8>) -> Result<Typeface, ContextError> {
        let font = Font::try_from_vec(font_bytes).ok_or(ContextError::with_context(
            ErrorKind::Render,
            "Failed to parse the font, it is not a valid TTF/OTF font",
        ))?;
        Ok(Typeface::Outline(font))
    }

    pub fn line_metrics(&self, size: f32) -> LineMetrics {
        match self {
            Typeface::Outline(font) => {
                let vertical_metrics = font.v_metrics(Scale::uniform(size));
                LineMetrics {
                    ascent: vertical_metrics.ascent,
                    descent: -vertical_metrics.descent,
                    line_gap: vertical_metrics.line_gap,
                }
            }
            Typeface::Greeked => LineMetrics {
                ascent: 0.8 * size,
                descent: 0.2 * size,
                line_gap: 0.15 * size,
            },
        }
    }

    /// The horizontal advance of the text, kerning included.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        match self {
            Typeface::Outline(font) => font
                .layout(text, Scale::uniform(size), point(0.0, 0.0))
                .map(|glyph| glyph.position().x + glyph.unpositioned().h_metrics().advance_width)
                .fold(0.0, f32::max),
            Typeface::Greeked => text
                .chars()
                .map(|character| greeked_advance(character, size))
                .sum(),
        }
    }

    /// Paints the text with its baseline starting at `origin`. Every covered pixel is reported
    /// to `plot` with its coverage in `0.0..=1.0`; the caller does the blending.
    pub fn draw(&self, text: &str, size: f32, origin: (f32, f32), plot: &mut dyn FnMut(i32, i32, f32)) {
        match self {
            Typeface::Outline(font) => {
                for character in text.chars().filter(|character| !character.is_whitespace()) {
                    if font.glyph(character).id().0 == 0 {
                        log::warn!("Unable to find the character {:?} in the font", character);
                    }
                }
                for glyph in font.layout(text, Scale::uniform(size), point(origin.0, origin.1)) {
                    if let Some(bounding_box) = glyph.pixel_bounding_box() {
                        // Offset the glyph pixels by the glyph bounding box
                        glyph.draw(|x, y, coverage| {
                            plot(
                                bounding_box.min.x + x as i32,
                                bounding_box.min.y + y as i32,
                                coverage,
                            )
                        });
                    }
                }
            }
            Typeface::Greeked => {
                let mut caret = origin.0;
                for character in text.chars() {
                    let advance = greeked_advance(character, size);
                    if !character.is_whitespace() {
                        let top = if character.is_uppercase() || character.is_ascii_digit() {
                            origin.1 - 0.7 * size
                        } else {
                            origin.1 - 0.5 * size
                        };
                        let left = (caret + 0.1 * advance).round() as i32;
                        let right = (caret + 0.9 * advance).round() as i32;
                        for y in top.round() as i32..origin.1.round() as i32 {
                            for x in left..right.max(left + 1) {
                                plot(x, y, 1.0);
                            }
                        }
                    }
                    caret += advance;
                }
            }
        }
    }

    /// Breaks the text into lines no wider than `maximum_width`. Explicit line breaks are kept,
    /// blank lines are dropped and words wider than a line are broken between characters.
    pub fn wrap(&self, text: &str, size: f32, maximum_width: f32) -> Vec<String> {
        let normalized_text: String = text.nfc().collect();
        let mut lines = Vec::new();

        for paragraph in normalized_text.lines() {
            let mut current_line = String::new();
            for word in paragraph.split_whitespace() {
                let candidate = if current_line.is_empty() {
                    word.to_string()
                } else {
                    format!("{current_line} {word}")
                };
                if self.measure(&candidate, size) <= maximum_width {
                    current_line = candidate;
                    continue;
                }

                if !current_line.is_empty() {
                    lines.push(std::mem::take(&mut current_line));
                }
                if self.measure(word, size) <= maximum_width {
                    current_line = word.to_string();
                } else {
                    for character in word.chars() {
                        current_line.push(character);
                        if current_line.chars().count() > 1
                            && self.measure(&current_line, size) > maximum_width
                        {
                            current_line.pop();
                            lines.push(std::mem::replace(&mut current_line, character.to_string()));
                        }
                    }
                }
            }
            if !current_line.is_empty() {
                lines.push(current_line);
            }
        }

        lines
    }
}

fn greeked_advance(character: char, size: f32) -> f32 {
    if character.is_whitespace() {
        GREEKED_SPACE_ADVANCE * size
    } else if character.is_control() {
        0.0
    } else {
        GREEKED_ADVANCE * size
    }
}
