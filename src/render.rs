use std::path::Path;
use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::cv::{is_blank, CvDocument, SectionEntry};
use crate::error::{ContextError, ErrorKind};
use crate::surface::{Element, Frame, Rect, RenderedSurface, TextRole, Viewport};
use crate::template::{Geometry, Palette, Template, REFERENCE_WIDTH_DP};
use crate::typeface::Typeface;

/// What a template needs besides the CV data: the face to set the text in and, if it could be
/// retrieved, the decoded profile photo.
#[derive(Debug, Clone, Default)]
pub struct RenderAssets {
    pub typeface: Typeface,
    pub photo: Option<Arc<RgbaImage>>,
}

impl RenderAssets {
    pub fn new(typeface: Typeface) -> Self {
        RenderAssets {
            typeface,
            photo: None,
        }
    }

    pub fn with_photo(mut self, photo: RgbaImage) -> Self {
        self.photo = Some(Arc::new(photo));
        self
    }

    /// Decodes a PNG or JPEG profile photo.
    pub fn with_photo_bytes(self, photo_bytes: &[u8]) -> Result<Self, ContextError> {
        let photo = image::load_from_memory(photo_bytes).map_err(|error| {
            ContextError::with_error(ErrorKind::Render, "Unable to decode the profile photo", &error)
        })?;
        Ok(self.with_photo(photo.into_rgba8()))
    }

    pub fn with_photo_path(self, photo_path: &Path) -> Result<Self, ContextError> {
        let photo_bytes = std::fs::read(photo_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Io,
                format!("Unable to read the profile photo {:?}", photo_path),
                &error,
            )
        })?;
        self.with_photo_bytes(&photo_bytes)
    }
}

/// Renders the CV with the template. The returned surface has not been laid out yet, call
/// `RenderedSurface::layout` with the viewport it is displayed in.
pub fn render<D: Into<Arc<CvDocument>>>(
    document: D,
    template: Template,
    assets: RenderAssets,
) -> RenderedSurface {
    RenderedSurface::new(document.into(), template, assets)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Start,
    Center,
}

/// A vertical run of content with a caret that moves down as content is appended.
struct Column<'a> {
    typeface: &'a Typeface,
    density: f32,
    left: f32,
    width: f32,
    caret: f32,
    elements: Vec<Element>,
}

impl<'a> Column<'a> {
    fn new(typeface: &'a Typeface, density: f32, left: f32, width: f32, top: f32) -> Self {
        Column {
            typeface,
            density,
            left,
            width,
            caret: top,
            elements: Vec::new(),
        }
    }

    fn dp(&self, value: f32) -> f32 {
        value * self.density
    }

    fn space(&mut self, value: f32) {
        self.caret += self.dp(value);
    }

    fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Appends the text wrapped to the column width, starting `indent` into the column.
    #[allow(clippy::too_many_arguments)]
    fn text(
        &mut self,
        role: TextRole,
        text: &str,
        size: f32,
        color: Rgba<u8>,
        bold: bool,
        align: Align,
        indent: f32,
    ) {
        let size = self.dp(size);
        let indent = self.dp(indent);
        let available_width = self.width - indent;
        if available_width <= 0.0 || size <= 0.0 {
            return;
        }

        let metrics = self.typeface.line_metrics(size);
        for line in self.typeface.wrap(text, size, available_width) {
            let x = match align {
                Align::Start => self.left + indent,
                Align::Center => {
                    let line_width = self.typeface.measure(&line, size);
                    self.left + indent + ((available_width - line_width) / 2.0).max(0.0)
                }
            };
            self.elements.push(Element::Text {
                role,
                text: line,
                origin: (x, self.caret + metrics.ascent),
                size,
                color,
                bold,
            });
            self.caret += metrics.line_height();
        }
    }

    /// Appends a heading, either as bold text or, when a chip colour is given, as bold text
    /// on a padded coloured band.
    fn heading(&mut self, text: &str, size: f32, color: Rgba<u8>, chip: Option<(Rgba<u8>, f32)>) {
        match chip {
            Some((chip_color, horizontal_padding)) => {
                let vertical_padding = self.dp(4.0);
                let horizontal_padding = self.dp(horizontal_padding);
                let pixel_size = self.dp(size);
                let metrics = self.typeface.line_metrics(pixel_size);
                let text_width = self.typeface.measure(text, pixel_size);
                let chip_rect = Rect::new(
                    self.left,
                    self.caret,
                    (text_width + 2.0 * horizontal_padding).min(self.width),
                    metrics.ascent + metrics.descent + 2.0 * vertical_padding,
                );
                self.elements.push(Element::FillRect {
                    rect: chip_rect,
                    color: chip_color,
                });
                self.elements.push(Element::Text {
                    role: TextRole::Heading,
                    text: text.to_string(),
                    origin: (
                        self.left + horizontal_padding,
                        self.caret + vertical_padding + metrics.ascent,
                    ),
                    size: pixel_size,
                    color,
                    bold: true,
                });
                self.caret = chip_rect.bottom();
            }
            None => self.text(TextRole::Heading, text, size, color, true, Align::Start, 0.0),
        }
    }

    fn rule(&mut self, thickness: f32, color: Rgba<u8>) {
        let rect = Rect::new(self.left, self.caret, self.width, self.dp(thickness).max(1.0));
        self.elements.push(Element::FillRect { rect, color });
        self.caret = rect.bottom();
    }

    /// A round avatar centred in the column: the photo when there is one, a person figure on
    /// a coloured disc otherwise.
    fn avatar(&mut self, diameter: f32, photo: Option<&Arc<RgbaImage>>, palette: &Palette) {
        let diameter = self.dp(diameter);
        let radius = diameter / 2.0;
        let center = (self.left + self.width / 2.0, self.caret + radius);

        self.elements.push(Element::FillCircle {
            center,
            radius,
            color: palette.avatar_background,
        });
        match photo {
            Some(photo) => {
                let inset = self.dp(4.0);
                self.elements.push(Element::Image {
                    rect: Rect::new(
                        center.0 - radius + inset,
                        center.1 - radius + inset,
                        diameter - 2.0 * inset,
                        diameter - 2.0 * inset,
                    ),
                    image: Arc::clone(photo),
                    circular: true,
                });
            }
            None => {
                // Head and shoulders
                self.elements.push(Element::FillCircle {
                    center: (center.0, center.1 - 0.12 * diameter),
                    radius: 0.13 * diameter,
                    color: palette.avatar_figure,
                });
                self.elements.push(Element::FillCircle {
                    center: (center.0, center.1 + 0.2 * diameter),
                    radius: 0.22 * diameter,
                    color: palette.avatar_figure,
                });
                self.elements.push(Element::FillRect {
                    rect: Rect::new(
                        center.0 - 0.22 * diameter,
                        center.1 + 0.2 * diameter,
                        0.44 * diameter,
                        0.12 * diameter,
                    ),
                    color: palette.avatar_figure,
                });
            }
        }
        self.caret += diameter;
    }

    /// A contact line with a small round marker in front of it.
    fn contact(&mut self, text: &str, size: f32, color: Rgba<u8>) {
        let marker_radius = self.dp(2.5);
        let metrics = self.typeface.line_metrics(self.dp(size));
        self.elements.push(Element::FillCircle {
            center: (
                self.left + marker_radius,
                self.caret + metrics.ascent - metrics.ascent * 0.35,
            ),
            radius: marker_radius,
            color,
        });
        self.text(TextRole::Contact, text, size, color, false, Align::Start, 10.0);
        self.space(2.0);
    }

    fn entry(&mut self, entry: &SectionEntry, geometry: &Geometry, palette: &Palette) {
        if !is_blank(&entry.title) {
            self.text(
                TextRole::EntryTitle,
                entry.title.trim(),
                geometry.entry_title_size,
                palette.entry_title,
                true,
                Align::Start,
                0.0,
            );
        }
        for line in entry.content_lines() {
            self.text(
                TextRole::Body,
                &line,
                geometry.body_size,
                palette.body,
                false,
                Align::Start,
                0.0,
            );
        }
        self.space(geometry.entry_gap);
    }
}

/// Everything one layout pass works with.
struct Page<'a> {
    document: &'a CvDocument,
    template: Template,
    assets: &'a RenderAssets,
    palette: Palette,
    geometry: Geometry,
    density: f32,
    width: f32,
}

impl<'a> Page<'a> {
    fn sidebar_width(&self) -> f32 {
        self.geometry.sidebar_width.unwrap_or(0.0) * self.density
    }

    fn sidebar(&self) -> Column<'a> {
        let padding = self.geometry.sidebar_padding * self.density;
        Column::new(
            &self.assets.typeface,
            self.density,
            padding,
            self.sidebar_width() - 2.0 * padding,
            padding,
        )
    }

    fn main_column(&self) -> Column<'a> {
        let padding = self.geometry.main_padding * self.density;
        Column::new(
            &self.assets.typeface,
            self.density,
            self.sidebar_width() + padding,
            self.width - self.sidebar_width() - 2.0 * padding,
            padding,
        )
    }

    fn photo(&self) -> Option<&'a Arc<RgbaImage>> {
        if self.assets.photo.is_none() && !is_blank(&self.document.photo_url) {
            log::debug!(
                "The profile photo {:?} has not been retrieved, drawing the placeholder",
                self.document.photo_url
            );
        }
        self.assets.photo.as_ref()
    }

    fn contact_lines(&self) -> Vec<&'a str> {
        [
            &self.document.email,
            &self.document.phone,
            &self.document.address,
        ]
        .into_iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect()
    }

    fn visible_entries(entries: &'a [SectionEntry]) -> Vec<&'a SectionEntry> {
        entries.iter().filter(|entry| !entry.is_blank()).collect()
    }

    /// The classic sidebar centres its headings over the avatar, the others keep them flush.
    fn sidebar_heading(&self, column: &mut Column<'a>, heading: &str) {
        let align = match self.template {
            Template::Classic => Align::Center,
            _ => Align::Start,
        };
        column.text(
            TextRole::Heading,
            heading,
            self.geometry.heading_size,
            self.palette.sidebar_heading,
            true,
            align,
            0.0,
        );
        column.space(self.geometry.heading_gap);
    }

    /// Appends a titled list of bullets to the sidebar, nothing at all if the list is empty.
    fn sidebar_bullets(&self, column: &mut Column<'a>, heading: &str, items: &[&str]) {
        if items.is_empty() {
            return;
        }
        if !column.is_empty() {
            column.space(self.geometry.sidebar_section_gap);
        }
        self.sidebar_heading(column, heading);
        for item in items {
            column.text(
                TextRole::Bullet,
                &format!("• {item}"),
                self.geometry.body_size,
                self.palette.sidebar_text,
                false,
                Align::Start,
                0.0,
            );
        }
    }

    fn sidebar_contact(&self, column: &mut Column<'a>, heading: &str) {
        let contact_lines = self.contact_lines();
        if contact_lines.is_empty() {
            return;
        }
        if !column.is_empty() {
            column.space(self.geometry.sidebar_section_gap);
        }
        self.sidebar_heading(column, heading);
        for line in contact_lines {
            column.contact(line, self.geometry.body_size, self.palette.sidebar_text);
        }
    }

    /// Appends a titled list of entries to the main column, nothing at all if the list is empty.
    fn main_section(&self, column: &mut Column<'a>, heading: &str, entries: &'a [SectionEntry]) {
        let entries = Page::visible_entries(entries);
        if entries.is_empty() {
            return;
        }
        let chip = self
            .palette
            .heading_background
            .map(|color| (color, self.geometry.chip_padding));
        column.heading(heading, self.geometry.heading_size, self.palette.heading, chip);
        if chip.is_none() {
            column.rule(1.0, self.palette.name);
        }
        column.space(self.geometry.heading_gap);
        for entry in entries {
            column.entry(entry, &self.geometry, &self.palette);
        }
        column.space(self.geometry.section_gap);
    }

    /// Name and profession at the top of the main column.
    fn masthead(&self, column: &mut Column<'a>, name: &str) {
        if !is_blank(name) {
            column.text(
                TextRole::Name,
                name.trim(),
                self.geometry.name_size,
                self.palette.name,
                true,
                Align::Start,
                0.0,
            );
        }
        if !is_blank(&self.document.profession) {
            column.text(
                TextRole::Profession,
                self.document.profession.trim(),
                self.geometry.profession_size,
                self.palette.profession,
                false,
                Align::Start,
                0.0,
            );
        }
        if !column.is_empty() {
            column.space(self.geometry.section_gap);
        }
    }

    fn lay_out_classic(&self) -> (Vec<Element>, f32) {
        let mut sidebar = self.sidebar();
        sidebar.avatar(self.geometry.avatar_diameter, self.photo(), &self.palette);
        self.sidebar_contact(&mut sidebar, "Contact");
        let skills: Vec<&str> = self.document.visible_skills().collect();
        self.sidebar_bullets(&mut sidebar, "Skills", &skills);
        let trainings: Vec<&str> = Page::visible_entries(&self.document.training)
            .into_iter()
            .map(|entry| entry.title.trim())
            .filter(|title| !title.is_empty())
            .collect();
        self.sidebar_bullets(&mut sidebar, "Trainings", &trainings);

        let mut main = self.main_column();
        self.masthead(&mut main, &self.document.full_name);
        if !is_blank(&self.document.profile_description) {
            main.heading("About Me", self.geometry.heading_size, self.palette.heading, None);
            main.space(self.geometry.heading_gap);
            main.text(
                TextRole::Body,
                self.document.profile_description.trim(),
                self.geometry.body_size,
                self.palette.body,
                false,
                Align::Start,
                0.0,
            );
            main.space(self.geometry.section_gap);
        }
        self.main_section(&mut main, "Education", &self.document.education);
        self.main_section(&mut main, "Experience", &self.document.experience);

        join_columns(sidebar, main)
    }

    fn lay_out_modern(&self) -> (Vec<Element>, f32) {
        let mut sidebar = self.sidebar();
        sidebar.avatar(self.geometry.avatar_diameter, self.photo(), &self.palette);
        if !is_blank(&self.document.profile_description) {
            sidebar.space(self.geometry.sidebar_section_gap);
            self.sidebar_heading(&mut sidebar, "PROFILE");
            sidebar.text(
                TextRole::Body,
                self.document.profile_description.trim(),
                self.geometry.body_size,
                self.palette.sidebar_text,
                false,
                Align::Start,
                0.0,
            );
        }
        self.sidebar_contact(&mut sidebar, "CONTACT");
        let skills: Vec<&str> = self.document.visible_skills().collect();
        self.sidebar_bullets(&mut sidebar, "SKILLS", &skills);

        let mut main = self.main_column();
        self.masthead(&mut main, &self.document.full_name.to_uppercase());
        self.main_section(&mut main, "WORK EXPERIENCE", &self.document.experience);
        self.main_section(&mut main, "EDUCATION", &self.document.education);
        self.main_section(&mut main, "TRAININGS", &self.document.training);

        join_columns(sidebar, main)
    }

    fn lay_out_minimal(&self) -> (Vec<Element>, f32) {
        let mut column = self.main_column();
        if !is_blank(&self.document.full_name) {
            column.text(
                TextRole::Name,
                self.document.full_name.trim(),
                self.geometry.name_size,
                self.palette.name,
                true,
                Align::Start,
                0.0,
            );
            column.space(self.geometry.entry_gap);
        }
        for value in [&self.document.email, &self.document.phone] {
            if !is_blank(value) {
                column.text(
                    TextRole::Contact,
                    value.trim(),
                    self.geometry.body_size,
                    self.palette.body,
                    false,
                    Align::Start,
                    0.0,
                );
                column.space(self.geometry.entry_gap);
            }
        }

        if column.is_empty() {
            (Vec::new(), 0.0)
        } else {
            let bottom = column.caret + column.dp(self.geometry.main_padding);
            (column.elements, bottom)
        }
    }
}

/// Sidebar elements first, then the main column; the bottom is the lowest of the two carets.
fn join_columns(sidebar: Column<'_>, main: Column<'_>) -> (Vec<Element>, f32) {
    let bottom_padding = main.dp(16.0);
    let bottom = sidebar.caret.max(main.caret) + bottom_padding;
    let mut elements = sidebar.elements;
    elements.extend(main.elements);
    (elements, bottom)
}

/// The layout pass: positions the content of the template for the viewport width. The frame
/// is as tall as the viewport, or taller when the content does not fit.
pub(crate) fn lay_out(
    document: &CvDocument,
    template: Template,
    assets: &RenderAssets,
    viewport: Viewport,
) -> Frame {
    let palette = template.palette();
    if viewport.width == 0 {
        return Frame {
            width: 0,
            height: viewport.height,
            background: palette.page_background,
            elements: Vec::new(),
        };
    }

    let page = Page {
        document,
        template,
        assets,
        palette,
        geometry: template.geometry(),
        density: viewport.width as f32 / REFERENCE_WIDTH_DP,
        width: viewport.width as f32,
    };
    let (content, content_bottom) = match template {
        Template::Classic => page.lay_out_classic(),
        Template::Modern => page.lay_out_modern(),
        Template::Minimal => page.lay_out_minimal(),
    };
    let height = viewport.height.max(content_bottom.ceil() as u32);

    let mut elements = Vec::with_capacity(content.len() + 1);
    if page.geometry.sidebar_width.is_some() && height > 0 {
        elements.push(Element::FillRect {
            rect: Rect::new(0.0, 0.0, page.sidebar_width(), height as f32),
            color: palette.sidebar_background,
        });
    }
    elements.extend(content);

    Frame {
        width: viewport.width,
        height,
        background: palette.page_background,
        elements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::Skill;

    fn jane_doe() -> CvDocument {
        CvDocument {
            full_name: "Jane Doe".into(),
            email: "jane@x.com".into(),
            skills: vec![Skill::new("Go"), Skill::new("SQL")],
            ..Default::default()
        }
    }

    fn laid_out(document: CvDocument, template: Template, viewport: Viewport) -> Frame {
        let mut surface = render(document, template, RenderAssets::default());
        surface.layout(viewport).clone()
    }

    #[test]
    fn blank_document_has_no_headings_in_any_template() {
        for template in [Template::Classic, Template::Modern, Template::Minimal] {
            let frame = laid_out(CvDocument::default(), template, Viewport::new(1080, 1920));
            assert!(
                frame.texts(TextRole::Heading).is_empty(),
                "{template} shows {:?}",
                frame.texts(TextRole::Heading)
            );
            assert!(frame.all_texts().is_empty(), "{template} shows {:?}", frame.all_texts());
            assert_eq!((frame.width, frame.height), (1080, 1920));
        }
    }

    #[test]
    fn blank_entries_and_whitespace_fields_are_omitted() {
        let document = CvDocument {
            profile_description: "   ".into(),
            skills: vec![Skill::new(" ")],
            education: vec![SectionEntry::default()],
            training: vec![SectionEntry::new("")],
            ..Default::default()
        };
        let frame = laid_out(document, Template::Classic, Viewport::new(720, 1280));
        assert!(frame.texts(TextRole::Heading).is_empty());
    }

    #[test]
    fn classic_template_shows_only_sections_with_content() {
        let frame = laid_out(jane_doe(), Template::Classic, Viewport::new(1080, 1920));

        similar_asserts::assert_eq!(frame.texts(TextRole::Heading), vec!["Contact", "Skills"]);
        similar_asserts::assert_eq!(frame.texts(TextRole::Bullet), vec!["• Go", "• SQL"]);
        assert_eq!(frame.texts(TextRole::Name), vec!["Jane Doe"]);
        assert_eq!(frame.texts(TextRole::Contact), vec!["jane@x.com"]);
        assert_eq!((frame.width, frame.height), (1080, 1920));
    }

    #[test]
    fn modern_template_orders_experience_before_education() {
        let document = CvDocument {
            full_name: "Jane Doe".into(),
            profile_description: "Engineer".into(),
            education: vec![SectionEntry::new("BSc").with_dates("2012", "2015")],
            experience: vec![SectionEntry::new("Backend engineer")],
            training: vec![SectionEntry::new("Kubernetes")],
            ..Default::default()
        };
        let frame = laid_out(document, Template::Modern, Viewport::new(1080, 1920));

        similar_asserts::assert_eq!(
            frame.texts(TextRole::Heading),
            vec!["PROFILE", "WORK EXPERIENCE", "EDUCATION", "TRAININGS"]
        );
        assert_eq!(frame.texts(TextRole::Name), vec!["JANE DOE"]);
        assert_eq!(
            frame.texts(TextRole::EntryTitle),
            vec!["Backend engineer", "BSc", "Kubernetes"]
        );
        assert!(frame.texts(TextRole::Body).contains(&"(2012 - 2015)"));
    }

    #[test]
    fn minimal_template_stacks_name_email_and_phone() {
        let document = CvDocument {
            phone: "+1 555 0100".into(),
            profession: "Engineer".into(),
            ..jane_doe()
        };
        let frame = laid_out(document, Template::Minimal, Viewport::new(360, 640));

        similar_asserts::assert_eq!(frame.all_texts(), vec!["Jane Doe", "jane@x.com", "+1 555 0100"]);
        let baselines: Vec<f32> = frame
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Text { origin, .. } => Some(origin.1),
                _ => None,
            })
            .collect();
        assert!(baselines.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn surface_grows_to_fit_long_content() {
        let document = CvDocument {
            experience: (0..40)
                .map(|index| {
                    SectionEntry::new(format!("Position {index}"))
                        .with_description("Built and operated services")
                        .with_dates("2001", "2002")
                })
                .collect(),
            ..jane_doe()
        };
        let frame = laid_out(document, Template::Classic, Viewport::new(360, 640));

        assert_eq!(frame.width, 360);
        assert!(frame.height > 640);
        let sidebar_height = frame.elements.iter().find_map(|element| match element {
            Element::FillRect { rect, .. } => Some(rect.height),
            _ => None,
        });
        assert_eq!(sidebar_height, Some(frame.height as f32));
    }

    #[test]
    fn photo_replaces_the_placeholder_figure() {
        let assets = RenderAssets::default().with_photo(RgbaImage::new(8, 8));
        let mut surface = render(jane_doe(), Template::Classic, assets);
        let frame = surface.layout(Viewport::new(1080, 1920));

        let images = frame
            .elements
            .iter()
            .filter(|element| matches!(element, Element::Image { circular: true, .. }))
            .count();
        assert_eq!(images, 1);
    }

    #[test]
    fn undecodable_photo_is_an_error() {
        let error = RenderAssets::default()
            .with_photo_bytes(b"not an image")
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Render);
    }
}
