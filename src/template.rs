use image::Rgba;
use serde::{Deserialize, Serialize};

/// The width, in density-independent units, every template is designed for. A viewport that is
/// wider simply scales the whole layout up.
pub const REFERENCE_WIDTH_DP: f32 = 360.0;

/// The fixed set of hand-built layouts a CV can be rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum Template {
    /// Coloured sidebar with photo, contact details, skills and trainings; main column with
    /// the profile, education and experience.
    #[default]
    Classic,
    /// Light sidebar with profile, contact and skills; main column with chip-style headings.
    Modern,
    /// Name, email and phone stacked on a white page.
    Minimal,
}

/// The colours a template paints with.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub page_background: Rgba<u8>,
    pub sidebar_background: Rgba<u8>,
    pub sidebar_heading: Rgba<u8>,
    pub sidebar_text: Rgba<u8>,
    pub name: Rgba<u8>,
    pub profession: Rgba<u8>,
    pub heading: Rgba<u8>,
    pub heading_background: Option<Rgba<u8>>,
    pub entry_title: Rgba<u8>,
    pub body: Rgba<u8>,
    pub avatar_background: Rgba<u8>,
    pub avatar_figure: Rgba<u8>,
}

/// Font sizes and spacing of a template, in density-independent units.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// Width of the sidebar, `None` for single-column templates.
    pub sidebar_width: Option<f32>,
    pub sidebar_padding: f32,
    pub main_padding: f32,
    pub avatar_diameter: f32,
    pub name_size: f32,
    pub profession_size: f32,
    pub heading_size: f32,
    pub entry_title_size: f32,
    pub body_size: f32,
    /// Vertical gap before a sidebar section.
    pub sidebar_section_gap: f32,
    /// Vertical gap after a main column section.
    pub section_gap: f32,
    /// Vertical gap between a heading and its content.
    pub heading_gap: f32,
    /// Vertical gap after a list entry.
    pub entry_gap: f32,
    /// Horizontal padding of the heading chip, if the palette paints one.
    pub chip_padding: f32,
}

const fn rgb(hex: u32) -> Rgba<u8> {
    Rgba([
        ((hex >> 16) & 0xff) as u8,
        ((hex >> 8) & 0xff) as u8,
        (hex & 0xff) as u8,
        0xff,
    ])
}

const WHITE: Rgba<u8> = rgb(0xffffff);
const BLACK: Rgba<u8> = rgb(0x000000);
const GRAY: Rgba<u8> = rgb(0x888888);
const DARK_GRAY: Rgba<u8> = rgb(0x444444);
const LIGHT_GRAY: Rgba<u8> = rgb(0xcccccc);

impl Template {
    pub fn palette(self) -> Palette {
        match self {
            Template::Classic => Palette {
                page_background: WHITE,
                sidebar_background: rgb(0xb28b72),
                sidebar_heading: WHITE,
                sidebar_text: WHITE,
                name: rgb(0xb28b72),
                profession: GRAY,
                heading: BLACK,
                heading_background: None,
                entry_title: BLACK,
                body: DARK_GRAY,
                avatar_background: WHITE,
                avatar_figure: LIGHT_GRAY,
            },
            Template::Modern => Palette {
                page_background: WHITE,
                sidebar_background: rgb(0xf5f5f5),
                sidebar_heading: BLACK,
                sidebar_text: DARK_GRAY,
                name: BLACK,
                profession: GRAY,
                heading: BLACK,
                heading_background: Some(rgb(0xa5b9c2)),
                entry_title: BLACK,
                body: DARK_GRAY,
                avatar_background: rgb(0xb3e5fc),
                avatar_figure: rgb(0x4e6075),
            },
            Template::Minimal => Palette {
                page_background: WHITE,
                sidebar_background: WHITE,
                sidebar_heading: BLACK,
                sidebar_text: DARK_GRAY,
                name: BLACK,
                profession: GRAY,
                heading: BLACK,
                heading_background: None,
                entry_title: BLACK,
                body: DARK_GRAY,
                avatar_background: WHITE,
                avatar_figure: LIGHT_GRAY,
            },
        }
    }

    pub fn geometry(self) -> Geometry {
        match self {
            Template::Classic => Geometry {
                sidebar_width: Some(132.0),
                sidebar_padding: 12.0,
                main_padding: 16.0,
                avatar_diameter: 84.0,
                name_size: 22.0,
                profession_size: 13.0,
                heading_size: 13.0,
                entry_title_size: 12.0,
                body_size: 10.0,
                sidebar_section_gap: 24.0,
                section_gap: 14.0,
                heading_gap: 6.0,
                entry_gap: 8.0,
                chip_padding: 0.0,
            },
            Template::Modern => Geometry {
                sidebar_width: Some(128.0),
                sidebar_padding: 12.0,
                main_padding: 16.0,
                avatar_diameter: 80.0,
                name_size: 22.0,
                profession_size: 13.0,
                heading_size: 12.0,
                entry_title_size: 11.5,
                body_size: 10.0,
                sidebar_section_gap: 18.0,
                section_gap: 14.0,
                heading_gap: 8.0,
                entry_gap: 12.0,
                chip_padding: 8.0,
            },
            Template::Minimal => Geometry {
                sidebar_width: None,
                sidebar_padding: 0.0,
                main_padding: 24.0,
                avatar_diameter: 0.0,
                name_size: 24.0,
                profession_size: 13.0,
                heading_size: 13.0,
                entry_title_size: 12.0,
                body_size: 13.0,
                sidebar_section_gap: 0.0,
                section_gap: 12.0,
                heading_gap: 6.0,
                entry_gap: 10.0,
                chip_padding: 0.0,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Template::Classic => "classic",
            Template::Modern => "modern",
            Template::Minimal => "minimal",
        }
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.name())
    }
}
