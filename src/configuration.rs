use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ErrorKind};
use crate::export::FileNaming;
use crate::render::RenderAssets;
use crate::surface::Viewport;
use crate::template::Template;
use crate::typeface::Typeface;

/// The settings of an export run, read from a JSON file. Every field is optional in the file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Where the exported PDF documents are written.
    pub output_directory: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub template: Template,
    /// The TTF/OTF font the text is rendered with, greeked text if absent.
    pub font_file_path: Option<PathBuf>,
    pub file_naming: FileNaming,
    /// Overrides the author of the exported documents, which is the CV name otherwise.
    pub author: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            output_directory: PathBuf::from("."),
            viewport_width: 1080,
            viewport_height: 1920,
            template: Template::default(),
            font_file_path: None,
            file_naming: FileNaming::default(),
            author: None,
        }
    }
}

impl Configuration {
    pub fn from_path(configuration_file_path: &Path) -> Result<Self, ContextError> {
        let configuration_file_contents =
            std::fs::read_to_string(configuration_file_path).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Configuration,
                    format!("Failed to read the configuration file {:?}", configuration_file_path),
                    &error,
                )
            })?;
        let configuration: Configuration = serde_json::from_str(&configuration_file_contents).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Configuration,
                format!("Failed to parse the configuration file {:?}", configuration_file_path),
                &error,
            )
        })?;

        Ok(configuration)
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport_width, self.viewport_height)
    }

    /// Loads the typeface, without a photo.
    pub fn render_assets(&self) -> Result<RenderAssets, ContextError> {
        let typeface = match &self.font_file_path {
            Some(font_file_path) => Typeface::from_path(font_file_path)?,
            None => Typeface::Greeked,
        };
        Ok(RenderAssets::new(typeface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_configuration_uses_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let configuration_path = directory.path().join("configuration.json");
        std::fs::write(
            &configuration_path,
            r#"{ "template": "modern", "outputDirectory": "exports", "fileNaming": { "fixed": "cv.pdf" } }"#,
        )
        .unwrap();

        let configuration = Configuration::from_path(&configuration_path).unwrap();
        assert_eq!(configuration.template, Template::Modern);
        assert_eq!(configuration.output_directory, PathBuf::from("exports"));
        assert_eq!(configuration.file_naming, FileNaming::Fixed("cv.pdf".into()));
        assert_eq!(configuration.viewport(), Viewport::new(1080, 1920));
        assert_eq!(configuration.author, None);
    }

    #[test]
    fn malformed_configuration_is_a_configuration_error() {
        let directory = tempfile::tempdir().unwrap();
        let configuration_path = directory.path().join("configuration.json");
        std::fs::write(&configuration_path, r#"{ "viewportWidth": "wide" }"#).unwrap();

        let error = Configuration::from_path(&configuration_path).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);

        let error = Configuration::from_path(&directory.path().join("missing.json")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn missing_font_file_fails_to_load() {
        let configuration = Configuration {
            font_file_path: Some(PathBuf::from("/nonexistent/font.ttf")),
            ..Configuration::default()
        };
        assert_eq!(configuration.render_assets().unwrap_err().kind(), ErrorKind::Render);
        assert!(matches!(
            Configuration::default().render_assets().unwrap().typeface,
            Typeface::Greeked
        ));
    }
}
