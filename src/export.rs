use rand::{distributions::Alphanumeric, Rng as _};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::capture::RasterImage;
use crate::cv::CvDocument;
use crate::error::{ContextError, ErrorKind};
use crate::pdf::{ImagePlacement, ImageXObject, PdfDocument, PdfMetadata};

/// What an export resolved to: the path of the written file, or why nothing was written.
pub type ExportOutcome = Result<PathBuf, ContextError>;

/// How the destination file of an export is named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileNaming {
    /// `<prefix>-<UTC timestamp>-<random suffix>.pdf`, a new file for every export.
    Unique { prefix: String },
    /// Always the same file name, overwritten by every export.
    Fixed(String),
}

impl Default for FileNaming {
    fn default() -> Self {
        FileNaming::Unique {
            prefix: "cv".into(),
        }
    }
}

impl FileNaming {
    pub fn file_name(&self) -> String {
        match self {
            FileNaming::Unique { prefix } => format!(
                "{}-{}-{}.pdf",
                prefix,
                file_name_timestamp(&OffsetDateTime::now_utc()),
                random_identifier(8)
            ),
            FileNaming::Fixed(file_name) => file_name.clone(),
        }
    }
}

/// Writes rasters as single-page PDF documents into an output directory.
#[derive(Debug, Clone)]
pub struct PdfExporter {
    output_directory: PathBuf,
    file_naming: FileNaming,
}

impl PdfExporter {
    pub fn new<P: Into<PathBuf>>(output_directory: P) -> Self {
        PdfExporter {
            output_directory: output_directory.into(),
            file_naming: FileNaming::default(),
        }
    }

    pub fn with_file_naming(mut self, file_naming: FileNaming) -> Self {
        self.file_naming = file_naming;
        self
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Exports the raster, then hands the outcome to `completion`.
    ///
    /// The completion runs exactly once, after the file and the document have been released,
    /// whether the export succeeded or not.
    pub fn export_with_completion<F>(&self, raster: &RasterImage, metadata: &PdfMetadata, completion: F)
    where
        F: FnOnce(ExportOutcome),
    {
        let outcome = self.export(raster, metadata);
        if let Err(error) = &outcome {
            log::error!("Failed to export the CV: {}", error);
        }
        completion(outcome)
    }

    /// Exports the raster as a single page sized to it, returning the path of the written file.
    pub fn export(&self, raster: &RasterImage, metadata: &PdfMetadata) -> ExportOutcome {
        let pdf_bytes = raster_to_pdf_bytes(raster, metadata)?;

        std::fs::create_dir_all(&self.output_directory).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Io,
                format!("Failed to create the output directory {:?}", self.output_directory),
                &error,
            )
        })?;
        let destination = self.output_directory.join(self.file_naming.file_name());
        write_file(&destination, &pdf_bytes)?;

        log::info!(
            "Exported a {}x{} CV to {:?} ({} bytes)",
            raster.width(),
            raster.height(),
            destination,
            pdf_bytes.len()
        );
        Ok(destination)
    }
}

/// Builds the single-page document for the raster and serializes it. The page has the size of the
/// raster in points and the raster is drawn at the origin without scaling.
pub fn raster_to_pdf_bytes(raster: &RasterImage, metadata: &PdfMetadata) -> Result<Vec<u8>, ContextError> {
    let (width, height) = (raster.width() as f32, raster.height() as f32);
    if raster.width() == 0 || raster.height() == 0 {
        return Err(ContextError::with_context(
            ErrorKind::InvalidSurfaceState,
            format!("Unable to export an empty raster of {}x{} pixels", width, height),
        ));
    }

    let mut pdf_document = PdfDocument::new(random_identifier(32));
    let (page_index, layer_index) = pdf_document.add_page_with_layer(width, height);
    let image_reference = pdf_document.add_image(page_index, ImageXObject::from_rgba(raster.as_rgba()))?;
    pdf_document.draw_image_to_layer_in_page(
        layer_index,
        page_index,
        &image_reference,
        ImagePlacement {
            x: 0.0,
            y: 0.0,
            width,
            height,
        },
    )?;
    pdf_document.write_all(random_identifier(32), metadata)?;
    pdf_document.optimize();
    log::debug!("Assembled a PDF document with {} objects", pdf_document.inner_document.objects.len());

    pdf_document.save_to_bytes()
}

/// The document information of an exported CV.
pub fn document_metadata(document: &CvDocument, author: Option<&str>) -> PdfMetadata {
    let full_name = document.full_name.trim();
    let title = if full_name.is_empty() {
        "Curriculum Vitae".to_string()
    } else {
        format!("Curriculum Vitae - {}", full_name)
    };

    PdfMetadata {
        title,
        author: author.unwrap_or(full_name).to_string(),
        creation_date: OffsetDateTime::now_utc(),
        ..PdfMetadata::default()
    }
}

/// Writes the bytes to the destination, replacing it if it exists. A file left incomplete by a
/// failed write is removed.
fn write_file(destination: &Path, bytes: &[u8]) -> Result<(), ContextError> {
    let write_error = |error: std::io::Error| {
        ContextError::with_error(
            ErrorKind::Io,
            format!("Failed to write the PDF document to {:?}", destination),
            &error,
        )
    };
    // Nothing was truncated if the file could not be opened, so an existing file is left alone
    let file = File::create(destination).map_err(write_error)?;

    let write_result = {
        let mut writer = BufWriter::new(file);
        writer
            .write_all(bytes)
            .and_then(|_| writer.flush())
            .and_then(|_| writer.get_ref().sync_all())
    };
    write_result.map_err(|error| {
        if let Err(removal_error) = std::fs::remove_file(destination) {
            log::warn!(
                "Unable to remove the partially written file {:?}: {}",
                destination,
                removal_error
            );
        }
        write_error(error)
    })
}

/// A random alphanumeric string, used for the PDF identifiers and the file name suffixes.
pub(crate) fn random_identifier(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn file_name_timestamp(date: &OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn raster(width: u32, height: u32) -> RasterImage {
        RasterImage::from(RgbaImage::from_pixel(width, height, Rgba([178, 139, 114, 255])))
    }

    #[test]
    fn any_raster_becomes_a_single_page_of_its_size() {
        for (width, height) in [(1, 1), (17, 5), (360, 640)] {
            let pdf_bytes = raster_to_pdf_bytes(&raster(width, height), &PdfMetadata::default()).unwrap();
            let document = lopdf::Document::load_mem(&pdf_bytes).unwrap();

            let pages = document.get_pages();
            assert_eq!(pages.len(), 1);
            let page = document.get_dictionary(*pages.values().next().unwrap()).unwrap();
            let media_box = page
                .get(b"MediaBox")
                .unwrap()
                .as_array()
                .unwrap()
                .iter()
                .map(|value| value.as_float().unwrap())
                .collect::<Vec<_>>();
            assert_eq!(media_box, vec![0.0, 0.0, width as f32, height as f32]);
        }
    }

    #[test]
    fn metadata_carries_the_name() {
        let document = CvDocument {
            full_name: "Jane Doe".into(),
            ..Default::default()
        };
        let metadata = document_metadata(&document, None);
        assert_eq!(metadata.title, "Curriculum Vitae - Jane Doe");
        assert_eq!(metadata.author, "Jane Doe");

        let metadata = document_metadata(&CvDocument::default(), Some("HR"));
        assert_eq!(metadata.title, "Curriculum Vitae");
        assert_eq!(metadata.author, "HR");
    }

    #[test]
    fn info_dictionary_has_the_title() {
        let metadata = PdfMetadata {
            title: "Curriculum Vitae - Jane Doe".into(),
            ..PdfMetadata::default()
        };
        let pdf_bytes = raster_to_pdf_bytes(&raster(2, 2), &metadata).unwrap();
        let document = lopdf::Document::load_mem(&pdf_bytes).unwrap();

        let info_id = document.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let title = document
            .get_dictionary(info_id)
            .unwrap()
            .get(b"Title")
            .unwrap()
            .as_str()
            .unwrap();
        assert_eq!(title, b"Curriculum Vitae - Jane Doe");
        assert_eq!(document.trailer.get(b"ID").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn unique_file_names_differ() {
        let file_naming = FileNaming::default();
        let first = file_naming.file_name();
        let second = file_naming.file_name();

        assert!(first.starts_with("cv-"));
        assert!(first.ends_with(".pdf"));
        assert_ne!(first, second);
        assert_eq!(FileNaming::Fixed("cv.pdf".into()).file_name(), "cv.pdf");
    }

    #[test]
    fn export_writes_into_the_output_directory() {
        let output_directory = tempfile::tempdir().unwrap();
        let exporter = PdfExporter::new(output_directory.path().join("nested"));

        let path = exporter.export(&raster(8, 8), &PdfMetadata::default()).unwrap();
        assert_eq!(path.parent().unwrap(), output_directory.path().join("nested"));
        let pdf_bytes = std::fs::read(&path).unwrap();
        assert!(pdf_bytes.starts_with(b"%PDF-1.5"));
    }

    #[test]
    fn completion_runs_once_on_failure() {
        let output_directory = tempfile::tempdir().unwrap();
        let blocking_file = output_directory.path().join("not-a-directory");
        std::fs::write(&blocking_file, b"").unwrap();
        let exporter = PdfExporter::new(&blocking_file);

        let mut outcomes = Vec::new();
        exporter.export_with_completion(&raster(4, 4), &PdfMetadata::default(), |outcome| {
            outcomes.push(outcome)
        });

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].as_ref().unwrap_err().kind(), ErrorKind::Io);
    }

    #[test]
    fn fixed_file_is_overwritten() {
        let output_directory = tempfile::tempdir().unwrap();
        let exporter = PdfExporter::new(output_directory.path())
            .with_file_naming(FileNaming::Fixed("cv.pdf".into()));

        let first_path = exporter.export(&raster(4, 4), &PdfMetadata::default()).unwrap();
        let second_path = exporter.export(&raster(6, 6), &PdfMetadata::default()).unwrap();
        assert_eq!(first_path, second_path);

        let document = lopdf::Document::load(&second_path).unwrap();
        assert_eq!(document.get_pages().len(), 1);
    }

    #[test]
    fn failed_open_keeps_the_previous_export() {
        let output_directory = tempfile::tempdir().unwrap();
        let previous_export = output_directory.path().join("cv.pdf");
        std::fs::write(&previous_export, b"OLD EXPORT").unwrap();
        let mut permissions = std::fs::metadata(&previous_export).unwrap().permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(&previous_export, permissions).unwrap();

        let occupied = output_directory.path().join("occupied.pdf");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("kept"), b"").unwrap();
        assert_eq!(write_file(&occupied, b"NEW").unwrap_err().kind(), ErrorKind::Io);
        assert!(occupied.join("kept").exists());

        // Privileged users can open read-only files, then the export simply replaces the file
        match write_file(&previous_export, b"NEW EXPORT") {
            Ok(()) => assert_eq!(std::fs::read(&previous_export).unwrap(), b"NEW EXPORT"),
            Err(error) => {
                assert_eq!(error.kind(), ErrorKind::Io);
                assert_eq!(std::fs::read(&previous_export).unwrap(), b"OLD EXPORT");
            }
        }
    }

    #[test]
    fn random_identifiers_are_alphanumeric() {
        let identifier = random_identifier(32);
        assert_eq!(identifier.len(), 32);
        assert!(identifier.chars().all(|character| character.is_ascii_alphanumeric()));
    }
}
