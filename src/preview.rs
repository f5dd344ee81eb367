use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use crate::capture;
use crate::error::{ContextError, ErrorKind};
use crate::export::{self, ExportOutcome, PdfExporter};
use crate::surface::RenderedSurface;

/// Whether an export is currently running for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportState {
    #[default]
    Idle,
    Exporting,
}

/// The user-visible result of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Exported(PathBuf),
    Failed(String),
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Notification::Exported(_) => "Exported successfully!".to_string(),
            Notification::Failed(reason) => format!("Export failed: {}", reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notification::Exported(_))
    }
}

impl From<ExportOutcome> for Notification {
    fn from(outcome: ExportOutcome) -> Self {
        match outcome {
            Ok(path) => Notification::Exported(path),
            Err(error) => Notification::Failed(error.to_string()),
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.message())
    }
}

/// What a call to `trigger_export` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The export is running on its worker thread.
    Started,
    /// No surface is mounted, so there was nothing to export.
    Ignored,
}

/// The preview of one CV: the mounted surface, the export state and the pending completion.
///
/// All the methods are meant to be called from the interactive thread. Capture, encoding and
/// writing run on a worker thread; the state only goes back to `Idle` when the completion is
/// handled by `poll_completion` or `wait_for_completion`.
#[derive(Debug)]
pub struct PreviewSession {
    surface: Option<RenderedSurface>,
    exporter: PdfExporter,
    author: Option<String>,
    state: ExportState,
    completion: Option<Receiver<ExportOutcome>>,
}

impl PreviewSession {
    pub fn new(exporter: PdfExporter) -> Self {
        PreviewSession {
            surface: None,
            exporter,
            author: None,
            state: ExportState::Idle,
            completion: None,
        }
    }

    /// Overrides the author written into the exported documents, which defaults to the CV name.
    pub fn with_author<S: Into<String>>(mut self, author: S) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Mounts the surface, replacing the previous one.
    pub fn mount(&mut self, surface: RenderedSurface) {
        self.surface = Some(surface);
    }

    pub fn unmount(&mut self) -> Option<RenderedSurface> {
        self.surface.take()
    }

    pub fn surface(&self) -> Option<&RenderedSurface> {
        self.surface.as_ref()
    }

    /// The mounted surface, for running its layout pass.
    pub fn surface_mut(&mut self) -> Option<&mut RenderedSurface> {
        self.surface.as_mut()
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Starts exporting the mounted surface.
    ///
    /// Fails with `ErrorKind::ExportInProgress` while a previous export has not been handled yet,
    /// and with `ErrorKind::InvalidSurfaceState` when the surface has not been laid out. In both
    /// cases the state is left as it was.
    pub fn trigger_export(&mut self) -> Result<Trigger, ContextError> {
        if self.state == ExportState::Exporting {
            return Err(ContextError::with_context(
                ErrorKind::ExportInProgress,
                "An export is already in progress",
            ));
        }
        let Some(surface) = &self.surface else {
            log::debug!("Ignoring the export request, no surface is mounted");
            return Ok(Trigger::Ignored);
        };
        let frame = match surface.shared_frame() {
            Some(frame) if surface.is_ready() => frame,
            _ => {
                return Err(ContextError::with_context(
                    ErrorKind::InvalidSurfaceState,
                    format!(
                        "Unable to export a surface of {}x{} pixels, it has not completed its layout pass",
                        surface.width(),
                        surface.height()
                    ),
                ))
            }
        };

        let typeface = surface.assets().typeface.clone();
        let metadata = export::document_metadata(surface.document(), self.author.as_deref());
        let exporter = self.exporter.clone();
        let (sender, receiver) = mpsc::channel::<ExportOutcome>();

        std::thread::Builder::new()
            .name("cv-export".into())
            .spawn(move || {
                let outcome = capture::capture_frame(&frame, &typeface);
                match outcome {
                    Ok(raster) => exporter.export_with_completion(&raster, &metadata, |outcome| {
                        // The session may be gone already, in which case nobody is waiting for the outcome
                        let _ = sender.send(outcome);
                    }),
                    Err(error) => {
                        log::error!("Failed to capture the surface: {}", error);
                        let _ = sender.send(Err(error));
                    }
                }
            })
            .map_err(|error| {
                ContextError::with_error(ErrorKind::Io, "Failed to start the export worker", &error)
            })?;

        log::debug!("Started exporting the {} template", surface.template());
        self.state = ExportState::Exporting;
        self.completion = Some(receiver);
        Ok(Trigger::Started)
    }

    /// Handles the completion of the running export if it has arrived, without blocking.
    pub fn poll_completion(&mut self) -> Option<Notification> {
        let receiver = self.completion.as_ref()?;
        let outcome = match receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(worker_vanished()),
        };
        Some(self.complete(outcome))
    }

    /// Blocks until the running export completes and handles it. Returns `None` if no export is running.
    pub fn wait_for_completion(&mut self) -> Option<Notification> {
        let receiver = self.completion.as_ref()?;
        let outcome = receiver.recv().unwrap_or_else(|_| Err(worker_vanished()));
        Some(self.complete(outcome))
    }

    fn complete(&mut self, outcome: ExportOutcome) -> Notification {
        self.completion = None;
        self.state = ExportState::Idle;

        let notification = Notification::from(outcome);
        match &notification {
            Notification::Exported(path) => log::debug!("Export completed: {:?}", path),
            Notification::Failed(reason) => log::debug!("Export failed: {}", reason),
        }
        notification
    }
}

fn worker_vanished() -> ContextError {
    ContextError::with_context(ErrorKind::Io, "The export worker stopped without reporting")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::CvDocument;
    use crate::render::{render, RenderAssets};
    use crate::surface::Viewport;
    use crate::template::Template;

    fn surface(viewport: Option<Viewport>) -> RenderedSurface {
        let document = CvDocument {
            full_name: "Jane Doe".into(),
            ..Default::default()
        };
        let mut surface = render(document, Template::Classic, RenderAssets::default());
        if let Some(viewport) = viewport {
            surface.layout(viewport);
        }
        surface
    }

    #[test]
    fn trigger_without_surface_is_ignored() {
        let output_directory = tempfile::tempdir().unwrap();
        let mut session = PreviewSession::new(PdfExporter::new(output_directory.path()));

        assert_eq!(session.trigger_export().unwrap(), Trigger::Ignored);
        assert_eq!(session.state(), ExportState::Idle);
        assert_eq!(session.poll_completion(), None);
        assert_eq!(session.wait_for_completion(), None);
    }

    #[test]
    fn trigger_before_layout_fails_fast() {
        let output_directory = tempfile::tempdir().unwrap();
        let mut session = PreviewSession::new(PdfExporter::new(output_directory.path()));
        session.mount(surface(None));

        let error = session.trigger_export().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidSurfaceState);
        assert_eq!(session.state(), ExportState::Idle);
        assert_eq!(std::fs::read_dir(output_directory.path()).unwrap().count(), 0);
    }

    #[test]
    fn export_round_trip_returns_to_idle() {
        let output_directory = tempfile::tempdir().unwrap();
        let mut session = PreviewSession::new(PdfExporter::new(output_directory.path()));
        session.mount(surface(Some(Viewport::new(360, 640))));

        assert_eq!(session.trigger_export().unwrap(), Trigger::Started);
        assert_eq!(session.state(), ExportState::Exporting);

        let notification = session.wait_for_completion().unwrap();
        assert_eq!(notification.message(), "Exported successfully!");
        assert_eq!(session.state(), ExportState::Idle);
        let Notification::Exported(path) = notification else {
            unreachable!()
        };
        assert!(path.starts_with(output_directory.path()));
    }

    #[test]
    fn second_trigger_is_rejected_while_exporting() {
        let output_directory = tempfile::tempdir().unwrap();
        let mut session = PreviewSession::new(PdfExporter::new(output_directory.path()));
        session.mount(surface(Some(Viewport::new(360, 640))));

        assert_eq!(session.trigger_export().unwrap(), Trigger::Started);
        let error = session.trigger_export().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ExportInProgress);
        assert_eq!(session.state(), ExportState::Exporting);

        assert!(session.wait_for_completion().unwrap().is_success());
        assert_eq!(session.trigger_export().unwrap(), Trigger::Started);
        assert!(session.wait_for_completion().unwrap().is_success());
        assert_eq!(std::fs::read_dir(output_directory.path()).unwrap().count(), 2);
    }

    #[test]
    fn failure_notification_carries_the_reason() {
        let notification = Notification::from(Err(ContextError::with_context(ErrorKind::Io, "Disk full")));
        assert_eq!(notification.message(), "Export failed: Disk full");
        assert!(!notification.is_success());
    }
}
