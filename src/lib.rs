//! Vitae renders curriculum vitae data into one of a small set of fixed templates and exports
//! what the preview shows as a single-page PDF document.
//!
//! The pipeline is Render → Capture → Export: `render::render` turns a `CvDocument` into a
//! `RenderedSurface`, whose layout pass gives it a size; `capture::capture` copies the laid-out
//! surface into a `RasterImage`; `export::PdfExporter` writes the raster as the only page of a PDF
//! document. The `preview::PreviewSession` drives the last two steps on a worker thread and turns
//! their outcome into a notification for the user.

/// The CV data: personal information, skills and the education, experience and training lists.
///
/// A `CvDocument` can be read from a JSON snapshot or resolved from the `cvdata` subtree of the
/// document store, whose layout is what `CvDocument::from_tree` and `CvDocument::to_tree` speak.
pub mod cv;

/// This module contains the `ContextError` type which is the error type used throughout this library.
///
/// Every error carries an `ErrorKind`, so that callers can tell a surface that has not been laid out
/// from a failed write, a context describing what was being done and, if the error was propagated
/// from another library, the message of that error.
pub mod error;

/// The fixed templates, with their colours and geometry.
pub mod template;

/// Measuring, wrapping and rasterizing text.
pub mod typeface;

/// The `RenderedSurface`: a CV rendered with a template, its layout pass and its readiness.
pub mod surface;

/// The layout of the templates into the display list of a surface.
pub mod render;

/// Copying a laid-out surface into a `RasterImage`.
pub mod capture;

/// The module were the `PdfDocument` interface for working with PDF documents is presented.
///
/// # Disclaimer
///
/// This work was partially adapted from the one of [fschutt](https://github.com/fschutt) for the crate [printpdf](https://github.com/fschutt/printpdf).
/// It only covers what the export needs: pages whose content is made of images drawn at a given
/// placement, the document information dictionary and the trailer identifiers.
///
/// # Introduction
///
/// The main component of this module is the struct `PdfDocument`, with the convenience functions
/// `add_page_with_layer`, `add_image`, `draw_image_to_layer_in_page`, `write_all` and `save_to_bytes`.
pub mod pdf;

/// Writing a `RasterImage` as a single-page PDF file and reporting the outcome.
pub mod export;

/// The `PreviewSession`, which owns the export state and runs the exports in the background.
pub mod preview;

/// The document store, the blob store for profile photos and the identity of the signed-in user,
/// each a trait with a local implementation backed by the filesystem.
pub mod store;

/// The settings of the command line front-end.
pub mod configuration;
