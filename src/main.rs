use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vitae::configuration::Configuration;
use vitae::cv::CvDocument;
use vitae::error::{ContextError, ErrorKind};
use vitae::export::PdfExporter;
use vitae::preview::PreviewSession;
use vitae::render::{render, RenderAssets};
use vitae::store::{self, BlobStore, CvStore as _, DirectoryBlobStore, JsonTreeStore, StaticIdentity};
use vitae::surface::Viewport;
use vitae::template::Template;

#[derive(Parser, Debug)]
#[command(version, long_about = None)]
struct CliArguments {
    #[arg(short = 'c', long = "config", value_name = "json_file", help = "Path to the configuration file")]
    configuration_path: Option<PathBuf>,
    #[arg(short = 'v', long = "verbose", help = "Log every step of the pipeline")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a CV with a template and export it as a single-page PDF
    Export {
        #[arg(long = "cv", value_name = "json_file", help = "CV snapshot (the cvdata subtree)", conflicts_with = "store_path")]
        cv_path: Option<PathBuf>,
        #[arg(long = "store", value_name = "json_file", help = "Document store to read the CV from", requires = "user_id")]
        store_path: Option<PathBuf>,
        #[arg(long = "user", value_name = "user_id", help = "User whose CV is read from the store")]
        user_id: Option<String>,
        #[arg(short = 't', long = "template", value_enum)]
        template: Option<Template>,
        #[arg(long = "photo", value_name = "image_file", help = "PNG or JPEG profile photo")]
        photo_path: Option<PathBuf>,
        #[arg(long = "blobs", value_name = "directory", help = "Blob store the photo of the CV is fetched from")]
        blob_directory: Option<PathBuf>,
        #[arg(short = 'o', long = "output-dir", value_name = "directory")]
        output_directory: Option<PathBuf>,
        #[arg(long = "width", help = "Width of the viewport in pixels")]
        viewport_width: Option<u32>,
        #[arg(long = "height", help = "Minimum height of the viewport in pixels")]
        viewport_height: Option<u32>,
    },
    /// Upload a profile photo for a user and record it in their CV
    UploadPhoto {
        #[arg(long = "store", value_name = "json_file")]
        store_path: PathBuf,
        #[arg(long = "blobs", value_name = "directory")]
        blob_directory: PathBuf,
        #[arg(long = "user", value_name = "user_id")]
        user_id: Option<String>,
        #[arg(long = "photo", value_name = "image_file")]
        photo_path: PathBuf,
    },
}

fn main() {
    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

fn fallible_main() -> Result<(), ContextError> {
    let arguments = CliArguments::parse();
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if arguments.verbose {
        logger.filter_level(log::LevelFilter::Trace);
    }
    logger.init();
    log::debug!("{:?}", arguments);

    let configuration = match &arguments.configuration_path {
        Some(configuration_path) => Configuration::from_path(configuration_path)?,
        None => Configuration::default(),
    };

    match arguments.command {
        Command::Export {
            cv_path,
            store_path,
            user_id,
            template,
            photo_path,
            blob_directory,
            output_directory,
            viewport_width,
            viewport_height,
        } => {
            let configuration = Configuration {
                template: template.unwrap_or(configuration.template),
                output_directory: output_directory.unwrap_or(configuration.output_directory),
                viewport_width: viewport_width.unwrap_or(configuration.viewport_width),
                viewport_height: viewport_height.unwrap_or(configuration.viewport_height),
                ..configuration
            };
            let document = match (cv_path, store_path, user_id) {
                (Some(cv_path), _, _) => CvDocument::from_path(&cv_path)?,
                (None, Some(store_path), Some(user_id)) => JsonTreeStore::new(store_path).fetch_cv(&user_id)?,
                _ => {
                    return Err(ContextError::with_context(
                        ErrorKind::Configuration,
                        "Either a CV snapshot (--cv) or a store and a user (--store, --user) are needed",
                    ))
                }
            };
            let blob_store = blob_directory.map(DirectoryBlobStore::new);
            let assets = match photo_path {
                Some(photo_path) => configuration.render_assets()?.with_photo_path(&photo_path)?,
                None => stored_photo(
                    &document,
                    blob_store.as_ref().map(|blob_store| blob_store as &dyn BlobStore),
                    configuration.render_assets()?,
                ),
            };
            export(&configuration, document, assets)
        }
        Command::UploadPhoto {
            store_path,
            blob_directory,
            user_id,
            photo_path,
        } => {
            let photo_bytes = std::fs::read(&photo_path).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Io,
                    format!("Failed to read the photo {:?}", photo_path),
                    &error,
                )
            })?;
            let extension = photo_path
                .extension()
                .and_then(|extension| extension.to_str())
                .unwrap_or("jpg")
                .to_lowercase();
            let identity = user_id.map_or(StaticIdentity::signed_out(), StaticIdentity::signed_in);
            let photo_url = store::upload_profile_photo(
                &identity,
                &JsonTreeStore::new(store_path),
                &DirectoryBlobStore::new(blob_directory),
                &photo_bytes,
                &extension,
            )?;
            println!("{}", photo_url);
            Ok(())
        }
    }
}

fn export(configuration: &Configuration, document: CvDocument, assets: RenderAssets) -> Result<(), ContextError> {
    let exporter = PdfExporter::new(&configuration.output_directory).with_file_naming(configuration.file_naming.clone());
    let mut session = PreviewSession::new(exporter);
    if let Some(author) = &configuration.author {
        session = session.with_author(author.clone());
    }

    let mut surface = render(document, configuration.template, assets);
    surface.layout(Viewport::new(configuration.viewport_width, configuration.viewport_height));
    session.mount(surface);

    session.trigger_export()?;
    if let Some(notification) = session.wait_for_completion() {
        println!("{}", notification);
        if !notification.is_success() {
            return Err(ContextError::with_context(ErrorKind::Io, notification.message()));
        }
    }

    Ok(())
}

/// The photo the CV refers to, if it can be fetched from the blob store and decoded. The
/// placeholder figure is painted otherwise.
fn stored_photo(document: &CvDocument, blob_store: Option<&dyn BlobStore>, assets: RenderAssets) -> RenderAssets {
    if document.photo_url.trim().is_empty() {
        return assets;
    }
    let Some(blob_store) = blob_store else {
        log::warn!("The CV has a profile photo but no blob store was given (--blobs), using the placeholder");
        return assets;
    };
    let photo_bytes = match blob_store.fetch(&document.photo_url) {
        Ok(photo_bytes) => photo_bytes,
        Err(error) => {
            log::warn!("Unable to fetch the profile photo, using the placeholder: {}", error);
            return assets;
        }
    };
    match assets.clone().with_photo_bytes(&photo_bytes) {
        Ok(assets) => assets,
        Err(error) => {
            log::warn!("Unable to decode the profile photo, using the placeholder: {}", error);
            assets
        }
    }
}
