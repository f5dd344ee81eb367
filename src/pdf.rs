use image::RgbaImage;
use lopdf::{Object, StringFormat};
use std::{collections::BTreeMap, io::BufWriter, mem};
use time::OffsetDateTime;

use crate::error::{ContextError, ErrorKind};

/// A layer of a page: the content stream operations that paint it.
#[derive(Debug, Clone)]
pub struct PdfLayer {
    /// The name of the layer, only used for diagnostics.
    pub name: String,
    /// The operations that the layer is composed of.
    pub(super) operations: Vec<lopdf::content::Operation>,
}

impl TryFrom<PdfLayer> for lopdf::Stream {
    type Error = ContextError;

    fn try_from(value: PdfLayer) -> Result<Self, Self::Error> {
        use lopdf::{Dictionary, Stream};
        // Construct the stream content from the actual underlying operations of the layer
        let stream_content = lopdf::content::Content {
            operations: value.operations,
        };

        // Encode the uncompressed stream content into the stream
        let encoded_content = stream_content.encode().map_err(|error| {
            ContextError::with_error(
                ErrorKind::Pdf,
                format!("Failed to encode the content of the PDF layer {:?}", value.name),
                &error,
            )
        })?;
        Ok(Stream::new(Dictionary::new(), encoded_content))
    }
}

/// The low-level image representation for a PDF document: 8 bits per component RGB samples,
/// with the alpha channel split off into a soft mask when the image is not fully opaque.
#[derive(Debug, Clone)]
pub struct ImageXObject {
    /// Width of the image in samples (original width, not scaled width).
    pub width: u32,
    /// Height of the image in samples (original height, not scaled height).
    pub height: u32,
    /// Should the image be interpolated when scaled?
    pub interpolate: bool,
    /// The RGB samples of the image, row by row from the top.
    pub image_data: Vec<u8>,
    /// The alpha samples, if `None` the image is fully opaque. See page 444 of the adobe pdf 1.4 reference.
    pub soft_mask: Option<Vec<u8>>,
}

impl ImageXObject {
    /// Splits an RGBA buffer into RGB samples and, only if some pixel is not opaque, the alpha samples.
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let pixel_count = (image.width() * image.height()) as usize;
        let mut image_data = Vec::with_capacity(pixel_count * 3);
        let mut alpha_data = Vec::with_capacity(pixel_count);
        for pixel in image.pixels() {
            image_data.extend_from_slice(&pixel.0[..3]);
            alpha_data.push(pixel.0[3]);
        }
        let is_opaque = alpha_data.iter().all(|alpha| *alpha == u8::MAX);

        ImageXObject {
            width: image.width(),
            height: image.height(),
            interpolate: false,
            image_data,
            soft_mask: (!is_opaque).then_some(alpha_data),
        }
    }

    /// Inserts the image (and its soft mask) into the document, returning the reference to it.
    fn insert_into_document(self, inner_document: &mut lopdf::Document) -> lopdf::ObjectId {
        use lopdf::Object::*;

        let image_dictionary = |color_space: &str| {
            lopdf::Dictionary::from_iter(vec![
                ("Type", Name("XObject".into())),
                ("Subtype", Name("Image".into())),
                ("Width", Integer(i64::from(self.width))),
                ("Height", Integer(i64::from(self.height))),
                ("ColorSpace", Name(color_space.into())),
                ("BitsPerComponent", Integer(8)),
                ("Interpolate", Boolean(self.interpolate)),
            ])
        };

        let mut dictionary = image_dictionary("DeviceRGB");
        if let Some(soft_mask) = &self.soft_mask {
            let soft_mask_stream = lopdf::Stream::new(image_dictionary("DeviceGray"), soft_mask.clone());
            let soft_mask_id = inner_document.add_object(soft_mask_stream);
            dictionary.set("SMask", Reference(soft_mask_id));
        }

        inner_document.add_object(lopdf::Stream::new(dictionary, self.image_data))
    }
}

/// `XObject`s are parts of the PDF specification. They allow for complex behavior to be
/// inserted into the PDF document: this comprises bookmarks, annotations and even images.
/// This implementation is only partial as it allows only for images.
#[derive(Debug, Clone)]
pub enum XObject {
    /// The `XObject` interface for an image.
    Image(ImageXObject),
}

impl XObject {
    fn insert_into_document(self, inner_document: &mut lopdf::Document) -> lopdf::ObjectId {
        match self {
            XObject::Image(image) => image.insert_into_document(inner_document),
        }
    }
}

/// Named reference to an `XObject`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct XObjectReference(String);

impl XObjectReference {
    /// Creates a new reference for an `XObject` from a number.
    pub fn new(index: usize) -> Self {
        Self(format!("X{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The association between the `XObject`s names and the actual `XObject`s themselves.
#[derive(Default, Debug, Clone)]
pub struct XObjectMap(BTreeMap<String, XObject>);

impl XObjectMap {
    /// Adds an `XObject` to the map under the next free name, returning the reference to it.
    pub fn add(&mut self, object: XObject) -> XObjectReference {
        let reference = XObjectReference::new(self.0.len());
        self.0.insert(reference.0.clone(), object);

        reference
    }

    /// Inserts the `XObject`s into the document, simultaneously constructing a PDF dictionary of them.
    pub fn into_with_document(self, document: &mut lopdf::Document) -> lopdf::Dictionary {
        self.0
            .into_iter()
            .map(|(name, object)| {
                // Add each `XObject` to the document, then collect its name and the reference to it
                let object_id = object.insert_into_document(document);
                (name, lopdf::Object::Reference(object_id))
            })
            .collect()
    }
}

/// Struct for storing the PDF Resources, to be used on a PDF page.
#[derive(Default, Debug, Clone)]
pub(crate) struct PdfResources {
    /// External graphics objects.
    pub xobjects: XObjectMap,
}

impl PdfResources {
    /// Inserts the resources into the document, simultaneously constructing a PDF dictionary of them.
    pub(crate) fn into_with_document(self, inner_document: &mut lopdf::Document) -> lopdf::Dictionary {
        let mut dictionary = lopdf::Dictionary::new();

        let xobjects_dictionary = self.xobjects.into_with_document(inner_document);
        // If the `XObjects` dictionary isn't empty, set the associated PDF key to the appropriated value
        if !xobjects_dictionary.is_empty() {
            dictionary.set("XObject", lopdf::Object::Dictionary(xobjects_dictionary));
        }

        dictionary
    }
}

/// The representation of a PDF page. Utility functions are implemented for this struct
/// so that its content can be inserted into the underlying PDF document.
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// The index of the page in the document, starting from 1.
    pub(crate) number: usize,
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    /// Page layers.
    pub layers: Vec<PdfLayer>,
    /// Resources used in this page.
    pub(crate) resources: PdfResources,
}

/// The largest side of a page in user space units that viewers are required to handle.
const MAXIMUM_PAGE_SIDE: f32 = 14_400.0;

impl PdfPage {
    /// The size of a user space unit of the page in points. It is 1 unless a side of the page is
    /// longer than `MAXIMUM_PAGE_SIDE`, then the page is described in larger units and keeps its size.
    pub fn user_unit(&self) -> f32 {
        let ratio = self.width.max(self.height) / MAXIMUM_PAGE_SIDE;
        if ratio <= 1.0 {
            1.0
        } else {
            (ratio * 1000.0).ceil() / 1000.0
        }
    }

    /// Consumes the page, inserting its resources into the document. Returns the dictionary of the
    /// resources and the streams of the layers, each wrapped in its own graphics state block.
    pub(crate) fn into_resources_and_streams(
        self,
        inner_document: &mut lopdf::Document,
    ) -> Result<(lopdf::Dictionary, Vec<lopdf::Stream>), ContextError> {
        use lopdf::content::Operation;
        use lopdf::Object::*;

        let user_unit = self.user_unit();
        let resource_dictionary = self.resources.into_with_document(inner_document);
        let mut layer_streams = Vec::<lopdf::Stream>::new();

        for mut layer in self.layers {
            // Layers are drawn in points, so they are scaled down when the page uses larger units
            if user_unit > 1.0 {
                let scale = 1.0 / user_unit;
                layer.operations.insert(
                    0,
                    Operation::new("cm", vec![Real(scale), Integer(0), Integer(0), Real(scale), Integer(0), Integer(0)]),
                );
            }
            // In the PDF specification the q/Q operator is an operator which creates an isolated graphics state block
            layer.operations.insert(0, Operation::new("q", vec![]));
            layer.operations.push(Operation::new("Q", vec![]));

            layer_streams.push(lopdf::Stream::try_from(layer)?);
        }

        Ok((resource_dictionary, layer_streams))
    }
}

/// Where an image is drawn on a page, in points, with the origin at the bottom left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// The entries of the document information dictionary.
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub creator: String,
    pub producer: String,
    pub creation_date: OffsetDateTime,
}

impl Default for PdfMetadata {
    fn default() -> Self {
        PdfMetadata {
            title: "Curriculum Vitae".into(),
            author: String::new(),
            subject: "Curriculum Vitae".into(),
            creator: env!("CARGO_PKG_NAME").into(),
            producer: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            creation_date: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// This struct represents the actual PDF document on a high-level. It is an interface to the actual underlying
/// `lopdf::document` with the addition of the PDF pages and the document ID.
///
/// Various convenience functions are exposed for this struct, such as `add_page_with_layer`, `add_image`,
/// `draw_image_to_layer_in_page`, `save_to_bytes`, which make the creation of a PDF document very much simplified.
pub struct PdfDocument {
    /// The underlying PDF document: this is a low-level interface and shouldn't be directly interacted with
    /// unless strictly necessary, anyway this is why it is exposed to the user.
    pub inner_document: lopdf::Document,
    /// The identifier of the document, it is used to in order to set the PDF `ID` tag.
    pub identifier: String,
    /// The pages of the PDF document.
    pub(crate) pages: Vec<PdfPage>,
}

impl PdfDocument {
    /// Create a new `PdfDocument` by defaulting the underlying PDF document to version 1.5
    /// of the PDF specification and customly specifying the PDF identifier.
    ///
    /// # Arguments
    ///
    /// * `pdf_document_identifier` - The identifier to be given to the PDF document.
    pub fn new(pdf_document_identifier: String) -> Self {
        PdfDocument {
            inner_document: lopdf::Document::with_version("1.5"),
            identifier: pdf_document_identifier,
            pages: Vec::new(),
        }
    }

    /// Adds a page of given width and height in points with an empty layer for contents to be added to.
    /// The function returns the index of the page and of the layer in the page, these are to be passed
    /// to the other functions when calling them, such as to `draw_image_to_layer_in_page`.
    ///
    /// # Arguments
    ///
    /// * `page_width` - The width of the PDF page to be created as expressed in points.
    /// * `page_height` - The height of the PDF page to be created as expressed in points.
    pub fn add_page_with_layer(&mut self, page_width: f32, page_height: f32) -> (usize, usize) {
        let pdf_page = PdfPage {
            number: self.pages.len() + 1,
            width: page_width,
            height: page_height,
            layers: vec![PdfLayer {
                name: "Layer0".into(),
                operations: Vec::new(),
            }],
            resources: PdfResources::default(),
        };
        self.pages.push(pdf_page);

        (self.pages.len() - 1, 0)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Registers the image as a resource of the given page, returning the name it can be drawn with.
    pub fn add_image(
        &mut self,
        page_index: usize,
        image: ImageXObject,
    ) -> Result<XObjectReference, ContextError> {
        let pdf_page = self.get_mut_page(page_index)?;
        Ok(pdf_page.resources.xobjects.add(XObject::Image(image)))
    }

    /// Draws an image previously added to the page, scaled into the given placement.
    pub fn draw_image_to_layer_in_page(
        &mut self,
        layer_index: usize,
        page_index: usize,
        image_reference: &XObjectReference,
        placement: ImagePlacement,
    ) -> Result<(), ContextError> {
        use lopdf::content::Operation;
        use lopdf::Object::*;

        let operations = vec![
            Operation::new("q", vec![]),
            // The image space is the unit square, so the transformation matrix scales it to the placement
            Operation::new(
                "cm",
                vec![
                    Real(placement.width),
                    Integer(0),
                    Integer(0),
                    Real(placement.height),
                    Real(placement.x),
                    Real(placement.y),
                ],
            ),
            Operation::new("Do", vec![Name(image_reference.as_str().into())]),
            Operation::new("Q", vec![]),
        ];
        self.add_operations_to_layer_in_page(layer_index, page_index, operations)
    }

    /// Write the pages so far specified to the underlying document and finalize it.
    ///
    /// # Disclaimer
    ///
    /// One mandatory argument needed by the PDF specification is the instance ID, which needs to be a
    /// 32 characters-long string. The pages are consumed by this function, so it can only be called once.
    pub fn write_all(&mut self, instance_id: String, metadata: &PdfMetadata) -> Result<(), ContextError> {
        use lopdf::Object::*;

        if self.pages.is_empty() {
            return Err(ContextError::with_context(
                ErrorKind::Pdf,
                "Unable to write a PDF document without pages",
            ));
        }

        // Construct all the general info that the PDF document needs and insert it into the PDF document itself
        let timestamp = to_pdf_timestamp_format(&metadata.creation_date);
        let document_info = lopdf::Dictionary::from_iter(vec![
            ("Trapped", Name("False".into())),
            ("CreationDate", String(timestamp.clone().into_bytes(), StringFormat::Literal)),
            ("ModDate", String(timestamp.into_bytes(), StringFormat::Literal)),
            ("Title", text_string(&metadata.title)),
            ("Author", text_string(&metadata.author)),
            ("Subject", text_string(&metadata.subject)),
            ("Creator", text_string(&metadata.creator)),
            ("Producer", text_string(&metadata.producer)),
            ("Identifier", text_string(&self.identifier)),
        ]);
        let document_info_id = self.inner_document.add_object(Dictionary(document_info));

        // Construct the catalog, required by the PDF specification
        let pages_id = self.inner_document.new_object_id();
        let catalog = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("Catalog".into())),
            ("PageLayout", Name("OneColumn".into())),
            ("PageMode", Name("UseNone".into())),
            ("Pages", Reference(pages_id)),
        ]);
        let catalog_id = self.inner_document.add_object(catalog);

        self.inner_document.trailer.set("Root", Reference(catalog_id));
        self.inner_document.trailer.set("Info", Reference(document_info_id));
        self.inner_document.trailer.set(
            "ID",
            Array(vec![
                String(self.identifier.clone().into_bytes(), StringFormat::Literal),
                String(instance_id.into_bytes(), StringFormat::Literal),
            ]),
        );

        let mut page_ids = Vec::<lopdf::Object>::new();
        for page in mem::take(&mut self.pages) {
            let user_unit = page.user_unit();
            let media_box: lopdf::Object = vec![
                0.into(),
                0.into(),
                (page.width / user_unit).into(),
                (page.height / user_unit).into(),
            ]
            .into();
            let mut page_dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", Name("Page".into())),
                ("Rotate", Integer(0)),
                ("MediaBox", media_box.clone()),
                ("TrimBox", media_box.clone()),
                ("CropBox", media_box),
                ("Parent", Reference(pages_id)),
            ]);
            if user_unit > 1.0 {
                // `UserUnit` was introduced with version 1.6 of the PDF specification
                log::warn!(
                    "The page of {}x{} points is too large for the default user space, using units of {} points",
                    page.width,
                    page.height,
                    user_unit
                );
                page_dictionary.set("UserUnit", Real(user_unit));
                self.inner_document.version = "1.6".into();
            }

            let page_number = page.number;
            let (resource_dictionary, layer_streams) =
                page.into_resources_and_streams(&mut self.inner_document)?;
            let resources_id = self.inner_document.add_object(Dictionary(resource_dictionary));
            page_dictionary.set("Resources", Reference(resources_id));

            // Merge all streams of the individual layers into one unified stream
            let mut merged_layer_streams = Vec::<u8>::new();
            for mut stream in layer_streams {
                merged_layer_streams.append(&mut stream.content);
            }
            let merged_layer_stream = lopdf::Stream::new(lopdf::Dictionary::new(), merged_layer_streams);
            let page_content_id = self.inner_document.add_object(merged_layer_stream);
            page_dictionary.set("Contents", Reference(page_content_id));

            let page_id = self.inner_document.add_object(page_dictionary);
            log::debug!("Wrote page {} as object {:?}", page_number, page_id);
            page_ids.push(Reference(page_id));
        }

        // Use all the collected page references in order to set the "Kids" field, then insert the pages dictionary
        let pages = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("Pages".into())),
            ("Count", Integer(page_ids.len() as i64)),
            ("Kids", Array(page_ids)),
        ]);
        self.inner_document.objects.insert(pages_id, Dictionary(pages));

        Ok(())
    }

    /// Optimize the PDF document (only superficially).
    pub fn optimize(&mut self) {
        self.inner_document.prune_objects();
        self.inner_document.delete_zero_length_streams();
        self.inner_document.renumber_objects();
        self.inner_document.compress();
    }

    /// Save the `PdfDocument` to bytes in order for it to be written to a file or further processed.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        let mut pdf_document_bytes = Vec::new();
        let mut writer = BufWriter::new(&mut pdf_document_bytes);
        self.inner_document.save_to(&mut writer).map_err(|error| {
            ContextError::with_error(ErrorKind::Pdf, "Error while saving the PDF document to bytes", &error)
        })?;
        mem::drop(writer);

        Ok(pdf_document_bytes)
    }

    /// This function is responsible for adding the given operations to the specified layer and page.
    fn add_operations_to_layer_in_page(
        &mut self,
        layer_index: usize,
        page_index: usize,
        operations: Vec<lopdf::content::Operation>,
    ) -> Result<(), ContextError> {
        let pdf_page = self.get_mut_page(page_index)?;
        let pdf_layer = pdf_page
            .layers
            .get_mut(layer_index)
            .ok_or(ContextError::with_context(
                ErrorKind::Pdf,
                format!("Failed to find the layer with index {}", layer_index),
            ))?;
        pdf_layer.operations.extend(operations);

        Ok(())
    }

    // Retrieve the page with the given index.
    fn get_mut_page(&mut self, page_index: usize) -> Result<&mut PdfPage, ContextError> {
        self.pages.get_mut(page_index).ok_or(ContextError::with_context(
            ErrorKind::Pdf,
            format!("Failed to find the page with index {}", page_index),
        ))
    }
}

/// Encodes a text string of the information dictionary: ASCII is kept literal, anything else is
/// written as UTF-16BE with a byte order mark.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut encoded_text = vec![0xfe, 0xff];
    for code_unit in text.encode_utf16() {
        encoded_text.extend_from_slice(&code_unit.to_be_bytes());
    }
    Object::String(encoded_text, StringFormat::Hexadecimal)
}

/// Formats the given time so that it matches what the PDF specification expects.
/// An example of it is the following: D:20170505150224+02'00'.
pub(crate) fn to_pdf_timestamp_format(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}
