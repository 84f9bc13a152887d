use lopdf::{Object, StringFormat};
use owned_ttf_parser::{AsFaceRef as _, Face, OwnedFace};
use std::{
    collections::{BTreeMap, HashMap},
    io::BufWriter,
    mem,
    path::Path,
    sync::Arc,
};
use time::OffsetDateTime;
use unicode_normalization::UnicodeNormalization as _;

use crate::error::ContextError;

/// The (insofar) relevant vertical metrics of a font.
#[derive(Clone, Copy, Debug, Default)]
struct FontMetrics {
    /// The ascent of the font.
    pub ascent: i16,
    /// The descent of the font.
    pub descent: i16,
    /// The number of units per em of the font.
    pub units_per_em: u16,
}

/// The (insofar) relevant metrics associated to a single glyph of a font.
#[derive(Clone, Copy, Debug, Default)]
struct GlyphMetrics {
    /// The width of the glyph.
    pub width: u32,
    /// The height of the glyph.
    pub height: u32,
}

/// A font face loaded from a TTF font, together with its measure of units per em.
#[derive(Debug)]
struct TtfFontFace {
    /// The underlying font face which is represented through the `ttf_parser` crate.
    inner: OwnedFace,
    /// The number of units per em of the font face.
    units_per_em: u16,
}

impl TtfFontFace {
    /// Retrieve the font metrics from the associated font face.
    fn font_metrics(&self) -> FontMetrics {
        FontMetrics {
            ascent: self.face().ascender(),
            descent: self.face().descender(),
            units_per_em: self.units_per_em,
        }
    }

    /// Retrieve the glyph ID of a specific codepoint, the glyph 0 being the one for missing characters.
    fn glyph_id(&self, codepoint: char) -> Option<u16> {
        self.face()
            .glyph_index(codepoint)
            .map(|glyph_id| glyph_id.0)
            .filter(|glyph_id| *glyph_id > 0)
    }

    /// Retrieve the mapping between the glyph IDs and the characters (codepoints), that specifically
    /// contains exactly the number of unicode glyphs present in the font.
    fn glyph_ids(&self) -> HashMap<u16, char> {
        // Retrieve all the unicode subtables of the font face
        let font_subtables = self.face().tables().cmap.map(|cmap| {
            cmap.subtables
                .into_iter()
                .filter(|font_subtable| font_subtable.is_unicode())
        });
        let Some(font_subtables) = font_subtables else {
            return HashMap::new();
        };

        let mut gid_to_codepoint_map =
            HashMap::with_capacity(self.face().number_of_glyphs().into());
        for font_subtable in font_subtables {
            font_subtable.codepoints(|codepoint| {
                if let Ok(character) = char::try_from(codepoint) {
                    // Only the glyphs with a positive index are actual glyphs
                    if let Some(glyph_index) = font_subtable
                        .glyph_index(codepoint)
                        .filter(|index| index.0 > 0)
                    {
                        gid_to_codepoint_map
                            .entry(glyph_index.0)
                            .or_insert(character);
                    }
                }
            })
        }

        gid_to_codepoint_map
    }

    /// Retrieve the total number of glyphs present in the font face.
    fn glyph_count(&self) -> u16 {
        self.face().number_of_glyphs()
    }

    /// Attempt to calculate the metrics of a glyph from the associated glyph ID, taken as input.
    fn glyph_metrics(&self, glyph_id: u16) -> Option<GlyphMetrics> {
        let glyph_id = owned_ttf_parser::GlyphId(glyph_id);

        let width = self.face().glyph_hor_advance(glyph_id)? as u32;
        // The height of the glyph is corrected by employing the descender vertical metric
        // of the font face (this is supposedly valid only for horizontally-laid fonts).
        let height = self
            .face()
            .glyph_bounding_box(glyph_id)
            .map(|bounding_box| {
                i32::from(bounding_box.y_max) - i32::from(bounding_box.y_min)
                    - i32::from(self.face().descender())
            })
            // Glyphs without outlines, such as the space, get the height of the em square
            .unwrap_or(i32::from(self.units_per_em)) as u32;

        Some(GlyphMetrics { width, height })
    }

    /// Constructs a font face from the underlying raw data extracted from the TTF font file.
    fn from_vec(data: Vec<u8>) -> Result<Self, ContextError> {
        let face = OwnedFace::from_vec(data, 0)
            .map_err(|error| ContextError::with_error("Failed to parse font", &error))?;
        let units_per_em = face.as_face_ref().units_per_em();

        Ok(Self {
            inner: face,
            units_per_em,
        })
    }

    /// Retrieve the underlying font face as a reference.
    fn face(&self) -> &Face<'_> {
        self.inner.as_face_ref()
    }
}

/// A font loaded from a TTF font, together with the byte data it was loaded from.
///
/// A `Font` is never mutated once loaded, so it can be shared between any number of
/// documents being rendered concurrently by wrapping it into an `Arc`.
#[derive(Debug)]
pub struct Font {
    /// The byte data the font was loaded from.
    bytes: Vec<u8>,
    /// The actual font face, together with its measure of units per em.
    ttf_face: TtfFontFace,
}

impl Font {
    /// Loads a TTF font, or an OTF font which is just a wrapper around a TTF font, from the given path.
    pub fn from_path(font_path: &Path) -> Result<Font, ContextError> {
        let font_bytes = std::fs::read(font_path).map_err(|error| {
            ContextError::with_error(format!("Failed to read the font {:?}", font_path), &error)
        })?;

        Font::from_bytes(font_bytes)
    }

    /// Parses a font from the raw bytes of a TTF/OTF file.
    pub fn from_bytes(font_bytes: Vec<u8>) -> Result<Font, ContextError> {
        let ttf_face = TtfFontFace::from_vec(font_bytes.clone())?;

        Ok(Font {
            bytes: font_bytes,
            ttf_face,
        })
    }

    /// Whether the font has a glyph for the given character.
    pub fn has_glyph(&self, character: char) -> bool {
        self.ttf_face.glyph_id(character).is_some()
    }

    /// Returns the first character of the (NFC normalized) text which the font can't draw.
    pub fn first_missing_character(&self, text: &str) -> Option<char> {
        text.nfc().find(|character| !self.has_glyph(*character))
    }

    /// The width in millimeters of the given text when written with the given font size (in points).
    /// Characters without a glyph don't contribute to the width.
    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let advance_units: u32 = text
            .nfc()
            .filter_map(|character| self.ttf_face.glyph_id(character))
            .filter_map(|glyph_id| self.ttf_face.glyph_metrics(glyph_id))
            .map(|glyph_metrics| glyph_metrics.width)
            .sum();

        points_to_millimeters(advance_units as f32 * font_size / self.ttf_face.units_per_em as f32)
    }

    /// Takes a well-formed font and inserts it into the PDF document under the given face
    /// identifier, returning the associated PDF dictionary.
    fn insert_into_document(
        &self,
        face_identifier: &str,
        inner_document: &mut lopdf::Document,
    ) -> lopdf::Dictionary {
        use lopdf::Object::*;
        let face_metrics = self.ttf_face.font_metrics();

        // The length in bytes of the font data is requested by the PDF specification
        // because the PDF format mixes text and byte data
        let font_stream = lopdf::Stream::new(
            lopdf::Dictionary::from_iter(vec![("Length1", Integer(self.bytes.len() as i64))]),
            self.bytes.clone(),
        )
        .with_compression(false);

        let mut font_vector: Vec<(::std::string::String, lopdf::Object)> = vec![
            ("Type".into(), Name("Font".into())),
            ("Subtype".into(), Name("Type0".into())),
            ("BaseFont".into(), Name(face_identifier.as_bytes().to_vec())),
            // `Identity-H` is used for horizontal writing, while `Identity-V` for vertical writing
            ("Encoding".into(), Name("Identity-H".into())),
            // `DescendantFonts` and `ToUnicode` are inserted once they are computed
        ];

        let mut font_descriptor_vector: Vec<(::std::string::String, lopdf::Object)> = vec![
            ("Type".into(), Name("FontDescriptor".into())),
            ("FontName".into(), Name(face_identifier.as_bytes().to_vec())),
            ("Ascent".into(), Integer(i64::from(face_metrics.ascent))),
            ("Descent".into(), Integer(i64::from(face_metrics.descent))),
            ("CapHeight".into(), Integer(i64::from(face_metrics.ascent))),
            ("ItalicAngle".into(), Integer(0)),
            // Symbolic font: the glyphs are addressed by their IDs and not by a standard encoding
            ("Flags".into(), Integer(4)),
            // 80 is the usual approximation of `StemV` when it can't be derived from the font
            ("StemV".into(), Integer(80)),
        ];

        let mut maximum_character_height = 0;
        let mut total_width = 0;

        // Association between glyph IDs and pairs of Unicode codepoints and character widths
        let mut gid_to_glyph_properties_map = BTreeMap::<u32, (u32, u32)>::new();
        for (glyph_id, character) in self.ttf_face.glyph_ids() {
            if let Some(glyph_metrics) = self.ttf_face.glyph_metrics(glyph_id) {
                maximum_character_height = maximum_character_height.max(glyph_metrics.height);
                total_width += glyph_metrics.width;
                gid_to_glyph_properties_map
                    .insert(glyph_id as u32, (character as u32, glyph_metrics.width));
            }
        }

        // Glyph IDs have to be in segments where the first byte of the first and last element
        // are the same: a range from 0x1000 to 0x10FF is valid, one from 0x1000 to 0x12FF is not.
        // A single `beginbfchar` block holds at most 100 entries.
        let mut current_first_byte: u32 = 0;
        let mut all_gid_to_character_blocks = Vec::new();
        let mut current_gid_to_character_block = Vec::new();
        for (glyph_id, (character, _glyph_width)) in gid_to_glyph_properties_map.iter() {
            if (*glyph_id >> 8) != current_first_byte || current_gid_to_character_block.len() >= 100
            {
                all_gid_to_character_blocks.push(mem::take(&mut current_gid_to_character_block));
                current_first_byte = *glyph_id >> 8;
            }
            current_gid_to_character_block.push((*glyph_id, *character));
        }
        all_gid_to_character_blocks.push(current_gid_to_character_block);

        let cid_to_unicode_map =
            generate_cid_to_unicode_map(face_identifier, all_gid_to_character_blocks);
        let cid_to_unicode_map_stream = lopdf::Stream::new(
            lopdf::Dictionary::new(),
            cid_to_unicode_map.as_bytes().to_vec(),
        );
        let cid_to_unicode_map_stream_id = inner_document.add_object(cid_to_unicode_map_stream);

        // Encode the widths so that they fit into what PDF expects (see page 439 in the PDF 1.7 reference):
        // `20 [21 99 34]` means that the glyph 20 is 21 units wide, the glyph 21 is 99 units wide and so on
        let mut width_objects = Vec::<Object>::new();
        let mut current_lesser_glyph_id = 0;
        let mut current_upper_glyph_id = 0;
        let mut current_widths_vector = Vec::<Object>::new();

        // PDF glyph widths are expressed in thousandths of the em square
        let percentage_font_scaling = 1000.0 / (face_metrics.units_per_em as f32);

        for glyph_id in 0..self.ttf_face.glyph_count() {
            let Some(GlyphMetrics { width, .. }) = self.ttf_face.glyph_metrics(glyph_id) else {
                log::warn!(
                    "Glyph ID {} has no width, skipping it when embedding the font {:?}",
                    glyph_id,
                    face_identifier
                );
                continue;
            };
            let scaled_width = Integer((width as f32 * percentage_font_scaling) as i64);
            if glyph_id == current_upper_glyph_id {
                current_widths_vector.push(scaled_width);
                current_upper_glyph_id += 1;
            } else {
                width_objects.push(Integer(current_lesser_glyph_id as i64));
                width_objects.push(Array(mem::take(&mut current_widths_vector)));

                current_widths_vector.push(scaled_width);
                current_lesser_glyph_id = glyph_id;
                current_upper_glyph_id = glyph_id + 1;
            }
        }
        // The loop is delayed by one iteration, the last run of widths is still pending
        width_objects.push(Integer(current_lesser_glyph_id as i64));
        width_objects.push(Array(mem::take(&mut current_widths_vector)));

        let mut font_descriptors = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("Font".into())),
            ("Subtype", Name("CIDFontType2".into())),
            ("BaseFont", Name(face_identifier.as_bytes().to_vec())),
            (
                "CIDSystemInfo",
                Dictionary(lopdf::Dictionary::from_iter(vec![
                    ("Registry", String("Adobe".into(), StringFormat::Literal)),
                    ("Ordering", String("Identity".into(), StringFormat::Literal)),
                    ("Supplement", Integer(0)),
                ])),
            ),
            ("W", Array(width_objects)),
            ("DW", Integer(1000)),
        ]);

        let font_bounding_box = vec![
            Integer(0),
            Integer(i64::from(face_metrics.descent)),
            Integer(total_width as i64),
            Integer(maximum_character_height as i64),
        ];
        font_descriptor_vector.push((
            "FontFile2".into(),
            Reference(inner_document.add_object(font_stream)),
        ));
        // Technically optional, but Adobe Reader needs it
        font_descriptor_vector.push(("FontBBox".into(), Array(font_bounding_box)));

        let font_descriptor_vector_id =
            inner_document.add_object(lopdf::Dictionary::from_iter(font_descriptor_vector));
        font_descriptors.set("FontDescriptor", Reference(font_descriptor_vector_id));

        font_vector.push((
            "DescendantFonts".into(),
            Array(vec![Dictionary(font_descriptors)]),
        ));
        font_vector.push(("ToUnicode".into(), Reference(cid_to_unicode_map_stream_id)));

        lopdf::Dictionary::from_iter(font_vector)
    }
}

/// The representation of a PDF page: its size in points and the operations of its content stream.
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    /// The operations drawing the contents of the page.
    pub(crate) operations: Vec<lopdf::content::Operation>,
}

impl PdfPage {
    /// Encodes the operations of the page into a content stream, isolated in its own graphics state.
    fn content_stream(&self) -> Result<lopdf::Stream, ContextError> {
        use lopdf::content::{Content, Operation};

        let mut operations = Vec::with_capacity(self.operations.len() + 2);
        operations.push(Operation::new("q", vec![]));
        operations.extend(self.operations.iter().cloned());
        operations.push(Operation::new("Q", vec![]));

        let stream_content = Content { operations }
            .encode()
            .map_err(|error| ContextError::with_error("Failed to encode the page content", &error))?;

        Ok(lopdf::Stream::new(lopdf::Dictionary::new(), stream_content))
    }
}

/// The entries of the information dictionary of a PDF document.
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    /// Used both as creation and modification date, so that identical inputs give identical files.
    pub creation_date: OffsetDateTime,
}

impl Default for PdfMetadata {
    fn default() -> Self {
        PdfMetadata {
            title: "Unknown".into(),
            author: "Unknown".into(),
            subject: "Unknown".into(),
            creation_date: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// Converts millimeters to points. The end user works in millimeters, which are easier to reason about,
/// while PDF expects points.
pub fn millimeters_to_points(millimeters: f32) -> f32 {
    millimeters * 2.834646
}

/// Converts points back to millimeters.
pub fn points_to_millimeters(points: f32) -> f32 {
    points / 2.834646
}

/// This struct represents the actual PDF document on a high-level. It is an interface to the actual underlying
/// `lopdf::Document` with the addition of the PDF pages, the document ID and the fonts used in the document.
///
/// All the coordinates taken by its methods are in millimeters, measured from the bottom left corner of the page.
pub struct PdfDocument {
    /// The association between the fonts ID, the object it is represented by and its face data.
    fonts: BTreeMap<String, (lopdf::ObjectId, Arc<Font>)>,
    /// The underlying PDF document: this is a low-level interface and shouldn't be directly interacted with
    /// unless strictly necessary.
    pub inner_document: lopdf::Document,
    /// The identifier of the document, it is used to in order to set the PDF `ID` tag.
    pub identifier: String,
    pub metadata: PdfMetadata,
    /// The pages of the PDF document.
    pub(crate) pages: Vec<PdfPage>,
}

impl PdfDocument {
    /// Create a new `PdfDocument` by defaulting the underlying PDF document to version 1.5
    /// of the PDF specification and customly specifying the PDF identifier.
    pub fn new(pdf_document_identifier: String) -> Self {
        PdfDocument {
            fonts: BTreeMap::default(),
            inner_document: lopdf::Document::with_version("1.5"),
            identifier: pdf_document_identifier,
            metadata: PdfMetadata::default(),
            pages: Vec::new(),
        }
    }

    /// Adds a page of given width and height in millimeters and returns its index,
    /// to be passed to the drawing functions such as `write_text_to_page`.
    pub fn add_page(&mut self, page_width: f32, page_height: f32) -> usize {
        self.pages.push(PdfPage {
            width: millimeters_to_points(page_width),
            height: millimeters_to_points(page_height),
            operations: Vec::new(),
        });

        self.pages.len() - 1
    }

    /// The number of pages added so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Registers a font in the document and returns the index to be used when writing text with it.
    /// The font data is only embedded once the document is written out.
    pub fn add_font(&mut self, font: Arc<Font>) -> usize {
        let font_index = self.fonts.len();
        let font_object_id = self.inner_document.new_object_id();
        self.fonts
            .insert(format!("F{font_index}"), (font_object_id, font));

        font_index
    }

    /// Writes the text in the specified font and color at the caret position (in millimeters) of the given page.
    ///
    /// The text is normalized in the NFC form beforehand. Unlike a viewer, this function doesn't
    /// fall back on a replacement glyph: a character missing from the font is an error, which
    /// reports the character itself.
    #[allow(clippy::too_many_arguments)]
    pub fn write_text_to_page(
        &mut self,
        page_index: usize,
        color: [f32; 3],
        text: &str,
        font_index: usize,
        font_size: f32,
        caret_position: [f32; 2],
    ) -> Result<(), WriteTextError> {
        use lopdf::content::Operation;

        let font = Arc::clone(&self.get_font(font_index)?.1);

        let mut glyph_id_list = Vec::<u16>::new();
        for character in text.nfc() {
            let glyph_id = font
                .ttf_face
                .glyph_id(character)
                .ok_or(WriteTextError::Character(character))?;
            glyph_id_list.push(glyph_id);
        }
        // Each glyph ID is written as a big endian pair of bytes
        let glyph_id_bytes = glyph_id_list
            .iter()
            .flat_map(|glyph_id| glyph_id.to_be_bytes())
            .collect::<Vec<u8>>();

        let [x, y] = caret_position;
        let [r, g, b] = color;
        self.add_operations_to_page(
            page_index,
            vec![
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![
                        Object::Name(format!("F{font_index}").into_bytes()),
                        font_size.into(),
                    ],
                ),
                Operation::new(
                    "Td",
                    vec![millimeters_to_points(x).into(), millimeters_to_points(y).into()],
                ),
                Operation::new(
                    "rg",
                    vec![r, g, b].into_iter().map(Object::Real).collect(),
                ),
                Operation::new(
                    "Tj",
                    vec![Object::String(glyph_id_bytes, StringFormat::Hexadecimal)],
                ),
                Operation::new("ET", vec![]),
            ],
        )?;

        Ok(())
    }

    /// Strokes a straight line between two points given in millimeters.
    pub fn draw_line(
        &mut self,
        page_index: usize,
        color: [f32; 3],
        line_width: f32,
        from: [f32; 2],
        to: [f32; 2],
    ) -> Result<(), ContextError> {
        use lopdf::content::Operation;

        let [r, g, b] = color;
        self.add_operations_to_page(
            page_index,
            vec![
                Operation::new("q", vec![]),
                Operation::new("w", vec![line_width.into()]),
                Operation::new(
                    "RG",
                    vec![r, g, b].into_iter().map(Object::Real).collect(),
                ),
                Operation::new(
                    "m",
                    vec![
                        millimeters_to_points(from[0]).into(),
                        millimeters_to_points(from[1]).into(),
                    ],
                ),
                Operation::new(
                    "l",
                    vec![
                        millimeters_to_points(to[0]).into(),
                        millimeters_to_points(to[1]).into(),
                    ],
                ),
                Operation::new("S", vec![]),
                Operation::new("Q", vec![]),
            ],
        )
    }

    /// Fills the rectangle whose bottom left corner is at `origin`, everything in millimeters.
    pub fn fill_rectangle(
        &mut self,
        page_index: usize,
        color: [f32; 3],
        origin: [f32; 2],
        size: [f32; 2],
    ) -> Result<(), ContextError> {
        use lopdf::content::Operation;

        let [r, g, b] = color;
        self.add_operations_to_page(
            page_index,
            vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "rg",
                    vec![r, g, b].into_iter().map(Object::Real).collect(),
                ),
                Operation::new(
                    "re",
                    vec![
                        millimeters_to_points(origin[0]).into(),
                        millimeters_to_points(origin[1]).into(),
                        millimeters_to_points(size[0]).into(),
                        millimeters_to_points(size[1]).into(),
                    ],
                ),
                Operation::new("f", vec![]),
                Operation::new("Q", vec![]),
            ],
        )
    }

    /// Write the pages and the fonts so far specified to the underlying PDF document and finalize it.
    ///
    /// One mandatory argument needed by the PDF specification is the instance ID, which together with
    /// the document identifier forms the `ID` entry of the trailer.
    pub fn write_all(&mut self, instance_id: String) -> Result<(), ContextError> {
        use lopdf::Object::*;
        use lopdf::StringFormat::*;

        let timestamp = to_pdf_timestamp_format(&self.metadata.creation_date);
        let document_info = lopdf::Dictionary::from_iter(vec![
            ("Trapped", "False".into()),
            (
                "CreationDate",
                String(timestamp.clone().into_bytes(), Literal),
            ),
            ("ModDate", String(timestamp.into_bytes(), Literal)),
            ("Title", text_string(&self.metadata.title)),
            ("Author", text_string(&self.metadata.author)),
            ("Subject", text_string(&self.metadata.subject)),
            (
                "Creator",
                String(env!("CARGO_PKG_NAME").as_bytes().to_vec(), Literal),
            ),
            (
                "Producer",
                String(
                    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
                        .into_bytes(),
                    Literal,
                ),
            ),
        ]);
        let document_info_id = self.inner_document.add_object(Dictionary(document_info));

        let pages_id = self.inner_document.new_object_id();
        let catalog = lopdf::Dictionary::from_iter(vec![
            ("Type", "Catalog".into()),
            ("PageLayout", "OneColumn".into()),
            ("PageMode", "UseNone".into()),
            ("Pages", Reference(pages_id)),
        ]);
        let catalog_id = self.inner_document.add_object(catalog);

        self.inner_document
            .trailer
            .set("Root", Reference(catalog_id));
        self.inner_document
            .trailer
            .set("Info", Reference(document_info_id));
        self.inner_document.trailer.set(
            "ID",
            Array(vec![
                String(self.identifier.clone().into_bytes(), Literal),
                String(instance_id.into_bytes(), Literal),
            ]),
        );

        let fonts_dictionary = self.insert_fonts_into_document();
        let fonts_dictionary_id = self.inner_document.add_object(fonts_dictionary);
        let resources_id = self
            .inner_document
            .add_object(lopdf::Dictionary::from_iter(vec![(
                "Font",
                Reference(fonts_dictionary_id),
            )]));

        let mut page_ids = Vec::<lopdf::Object>::new();
        for page in self.pages.iter() {
            let media_box = Array(vec![
                Integer(0),
                Integer(0),
                Real(page.width),
                Real(page.height),
            ]);
            let page_content_id = self.inner_document.add_object(page.content_stream()?);
            let page_dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", "Page".into()),
                ("Rotate", Integer(0)),
                ("MediaBox", media_box.clone()),
                ("TrimBox", media_box.clone()),
                ("CropBox", media_box),
                ("Parent", Reference(pages_id)),
                ("Resources", Reference(resources_id)),
                ("Contents", Reference(page_content_id)),
            ]);
            page_ids.push(Reference(self.inner_document.add_object(page_dictionary)));
        }

        let pages = lopdf::Dictionary::from_iter(vec![
            ("Type", "Pages".into()),
            ("Count", Integer(self.pages.len() as i64)),
            ("Kids", Array(page_ids)),
        ]);
        self.inner_document
            .objects
            .insert(pages_id, Dictionary(pages));

        Ok(())
    }

    /// Save the `PdfDocument` to bytes in order for it to be written to a file or further processed.
    /// The content streams are compressed, the embedded fonts are left as they are.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        self.inner_document.compress();

        let mut pdf_document_bytes = Vec::new();
        let mut writer = BufWriter::new(&mut pdf_document_bytes);
        self.inner_document.save_to(&mut writer).map_err(|error| {
            ContextError::with_error("Error while saving the PDF document to bytes", &error)
        })?;
        mem::drop(writer);

        Ok(pdf_document_bytes)
    }

    /// Converts the fonts into a dictionary and inserts them into the document.
    fn insert_fonts_into_document(&mut self) -> lopdf::Dictionary {
        let mut font_dictionary = lopdf::Dictionary::new();

        for (face_identifier, (font_object_id, font)) in self.fonts.iter() {
            let collected_font_dictionary =
                font.insert_into_document(face_identifier, &mut self.inner_document);

            self.inner_document.objects.insert(
                *font_object_id,
                lopdf::Object::Dictionary(collected_font_dictionary),
            );
            font_dictionary.set(
                face_identifier.clone(),
                lopdf::Object::Reference(*font_object_id),
            );
        }
        font_dictionary
    }

    /// This function is responsible for adding the given operations to the specified page.
    fn add_operations_to_page(
        &mut self,
        page_index: usize,
        operations: Vec<lopdf::content::Operation>,
    ) -> Result<(), ContextError> {
        let pdf_page = self
            .pages
            .get_mut(page_index)
            .ok_or(ContextError::with_context(format!(
                "Failed to find the page with index {}",
                page_index
            )))?;
        pdf_page.operations.extend(operations);

        Ok(())
    }

    // Retrieve the font at the given font index.
    fn get_font(&self, font_index: usize) -> Result<&(lopdf::ObjectId, Arc<Font>), ContextError> {
        self.fonts
            .get(&format!("F{font_index}"))
            .ok_or(ContextError::with_context(format!(
                "Failed to find font {} into the fonts map",
                font_index
            )))
    }
}

/// The failure of writing a piece of text, either because of the font or of the document itself.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteTextError {
    Character(char),
    Document(ContextError),
}

impl From<ContextError> for WriteTextError {
    fn from(error: ContextError) -> Self {
        WriteTextError::Document(error)
    }
}

impl std::fmt::Display for WriteTextError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteTextError::Character(character) => {
                write!(formatter, "The font has no glyph for {:?}", character)
            }
            WriteTextError::Document(error) => write!(formatter, "{error}"),
        }
    }
}

impl std::error::Error for WriteTextError {}

/// Encodes a string of the information dictionary, switching to UTF-16BE with
/// a byte order mark whenever it is not plain ASCII.
fn text_string(text: &str) -> lopdf::Object {
    if text.is_ascii() {
        return lopdf::Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(text.encode_utf16().flat_map(|unit| unit.to_be_bytes()));

    lopdf::Object::String(bytes, StringFormat::Hexadecimal)
}

type GlyphId = u32;
type UnicodeCodePoint = u32;
type CmapBlock = Vec<(GlyphId, UnicodeCodePoint)>;

/// Generates a CMAP (character map) from valid cmap blocks by iterating over them. This function adheres to
/// the PDF specification by employing a predefined beginning and end section which is inserted at compile time.
fn generate_cid_to_unicode_map(face_name: &str, all_cmap_blocks: Vec<CmapBlock>) -> String {
    let mut cid_to_unicode_map =
        format!(include_str!("../assets/gid_to_unicode_beg.txt"), face_name);

    for cmap_block in all_cmap_blocks
        .into_iter()
        .filter(|block| !block.is_empty())
    {
        cid_to_unicode_map.push_str(format!("{} beginbfchar\r\n", cmap_block.len()).as_str());
        for (glyph_id, unicode) in cmap_block {
            cid_to_unicode_map.push_str(format!("<{glyph_id:04x}> <{}>\n", utf16_hex(unicode)).as_str());
        }
        cid_to_unicode_map.push_str("endbfchar\r\n");
    }

    cid_to_unicode_map.push_str(include_str!("../assets/gid_to_unicode_end.txt"));

    cid_to_unicode_map
}

/// The UTF-16BE hexadecimal form of a codepoint, as `ToUnicode` maps expect it,
/// which takes a surrogate pair for the characters outside of the basic plane.
fn utf16_hex(codepoint: UnicodeCodePoint) -> String {
    match char::from_u32(codepoint) {
        Some(character) => character
            .encode_utf16(&mut [0; 2])
            .iter()
            .map(|unit| format!("{unit:04x}"))
            .collect(),
        None => format!("{codepoint:04x}"),
    }
}

/// Formats the given time so that it matches what the PDF specification expects.
/// An example of it is the following: D:20170505150224+02'00'.
fn to_pdf_timestamp_format(date: &OffsetDateTime) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_follow_the_pdf_date_format() {
        assert_eq!(
            to_pdf_timestamp_format(&OffsetDateTime::UNIX_EPOCH),
            "D:19700101000000+00'00'"
        );
    }

    #[test]
    fn characters_outside_the_basic_plane_take_a_surrogate_pair() {
        assert_eq!(utf16_hex('A' as u32), "0041");
        assert_eq!(utf16_hex('請' as u32), "8acb");
        assert_eq!(utf16_hex('𠀋' as u32), "d840dc0b");
    }

    #[test]
    fn non_ascii_metadata_is_written_as_utf16() {
        let lopdf::Object::String(bytes, StringFormat::Literal) = text_string("Ab") else {
            panic!("ASCII text should be a literal string");
        };
        assert_eq!(bytes, b"Ab");

        let lopdf::Object::String(bytes, StringFormat::Hexadecimal) = text_string("請求") else {
            panic!("Non-ASCII text should be a hexadecimal string");
        };
        assert_eq!(bytes, vec![0xFE, 0xFF, 0x8A, 0xCB, 0x6C, 0x42]);
    }

    #[test]
    fn millimeters_and_points_convert_back_and_forth() {
        let points = millimeters_to_points(210.0);

        assert!((points - 595.27).abs() < 0.01);
        assert!((points_to_millimeters(points) - 210.0).abs() < 1e-3);
    }
}
