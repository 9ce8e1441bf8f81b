use std::{
    io::{self, Cursor},
    path::{Path, PathBuf},
};

use printpdf::{
    Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfLayerReference, Pt,
    image_crate::{self, DynamicImage, GenericImageView},
};
use thiserror::Error;
use tracing::{info, instrument};
use ttf_parser::{Face, FaceParsingError, GlyphId};

use super::{
    FONT_PATH, LOGO_PATH,
    layout::{Element, PAGE_HEIGHT, PAGE_WIDTH, TextMeasure, layout_shopping_list},
};
use crate::aggregate::AggregateRow;

const DOCUMENT_TITLE: &str = "Список покупок";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read {}: {source}", path.display())]
    MissingResource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse font: {0}")]
    Font(#[from] FaceParsingError),
    #[error("failed to decode logo: {0}")]
    Image(#[from] image_crate::ImageError),
    #[error("logo has no pixels")]
    EmptyLogo,
    #[error("failed to write PDF: {0}")]
    Pdf(String),
}

/// Raw bytes of the font and logo the document embeds.
pub struct ShoppingListResources {
    font: Vec<u8>,
    logo: Vec<u8>,
}

impl ShoppingListResources {
    /// # Errors
    /// Returns [`RenderError::MissingResource`] if either file can't be read.
    pub fn load(media_root: &Path) -> Result<Self, RenderError> {
        Ok(Self {
            font: read_resource(media_root.join(FONT_PATH))?,
            logo: read_resource(media_root.join(LOGO_PATH))?,
        })
    }

    #[must_use]
    pub const fn from_bytes(font: Vec<u8>, logo: Vec<u8>) -> Self {
        Self { font, logo }
    }
}

fn read_resource(path: PathBuf) -> Result<Vec<u8>, RenderError> {
    std::fs::read(&path).map_err(|source| RenderError::MissingResource { path, source })
}

/// Horizontal advances read straight from the font's `hmtx` table.
pub struct FontMetrics<'a> {
    face: Face<'a>,
}

impl<'a> FontMetrics<'a> {
    /// # Errors
    /// Returns [`Err`] if `data` is not a TrueType/OpenType font.
    pub fn parse(data: &'a [u8]) -> Result<Self, RenderError> {
        Ok(Self {
            face: Face::parse(data, 0)?,
        })
    }
}

impl TextMeasure for FontMetrics<'_> {
    #[allow(clippy::cast_precision_loss)]
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .map(|ch| {
                // NOTE: unmapped characters render as .notdef, so measure them as such
                let glyph = self.face.glyph_index(ch).unwrap_or(GlyphId(0));
                self.face.glyph_hor_advance(glyph).map_or(0, u32::from)
            })
            .sum();
        units as f32 * font_size / f32::from(self.face.units_per_em())
    }
}

fn pdf_error(err: impl std::fmt::Debug) -> RenderError {
    RenderError::Pdf(format!("{err:?}"))
}

fn mm(points: f32) -> Mm {
    Mm::from(Pt(points))
}

#[allow(clippy::cast_precision_loss)]
fn place_logo(
    logo: &DynamicImage,
    layer: &PdfLayerReference,
    (x, y, width, height): (f32, f32, f32, f32),
) -> Result<(), RenderError> {
    let (px_width, px_height) = GenericImageView::dimensions(logo);
    if px_width == 0 || px_height == 0 {
        return Err(RenderError::EmptyLogo);
    }
    // NOTE: at 72 dpi one pixel is one point
    Image::from_dynamic_image(logo).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(mm(x)),
            translate_y: Some(mm(y)),
            scale_x: Some(width / px_width as f32),
            scale_y: Some(height / px_height as f32),
            dpi: Some(72.0),
            ..Default::default()
        },
    );
    Ok(())
}

/// Builds the whole document in memory; nothing is returned unless every
/// page rendered.
///
/// # Errors
/// Returns [`Err`] if the font or logo can't be decoded or the PDF can't be
/// serialized.
#[instrument(skip(rows, resources), fields(row_count = rows.len()))]
pub fn render_shopping_list(
    rows: &[AggregateRow],
    username: &str,
    resources: &ShoppingListResources,
) -> Result<Vec<u8>, RenderError> {
    let metrics = FontMetrics::parse(&resources.font)?;
    let logo = image_crate::load_from_memory(&resources.logo)?;
    let pages = layout_shopping_list(rows, username, &metrics);

    let (doc, first_page, first_layer) =
        PdfDocument::new(DOCUMENT_TITLE, mm(PAGE_WIDTH), mm(PAGE_HEIGHT), "Layer 1");
    let font: IndirectFontRef = doc
        .add_external_font(Cursor::new(resources.font.as_slice()))
        .map_err(pdf_error)?;

    for (index, page) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_index, layer_index) = doc.add_page(
                mm(PAGE_WIDTH),
                mm(PAGE_HEIGHT),
                format!("Layer {}", index + 1),
            );
            doc.get_page(page_index).get_layer(layer_index)
        };

        for element in &page.elements {
            match element {
                Element::Logo {
                    x,
                    y,
                    width,
                    height,
                } => place_logo(&logo, &layer, (*x, *y, *width, *height))?,
                Element::Text {
                    text,
                    x,
                    baseline,
                    font_size,
                } => layer.use_text(text.as_str(), *font_size, mm(*x), mm(*baseline), &font),
            }
        }
    }

    let bytes = doc.save_to_bytes().map_err(pdf_error)?;
    info!(pages = pages.len(), bytes = bytes.len(), "Rendered shopping list");
    Ok(bytes)
}
