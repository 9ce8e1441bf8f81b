//! Shopping-list export: lays aggregated cart rows out on A4 pages and
//! writes them as a PDF with an embedded TrueType font.

mod layout;
mod pdf;

use std::{path::PathBuf, sync::Arc};

use rearch::CapsuleHandle;

pub use layout::{Element, Page, TextMeasure, greeting, layout_shopping_list, row_text, wrap_text};
pub use pdf::{FontMetrics, RenderError, ShoppingListResources, render_shopping_list};

use crate::{aggregate::AggregateRow, config::media_root_capsule};

/// Relative to the media root.
pub const FONT_PATH: &str = "fonts/Roboto-Regular.ttf";
/// Relative to the media root.
pub const LOGO_PATH: &str = "logo_foodgram.png";

pub const DOWNLOAD_FILENAME: &str = "shopping_cart.pdf";

pub fn shopping_list_renderer_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn ShoppingListRenderer> {
    let media_root = get.as_ref(media_root_capsule).clone();
    Arc::new(MediaRootRenderer { media_root })
}

/// Blocking; call from a thread that may block.
pub trait ShoppingListRenderer: Send + Sync {
    fn render(&self, rows: &[AggregateRow], username: &str) -> Result<Vec<u8>, RenderError>;
}

/// Reads the font and logo from the media root on every render, so a
/// missing file fails the request that needed it.
struct MediaRootRenderer {
    media_root: PathBuf,
}

impl ShoppingListRenderer for MediaRootRenderer {
    fn render(&self, rows: &[AggregateRow], username: &str) -> Result<Vec<u8>, RenderError> {
        let resources = ShoppingListResources::load(&self.media_root)?;
        render_shopping_list(rows, username, &resources)
    }
}
