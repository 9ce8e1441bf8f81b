use unicode_linebreak::{BreakOpportunity, linebreaks};
use unicode_segmentation::UnicodeSegmentation;

use crate::aggregate::AggregateRow;

// All dimensions are in PDF points; the origin is the bottom-left page corner.
pub const PAGE_WIDTH: f32 = 595.275_6;
pub const PAGE_HEIGHT: f32 = 841.889_8;
pub const MARGIN: f32 = 72.0;

const FRAME_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const FRAME_TOP: f32 = PAGE_HEIGHT - MARGIN;

const LOGO_WIDTH: f32 = 159.0;
const LOGO_HEIGHT: f32 = 43.0;
const SPACER: f32 = 30.0;

const HEADER_FONT_SIZE: f32 = 18.0;
const HEADER_LEADING: f32 = 21.6;
const ROW_FONT_SIZE: f32 = 16.0;
const ROW_LEADING: f32 = 20.0;
const BULLET: &str = "•";
const BULLET_FONT_SIZE: f32 = 20.0;
const BULLET_INDENT: f32 = 18.0;

pub trait TextMeasure {
    /// Width of `text` in points when set at `font_size`.
    fn text_width(&self, text: &str, font_size: f32) -> f32;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Logo {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Text {
        text: String,
        x: f32,
        baseline: f32,
        font_size: f32,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub elements: Vec<Element>,
}

#[must_use]
pub fn greeting(username: &str) -> String {
    format!("Привет, {username}! Список ингредиентов для покупки сформирован.")
}

#[must_use]
pub fn row_text(row: &AggregateRow) -> String {
    format!(
        "{}, {} - {}",
        row.ingredient_name, row.measurement_unit, row.total_amount
    )
}

/// Breaks `text` into lines no wider than `max_width`.
///
/// Lines only break at UAX #14 opportunities (between words, and between
/// ideographs for CJK-class scripts). A single unbreakable run wider than
/// the line is split between grapheme clusters.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    max_width: f32,
    measure: &dyn TextMeasure,
) -> Vec<String> {
    let fits = |segment: &str| measure.text_width(segment, font_size) <= max_width;

    let mut lines = Vec::new();
    let mut start = 0;
    let mut fitted_end = None;

    for (end, opportunity) in linebreaks(text) {
        if !fits(text[start..end].trim_end()) {
            if let Some(fitted) = fitted_end.take() {
                push_non_blank(&mut lines, &text[start..fitted]);
                start = fitted;
            }
            start = split_overflowing(text, start, end, &fits, &mut lines);
        }
        fitted_end = Some(end);

        if opportunity == BreakOpportunity::Mandatory {
            lines.push(text[start..end].trim_end().to_owned());
            start = end;
            fitted_end = None;
        }
    }

    if start < text.len() {
        lines.push(text[start..].trim_end().to_owned());
    }
    lines
}

/// Lines left blank by an overflow break carry nothing worth drawing.
fn push_non_blank(lines: &mut Vec<String>, line: &str) {
    let line = line.trim();
    if !line.is_empty() {
        lines.push(line.to_owned());
    }
}

/// Emits grapheme-split lines until `text[start..end]` fits; returns the new start.
fn split_overflowing(
    text: &str,
    mut start: usize,
    end: usize,
    fits: &dyn Fn(&str) -> bool,
    lines: &mut Vec<String>,
) -> usize {
    while !fits(text[start..end].trim_end()) {
        let mut cut = start;
        for (offset, grapheme) in text[start..end].grapheme_indices(true) {
            let next = start + offset + grapheme.len();
            // NOTE: always take at least one grapheme so we make progress
            if cut > start && !fits(&text[start..next]) {
                break;
            }
            cut = next;
        }
        push_non_blank(lines, &text[start..cut]);
        start = cut;
    }
    start
}

/// Vertical flow of content through the page frames.
struct Flow {
    done: Vec<Page>,
    current: Page,
    cursor: f32,
}

impl Flow {
    fn new() -> Self {
        Self {
            done: Vec::new(),
            current: Page::default(),
            cursor: FRAME_TOP,
        }
    }

    fn at_frame_top(&self) -> bool {
        (self.cursor - FRAME_TOP).abs() < f32::EPSILON
    }

    /// Claims `height` points, moving to a new page if they don't fit.
    /// Returns the top edge of the claimed block.
    fn reserve(&mut self, height: f32) -> f32 {
        if self.cursor - height < MARGIN && !self.at_frame_top() {
            self.done.push(std::mem::take(&mut self.current));
            self.cursor = FRAME_TOP;
        }
        let top = self.cursor;
        self.cursor -= height;
        top
    }

    /// Spacers are dropped at the top of a frame.
    fn skip(&mut self, height: f32) {
        if !self.at_frame_top() {
            self.cursor -= height;
        }
    }

    fn push(&mut self, element: Element) {
        self.current.elements.push(element);
    }

    fn finish(mut self) -> Vec<Page> {
        self.done.push(self.current);
        self.done
    }
}

/// Logo, greeting and one bulleted entry per row, flowed onto as many
/// pages as needed. An empty `rows` still yields the first page.
pub fn layout_shopping_list(
    rows: &[AggregateRow],
    username: &str,
    measure: &dyn TextMeasure,
) -> Vec<Page> {
    let mut flow = Flow::new();

    let top = flow.reserve(LOGO_HEIGHT);
    flow.push(Element::Logo {
        x: (PAGE_WIDTH - LOGO_WIDTH) / 2.0,
        y: top - LOGO_HEIGHT,
        width: LOGO_WIDTH,
        height: LOGO_HEIGHT,
    });
    flow.skip(SPACER);

    for line in wrap_text(&greeting(username), HEADER_FONT_SIZE, FRAME_WIDTH, measure) {
        let width = measure.text_width(&line, HEADER_FONT_SIZE);
        let top = flow.reserve(HEADER_LEADING);
        flow.push(Element::Text {
            text: line,
            x: MARGIN + (FRAME_WIDTH - width).max(0.0) / 2.0,
            baseline: top - HEADER_FONT_SIZE,
            font_size: HEADER_FONT_SIZE,
        });
    }
    flow.skip(SPACER);

    for row in rows {
        let lines = wrap_text(
            &row_text(row),
            ROW_FONT_SIZE,
            FRAME_WIDTH - BULLET_INDENT,
            measure,
        );
        for (index, line) in lines.into_iter().enumerate() {
            let baseline = flow.reserve(ROW_LEADING) - ROW_FONT_SIZE;
            if index == 0 {
                flow.push(Element::Text {
                    text: BULLET.to_owned(),
                    x: MARGIN,
                    baseline,
                    font_size: BULLET_FONT_SIZE,
                });
            }
            flow.push(Element::Text {
                text: line,
                x: MARGIN + BULLET_INDENT,
                baseline,
                font_size: ROW_FONT_SIZE,
            });
        }
    }

    flow.finish()
}
