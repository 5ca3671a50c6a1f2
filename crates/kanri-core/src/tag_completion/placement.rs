//! Where the suggestion panel goes, in
//! viewport coordinates.

use unicode_width::UnicodeWidthChar;

pub const PANEL_WIDTH: f64 = 200.0;
pub const PANEL_HEIGHT: f64 = 160.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
  pub width:  f64,
  pub height: f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
  pub x:      f64,
  pub y:      f64,
  pub width:  f64,
  pub height: f64
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum FieldKind {
  SingleLine,
  MultiLine
}

/// Enough of an input's rendering to
/// measure text in it. One column of
/// display width is `char_width` wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputField {
  pub kind:        FieldKind,
  pub rect:        Rect,
  pub char_width:  f64,
  pub line_height: f64,
  pub padding:     f64,
  pub scroll_left: f64,
  pub scroll_top:  f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelPlacement {
  pub x:     f64,
  pub y:     f64,
  /// Shown above the anchor instead of
  /// below it.
  pub above: bool
}

fn column_width(c: char) -> usize {
  c.width().unwrap_or(0)
}

/// Display columns of `text`.
pub fn measure(text: &str) -> usize {
  text.chars().map(column_width).sum()
}

/// The (line, column) a char offset lands
/// on once `text` is wrapped at `columns`
/// display columns, the way a textarea
/// lays it out.
pub fn wrapped_position(
  text: &str,
  offset: usize,
  columns: usize
) -> (usize, usize) {
  let columns = columns.max(1);
  let mut line = 0;
  let mut col = 0;
  for c in text.chars().take(offset) {
    if c == '\n' {
      line += 1;
      col = 0;
      continue;
    }
    let w = column_width(c);
    if col + w > columns {
      line += 1;
      col = 0;
    }
    col += w;
  }
  (line, col)
}

/// The caret anchor for a token starting
/// at char offset `start`: its left edge
/// and the top and bottom of its line.
fn anchor(
  field: &InputField,
  text: &str,
  start: usize
) -> (f64, f64, f64) {
  match field.kind {
    | FieldKind::SingleLine => {
      let prefix: String =
        text.chars().take(start).collect();
      let x = field.rect.x
        + field.padding
        + measure(&prefix) as f64
          * field.char_width
        - field.scroll_left;
      (
        x,
        field.rect.y,
        field.rect.y + field.rect.height
      )
    }
    | FieldKind::MultiLine => {
      let char_width =
        field.char_width.max(1.0);
      let inner = (field.rect.width
        - 2.0 * field.padding)
        .max(char_width);
      let columns =
        (inner / char_width).floor() as usize;
      let (line, col) =
        wrapped_position(text, start, columns);
      let x = field.rect.x
        + field.padding
        + col as f64 * char_width;
      let top = field.rect.y
        + field.padding
        + line as f64 * field.line_height
        - field.scroll_top;
      (x, top, top + field.line_height)
    }
  }
}

/// Places the panel below the token,
/// flipping above it or sliding left when
/// it would leave the viewport.
pub fn place_panel(
  field: &InputField,
  text: &str,
  start: usize,
  viewport: Viewport
) -> PanelPlacement {
  let (x, top, bottom) =
    anchor(field, text, start);

  let above = bottom + PANEL_HEIGHT
    > viewport.height
    && top - PANEL_HEIGHT >= 0.0;
  let y = if above {
    top - PANEL_HEIGHT
  } else {
    bottom
  };

  let x = if x + PANEL_WIDTH > viewport.width
  {
    viewport.width - PANEL_WIDTH
  } else {
    x
  };

  PanelPlacement {
    x: x.max(0.0),
    y: y.max(0.0),
    above
  }
}
