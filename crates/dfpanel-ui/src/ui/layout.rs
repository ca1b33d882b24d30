use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;

/// Width of one glyph of the list font, in pixels.
pub const LIST_CHAR_WIDTH_PX: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLayout {
    pub panel: Rectangle,
    pub scroll_up: Rectangle,
    pub scroll_down: Rectangle,
    /// Area covered by the visible rows, directly below `scroll_up`.
    pub rows: Rectangle,
    pub row_height_px: u32,
    pub visible_rows: usize,
    pub chars_per_row: usize,
}

impl ListLayout {
    pub fn row_rect(&self, row: usize) -> Rectangle {
        let top = self.rows.top_left.y + (row as u32 * self.row_height_px) as i32;
        Rectangle::new(
            Point::new(self.rows.top_left.x, top),
            Size::new(self.rows.size.width, self.row_height_px),
        )
    }

    /// Visible row under `y`, if any.
    pub fn row_at(&self, y: i32) -> Option<usize> {
        let offset = y - self.rows.top_left.y;
        if offset < 0 || self.row_height_px == 0 {
            return None;
        }
        let row = offset as usize / self.row_height_px as usize;
        (row < self.visible_rows).then_some(row)
    }
}

/// Static control geometry derived once from the panel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLayout {
    pub width_px: u32,
    pub height_px: u32,
    pub padding_px: u32,
    pub play_pause: Rectangle,
    pub previous: Rectangle,
    pub next: Rectangle,
    pub stop: Rectangle,
    pub volume: Rectangle,
    pub calibrate: Rectangle,
    pub orientation: Rectangle,
    pub status: Rectangle,
    pub list: Option<ListLayout>,
}

impl PanelLayout {
    pub const PADDING_PX: u32 = 8;
    pub const SCROLL_BUTTON_HEIGHT_PX: u32 = 36;
    pub const LIST_ROW_HEIGHT_PX: u32 = 32;

    pub fn from_dimensions(width_px: u32, height_px: u32, with_list: bool) -> Self {
        let pad = Self::PADDING_PX;
        let controls_w = if with_list {
            width_px * 56 / 100
        } else {
            width_px
        };

        let transport_h = height_px * 28 / 100;
        let wide_w = controls_w.saturating_sub(4 * pad) / 2;
        let narrow_w = controls_w.saturating_sub(4 * pad) / 4;

        let mut x = pad;
        let y = pad;
        let play_pause = rect(x, y, wide_w, transport_h);
        x += wide_w + pad;
        let previous = rect(x, y, narrow_w, transport_h);
        x += narrow_w + pad;
        let next = rect(x, y, narrow_w, transport_h);

        let level_y = y + transport_h + pad;
        let level_h = height_px * 22 / 100;
        let stop = rect(pad, level_y, narrow_w, level_h);
        let volume_x = pad + narrow_w + pad;
        let volume = rect(
            volume_x,
            level_y,
            controls_w.saturating_sub(volume_x + pad),
            level_h,
        );

        let tools_y = level_y + level_h + pad;
        let tools_h = height_px * 16 / 100;
        let tool_w = controls_w.saturating_sub(3 * pad) / 2;
        let calibrate = rect(pad, tools_y, tool_w, tools_h);
        let orientation = rect(pad + tool_w + pad, tools_y, tool_w, tools_h);

        let status_y = tools_y + tools_h + pad;
        let status = rect(
            pad,
            status_y,
            controls_w.saturating_sub(2 * pad),
            height_px.saturating_sub(status_y + pad),
        );

        let list = with_list.then(|| Self::list_layout(controls_w, width_px, height_px));

        Self {
            width_px,
            height_px,
            padding_px: pad,
            play_pause,
            previous,
            next,
            stop,
            volume,
            calibrate,
            orientation,
            status,
            list,
        }
    }

    fn list_layout(left: u32, width_px: u32, height_px: u32) -> ListLayout {
        let pad = Self::PADDING_PX;
        let button_h = Self::SCROLL_BUTTON_HEIGHT_PX;
        let row_h = Self::LIST_ROW_HEIGHT_PX;
        let list_w = width_px.saturating_sub(left + pad);

        let panel = rect(left, pad, list_w, height_px.saturating_sub(2 * pad));
        let scroll_up = rect(left, pad, list_w, button_h);
        let down_y = height_px.saturating_sub(pad + button_h);
        let scroll_down = rect(left, down_y, list_w, button_h);

        let rows_top = pad + button_h + 4;
        let rows_span = down_y.saturating_sub(4).saturating_sub(rows_top);
        let visible_rows = ((rows_span / row_h) as usize).max(1);
        let rows = rect(left, rows_top, list_w, visible_rows as u32 * row_h);

        ListLayout {
            panel,
            scroll_up,
            scroll_down,
            rows,
            row_height_px: row_h,
            visible_rows,
            chars_per_row: chars_that_fit(list_w.saturating_sub(8), LIST_CHAR_WIDTH_PX),
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width_px, self.height_px)
    }

    pub fn visible_rows(&self) -> usize {
        self.list.map_or(0, |list| list.visible_rows)
    }
}

fn rect(x: u32, y: u32, w: u32, h: u32) -> Rectangle {
    Rectangle::new(Point::new(x as i32, y as i32), Size::new(w, h))
}

pub fn chars_that_fit(width_px: u32, char_width_px: u32) -> usize {
    if char_width_px == 0 {
        return 1;
    }
    (width_px / char_width_px).max(1) as usize
}

pub fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - 3;
    let head: String = text.chars().take(keep).collect();
    format!("{head}...")
}
