use std::{
    convert::Infallible,
    fs::{self, OpenOptions},
    path::Path,
};

use anyhow::{Context, Result};
use dfpanel_logging::targets::T_DISPLAY;
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_7X13},
        MonoTextStyle,
    },
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{
        Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle, RoundedRectangle, StrokeAlignment,
    },
    text::{Alignment, Baseline, Text, TextStyle, TextStyleBuilder},
};
use image::{imageops, RgbImage};
use memmap2::{MmapMut, MmapOptions};

use crate::calibration::Orientation;
use crate::catalog::Catalog;
use crate::config::{parse_hex_rgb, ColorScheme};
use crate::playback::PlaybackState;
use crate::protocol::MAX_VOLUME;
use crate::touch::calibrate::TARGET_COUNT;
use crate::ui::{layout::ellipsize, UiModel};

pub const DEFAULT_PANEL_SIZE: Size = Size::new(480, 320);
const BYTES_PER_PIXEL: usize = 2;
const CROSSHAIR_ARM_PX: i32 = 10;

/// Destination for finished frames.
pub trait DisplaySink {
    fn size(&self) -> Size;

    /// `pixels` is row-major RGB565LE, `width * height * 2` bytes.
    fn write_pixels(&mut self, pixels: &[u8]) -> Result<()>;
}

/// One RGB565 pixel from 8-bit channels, truncating each channel.
pub fn rgb565_le(r: u8, g: u8, b: u8) -> [u8; 2] {
    let packed = (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3);
    packed.to_le_bytes()
}

pub fn encode_rgb565le(image: &RgbImage) -> Vec<u8> {
    let pixels = image.width() as usize * image.height() as usize;
    let mut out = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
    for pixel in image.pixels() {
        let [r, g, b] = pixel.0;
        out.extend_from_slice(&rgb565_le(r, g, b));
    }
    out
}

/// RGB888 drawing surface for `embedded-graphics`.
pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(size: Size) -> Self {
        Self {
            image: RgbImage::new(size.width, size.height),
        }
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.image.dimensions();
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as u32, point.y as u32);
            if x < width && y < height {
                self.image
                    .put_pixel(x, y, image::Rgb([color.r(), color.g(), color.b()]));
            }
        }
        Ok(())
    }
}

fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// Memory-mapped Linux framebuffer.
pub struct FramebufferSink {
    map: MmapMut,
    size: Size,
}

impl FramebufferSink {
    pub fn open(path: &Path) -> Result<Self> {
        let size = framebuffer_geometry(Path::new("/sys/class/graphics"), path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("opening framebuffer {}", path.display()))?;
        let len = size.width as usize * size.height as usize * BYTES_PER_PIXEL;
        // SAFETY: the framebuffer device is owned by this process for its
        // lifetime and is never truncated while mapped.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .with_context(|| format!("mapping {} bytes of {}", len, path.display()))?;
        tracing::info!(
            target: T_DISPLAY,
            path = %path.display(),
            width = size.width,
            height = size.height,
            "framebuffer mapped"
        );
        Ok(Self { map, size })
    }
}

impl DisplaySink for FramebufferSink {
    fn size(&self) -> Size {
        self.size
    }

    fn write_pixels(&mut self, pixels: &[u8]) -> Result<()> {
        let len = pixels.len().min(self.map.len());
        self.map[..len].copy_from_slice(&pixels[..len]);
        Ok(())
    }
}

/// Panel size from `<sysfs>/<fbN>/virtual_size`, or the default panel size.
pub fn framebuffer_geometry(sysfs: &Path, device: &Path) -> Size {
    let Some(name) = device.file_name() else {
        return DEFAULT_PANEL_SIZE;
    };
    let descriptor = sysfs.join(name).join("virtual_size");
    match fs::read_to_string(&descriptor) {
        Ok(contents) => match parse_fb_virtual_size(&contents) {
            Some((w, h)) if w > 0 && h > 0 => Size::new(w, h),
            _ => {
                tracing::warn!(
                    target: T_DISPLAY,
                    path = %descriptor.display(),
                    "Unparseable framebuffer geometry, using {}x{}",
                    DEFAULT_PANEL_SIZE.width,
                    DEFAULT_PANEL_SIZE.height
                );
                DEFAULT_PANEL_SIZE
            }
        },
        Err(err) => {
            tracing::warn!(
                target: T_DISPLAY,
                path = %descriptor.display(),
                "Framebuffer geometry unavailable ({err}), using {}x{}",
                DEFAULT_PANEL_SIZE.width,
                DEFAULT_PANEL_SIZE.height
            );
            DEFAULT_PANEL_SIZE
        }
    }
}

fn parse_fb_virtual_size(input: &str) -> Option<(u32, u32)> {
    let mut parts = input.trim().split(',');
    let w = parts.next()?.trim().parse::<u32>().ok()?;
    let h = parts.next()?.trim().parse::<u32>().ok()?;
    Some((w, h))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgb888,
    pub button: Rgb888,
    pub button_text: Rgb888,
    pub accent: Rgb888,
    pub slider_track: Rgb888,
    pub slider_fill: Rgb888,
    pub text: Rgb888,
    pub list_selected: Rgb888,
}

impl Palette {
    pub fn from_scheme(colors: &ColorScheme) -> Self {
        Self {
            background: parse_color(&colors.background, ColorScheme::DEFAULT_BACKGROUND),
            button: parse_color(&colors.button, ColorScheme::DEFAULT_BUTTON),
            button_text: parse_color(&colors.button_text, ColorScheme::DEFAULT_BUTTON_TEXT),
            accent: parse_color(&colors.accent, ColorScheme::DEFAULT_ACCENT),
            slider_track: parse_color(&colors.slider_track, ColorScheme::DEFAULT_SLIDER_TRACK),
            slider_fill: parse_color(&colors.slider_fill, ColorScheme::DEFAULT_SLIDER_FILL),
            text: parse_color(&colors.text, ColorScheme::DEFAULT_TEXT),
            list_selected: parse_color(&colors.list_selected, ColorScheme::DEFAULT_LIST_SELECTED),
        }
    }
}

fn parse_color(value: &str, fallback: &str) -> Rgb888 {
    let (r, g, b) = parse_hex_rgb(value)
        .or_else(|| parse_hex_rgb(fallback))
        .unwrap_or((0, 0, 0));
    Rgb888::new(r, g, b)
}

/// Everything the main screen shows, borrowed from its owners for one frame.
pub struct MainView<'a> {
    pub ui: &'a UiModel,
    pub state: PlaybackState,
    pub volume: u8,
    pub catalog: Option<&'a Catalog>,
    pub orientation: Orientation,
    pub note: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationView {
    pub target: Point,
    pub index: usize,
    pub orientation: Orientation,
}

pub struct Compositor {
    palette: Palette,
    panel: Size,
    large: MonoTextStyle<'static, Rgb888>,
    small: MonoTextStyle<'static, Rgb888>,
    centered: TextStyle,
}

impl Compositor {
    pub fn new(colors: &ColorScheme, panel: Size) -> Self {
        let palette = Palette::from_scheme(colors);
        Self {
            palette,
            panel,
            large: MonoTextStyle::new(&FONT_10X20, palette.button_text),
            small: MonoTextStyle::new(&FONT_7X13, palette.text),
            centered: TextStyleBuilder::new()
                .alignment(Alignment::Center)
                .baseline(Baseline::Middle)
                .build(),
        }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Converts a finished surface and writes it to `sink`, resizing first if
    /// the surface does not match the sink.
    pub fn present<S: DisplaySink + ?Sized>(&self, sink: &mut S, image: RgbImage) -> Result<()> {
        let size = sink.size();
        let image = if image.dimensions() != (size.width, size.height) {
            tracing::warn!(
                target: T_DISPLAY,
                from_w = image.width(),
                from_h = image.height(),
                to_w = size.width,
                to_h = size.height,
                "resizing frame to panel"
            );
            imageops::resize(&image, size.width, size.height, imageops::FilterType::Nearest)
        } else {
            image
        };
        sink.write_pixels(&encode_rgb565le(&image))
            .context("writing frame to display")
    }

    pub fn render_main(&self, view: &MainView<'_>) -> RgbImage {
        let mut canvas = Canvas::new(self.panel);
        infallible(self.draw_main(&mut canvas, view));
        canvas.into_image()
    }

    pub fn render_calibration(&self, view: &CalibrationView) -> RgbImage {
        let mut canvas = Canvas::new(self.panel);
        infallible(self.draw_calibration(&mut canvas, view));
        canvas.into_image()
    }

    pub fn draw_main<D>(&self, target: &mut D, view: &MainView<'_>) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        target.clear(self.palette.background)?;
        let layout = view.ui.layout();

        let play_label = if view.state.is_playing() { "Pause" } else { "Play" };
        self.draw_button(target, layout.play_pause, play_label)?;
        self.draw_button(target, layout.previous, "<<")?;
        self.draw_button(target, layout.next, ">>")?;
        self.draw_button(target, layout.stop, "Stop")?;
        self.draw_button(target, layout.calibrate, "Cal")?;
        self.draw_button(target, layout.orientation, "Rot")?;
        self.draw_volume(target, layout.volume, view.volume, view.ui.is_dragging())?;
        self.draw_status(target, layout.status, view)?;

        if let (Some(list), Some(catalog)) = (layout.list, view.catalog) {
            self.draw_button(target, list.scroll_up, "Up")?;
            self.draw_button(target, list.scroll_down, "Down")?;
            let playing = view.state.track();
            for row in 0..list.visible_rows {
                let index = view.ui.scroll() + row;
                let Some(track) = catalog.get(index) else {
                    break;
                };
                let rect = list.row_rect(row);
                let highlighted = match playing {
                    Some(track) => track == index,
                    None => view.ui.selected() == Some(index),
                };
                if highlighted {
                    rect.into_styled(PrimitiveStyle::with_fill(self.palette.list_selected))
                        .draw(target)?;
                }
                let label = ellipsize(
                    &format!("{:>3} {}", track.number, track.title),
                    list.chars_per_row,
                );
                Text::with_baseline(
                    &label,
                    Point::new(rect.top_left.x + 4, rect.center().y),
                    self.small,
                    Baseline::Middle,
                )
                .draw(target)?;
            }
        }
        Ok(())
    }

    fn draw_button<D>(&self, target: &mut D, rect: Rectangle, label: &str) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        RoundedRectangle::with_equal_corners(rect, Size::new(6, 6))
            .into_styled(PrimitiveStyle::with_fill(self.palette.button))
            .draw(target)?;
        Text::with_text_style(label, rect.center(), self.large, self.centered).draw(target)?;
        Ok(())
    }

    fn draw_volume<D>(
        &self,
        target: &mut D,
        rect: Rectangle,
        volume: u8,
        dragging: bool,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        RoundedRectangle::with_equal_corners(rect, Size::new(6, 6))
            .into_styled(PrimitiveStyle::with_fill(self.palette.slider_track))
            .draw(target)?;
        let fill_w = rect.size.width * u32::from(volume.min(MAX_VOLUME)) / u32::from(MAX_VOLUME);
        if fill_w > 0 {
            RoundedRectangle::with_equal_corners(
                Rectangle::new(rect.top_left, Size::new(fill_w, rect.size.height)),
                Size::new(6, 6),
            )
            .into_styled(PrimitiveStyle::with_fill(self.palette.slider_fill))
            .draw(target)?;
        }
        if dragging {
            let outline = PrimitiveStyleBuilder::new()
                .stroke_color(self.palette.accent)
                .stroke_width(2)
                .stroke_alignment(StrokeAlignment::Inside)
                .build();
            RoundedRectangle::with_equal_corners(rect, Size::new(6, 6))
                .into_styled(outline)
                .draw(target)?;
        }
        let label = format!("Vol {volume}");
        Text::with_text_style(&label, rect.center(), self.large, self.centered).draw(target)?;
        Ok(())
    }

    fn draw_status<D>(&self, target: &mut D, rect: Rectangle, view: &MainView<'_>) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        let chars = (rect.size.width / 7).max(1) as usize;
        let title = view
            .state
            .track()
            .and_then(|index| view.catalog?.get(index))
            .map(|track| format!("{}: {}", view.state.label(), track.title))
            .unwrap_or_else(|| view.state.label().to_string());

        let mut lines = vec![title];
        if let Some(note) = view.note {
            lines.push(note.to_string());
        }
        lines.push(format!("Rotation: {}", view.orientation.label()));

        let mut y = rect.top_left.y;
        let bottom = rect.top_left.y + rect.size.height as i32;
        for line in lines {
            if y + 13 > bottom {
                break;
            }
            Text::with_baseline(
                &ellipsize(&line, chars),
                Point::new(rect.top_left.x, y),
                self.small,
                Baseline::Top,
            )
            .draw(target)?;
            y += 15;
        }
        Ok(())
    }

    pub fn draw_calibration<D>(&self, target: &mut D, view: &CalibrationView) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        target.clear(self.palette.background)?;
        let stroke = PrimitiveStyle::with_stroke(self.palette.accent, 3);
        let t = view.target;
        Line::new(
            Point::new(t.x - CROSSHAIR_ARM_PX, t.y),
            Point::new(t.x + CROSSHAIR_ARM_PX, t.y),
        )
        .into_styled(stroke)
        .draw(target)?;
        Line::new(
            Point::new(t.x, t.y - CROSSHAIR_ARM_PX),
            Point::new(t.x, t.y + CROSSHAIR_ARM_PX),
        )
        .into_styled(stroke)
        .draw(target)?;

        let center = Rectangle::new(Point::zero(), self.panel).center();
        let text = MonoTextStyle::new(&FONT_10X20, self.palette.text);
        let progress = format!("Target {}/{}", view.index + 1, TARGET_COUNT);
        Text::with_text_style(&progress, center - Point::new(0, 24), text, self.centered)
            .draw(target)?;
        Text::with_text_style("Touch and hold the cross", center, self.small, self.centered)
            .draw(target)?;
        let orientation = format!("Rotation: {}", view.orientation.label());
        Text::with_text_style(&orientation, center + Point::new(0, 20), self.small, self.centered)
            .draw(target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Track;
    use crate::touch::TouchUpdate;
    use crate::ui::PanelLayout;
    use std::time::{Duration, Instant};

    struct MemorySink {
        size: Size,
        pixels: Vec<u8>,
    }

    impl DisplaySink for MemorySink {
        fn size(&self) -> Size {
            self.size
        }

        fn write_pixels(&mut self, pixels: &[u8]) -> Result<()> {
            self.pixels = pixels.to_vec();
            Ok(())
        }
    }

    fn rgb(c: Rgb888) -> image::Rgb<u8> {
        image::Rgb([c.r(), c.g(), c.b()])
    }

    #[test]
    fn rgb565_truncates_each_channel() {
        assert_eq!(rgb565_le(0xFF, 0x00, 0x00), [0x00, 0xF8]);
        assert_eq!(rgb565_le(0x00, 0xFF, 0x00), [0xE0, 0x07]);
        assert_eq!(rgb565_le(0x00, 0x00, 0xFF), [0x1F, 0x00]);
        assert_eq!(rgb565_le(0x07, 0x03, 0x07), [0x00, 0x00]);
        assert_eq!(rgb565_le(0x08, 0x04, 0x08), [0x21, 0x08]);
    }

    #[test]
    fn encoding_is_row_major() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, image::Rgb([0xFF, 0xFF, 0xFF]));
        assert_eq!(encode_rgb565le(&image), vec![0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn mismatched_surface_is_resized_before_write() {
        let compositor = Compositor::new(&ColorScheme::default(), Size::new(8, 4));
        let mut sink = MemorySink {
            size: Size::new(4, 2),
            pixels: Vec::new(),
        };
        let mut image = RgbImage::new(8, 4);
        for pixel in image.pixels_mut() {
            *pixel = image::Rgb([0xFF, 0x00, 0x00]);
        }
        compositor.present(&mut sink, image).unwrap();
        assert_eq!(sink.pixels.len(), 4 * 2 * 2);
        assert!(sink.pixels.chunks(2).all(|px| px == [0x00, 0xF8]));
    }

    #[test]
    fn geometry_comes_from_sysfs_or_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("fb1")).unwrap();
        fs::write(dir.path().join("fb1/virtual_size"), "320,240\n").unwrap();
        assert_eq!(
            framebuffer_geometry(dir.path(), Path::new("/dev/fb1")),
            Size::new(320, 240)
        );
        assert_eq!(
            framebuffer_geometry(dir.path(), Path::new("/dev/fb0")),
            DEFAULT_PANEL_SIZE
        );
        fs::write(dir.path().join("fb1/virtual_size"), "garbage").unwrap();
        assert_eq!(
            framebuffer_geometry(dir.path(), Path::new("/dev/fb1")),
            DEFAULT_PANEL_SIZE
        );
    }

    #[test]
    fn invalid_scheme_colors_fall_back() {
        let mut colors = ColorScheme::default();
        colors.accent = "nope".into();
        let palette = Palette::from_scheme(&colors);
        assert_eq!(palette.accent, Rgb888::new(0xF0, 0xA0, 0x20));
    }

    #[test]
    fn main_screen_highlights_playing_row() {
        let catalog = Catalog::from_tracks(
            (1..=3)
                .map(|number| Track {
                    number,
                    title: format!("Song {number}"),
                })
                .collect(),
        );
        let layout = PanelLayout::from_dimensions(480, 320, true);
        let ui = UiModel::new(layout, catalog.len(), Duration::from_millis(20));
        let compositor = Compositor::new(&ColorScheme::default(), Size::new(480, 320));
        let view = MainView {
            ui: &ui,
            state: PlaybackState::Playing(Some(1)),
            volume: 15,
            catalog: Some(&catalog),
            orientation: Orientation::SwapFlipY,
            note: Some("Playing Song 2"),
        };
        let image = compositor.render_main(&view);
        assert_eq!(image.dimensions(), (480, 320));
        let palette = compositor.palette();
        assert_eq!(*image.get_pixel(0, 0), rgb(palette.background));

        let list = ui.layout().list.unwrap();
        let playing = list.row_rect(1);
        let idle = list.row_rect(0);
        let (px, py) = (playing.top_left.x as u32 + 1, playing.top_left.y as u32 + 1);
        assert_eq!(*image.get_pixel(px, py), rgb(palette.list_selected));
        let (ix, iy) = (idle.top_left.x as u32 + 1, idle.top_left.y as u32 + 1);
        assert_eq!(*image.get_pixel(ix, iy), rgb(palette.background));
    }

    #[test]
    fn slider_is_outlined_while_dragging() {
        let layout = PanelLayout::from_dimensions(480, 320, false);
        let slider = layout.volume;
        let mut ui = UiModel::new(layout, 0, Duration::from_millis(20));
        let compositor = Compositor::new(&ColorScheme::default(), Size::new(480, 320));
        let top_edge = (slider.center().x as u32, slider.top_left.y as u32);
        let render = |ui: &UiModel| {
            compositor.render_main(&MainView {
                ui,
                state: PlaybackState::Idle,
                volume: 0,
                catalog: None,
                orientation: Orientation::Identity,
                note: None,
            })
        };

        let idle = render(&ui);
        assert_ne!(*idle.get_pixel(top_edge.0, top_edge.1), rgb(compositor.palette().accent));

        ui.handle(TouchUpdate::Pressed(slider.center()), Instant::now());
        assert!(ui.is_dragging());
        let dragging = render(&ui);
        assert_eq!(*dragging.get_pixel(top_edge.0, top_edge.1), rgb(compositor.palette().accent));
    }

    #[test]
    fn calibration_screen_marks_target() {
        let compositor = Compositor::new(&ColorScheme::default(), Size::new(480, 320));
        let image = compositor.render_calibration(&CalibrationView {
            target: Point::new(12, 12),
            index: 0,
            orientation: Orientation::Identity,
        });
        assert_eq!(*image.get_pixel(12, 12), rgb(compositor.palette().accent));
        assert_eq!(*image.get_pixel(40, 40), rgb(compositor.palette().background));
    }
}
