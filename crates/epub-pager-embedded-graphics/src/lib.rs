//! embedded-graphics measurer and drawer for `epub-pager-layout` pages.
//!
//! [`EgTextMeasurer`] feeds layout the same mono-font widths that
//! [`EgDrawer`] rasterizes with, so line breaks match what lands on the
//! panel.

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

use embedded_graphics::{
    mono_font::{
        ascii::{
            FONT_10X20, FONT_6X13_BOLD, FONT_6X13_ITALIC, FONT_6X9, FONT_7X13_ITALIC, FONT_7X14,
            FONT_7X14_BOLD, FONT_8X13, FONT_8X13_BOLD, FONT_8X13_ITALIC, FONT_9X18,
            FONT_9X18_BOLD,
        },
        MonoFont, MonoTextStyle,
    },
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use epub_pager_layout::{
    FontStyle, LayoutConfig, LayoutEngine, PageLayout, TextBounds, TextDrawer, TextMeasurer,
    WordSource,
};
use std::borrow::Cow;

/// Backend-local font identifier.
pub type FontId = u8;

/// Metrics of one font face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontMetrics {
    pub char_width: i32,
    pub space_width: i32,
    pub char_height: i32,
}

/// Font abstraction shared by the measurer and the drawer.
pub trait FontBackend {
    fn resolve_font(&self, style: FontStyle) -> FontId;
    fn metrics(&self, font_id: FontId) -> FontMetrics;
    fn draw_text_run<D>(
        &self,
        display: &mut D,
        font_id: FontId,
        text: &str,
        origin: Point,
    ) -> Result<i32, D::Error>
    where
        D: DrawTarget<Color = BinaryColor>;

    /// Baseline-to-baseline advance that fits every face of the backend.
    fn line_height(&self) -> i32 {
        [
            FontStyle::Regular,
            FontStyle::Bold,
            FontStyle::Italic,
            FontStyle::BoldItalic,
        ]
        .into_iter()
        .map(|style| self.metrics(self.resolve_font(style)).char_height)
        .max()
        .unwrap_or(0)
            + 2
    }
}

/// Mono font size bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FontSize {
    /// 6 px wide.
    Small,
    /// 7 px wide.
    #[default]
    Medium,
    /// 8 px wide.
    Large,
    /// 9-10 px wide.
    ExtraLarge,
}

/// Built-in mono fonts, one size bucket per backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonoFontBackend {
    size: FontSize,
}

impl MonoFontBackend {
    const VARIANT_REGULAR: FontId = 0;
    const VARIANT_ITALIC: FontId = 1;
    const VARIANT_BOLD: FontId = 2;
    const VARIANT_BOLD_ITALIC: FontId = 3;

    /// Backend for one size bucket.
    pub fn new(size: FontSize) -> Self {
        Self { size }
    }

    /// Size bucket in use.
    pub fn size(&self) -> FontSize {
        self.size
    }

    fn encode_font_id(size: FontSize, variant: FontId) -> FontId {
        let bucket = match size {
            FontSize::Small => 0,
            FontSize::Medium => 1,
            FontSize::Large => 2,
            FontSize::ExtraLarge => 3,
        };
        (bucket << 2) | (variant & 0x03)
    }

    fn variant_for(style: FontStyle) -> FontId {
        match style {
            FontStyle::Regular => Self::VARIANT_REGULAR,
            FontStyle::Italic => Self::VARIANT_ITALIC,
            FontStyle::Bold => Self::VARIANT_BOLD,
            FontStyle::BoldItalic => Self::VARIANT_BOLD_ITALIC,
        }
    }

    fn font_for(font_id: FontId) -> &'static MonoFont<'static> {
        match ((font_id >> 2) & 0x03, font_id & 0x03) {
            (0, Self::VARIANT_REGULAR) => &FONT_6X9,
            (0, Self::VARIANT_ITALIC) => &FONT_6X13_ITALIC,
            (0, _) => &FONT_6X13_BOLD,
            (1, Self::VARIANT_REGULAR) => &FONT_7X14,
            (1, Self::VARIANT_ITALIC) => &FONT_7X13_ITALIC,
            (1, _) => &FONT_7X14_BOLD,
            (2, Self::VARIANT_REGULAR) => &FONT_8X13,
            (2, Self::VARIANT_ITALIC) => &FONT_8X13_ITALIC,
            (2, _) => &FONT_8X13_BOLD,
            (_, Self::VARIANT_REGULAR) => &FONT_10X20,
            (_, Self::VARIANT_ITALIC) => &FONT_9X18,
            (_, _) => &FONT_9X18_BOLD,
        }
    }

    fn style_for(font_id: FontId) -> MonoTextStyle<'static, BinaryColor> {
        MonoTextStyle::new(Self::font_for(font_id), BinaryColor::On)
    }
}

impl FontBackend for MonoFontBackend {
    fn resolve_font(&self, style: FontStyle) -> FontId {
        if style == FontStyle::BoldItalic {
            log::trace!("[EG] no bold italic mono face, using bold");
        }
        Self::encode_font_id(self.size, Self::variant_for(style))
    }

    fn metrics(&self, font_id: FontId) -> FontMetrics {
        let font = Self::font_for(font_id);
        let width = (font.character_size.width + font.character_spacing) as i32;
        FontMetrics {
            char_width: width,
            space_width: width,
            char_height: font.character_size.height as i32,
        }
    }

    fn draw_text_run<D>(
        &self,
        display: &mut D,
        font_id: FontId,
        text: &str,
        origin: Point,
    ) -> Result<i32, D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let style = Self::style_for(font_id);
        let normalized = normalize_text_for_mono(text);
        Text::with_baseline(normalized.as_ref(), origin, style, Baseline::Top).draw(display)?;
        Ok(normalized.chars().count() as i32 * self.metrics(font_id).char_width)
    }
}

/// [`TextMeasurer`] backed by a [`FontBackend`].
#[derive(Clone, Debug, Default)]
pub struct EgTextMeasurer<B = MonoFontBackend> {
    backend: B,
}

impl EgTextMeasurer<MonoFontBackend> {
    /// Measurer over the built-in mono fonts.
    pub fn new(size: FontSize) -> Self {
        Self {
            backend: MonoFontBackend::new(size),
        }
    }
}

impl<B: FontBackend> EgTextMeasurer<B> {
    /// Measurer over an explicit backend.
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Backend in use.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: FontBackend> TextMeasurer for EgTextMeasurer<B> {
    fn measure_text(&self, text: &str, style: FontStyle) -> TextBounds {
        let metrics = self.backend.metrics(self.backend.resolve_font(style));
        let mut width = 0;
        for ch in normalize_text_for_mono(text).chars() {
            width += if ch == ' ' {
                metrics.space_width
            } else {
                metrics.char_width
            };
        }
        TextBounds {
            width,
            height: metrics.char_height,
        }
    }

    fn space_width(&self, style: FontStyle) -> i32 {
        self.backend
            .metrics(self.backend.resolve_font(style))
            .space_width
    }
}

/// [`TextDrawer`] that rasterizes onto a binary `DrawTarget`.
pub struct EgDrawer<'a, D, B = MonoFontBackend> {
    display: &'a mut D,
    backend: B,
    style: FontStyle,
    cursor: Point,
}

impl<'a, D> EgDrawer<'a, D, MonoFontBackend>
where
    D: DrawTarget<Color = BinaryColor>,
{
    /// Drawer over the built-in mono fonts.
    pub fn new(display: &'a mut D, size: FontSize) -> Self {
        Self::with_backend(display, MonoFontBackend::new(size))
    }
}

impl<'a, D, B> EgDrawer<'a, D, B>
where
    D: DrawTarget<Color = BinaryColor>,
    B: FontBackend,
{
    /// Drawer over an explicit backend.
    pub fn with_backend(display: &'a mut D, backend: B) -> Self {
        Self {
            display,
            backend,
            style: FontStyle::Regular,
            cursor: Point::zero(),
        }
    }
}

impl<D, B> TextDrawer for EgDrawer<'_, D, B>
where
    D: DrawTarget<Color = BinaryColor>,
    B: FontBackend,
{
    type Error = D::Error;

    fn set_style(&mut self, style: FontStyle) {
        self.style = style;
    }

    fn set_cursor(&mut self, x: i32, y: i32) {
        self.cursor = Point::new(x, y);
    }

    fn print(&mut self, text: &str) -> Result<(), Self::Error> {
        let font_id = self.backend.resolve_font(self.style);
        let advance = self
            .backend
            .draw_text_run(&mut *self.display, font_id, text, self.cursor)?;
        self.cursor.x += advance;
        Ok(())
    }
}

/// Layout config sized to `display` with line height from `backend`.
pub fn layout_config_for<D, B>(display: &D, backend: &B) -> LayoutConfig
where
    D: OriginDimensions,
    B: FontBackend,
{
    let size = display.size();
    LayoutConfig::for_display(size.width as i32, size.height as i32)
        .with_line_height(backend.line_height())
}

/// Lay out the page at the source cursor and draw it in one step.
pub fn render_text_page<S, D>(
    engine: &LayoutEngine,
    source: &mut S,
    display: &mut D,
    size: FontSize,
) -> Result<PageLayout, D::Error>
where
    S: WordSource + ?Sized,
    D: DrawTarget<Color = BinaryColor>,
{
    let measurer = EgTextMeasurer::new(size);
    let page = engine.layout_text(source, &measurer);
    engine.render_page(&page, &mut EgDrawer::new(display, size))?;
    Ok(page)
}

fn normalize_text_for_mono(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|ch| {
        matches!(
            ch,
            '\u{00A0}' | '\u{2013}' | '\u{2014}' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}'
                | '\u{2026}'
        )
    }) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{00A0}' => out.push(' '),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2026}' => out.push_str("..."),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}
