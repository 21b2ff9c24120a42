//! Display adapter.
//!
//! [`ScreenPresenter`] implements [`PresentationPort`] on top of any
//! [`DisplaySurface`] (a panel driver, or [`LogSurface`] on the serial
//! console).  Layout on the 240x240 panel:
//!
//! ```text
//!   (10,80)  TEMP:      (120,80)  23.1C
//!   (10,140) HUMD:      (120,140) 60%
//!   (10,200) NET UP / NET DN
//! ```
//!
//! The large font only carries the glyphs in [`LARGE_GLYPHS`]; anything
//! else is drawn as a space so the panel never shows garbage.

use core::fmt::Write;
use std::sync::{Mutex, PoisonError};

use log::info;

use crate::app::ports::PresentationPort;

/// Characters the large font can render.
pub const LARGE_GLYPHS: &str = "0123456789.%:-ACDEHIMNPRSTUY ";

/// Longest line the panel fits at the large font size.
pub const MAX_LINE: usize = 16;

pub type Line = heapless::String<MAX_LINE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Black,
    White,
    Red,
    Green,
    Blue,
    Yellow,
}

impl Colour {
    /// RGB565 value as sent to an ST7789.
    pub const fn rgb565(self) -> u16 {
        match self {
            Self::Black => 0x0000,
            Self::White => 0xFFFF,
            Self::Red => 0xF800,
            Self::Green => 0x07E0,
            Self::Blue => 0x001F,
            Self::Yellow => 0xFFE0,
        }
    }
}

/// Minimal drawing contract a panel driver has to offer.
pub trait DisplaySurface {
    fn clear(&mut self, background: Colour);
    fn draw_text(&mut self, x: u16, y: u16, text: &str, fg: Colour, bg: Colour);
}

/// Uppercase and replace every glyph the font lacks with a space.
pub fn sanitize(text: &str) -> Line {
    let mut out = Line::new();
    for c in text.chars().map(|c| c.to_ascii_uppercase()) {
        let c = if LARGE_GLYPHS.contains(c) { c } else { ' ' };
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

fn format_temperature(celsius: f32) -> Line {
    let mut s = Line::new();
    let _ = write!(s, "{:.1}C", celsius);
    s
}

fn format_humidity(pct: f32) -> Line {
    let mut s = Line::new();
    let _ = write!(s, "{:.0}%", pct);
    s
}

// ───────────────────────────────────────────────────────────────
// Presenter
// ───────────────────────────────────────────────────────────────

struct Screen<S> {
    surface: S,
    /// Last link state shown, redrawn after every full clear.
    network_up: Option<bool>,
}

impl<S: DisplaySurface> Screen<S> {
    fn text(&mut self, x: u16, y: u16, text: &str, fg: Colour) {
        self.surface
            .draw_text(x, y, &sanitize(text), fg, Colour::Black);
    }

    fn network_indicator(&mut self) {
        match self.network_up {
            Some(true) => self.text(10, 200, "NET UP", Colour::Green),
            Some(false) => self.text(10, 200, "NET DN", Colour::Red),
            None => {}
        }
    }
}

/// Presentation port over a single display surface.
///
/// Both loops present through one shared instance; the surface sits
/// behind a mutex so their draw sequences never interleave.
pub struct ScreenPresenter<S> {
    screen: Mutex<Screen<S>>,
}

impl<S: DisplaySurface> ScreenPresenter<S> {
    pub fn new(surface: S) -> Self {
        Self {
            screen: Mutex::new(Screen {
                surface,
                network_up: None,
            }),
        }
    }

    fn with_screen(&self, f: impl FnOnce(&mut Screen<S>)) {
        let mut screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut screen);
    }

    /// Boot splash shown until the first cycle completes.
    pub fn splash(&self) {
        self.with_screen(|s| {
            s.surface.clear(Colour::Black);
            s.text(50, 80, "SYSTEM", Colour::Green);
            s.text(50, 140, "READY", Colour::Green);
        });
    }

    /// Hand the surface back, e.g. for inspection in tests.
    pub fn into_surface(self) -> S {
        self.screen
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .surface
    }
}

impl<S: DisplaySurface> PresentationPort for ScreenPresenter<S> {
    fn show_reading(&self, temperature_c: f32, humidity_pct: f32) {
        self.with_screen(|s| {
            s.surface.clear(Colour::Black);
            s.text(10, 80, "TEMP:", Colour::White);
            s.text(120, 80, &format_temperature(temperature_c), Colour::Red);
            s.text(10, 140, "HUMD:", Colour::White);
            s.text(120, 140, &format_humidity(humidity_pct), Colour::Blue);
            s.network_indicator();
        });
    }

    fn show_warning(&self, consecutive_failures: u32) {
        self.with_screen(|s| {
            s.surface.clear(Colour::Black);
            s.text(20, 80, "DHT ERR", Colour::Yellow);
            let mut line = Line::new();
            let _ = write!(line, "MISS: {}", consecutive_failures);
            s.text(20, 140, &line, Colour::Yellow);
            s.network_indicator();
        });
    }

    fn show_fatal(&self, message: &str) {
        self.with_screen(|s| {
            s.surface.clear(Colour::Black);
            s.text(20, 80, "DHT ERR", Colour::Red);
            s.text(20, 140, message, Colour::Red);
        });
    }

    fn show_network_state(&self, connected: bool) {
        self.with_screen(|s| {
            s.network_up = Some(connected);
            s.network_indicator();
        });
    }
}

// ───────────────────────────────────────────────────────────────
// Serial console surface
// ───────────────────────────────────────────────────────────────

/// Surface that writes every draw call to the log instead of a panel.
#[derive(Debug, Default)]
pub struct LogSurface;

impl LogSurface {
    pub fn new() -> Self {
        Self
    }
}

impl DisplaySurface for LogSurface {
    fn clear(&mut self, _background: Colour) {
        info!("DISPLAY | clear");
    }

    fn draw_text(&mut self, x: u16, y: u16, text: &str, fg: Colour, _bg: Colour) {
        info!("DISPLAY | ({:>3},{:>3}) #{:04X} {}", x, y, fg.rgb565(), text);
    }
}
