//! ANSI terminal escape codes, just enough for colored log output. See
//! <https://en.wikipedia.org/wiki/ANSI_escape_code>.

use core::fmt;

pub(crate) const CLEAR_FORMAT: AnsiEscapeSequence =
    AnsiEscapeSequence::SelectGraphicRendition(SelectGraphicRendition::Reset);

/// An escape sequence value that can be used in format strings; the actual
/// bytes come out of the `Display` impl.
pub(crate) enum AnsiEscapeSequence {
    SelectGraphicRendition(SelectGraphicRendition),
    MoveCursorTopLeft,
    ClearScreenFromCursorToEnd,
}

impl fmt::Display for AnsiEscapeSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1B[")?;
        match self {
            Self::SelectGraphicRendition(sgr) => write!(f, "{sgr}"),
            Self::MoveCursorTopLeft => write!(f, "H"),
            Self::ClearScreenFromCursorToEnd => write!(f, "J"),
        }
    }
}

/// <https://en.wikipedia.org/wiki/ANSI_escape_code#SGR_(Select_Graphic_Rendition)_parameters>
pub(crate) enum SelectGraphicRendition {
    Reset,
    ForegroundColor(Color),
}

impl fmt::Display for SelectGraphicRendition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // N.B. \x1B[ already added from outer `AnsiEscapeSequence` impl
        match self {
            Self::Reset => write!(f, "0")?,
            Self::ForegroundColor(color) => write!(f, "{}", color.foreground_byte())?,
        }
        write!(f, "m")
    }
}

#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub(crate) enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    fn foreground_byte(self) -> u8 {
        match self {
            Self::Black => 30,
            Self::Red => 31,
            Self::Green => 32,
            Self::Yellow => 33,
            Self::Blue => 34,
            Self::Magenta => 35,
            Self::Cyan => 36,
            Self::White => 37,
        }
    }
}
