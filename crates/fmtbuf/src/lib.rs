//! Bounded text formatting with no allocator and no `core::fmt`.
//!
//! The engine walks a format string against a slice of explicitly tagged
//! arguments. Directives:
//!
//! - `%d` renders a signed decimal ([`Arg::Int`], [`Arg::Long`]).
//! - `%x` renders lowercase hexadecimal at a fixed width of two digits per
//!   byte of the argument's tagged width ([`Arg::Hex8`] through
//!   [`Arg::Hex64`]).
//! - `%p` renders a literal `0x` followed by the `%x` form of the argument.
//! - `%s` copies a string slice, `%c` a single character.
//! - `l` inside a directive is accepted (`%ld`, `%lx`) but the operand
//!   width always comes from the argument tag.
//! - Any other character after `%` silently drops the directive and parsing
//!   returns to literal text. There is no escape for a literal `%`.
//!
//! A directive whose argument is missing, or whose argument carries a tag
//! from the wrong family, emits nothing; the argument is still consumed.
//!
//! Formatting runs in one of two modes sharing this engine: [`measure`]
//! computes the exact output length without writing a byte, and [`render`]
//! fills a caller-supplied buffer, truncating silently and always
//! NUL-terminating when the buffer is non-empty. Both return the full
//! logical length, so the measure-then-render idiom can size a buffer
//! precisely before committing bytes to it.

#![cfg_attr(not(test), no_std)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cargo_common_metadata,
    clippy::implicit_return,
    clippy::missing_const_for_fn,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

/// A formatting argument with an explicit width tag.
///
/// The tag, not the directive, decides how many bytes of operand exist; the
/// directive only picks the rendered form.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    /// 32-bit signed decimal operand.
    Int(i32),
    /// 64-bit signed decimal operand.
    Long(i64),
    /// Hexadecimal operand rendered as 2 digits.
    Hex8(u8),
    /// Hexadecimal operand rendered as 4 digits.
    Hex16(u16),
    /// Hexadecimal operand rendered as 8 digits.
    Hex32(u32),
    /// Hexadecimal operand rendered as 16 digits.
    Hex64(u64),
    /// String slice copied verbatim.
    Str(&'a str),
    /// Single character, UTF-8 encoded.
    Char(char),
}

/// Byte-oriented output device. The single required method blocks until the
/// byte is accepted.
pub trait ByteSink {
    fn put_byte(&mut self, byte: u8);

    fn put_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.put_byte(byte);
        }
    }
}

/// Scratch buffer too small for the rendered text plus its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub needed: usize,
    pub capacity: usize,
}

/// Computes the length the formatted text would occupy, writing nothing.
pub fn measure(fmt: &str, args: &[Arg]) -> usize {
    Cursor::new(None).run(fmt, args)
}

/// Formats into `out`, truncating past `out.len() - 1` and NUL-terminating
/// whenever `out` is non-empty. Returns the full untruncated length, which
/// may exceed what was written.
pub fn render(out: &mut [u8], fmt: &str, args: &[Arg]) -> usize {
    let mut cursor = Cursor::new(Some(out));
    let len = cursor.run(fmt, args);
    cursor.terminate();
    len
}

/// Renders through `scratch` and forwards the text to `sink`, or reports
/// that the scratch buffer cannot hold it. Nothing reaches the sink on
/// overflow.
pub fn try_write_to<S: ByteSink + ?Sized>(
    sink: &mut S,
    scratch: &mut [u8],
    fmt: &str,
    args: &[Arg],
) -> Result<usize, Overflow> {
    let needed = measure(fmt, args);
    if needed + 1 > scratch.len() {
        return Err(Overflow {
            needed,
            capacity: scratch.len(),
        });
    }
    let len = render(scratch, fmt, args);
    sink.put_bytes(&scratch[..len]);
    Ok(len)
}

/// Like [`try_write_to`], but an undersized scratch buffer is fatal.
/// Diagnostic text must never be silently cut short, so the one recovery
/// is a bigger buffer at the call site.
pub fn write_to<S: ByteSink + ?Sized>(
    sink: &mut S,
    scratch: &mut [u8],
    fmt: &str,
    args: &[Arg],
) -> usize {
    match try_write_to(sink, scratch, fmt, args) {
        Ok(len) => len,
        Err(overflow) => panic!(
            "formatted output needs {} bytes, scratch holds {}",
            overflow.needed, overflow.capacity
        ),
    }
}

/// Directive parse state. `DirectiveLong` is `Directive` after an `l`
/// modifier; rendering treats them identically since widths come from
/// argument tags.
#[derive(Debug, Clone, Copy)]
enum Mode {
    Literal,
    Directive,
    DirectiveLong,
}

/// Per-call engine state: the output position and parse mode. A cursor
/// lives for exactly one measure or render pass.
struct Cursor<'a> {
    out: Option<&'a mut [u8]>,
    pos: usize,
    mode: Mode,
}

impl<'a> Cursor<'a> {
    fn new(out: Option<&'a mut [u8]>) -> Self {
        Self {
            out,
            pos: 0,
            mode: Mode::Literal,
        }
    }

    fn run(&mut self, fmt: &str, args: &[Arg]) -> usize {
        let mut args = args.iter();
        for byte in fmt.bytes() {
            match self.mode {
                Mode::Literal => {
                    if byte == b'%' {
                        self.mode = Mode::Directive;
                    } else {
                        self.put(byte);
                    }
                }
                Mode::Directive | Mode::DirectiveLong => self.directive(byte, &mut args),
            }
        }
        self.pos
    }

    fn directive(&mut self, byte: u8, args: &mut core::slice::Iter<Arg>) {
        match byte {
            b'l' => {
                self.mode = Mode::DirectiveLong;
                return;
            }
            b'd' => {
                if let Some(arg) = args.next() {
                    self.decimal(arg);
                }
            }
            b'x' => {
                if let Some(arg) = args.next() {
                    self.hex(arg);
                }
            }
            b'p' => {
                if let Some(arg) = args.next() {
                    self.put(b'0');
                    self.put(b'x');
                    self.hex(arg);
                }
            }
            b's' => {
                if let Some(Arg::Str(s)) = args.next() {
                    for b in s.bytes() {
                        self.put(b);
                    }
                }
            }
            b'c' => {
                if let Some(Arg::Char(c)) = args.next() {
                    let mut encoded = [0u8; 4];
                    for &b in c.encode_utf8(&mut encoded).as_bytes() {
                        self.put(b);
                    }
                }
            }
            // Unknown directive: drop it and fall back to literal text.
            _ => {}
        }
        self.mode = Mode::Literal;
    }

    fn decimal(&mut self, arg: &Arg) {
        let value = match arg {
            Arg::Int(v) => i64::from(*v),
            Arg::Long(v) => *v,
            _ => return,
        };
        if value < 0 {
            self.put(b'-');
        }
        let magnitude = value.unsigned_abs();

        // Count digits up front: they are stored by index with the most
        // significant at the current position, so the width must be known
        // before the first digit lands.
        let mut digits = 1;
        let mut probe = magnitude;
        while probe >= 10 {
            probe /= 10;
            digits += 1;
        }

        let mut rest = magnitude;
        for i in (0..digits).rev() {
            self.put_at(i, b'0' + (rest % 10) as u8);
            rest /= 10;
        }
        self.advance(digits);
    }

    fn hex(&mut self, arg: &Arg) {
        let (value, digits) = match arg {
            Arg::Hex8(v) => (u64::from(*v), 2),
            Arg::Hex16(v) => (u64::from(*v), 4),
            Arg::Hex32(v) => (u64::from(*v), 8),
            Arg::Hex64(v) => (*v, 16),
            _ => return,
        };
        for i in (0..digits).rev() {
            let digit = ((value >> (4 * i)) & 0xF) as u8;
            self.put(if digit < 10 {
                b'0' + digit
            } else {
                b'a' + digit - 10
            });
        }
    }

    /// Emits one byte at the current position and advances past it. Bytes
    /// beyond the buffer still advance the position; truncation must not
    /// disturb the logical length.
    fn put(&mut self, byte: u8) {
        if let Some(out) = self.out.as_deref_mut() {
            if self.pos < out.len() {
                out[self.pos] = byte;
            }
        }
        self.pos += 1;
    }

    /// Stores one byte at `offset` past the current position without
    /// advancing; the decimal digit fill places digits by index.
    fn put_at(&mut self, offset: usize, byte: u8) {
        if let Some(out) = self.out.as_deref_mut() {
            let at = self.pos + offset;
            if at < out.len() {
                out[at] = byte;
            }
        }
    }

    fn advance(&mut self, count: usize) {
        self.pos += count;
    }

    /// NUL-terminates at the current position, or at the final byte when
    /// the text was truncated.
    fn terminate(&mut self) {
        if let Some(out) = self.out.as_deref_mut() {
            if self.pos < out.len() {
                out[self.pos] = 0;
            } else if let Some(last) = out.last_mut() {
                *last = 0;
            }
        }
    }
}
