use core::fmt::Write;

use fmtbuf::ByteSink;
use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::MmioSerialPort;

use crate::ansiterm;
use crate::platform;

lazy_static! {
    pub static ref SERIAL1: Mutex<MmioSerialPort> = {
        let mut serial_port = unsafe { MmioSerialPort::new(platform::UART_BASE) };
        serial_port.init();

        // OpenSBI has already printed its banner by the time we run; reset
        // the terminal so our output starts on a clean screen.
        write!(
            serial_port,
            "{}{}{}",
            ansiterm::CLEAR_FORMAT,
            ansiterm::AnsiEscapeSequence::MoveCursorTopLeft,
            ansiterm::AnsiEscapeSequence::ClearScreenFromCursorToEnd,
        )
        .expect("Failed to reset terminal");

        Mutex::new(serial_port)
    };
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    // Single hart, and no interrupt handlers are installed that could take
    // this lock, so a plain lock cannot deadlock.
    SERIAL1
        .lock()
        .write_fmt(args)
        .expect("Printing to serial failed");
}

/// Prints to the host through the serial interface.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

/// Prints to the host through the serial interface, appending a newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

/// Byte-sequence writer over the UART, for formatter output that bypasses
/// `core::fmt`.
pub struct SerialSink;

impl ByteSink for SerialSink {
    fn put_byte(&mut self, byte: u8) {
        SERIAL1.lock().send_raw(byte);
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        // One lock per line, not per byte.
        let mut port = SERIAL1.lock();
        for &byte in bytes {
            port.send_raw(byte);
        }
    }
}
