#![no_std]
#![no_main]

mod ansiterm;
mod framebuffer;
mod logging;
mod platform;
mod serial;
mod vbe;

use embedded_graphics::mono_font::ascii::FONT_7X14;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::Text;
use fmtbuf::Arg;
use pci::{
    offset, AssignError, BarAccessError, ConfigSpace, Ecam, HeaderInfo, PciBar, WriteMismatch,
};

core::arch::global_asm!(
    r#"
.section .text.boot
.global _start
.align 4
_start:
    la sp, __stack_top
    j kernel_entry
"#
);

#[no_mangle]
extern "C" fn kernel_entry() -> ! {
    extern "C" {
        static mut __bss: u8;
        static mut __bss_end: u8;
    }

    // OpenSBI hands over with BSS untouched; clear it before any static is
    // used.
    unsafe {
        let bss = core::ptr::addr_of_mut!(__bss);
        let bss_end = core::ptr::addr_of_mut!(__bss_end);
        bss.write_bytes(0, bss_end as usize - bss as usize);
    }

    kmain()
}

fn kmain() -> ! {
    logging::init();
    log::info!("ochre {} booting", env!("CARGO_PKG_VERSION"));

    match bring_up_display() {
        Ok(()) => log::info!("display ready"),
        Err(err) => log::error!("display bring-up failed: {err:?}"),
    }

    park()
}

#[derive(Debug)]
enum BringUpError {
    DisplayNotFound,
    BarProbe { index: u8 },
    BarPlacement(AssignError),
    CommandWrite(WriteMismatch),
    UnexpectedDispiId(u16),
    Dispi(BarAccessError),
}

/// Finds the display on the PCI bus, places its windows, and brings the
/// framebuffer up at 640x480.
fn bring_up_display() -> Result<(), BringUpError> {
    let config = unsafe { Ecam::new(platform::ECAM_BASE) };
    let mut sink = serial::SerialSink;

    let location = pci::find_device(&config, &mut sink, platform::DISPLAY_ID);
    if !location.is_present() {
        return Err(BringUpError::DisplayNotFound);
    }

    let header = HeaderInfo::from(config.read32(location.bus, location.device, 0, offset::HEADER));
    if header.header_type() != 0 {
        log::warn!(
            "display reports header type {:#04x}, expected a regular function",
            header.header_type()
        );
    }

    let mut framebuffer_bar = pci::probe_bar(&config, &mut sink, location, 0);
    if !framebuffer_bar.mapped {
        return Err(BringUpError::BarProbe { index: 0 });
    }
    let mut dispi_bar = pci::probe_bar(&config, &mut sink, location, 2);
    if !dispi_bar.mapped {
        return Err(BringUpError::BarProbe { index: 2 });
    }

    framebuffer_bar
        .assign(&config, platform::FRAMEBUFFER_WINDOW)
        .map_err(BringUpError::BarPlacement)?;
    dispi_bar
        .assign(&config, platform::MMIO_WINDOW)
        .map_err(BringUpError::BarPlacement)?;
    location
        .enable_memory_space(&config)
        .map_err(BringUpError::CommandWrite)?;

    let dispi = vbe::Dispi::new(&dispi_bar);
    let id = dispi.id().map_err(BringUpError::Dispi)?;
    if id & 0xFFF0 != vbe::DISPI_ID_FAMILY {
        return Err(BringUpError::UnexpectedDispiId(id));
    }
    log::info!("DISPI interface {id:#06x}");

    dispi
        .set_mode(
            platform::DISPLAY_WIDTH as u16,
            platform::DISPLAY_HEIGHT as u16,
        )
        .map_err(BringUpError::Dispi)?;

    let mut framebuffer = unsafe {
        framebuffer::Framebuffer::new(
            platform::FRAMEBUFFER_WINDOW as *mut u32,
            platform::DISPLAY_WIDTH,
            platform::DISPLAY_HEIGHT,
        )
    };
    draw_splash(&mut framebuffer, &framebuffer_bar);

    Ok(())
}

fn draw_splash(framebuffer: &mut framebuffer::Framebuffer, bar: &PciBar) {
    let border = PrimitiveStyle::with_stroke(Rgb888::new(0xCC, 0x77, 0x22), 2);
    Rectangle::new(Point::zero(), framebuffer.size())
        .into_styled(border)
        .draw(framebuffer)
        .unwrap();

    let style = MonoTextStyle::new(&FONT_7X14, Rgb888::WHITE);
    Text::new("ochre", Point::new(24, 40), style)
        .draw(framebuffer)
        .unwrap();

    let mut line = [0u8; 96];
    let written = fmtbuf::render(
        &mut line,
        "framebuffer at %p, %ldx%ld @ 32bpp",
        &[
            Arg::Hex64(bar.base as u64),
            Arg::Long(platform::DISPLAY_WIDTH as i64),
            Arg::Long(platform::DISPLAY_HEIGHT as i64),
        ],
    );
    let len = written.min(line.len() - 1);
    if let Ok(text) = core::str::from_utf8(&line[..len]) {
        Text::new(text, Point::new(24, 64), style)
            .draw(framebuffer)
            .unwrap();
    }
}

#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    crate::serial_println!("PANIC: {info}");
    park()
}

fn park() -> ! {
    loop {
        unsafe { core::arch::asm!("wfi") };
    }
}
