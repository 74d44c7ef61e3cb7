//! PCI configuration-space access, device discovery, and BAR decoding over
//! the memory-mapped configuration mechanism (ECAM).
//!
//! The crate is hardware-independent: [`Ecam`] talks to a real
//! configuration window through volatile registers, while anything
//! implementing [`ConfigSpace`] (the test suites use an in-memory bus) can
//! stand in for it. Discovery and decoding narrate their progress through a
//! [`fmtbuf::ByteSink`], since the serial console may be the only
//! observability a bring-up environment has.

#![cfg_attr(not(test), no_std)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_lossless,
    clippy::cargo_common_metadata,
    clippy::implicit_return,
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::redundant_pub_crate,
    clippy::unreadable_literal
)]

mod access;
mod bar;
mod scan;

pub use access::{offset, ClassCode, Command, ConfigSpace, Ecam, HeaderInfo, WriteMismatch};
pub use bar::{probe_bar, AssignError, BarAccessError, BarSpace, PciBar};
pub use scan::{find_device, DeviceId, DeviceLocation};

#[cfg(test)]
pub(crate) mod testutil {
    use std::cell::{Cell, RefCell};

    use crate::ConfigSpace;

    /// One simulated function's configuration header: register values plus
    /// a writable-bit mask per register. BAR size masks live in the write
    /// mask, which makes all-ones probing behave the way QEMU models it.
    pub(crate) struct SimDevice {
        pub(crate) bus: u8,
        pub(crate) device: u8,
        pub(crate) function: u8,
        pub(crate) regs: [u32; 64],
        pub(crate) write_mask: [u32; 64],
    }

    impl SimDevice {
        pub(crate) fn new(bus: u8, device: u8, function: u8, vendor: u16, device_id: u16) -> Self {
            let mut regs = [0u32; 64];
            regs[0] = u32::from(vendor) | (u32::from(device_id) << 16);
            let mut write_mask = [0u32; 64];
            // Command bits: I/O, memory, bus master.
            write_mask[1] = 0x0000_0007;
            Self {
                bus,
                device,
                function,
                regs,
                write_mask,
            }
        }

        pub(crate) fn with_class(mut self, class: u8, subclass: u8, prog_if: u8) -> Self {
            self.regs[2] =
                u32::from(class) << 24 | u32::from(subclass) << 16 | u32::from(prog_if) << 8;
            self
        }

        /// Memory BAR of `size` bytes: address bits above the size are
        /// writable, the low nibble holds the read-only flag bits.
        pub(crate) fn with_memory_bar(mut self, index: u8, size: u32, flags: u32) -> Self {
            let reg = 4 + index as usize;
            self.regs[reg] = flags;
            self.write_mask[reg] = !(size - 1) & !0xF;
            self
        }

        pub(crate) fn with_io_bar(mut self, index: u8, size: u32) -> Self {
            let reg = 4 + index as usize;
            self.regs[reg] = 0x1;
            self.write_mask[reg] = !(size - 1) & !0x3;
            self
        }
    }

    /// In-memory configuration space. Reads of absent functions return
    /// all-ones like real hardware; stores honor each register's writable
    /// bits.
    pub(crate) struct SimBus {
        pub(crate) devices: RefCell<Vec<SimDevice>>,
        /// Vendor/device register reads, for scan-order assertions.
        pub(crate) vendor_reads: Cell<usize>,
    }

    impl SimBus {
        pub(crate) fn new(devices: Vec<SimDevice>) -> Self {
            Self {
                devices: RefCell::new(devices),
                vendor_reads: Cell::new(0),
            }
        }

        /// Raw register peek for assertions; bypasses the counters.
        pub(crate) fn register(&self, bus: u8, device: u8, function: u8, offset: u16) -> u32 {
            let slot = (offset & 0xFFC) as usize / 4;
            self.devices
                .borrow()
                .iter()
                .find(|d| d.bus == bus && d.device == device && d.function == function)
                .map_or(0xFFFF_FFFF, |d| d.regs[slot])
        }
    }

    impl ConfigSpace for SimBus {
        fn read32(&self, bus: u8, device: u8, function: u8, offset: u16) -> u32 {
            let slot = (offset & 0xFFC) as usize / 4;
            if slot == 0 {
                self.vendor_reads.set(self.vendor_reads.get() + 1);
            }
            self.devices
                .borrow()
                .iter()
                .find(|d| d.bus == bus && d.device == device && d.function == function)
                .map_or(0xFFFF_FFFF, |d| d.regs[slot])
        }

        fn read16(&self, bus: u8, device: u8, function: u8, offset: u16) -> u16 {
            (self.read32(bus, device, function, offset) & 0xFFFF) as u16
        }

        fn store32(&self, bus: u8, device: u8, function: u8, offset: u16, value: u32) {
            let slot = (offset & 0xFFC) as usize / 4;
            if let Some(d) = self
                .devices
                .borrow_mut()
                .iter_mut()
                .find(|d| d.bus == bus && d.device == device && d.function == function)
            {
                let mask = d.write_mask[slot];
                d.regs[slot] = (d.regs[slot] & !mask) | (value & mask);
            }
        }

        fn store16(&self, bus: u8, device: u8, function: u8, offset: u16, value: u16) {
            let current = self.register(bus, device, function, offset);
            let merged = (current & 0xFFFF_0000) | u32::from(value);
            self.store32(bus, device, function, offset, merged);
        }
    }

    pub(crate) struct VecSink(pub(crate) Vec<u8>);

    impl VecSink {
        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0).into_owned()
        }
    }

    impl fmtbuf::ByteSink for VecSink {
        fn put_byte(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }
}
