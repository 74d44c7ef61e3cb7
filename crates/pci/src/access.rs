//! Configuration-space primitives: the ECAM address computation, verified
//! writes, and typed views of the common header registers.
//!
//! See <https://wiki.osdev.org/PCI_Express#Enhanced_Configuration_Mechanism>
//! for the address layout and <https://wiki.osdev.org/PCI#PCI_Device_Structure>
//! for the header registers.

use bitfield_struct::bitfield;

use registers::{RegisterRO, RegisterRW};

/// Register offsets into a function's 256-byte configuration header.
pub mod offset {
    /// Vendor ID in the low half, device ID in the high half.
    pub const VENDOR_DEVICE: u16 = 0x00;
    /// Command in the low half, status in the high half.
    pub const COMMAND: u16 = 0x04;
    /// Class, subclass, prog-if, and revision, packed high to low.
    pub const CLASS: u16 = 0x08;
    /// BIST, header type, latency timer, and cache line size.
    pub const HEADER: u16 = 0x0C;
    /// First base address register; five more follow at 4-byte strides.
    pub const BAR0: u16 = 0x10;

    pub const fn bar(index: u8) -> u16 {
        BAR0 + 4 * index as u16
    }
}

const ALL_ONES32: u32 = 0xFFFF_FFFF;
const ALL_ONES16: u16 = 0xFFFF;

/// A verified write came back different.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMismatch {
    pub wrote: u32,
    pub read_back: u32,
}

/// Raw access to PCI configuration space.
///
/// Implementations provide the four raw operations; the verified writes are
/// layered on top. The 16-bit operations address the low half of the
/// containing aligned word, since every offset is snapped to its 4-byte slot
/// before the access.
pub trait ConfigSpace {
    fn read32(&self, bus: u8, device: u8, function: u8, offset: u16) -> u32;
    fn read16(&self, bus: u8, device: u8, function: u8, offset: u16) -> u16;

    /// Store without read-back. Prefer [`ConfigSpace::write32`].
    fn store32(&self, bus: u8, device: u8, function: u8, offset: u16, value: u32);
    /// Store without read-back. Prefer [`ConfigSpace::write16`].
    fn store16(&self, bus: u8, device: u8, function: u8, offset: u16, value: u16);

    /// Stores `value`, then reads the register back and reports a mismatch.
    ///
    /// The all-ones sentinel is exempt from verification: it is the BAR size
    /// probe, and hardware legitimately hands back a different value there.
    /// Absent or read-only registers also read back as all-ones, so a write
    /// of that value proves nothing either way.
    fn write32(
        &self,
        bus: u8,
        device: u8,
        function: u8,
        offset: u16,
        value: u32,
    ) -> Result<(), WriteMismatch> {
        self.store32(bus, device, function, offset, value);
        if value == ALL_ONES32 {
            return Ok(());
        }
        let read_back = self.read32(bus, device, function, offset);
        if read_back == value {
            Ok(())
        } else {
            Err(WriteMismatch {
                wrote: value,
                read_back,
            })
        }
    }

    /// 16-bit flavor of [`ConfigSpace::write32`], same sentinel rule.
    fn write16(
        &self,
        bus: u8,
        device: u8,
        function: u8,
        offset: u16,
        value: u16,
    ) -> Result<(), WriteMismatch> {
        self.store16(bus, device, function, offset, value);
        if value == ALL_ONES16 {
            return Ok(());
        }
        let read_back = self.read16(bus, device, function, offset);
        if read_back == value {
            Ok(())
        } else {
            Err(WriteMismatch {
                wrote: u32::from(value),
                read_back: u32::from(read_back),
            })
        }
    }
}

/// The memory-mapped configuration window (Enhanced Configuration Access
/// Mechanism). Each function owns a 4 KiB region; the address is recomputed
/// per access, never stored.
#[derive(Debug, Clone, Copy)]
pub struct Ecam {
    base: usize,
}

impl Ecam {
    /// # Safety
    ///
    /// `base` must be the physical address of an ECAM window that stays
    /// identity-mapped for the lifetime of the value.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

const fn ecam_address(base: usize, bus: u8, device: u8, function: u8, offset: u16) -> usize {
    base | ((bus as usize) << 20)
        | ((device as usize) << 15)
        | ((function as usize) << 12)
        | (offset & 0xFFC) as usize
}

impl ConfigSpace for Ecam {
    fn read32(&self, bus: u8, device: u8, function: u8, offset: u16) -> u32 {
        let address = ecam_address(self.base, bus, device, function, offset);
        let register: RegisterRO<u32> = unsafe { RegisterRO::from_address(address) };
        register.read()
    }

    fn read16(&self, bus: u8, device: u8, function: u8, offset: u16) -> u16 {
        let address = ecam_address(self.base, bus, device, function, offset);
        let register: RegisterRO<u16> = unsafe { RegisterRO::from_address(address) };
        register.read()
    }

    fn store32(&self, bus: u8, device: u8, function: u8, offset: u16, value: u32) {
        let address = ecam_address(self.base, bus, device, function, offset);
        let register: RegisterRW<u32> = unsafe { RegisterRW::from_address(address) };
        register.write(value);
    }

    fn store16(&self, bus: u8, device: u8, function: u8, offset: u16, value: u16) {
        let address = ecam_address(self.base, bus, device, function, offset);
        let register: RegisterRW<u16> = unsafe { RegisterRW::from_address(address) };
        register.write(value);
    }
}

/// Command register, low half of the word at [`offset::COMMAND`].
#[bitfield(u16)]
pub struct Command {
    pub io_space_enable: bool,
    pub memory_space_enable: bool,
    pub bus_master_enable: bool,
    #[bits(13)]
    __: u16,
}

/// The word at [`offset::CLASS`].
#[bitfield(u32)]
pub struct ClassCode {
    pub revision: u8,
    pub prog_if: u8,
    pub subclass: u8,
    pub class: u8,
}

/// The word at [`offset::HEADER`].
#[bitfield(u32)]
pub struct HeaderInfo {
    pub cache_line_size: u8,
    pub latency_timer: u8,
    pub header_type: u8,
    pub bist: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::{SimBus, SimDevice};

    #[test]
    fn ecam_addresses_are_bit_exact() {
        let base = 0x3000_0000;
        assert_eq!(ecam_address(base, 0, 0, 0, 0x00), 0x3000_0000);
        assert_eq!(ecam_address(base, 0, 3, 0, 0x10), 0x3001_8010);
        assert_eq!(ecam_address(base, 1, 0, 0, 0x00), 0x3010_0000);
        assert_eq!(ecam_address(base, 0, 0, 7, 0x00), 0x3000_7000);
        assert_eq!(ecam_address(base, 255, 31, 7, 0xFFC), 0x3FFF_FFFC);
    }

    #[test]
    fn offsets_snap_to_their_aligned_word() {
        let base = 0x3000_0000;
        assert_eq!(
            ecam_address(base, 0, 0, 0, 0x07),
            ecam_address(base, 0, 0, 0, 0x04)
        );
        // An offset past the 4 KiB window must not spill into the function
        // bits.
        assert_eq!(
            ecam_address(base, 0, 0, 0, 0x1004),
            ecam_address(base, 0, 0, 0, 0x004)
        );
    }

    #[test]
    fn verified_write_round_trips() {
        let bus = SimBus::new(vec![SimDevice::new(0, 0, 0, 0x1234, 0x1111)]);
        bus.write16(0, 0, 0, offset::COMMAND, 0x0002).unwrap();
        assert_eq!(bus.register(0, 0, 0, offset::COMMAND), 0x0002);
    }

    #[test]
    fn rejected_write_reports_what_came_back() {
        let bus = SimBus::new(vec![SimDevice::new(0, 0, 0, 0x1234, 0x1111)]);
        // The class register is read-only in the simulated device.
        let err = bus.write32(0, 0, 0, offset::CLASS, 0x0300_0000).unwrap_err();
        assert_eq!(
            err,
            WriteMismatch {
                wrote: 0x0300_0000,
                read_back: 0,
            }
        );
    }

    #[test]
    fn all_ones_writes_skip_verification() {
        let bus = SimBus::new(vec![SimDevice::new(0, 0, 0, 0x1234, 0x1111)]);
        // Size probes depend on the read-back differing from what was
        // written; the sentinel must never be verified.
        assert!(bus.write32(0, 0, 0, offset::BAR0, 0xFFFF_FFFF).is_ok());
        assert!(bus.write16(0, 0, 0, offset::COMMAND, 0xFFFF).is_ok());
    }

    #[test]
    fn absent_functions_read_all_ones() {
        let bus = SimBus::new(vec![]);
        assert_eq!(bus.read32(0, 0, 0, offset::VENDOR_DEVICE), 0xFFFF_FFFF);
        assert_eq!(bus.read16(0, 0, 0, offset::VENDOR_DEVICE), 0xFFFF);
    }

    #[test]
    fn bar_offsets_stride_by_word() {
        assert_eq!(offset::bar(0), 0x10);
        assert_eq!(offset::bar(2), 0x18);
        assert_eq!(offset::bar(5), 0x24);
    }

    #[test]
    fn class_code_unpacks_the_register() {
        let class = ClassCode::from(0x0300_0000);
        assert_eq!(class.class(), 0x03);
        assert_eq!(class.subclass(), 0x00);

        let class = ClassCode::from(0x0C03_20EE);
        assert_eq!(class.class(), 0x0C);
        assert_eq!(class.subclass(), 0x03);
        assert_eq!(class.prog_if(), 0x20);
        assert_eq!(class.revision(), 0xEE);
    }

    #[test]
    fn command_register_bits() {
        let command = Command::from(0).with_memory_space_enable(true);
        assert_eq!(u16::from(command), 0x0002);
        assert!(Command::from(0x0007).bus_master_enable());
        assert!(!Command::from(0x0001).memory_space_enable());
    }

    #[test]
    fn header_info_unpacks_the_register() {
        let header = HeaderInfo::from(0x0000_8010);
        assert_eq!(header.header_type(), 0x00);
        assert_eq!(header.latency_timer(), 0x80);
        assert_eq!(header.cache_line_size(), 0x10);
    }
}
