//! Bochs DISPI interface, as exposed by QEMU's `bochs-display` device.
//!
//! The registers are 16 bits wide and live at offset 0x500 inside the
//! device's MMIO BAR, one per index, 2 bytes apart. See
//! <https://wiki.osdev.org/Bochs_VBE_Extensions>.

use bitflags::bitflags;

use pci::{BarAccessError, PciBar};

/// High bits of the ID register for the whole DISPI family; the low nibble
/// is the interface revision (QEMU reports 5).
pub const DISPI_ID_FAMILY: u16 = 0xB0C0;

const DISPI_BASE: u32 = 0x500;

#[repr(u32)]
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
enum DispiRegister {
    Id = 0,
    XRes = 1,
    YRes = 2,
    Bpp = 3,
    Enable = 4,
    Bank = 5,
    VirtWidth = 6,
    VirtHeight = 7,
    XOffset = 8,
    YOffset = 9,
}

#[repr(u16)]
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
enum BitDepth {
    Bpp4 = 0x04,
    Bpp8 = 0x08,
    Bpp15 = 0x0F,
    Bpp16 = 0x10,
    Bpp24 = 0x18,
    Bpp32 = 0x20,
}

bitflags! {
    /// Bits of the enable register.
    struct DispiEnable: u16 {
        const ENABLED = 0x01;
        const LFB_ENABLED = 0x40;
        const NOCLEARMEM = 0x80;
    }
}

/// The DISPI register block behind a decoded MMIO BAR.
pub struct Dispi<'a> {
    regs: &'a PciBar,
}

impl<'a> Dispi<'a> {
    pub fn new(regs: &'a PciBar) -> Self {
        Self { regs }
    }

    /// Reads the ID register. The registers are 16-bit but the window only
    /// supports 32-bit reads; index 0 is word-aligned, so the ID sits in
    /// the low half.
    pub fn id(&self) -> Result<u16, BarAccessError> {
        let word = self.regs.read32(DISPI_BASE + DispiRegister::Id as u32 * 2)?;
        Ok((word & 0xFFFF) as u16)
    }

    fn write_reg(&self, register: DispiRegister, value: u16) -> Result<(), BarAccessError> {
        self.regs.write16(DISPI_BASE + register as u32 * 2, value)
    }

    /// Programs `width`x`height` at 32 bpp with the linear framebuffer on.
    /// Resolution and depth only latch while the device is disabled, so the
    /// sequence matters.
    pub fn set_mode(&self, width: u16, height: u16) -> Result<(), BarAccessError> {
        self.write_reg(DispiRegister::Enable, DispiEnable::empty().bits())?;
        self.write_reg(DispiRegister::XRes, width)?;
        self.write_reg(DispiRegister::YRes, height)?;
        self.write_reg(DispiRegister::Bpp, BitDepth::Bpp32 as u16)?;
        self.write_reg(
            DispiRegister::Enable,
            (DispiEnable::ENABLED | DispiEnable::LFB_ENABLED).bits(),
        )
    }
}
