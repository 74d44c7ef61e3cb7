//! Base address register probing and the decoded window it yields.
//!
//! Sizing follows the standard all-ones trick: park all-ones in the
//! register, read back which address bits the device actually decodes, and
//! recover the region size by two's complement. The original register value
//! goes back afterward no matter how the probe went, since a device left
//! holding the probe pattern is unusable. See
//! <https://wiki.osdev.org/PCI#Base_Address_Registers>.

use fmtbuf::{Arg, ByteSink};
use registers::{RegisterRO, RegisterRW};

use crate::access::{offset, ConfigSpace, WriteMismatch};
use crate::scan::DeviceLocation;

const PROBE_PATTERN: u32 = 0xFFFF_FFFF;

/// Which address space a BAR window lives in, from bit 0 of the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarSpace {
    Io,
    Memory,
}

/// A window access that never touched hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarAccessError {
    /// The descriptor never decoded; its geometry fields are invalid.
    Unmapped,
    /// Offset is not a multiple of the access width.
    Misaligned,
    /// The access would extend past the end of the window.
    OutOfRange,
}

/// Errors from [`PciBar::assign`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    /// The descriptor never decoded; there is nothing to place.
    Unmapped,
    /// The device did not accept the new address.
    Rejected(WriteMismatch),
}

/// A decoded base address register.
///
/// Produced by [`probe_bar`]. When `mapped` is false the probe failed and
/// the geometry fields hold nothing useful.
#[derive(Debug, Clone, Copy)]
pub struct PciBar {
    pub location: DeviceLocation,
    pub index: u8,
    /// Start of the window in the address space named by `space`.
    pub base: usize,
    /// Window length in bytes. A power of two on conformant hardware.
    pub size: u32,
    pub space: BarSpace,
    /// Low flag bits that are not part of the address: bit 1 for I/O
    /// registers, the two memory-type bits for memory registers.
    pub region_type: u8,
    pub mapped: bool,
    /// False when the device was left holding the probe pattern.
    pub restored: bool,
    saved: u32,
}

impl PciBar {
    fn unmapped(location: DeviceLocation, index: u8, saved: u32) -> Self {
        Self {
            location,
            index,
            base: 0,
            size: 0,
            space: BarSpace::Memory,
            region_type: 0,
            mapped: false,
            restored: false,
            saved,
        }
    }

    /// Interprets the probed register. Bit 0 picks the space; the base and
    /// type bits sit at different positions in the two encodings.
    fn decode(&mut self, probed: u32) {
        if probed & 0x3 == 0x1 {
            self.space = BarSpace::Io;
            self.base = (probed >> 2) as usize;
            self.region_type = (probed & 0b10) as u8;
        } else {
            self.space = BarSpace::Memory;
            self.base = (probed >> 4) as usize;
            self.region_type = (probed & 0b110) as u8;
        }
        // Two's-complement sizing. Bit 1 is not an address bit in either
        // encoding and gets cleared first; the cleared low bits of the
        // probe read-back then give the size directly.
        self.size = (!(probed & !0b10)).wrapping_add(1);
        self.mapped = true;
    }

    fn check(&self, offset: u32, width: u32) -> Result<(), BarAccessError> {
        if !self.mapped {
            return Err(BarAccessError::Unmapped);
        }
        if offset % width != 0 {
            return Err(BarAccessError::Misaligned);
        }
        let end = offset.checked_add(width).ok_or(BarAccessError::OutOfRange)?;
        if end > self.size {
            return Err(BarAccessError::OutOfRange);
        }
        Ok(())
    }

    /// Reads the 32-bit register at `offset` into the window.
    pub fn read32(&self, offset: u32) -> Result<u32, BarAccessError> {
        self.check(offset, 4)?;
        let register: RegisterRO<u32> =
            unsafe { RegisterRO::from_address(self.base + offset as usize) };
        Ok(register.read())
    }

    /// Writes the 32-bit register at `offset` into the window.
    pub fn write32(&self, offset: u32, value: u32) -> Result<(), BarAccessError> {
        self.check(offset, 4)?;
        let register: RegisterRW<u32> =
            unsafe { RegisterRW::from_address(self.base + offset as usize) };
        register.write(value);
        Ok(())
    }

    /// Writes the 16-bit register at `offset` into the window.
    pub fn write16(&self, offset: u32, value: u16) -> Result<(), BarAccessError> {
        self.check(offset, 2)?;
        let register: RegisterRW<u16> =
            unsafe { RegisterRW::from_address(self.base + offset as usize) };
        register.write(value);
        Ok(())
    }

    /// Points the window at `new_base` and rebinds the descriptor to it.
    ///
    /// The register's low flag bits are read-only on the device, so the
    /// verified write merges them into the value; the read-back then
    /// compares clean on success.
    pub fn assign<C: ConfigSpace>(&mut self, config: &C, new_base: u32) -> Result<(), AssignError> {
        if !self.mapped {
            return Err(AssignError::Unmapped);
        }
        let flag_mask = match self.space {
            BarSpace::Io => 0x3,
            BarSpace::Memory => 0xF,
        };
        let value = (new_base & !flag_mask) | (self.saved & flag_mask);
        config
            .write32(
                self.location.bus,
                self.location.device,
                0,
                offset::bar(self.index),
                value,
            )
            .map_err(AssignError::Rejected)?;
        self.base = new_base as usize;
        Ok(())
    }
}

/// Probe sequence phases. Probing runs each step exactly once, in order;
/// `Failed` absorbs a probe write that did not take, and the restore write
/// is issued from either of the last two phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbePhase {
    Idle,
    Probed,
    Decoded,
    Restored,
    Failed,
}

/// Sizes BAR `index` of the function at `location` and decodes its window.
///
/// The register's original value is written back before returning, on the
/// failure path included. A restore mismatch after a successful decode does
/// not invalidate the geometry already read; the descriptor comes back
/// `mapped` with `restored` false.
pub fn probe_bar<C: ConfigSpace, S: ByteSink + ?Sized>(
    config: &C,
    sink: &mut S,
    location: DeviceLocation,
    index: u8,
) -> PciBar {
    let mut scratch = [0u8; 128];
    let register = offset::bar(index);

    let saved = config.read32(location.bus, location.device, 0, register);
    let mut bar = PciBar::unmapped(location, index, saved);
    let mut phase = ProbePhase::Idle;

    // Park the probe pattern in the register. All-ones stores are exempt
    // from read-back verification, so an error here means the store itself
    // did not go through.
    if phase == ProbePhase::Idle {
        phase = match config.write32(location.bus, location.device, 0, register, PROBE_PATTERN) {
            Ok(()) => ProbePhase::Probed,
            Err(mismatch) => {
                fmtbuf::write_to(
                    sink,
                    &mut scratch,
                    "bar%d: probe write rejected, register reads 0x%x\r\n",
                    &[Arg::Int(i32::from(index)), Arg::Hex32(mismatch.read_back)],
                );
                ProbePhase::Failed
            }
        };
    }

    if phase == ProbePhase::Probed {
        let probed = config.read32(location.bus, location.device, 0, register);
        bar.decode(probed);
        phase = ProbePhase::Decoded;
    }

    // The restore write runs on the failed path too; the device must not
    // be left holding the probe pattern.
    match config.write32(location.bus, location.device, 0, register, saved) {
        Ok(()) => {
            if phase == ProbePhase::Decoded {
                phase = ProbePhase::Restored;
            }
        }
        Err(mismatch) => {
            // Geometry decoded before a failed restore stays valid; the
            // descriptor records that the device was left misconfigured.
            fmtbuf::write_to(
                sink,
                &mut scratch,
                "bar%d: restore failed, register reads 0x%x\r\n",
                &[Arg::Int(i32::from(index)), Arg::Hex32(mismatch.read_back)],
            );
        }
    }
    bar.restored = phase == ProbePhase::Restored;

    if bar.mapped {
        let space = match bar.space {
            BarSpace::Io => "io",
            BarSpace::Memory => "memory",
        };
        fmtbuf::write_to(
            sink,
            &mut scratch,
            "bar%d: 0x%x-0x%x %s space (size %ld, type %d)\r\n",
            &[
                Arg::Int(i32::from(index)),
                Arg::Hex32(bar.base as u32),
                Arg::Hex32((bar.base as u32).wrapping_add(bar.size)),
                Arg::Str(space),
                Arg::Long(i64::from(bar.size)),
                Arg::Int(i32::from(bar.region_type)),
            ],
        );
    }

    bar
}
