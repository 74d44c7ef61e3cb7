//! Fixed addresses of the QEMU riscv `virt` machine, from its device tree.
//! Nothing here is probed at runtime; the machine layout is stable.

use pci::DeviceId;

/// NS16550-compatible UART.
pub const UART_BASE: usize = 0x1000_0000;

/// PCI configuration window (ECAM).
pub const ECAM_BASE: usize = 0x3000_0000;

/// QEMU's `bochs-display` device.
pub const DISPLAY_ID: DeviceId = DeviceId {
    vendor: 0x1234,
    device: 0x1111,
};

/// Where the display BARs get placed inside the machine's 32-bit PCI
/// memory range (0x4000_0000..0x8000_0000). The framebuffer window is
/// 16 MiB on this device, so the register window goes right behind it.
pub const FRAMEBUFFER_WINDOW: u32 = 0x5000_0000;
pub const MMIO_WINDOW: u32 = 0x5100_0000;

pub const DISPLAY_WIDTH: usize = 640;
pub const DISPLAY_HEIGHT: usize = 480;
