//! Brute-force device discovery: walk every bus/device/function slot and
//! read the vendor/device register.
//!
//! The configuration space is not enumerated lazily or cached. 65536 probes
//! sounds like a lot, but each one is a single uncontended load from the
//! ECAM window, and a scan only happens once at bring-up.

use fmtbuf::{Arg, ByteSink};

use crate::access::{offset, ClassCode, Command, ConfigSpace, WriteMismatch};

/// Where a function lives on the bus. Function numbers are not recorded;
/// the devices this firmware drives are all single-function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLocation {
    pub bus: u8,
    pub device: u8,
}

impl DeviceLocation {
    /// Returned by [`find_device`] when the full scan comes up empty. Not a
    /// real location: device numbers only go to 31.
    pub const NOT_FOUND: Self = Self {
        bus: 0xFF,
        device: 0xFF,
    };

    pub fn is_present(self) -> bool {
        self != Self::NOT_FOUND
    }

    /// Sets the memory-space-enable command bit, leaving the rest of the
    /// register alone. BAR windows ignore accesses until this is on.
    pub fn enable_memory_space<C: ConfigSpace>(self, config: &C) -> Result<(), WriteMismatch> {
        let raw = config.read16(self.bus, self.device, 0, offset::COMMAND);
        let command = Command::from(raw).with_memory_space_enable(true);
        config.write16(self.bus, self.device, 0, offset::COMMAND, command.into())
    }
}

/// Vendor/device identifier pair, as burned into the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor: u16,
    pub device: u16,
}

/// Scans the whole configuration space for `target`, tracing every function
/// found along the way.
///
/// A vendor ID of all-ones means no function answers at that slot; the scan
/// moves on without touching the slot's other registers. The first matching
/// vendor/device pair ends the scan. An exhaustive miss returns
/// [`DeviceLocation::NOT_FOUND`].
pub fn find_device<C: ConfigSpace, S: ByteSink + ?Sized>(
    config: &C,
    sink: &mut S,
    target: DeviceId,
) -> DeviceLocation {
    let mut scratch = [0u8; 128];
    fmtbuf::write_to(sink, &mut scratch, "Scanning for PCI devices...\r\n", &[]);

    for bus in 0..=255u8 {
        for device in 0..32u8 {
            for function in 0..8u8 {
                let vendor_device = config.read32(bus, device, function, offset::VENDOR_DEVICE);
                let vendor = (vendor_device & 0xFFFF) as u16;
                if vendor == 0xFFFF {
                    continue;
                }
                let id = DeviceId {
                    vendor,
                    device: (vendor_device >> 16) as u16,
                };

                let class = ClassCode::from(config.read32(bus, device, function, offset::CLASS));
                fmtbuf::write_to(
                    sink,
                    &mut scratch,
                    "PCI device at %x:%x.%d\r\n",
                    &[Arg::Hex8(bus), Arg::Hex8(device), Arg::Int(i32::from(function))],
                );
                fmtbuf::write_to(
                    sink,
                    &mut scratch,
                    "  vendor 0x%x device 0x%x\r\n",
                    &[Arg::Hex16(id.vendor), Arg::Hex16(id.device)],
                );
                fmtbuf::write_to(
                    sink,
                    &mut scratch,
                    "  class 0x%x subclass 0x%x prog-if 0x%x\r\n",
                    &[
                        Arg::Hex8(class.class()),
                        Arg::Hex8(class.subclass()),
                        Arg::Hex8(class.prog_if()),
                    ],
                );

                if id == target {
                    let location = DeviceLocation { bus, device };
                    fmtbuf::write_to(
                        sink,
                        &mut scratch,
                        "Matched 0x%x:0x%x at %x:%x\r\n",
                        &[
                            Arg::Hex16(target.vendor),
                            Arg::Hex16(target.device),
                            Arg::Hex8(bus),
                            Arg::Hex8(device),
                        ],
                    );
                    return location;
                }
            }
        }
    }

    fmtbuf::write_to(
        sink,
        &mut scratch,
        "PCI device 0x%x:0x%x not found\r\n",
        &[Arg::Hex16(target.vendor), Arg::Hex16(target.device)],
    );
    DeviceLocation::NOT_FOUND
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::{SimBus, SimDevice, VecSink};

    fn display_bus() -> SimBus {
        SimBus::new(vec![
            SimDevice::new(0, 0, 0, 0x8086, 0x29C0).with_class(0x06, 0x00, 0x00),
            SimDevice::new(0, 3, 0, 0x1234, 0x1111)
                .with_class(0x03, 0x00, 0x00)
                .with_memory_bar(0, 0x0100_0000, 0x8),
        ])
    }

    #[test]
    fn finds_the_target_and_stops() {
        let bus = display_bus();
        let mut sink = VecSink(Vec::new());

        let location = find_device(
            &bus,
            &mut sink,
            DeviceId {
                vendor: 0x1234,
                device: 0x1111,
            },
        );

        assert_eq!(location, DeviceLocation { bus: 0, device: 3 });
        assert!(location.is_present());
        // Eight functions each for devices 0 through 2, then function 0 of
        // device 3.
        assert_eq!(bus.vendor_reads.get(), 25);
    }

    #[test]
    fn full_sweep_returns_the_sentinel() {
        let bus = display_bus();
        let mut sink = VecSink(Vec::new());

        let location = find_device(
            &bus,
            &mut sink,
            DeviceId {
                vendor: 0xAAAA,
                device: 0x5005,
            },
        );

        assert_eq!(location, DeviceLocation::NOT_FOUND);
        assert!(!location.is_present());
        assert_eq!(bus.vendor_reads.get(), 256 * 32 * 8);
        assert!(sink.text().contains("PCI device 0xaaaa:0x5005 not found"));
    }

    #[test]
    fn trace_describes_discovered_devices() {
        let bus = display_bus();
        let mut sink = VecSink(Vec::new());

        find_device(
            &bus,
            &mut sink,
            DeviceId {
                vendor: 0x1234,
                device: 0x1111,
            },
        );

        let text = sink.text();
        assert!(text.contains("Scanning for PCI devices..."));
        assert!(text.contains("PCI device at 00:00.0"));
        assert!(text.contains("  vendor 0x8086 device 0x29c0"));
        assert!(text.contains("PCI device at 00:03.0"));
        assert!(text.contains("  class 0x03 subclass 0x00 prog-if 0x00"));
        assert!(text.contains("Matched 0x1234:0x1111 at 00:03"));
    }

    #[test]
    fn absent_slots_cost_one_probe_each() {
        let bus = SimBus::new(vec![]);
        let mut sink = VecSink(Vec::new());

        find_device(
            &bus,
            &mut sink,
            DeviceId {
                vendor: 0x1234,
                device: 0x1111,
            },
        );

        // Nothing beyond the vendor register is read for empty slots, so
        // the trace stays at the banner and the miss line.
        assert_eq!(bus.vendor_reads.get(), 65536);
        assert_eq!(
            sink.text(),
            "Scanning for PCI devices...\r\nPCI device 0x1234:0x1111 not found\r\n"
        );
    }

    #[test]
    fn enable_memory_space_sets_only_that_bit() {
        let bus = display_bus();
        let location = DeviceLocation { bus: 0, device: 3 };

        location.enable_memory_space(&bus).unwrap();

        assert_eq!(bus.register(0, 3, 0, offset::COMMAND), 0x0002);
    }
}
