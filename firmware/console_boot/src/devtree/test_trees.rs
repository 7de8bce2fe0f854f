//! Device trees describing the development console, shared by the unit tests

use device_tree::fdt::{FdtBlob, FdtBuilder};

pub(crate) const SERIAL_BASE: u64 = 0x1001_3000;
pub(crate) const PLIC_BASE: u64 = 0x0c00_0000;
pub(crate) const GPIO_BASE: u64 = 0x1006_0000;
pub(crate) const KLEIN_BASE: u64 = 0x1007_0000;
pub(crate) const BLAKE2S_BASE: u64 = 0x1008_0000;
pub(crate) const CHACHA_BASE: u64 = 0x1009_0000;

/// Knobs for the parts of the console tree that individual tests break or vary
#[derive(Debug, Clone)]
pub(crate) struct ConsoleTree {
    pub harts: u32,
    pub serial: bool,
    pub clock_frequency: Vec<u32>,
    pub cpu0_timebase: Vec<u32>,
    pub chosen: bool,
    pub memory_size: u32,
}

impl Default for ConsoleTree {
    fn default() -> Self {
        Self {
            harts: 4,
            serial: true,
            clock_frequency: vec![33_330_000],
            cpu0_timebase: vec![500_000],
            chosen: false,
            memory_size: 0x1000_0000,
        }
    }
}

fn device(builder: &mut FdtBuilder, name: &str, compatible: &str, base: u64, size: u32) {
    builder
        .begin_node(name)
        .property_str("compatible", compatible)
        .property_cells("reg", &[(base >> 32) as u32, base as u32, 0, size])
        .end_node();
}

impl ConsoleTree {
    pub fn build(&self) -> FdtBlob {
        let mut builder = FdtBuilder::new();
        builder
            .reserve_memory(0x8000_0000, 0x4_0000)
            .begin_node("")
            .property_u32("#address-cells", 2)
            .property_u32("#size-cells", 2)
            .property_str("compatible", "console,dev");

        if self.chosen {
            builder
                .begin_node("chosen")
                .property_str("bootargs", "console=ttySIF0")
                .end_node();
        }

        builder
            .begin_node("cpus")
            .property_u32("#address-cells", 1)
            .property_u32("#size-cells", 0);
        for hart in 0..self.harts {
            builder
                .begin_node(&format!("cpu@{hart}"))
                .property_str("device_type", "cpu")
                .property_strings("compatible", &["sifive,u54", "riscv"])
                .property_u32("reg", hart);
            if hart == 0 {
                builder.property_cells("timebase-frequency", &self.cpu0_timebase);
            }
            builder.end_node();
        }
        builder.end_node();

        builder
            .begin_node("memory@80000000")
            .property_str("device_type", "memory")
            .property_cells("reg", &[0, 0x8000_0000, 0, self.memory_size])
            .end_node();

        builder
            .begin_node("soc")
            .property_u32("#address-cells", 2)
            .property_u32("#size-cells", 2)
            .property_strings("compatible", &["simple-bus"])
            .property_empty("ranges");
        builder
            .begin_node("subsystem_pbus_clock")
            .property_str("compatible", "fixed-clock")
            .property_cells("clock-frequency", &self.clock_frequency)
            .end_node();
        if self.serial {
            device(&mut builder, "serial@10013000", "sifive,uart0", SERIAL_BASE, 0x1000);
        }
        builder
            .begin_node("interrupt-controller@c000000")
            .property_str("compatible", "sifive,plic-1.0.0")
            .property_cells("reg", &[0, PLIC_BASE as u32, 0, 0x400_0000])
            .property_u32("riscv,ndev", 53)
            .property_u32("riscv,max-priority", 7)
            .end_node();
        device(&mut builder, "gpio@10060000", "sifive,gpio0", GPIO_BASE, 0x1000);
        device(&mut builder, "klein@10070000", "console,klein0", KLEIN_BASE, 0x1000);
        device(&mut builder, "blake2s@10080000", "console,blake2s0", BLAKE2S_BASE, 0x1000);
        device(&mut builder, "chacha@10090000", "console,chacha0", CHACHA_BASE, 0x1000);
        builder.end_node();

        builder.end_node();
        builder.finish().unwrap()
    }
}
