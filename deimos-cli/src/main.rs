//! Command-line driver: builds a machine with a single RAM bank, loads a flat memory image,
//! and runs it.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use deimos_core::machine::Machine;
use deimos_core::physmem::PhysicalMemory;
use deimos_core::registers::Specifier;

#[derive(Parser, Debug)]
#[command(name = "deimos", about = "Instruction-level simulator for a small RV32IMA machine")]
struct Args {
    /// Flat binary image loaded into RAM at the entry address.
    image: PathBuf,

    /// Physical address RAM starts at.
    #[arg(long, default_value = "0x0", value_parser = parse_u64)]
    ram_base: u64,

    /// RAM size in bytes (frame-aligned).
    #[arg(long, default_value = "0x1000000", value_parser = parse_u64)]
    ram_size: u64,

    /// Address the image is loaded at and execution starts from.
    #[arg(long, default_value = "0x1000", value_parser = parse_u32)]
    entry: u32,

    /// Stop after this many machine ticks (runs indefinitely when absent).
    #[arg(long)]
    steps: Option<u64>,
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u64::from_str_radix(digits, radix).map_err(|e| e.to_string())
}

fn parse_u32(s: &str) -> Result<u32, String> {
    parse_u64(s)?.try_into().map_err(|_| "value does not fit in 32 bits".to_string())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let image = fs::read(&args.image)
        .with_context(|| format!("reading image {}", args.image.display()))?;

    let mut mem = PhysicalMemory::new();
    mem.attach_ram(args.ram_base, args.ram_size)
        .context("attaching RAM")?;

    let mut machine = Machine::new(mem);
    if !machine.memory_mut().load(args.entry as u64, &image) {
        bail!(
            "image of {} bytes does not fit in RAM at {:#010x}",
            image.len(),
            args.entry
        );
    }

    machine.add_hart(args.entry);

    let executed = machine.run(args.steps);
    log::info!("executed {executed} ticks");

    dump_registers(&machine);
    machine.done();
    Ok(())
}

fn dump_registers(machine: &Machine) {
    let cpu = machine.hart(0);
    let registers = cpu.registers();
    println!("pc  {:#010x}  priv {}", registers.pc(), cpu.privilege_mode());
    for row in 0..8u8 {
        let columns: Vec<String> = (0..4u8)
            .map(|column| {
                let specifier = Specifier::new(row * 4 + column).unwrap();
                format!("x{:<2} {:#010x}", u8::from(specifier), registers.x(specifier))
            })
            .collect();
        println!("{}", columns.join("  "));
    }
    println!(
        "cycle {}  instret {}",
        cpu.counters().cycle(),
        cpu.counters().instret()
    );
}
