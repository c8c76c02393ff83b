use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use disasm_view::kernel::KernelMapConfig;
use disasm_view::protocol::serialize_compact_rows;
use disasm_view::{DisassemblyView, ImageRegistry, LoadedImage, Resolver};

/// Disassemble the function containing a stop address, the way a debugger's
/// disassembly view would on process-stop.
#[derive(Parser, Debug)]
#[command(name = "disasm-view", version)]
struct Args {
    /// ELF image to load
    elf: PathBuf,

    /// Load base address of the image (hex accepted)
    #[arg(long, default_value = "0", value_parser = parse_address)]
    base: u64,

    /// Stop address to resolve (hex accepted)
    #[arg(long, value_parser = parse_address, conflicts_with = "symbol")]
    at: Option<u64>,

    /// Resolve the address of this symbol instead of --at
    #[arg(long)]
    symbol: Option<String>,

    /// Emit the compact JSON listing instead of a text table
    #[arg(long)]
    json: bool,
}

fn parse_address(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", s, e))
}

fn main() -> Result<()> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?
        .log_to_stderr()
        .start()?;

    let args = Args::parse();

    let image = LoadedImage::from_file(&args.elf, args.base)
        .with_context(|| format!("failed to load {}", args.elf.display()))?;
    let kernel_config = KernelMapConfig::for_width(image.arch);

    let instruction_pointer = match (&args.at, &args.symbol) {
        (Some(address), _) => *address,
        (None, Some(name)) => {
            let symbol = image
                .symbols
                .get_by_name(name)
                .with_context(|| format!("no symbol named {:?} in the image", name))?;
            args.base + symbol.value
        }
        (None, None) => bail!("one of --at or --symbol is required"),
    };

    let mut registry = ImageRegistry::new();
    registry.insert(image);

    let mut view = DisassemblyView::new(Resolver::new(kernel_config));
    let summary = view
        .rebuild(&registry, instruction_pointer)
        .context("decode failed")?;

    if args.json {
        println!("{}", serialize_compact_rows(view.rows()));
        return Ok(());
    }

    if view.row_count() == 0 {
        println!("no disassembly available for {:#x}", instruction_pointer);
        return Ok(());
    }

    if let Some(function) = view.function() {
        let image = registry.library_at(instruction_pointer);
        let location = image.and_then(|image| {
            image
                .debug
                .source_location(instruction_pointer - image.base_address)
        });
        match location {
            Some((file, line)) => println!("{} ({}:{})", function, file, line),
            None => println!("{}", function),
        }
    }
    for row in view.rows() {
        println!("  {:>10x}:  {:<24} {}", row.address, row.bytes, row.text);
    }
    log::info!("{} instructions in generation {}", summary.row_count, summary.generation);

    Ok(())
}
