use std::path::PathBuf;

use thiserror::Error;

/// Reasons a stop address resolves to no disassembly.
///
/// None of these are fatal: the view degrades to an empty row set and the
/// reason is logged for diagnostics.
#[derive(Error, Debug)]
pub enum ResolveMiss {
    #[error("address {address:#x} is not mapped by any loaded image")]
    AddressNotMapped { address: u64 },

    #[error("no containing function for offset {relative:#x} in {image}")]
    FunctionUnknown { image: String, relative: u64 },

    #[error("no symbol with value {value:#x} in {image}")]
    SymbolUnknown { image: String, value: u64 },

    #[error("cannot load kernel debug image {path}: {reason}")]
    KernelImageUnavailable { path: PathBuf, reason: String },
}

impl ResolveMiss {
    /// True when the miss came from the kernel-image branch rather than the
    /// user-space lookup chain.
    pub fn is_kernel_miss(&self) -> bool {
        matches!(self, ResolveMiss::KernelImageUnavailable { .. })
    }
}

/// Hard failures while decoding a function span.
///
/// A decoder that stops making progress before the end of the span would
/// silently break the byte-coverage guarantee, so it is surfaced to the
/// caller instead of being swallowed.
#[derive(Error, Debug)]
pub enum DisasmError {
    #[error("decoder made no progress at {address:#x} with {remaining} bytes left")]
    DecoderStalled { address: u64, remaining: usize },

    #[error(transparent)]
    Decoder(#[from] capstone::Error),
}

/// Failures while ingesting an ELF image.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse image: {0}")]
    Object(#[from] object::Error),

    #[error("failed to parse debug info: {0}")]
    Dwarf(#[from] gimli::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_display_names_the_address() {
        let miss = ResolveMiss::AddressNotMapped { address: 0xdead_beef };
        assert!(miss.to_string().contains("0xdeadbeef"));
    }

    #[test]
    fn kernel_miss_is_classified() {
        let miss = ResolveMiss::KernelImageUnavailable {
            path: PathBuf::from("/boot/Kernel.debug"),
            reason: "No such file or directory".to_string(),
        };
        assert!(miss.is_kernel_miss());
        assert!(!ResolveMiss::AddressNotMapped { address: 0 }.is_kernel_miss());
    }
}
