use std::sync::Arc;

use log::debug;

use crate::error::ResolveMiss;
use crate::image::LoadedImage;
use crate::kernel::KernelMapConfig;
use crate::registry::ImageRegistry;
use crate::symbols::{Symbol, TableSymbolProvider};

/// The image a resolved function's bytes live in: a registry-owned
/// user-space image, or the kernel debug image mapped for this one
/// resolution and dropped with the `ResolvedFunction`.
pub enum FunctionImage<'a> {
    User(&'a LoadedImage),
    Kernel(Box<LoadedImage>),
}

impl FunctionImage<'_> {
    pub fn image(&self) -> &LoadedImage {
        match self {
            FunctionImage::User(image) => image,
            FunctionImage::Kernel(image) => image,
        }
    }
}

/// A located function, ready to decode: the symbol describing its byte span
/// and the image that backs those bytes. Read-only; rebuilt per request.
pub struct ResolvedFunction<'a> {
    image: FunctionImage<'a>,
    symbol: Arc<Symbol>,
    pub function_name: String,
}

impl ResolvedFunction<'_> {
    /// Absolute address of the function's first byte, the decode base.
    pub fn base_address(&self) -> u64 {
        self.symbol.value
    }

    /// The function's raw bytes, exactly the symbol's declared size. Valid
    /// for as long as this resolution is held, covering the decode pass.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.image.image().symbol_data(&self.symbol)
    }

    pub fn image(&self) -> &LoadedImage {
        self.image.image()
    }

    /// Operand-rendering provider over the backing image's symbol table.
    pub fn provider(&self) -> TableSymbolProvider<'_> {
        TableSymbolProvider::new(&self.image.image().symbols)
    }
}

/// Resolves a stop address to the function that should be disassembled.
pub struct Resolver {
    kernel: KernelMapConfig,
}

impl Resolver {
    pub fn new(kernel: KernelMapConfig) -> Self {
        Self { kernel }
    }

    /// The resolve → locate pipeline: registry lookup, containing function,
    /// kernel-vs-user branch, then the exact symbol for the function's low
    /// address. Every miss degrades to a `ResolveMiss`; nothing here is
    /// fatal.
    pub fn resolve<'a>(
        &self,
        registry: &'a ImageRegistry,
        instruction_pointer: u64,
    ) -> Result<ResolvedFunction<'a>, ResolveMiss> {
        let library = registry
            .library_at(instruction_pointer)
            .ok_or(ResolveMiss::AddressNotMapped {
                address: instruction_pointer,
            })?;

        let relative = instruction_pointer - library.base_address;
        let function = library.debug.containing_function(relative).ok_or_else(|| {
            ResolveMiss::FunctionUnknown {
                image: library.name.clone(),
                relative,
            }
        })?;
        let function_name = function.name.clone();
        let low = function.low;

        let image = if self.kernel.is_kernel_address(low) {
            debug!(
                "{:#x} resolves above the split, switching to the kernel image",
                low
            );
            FunctionImage::Kernel(Box::new(self.kernel.map_kernel_image()?))
        } else {
            FunctionImage::User(library)
        };

        let symbol =
            image
                .image()
                .symbols
                .find_symbol(low)
                .ok_or_else(|| ResolveMiss::SymbolUnknown {
                    image: image.image().name.clone(),
                    value: low,
                })?;

        debug!(
            "ip {:#x} -> {} [{:#x}, {:#x}) in {}",
            instruction_pointer,
            function_name,
            symbol.value,
            symbol.value + symbol.size,
            image.image().name
        );

        Ok(ResolvedFunction {
            image,
            symbol,
            function_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ArchWidth;
    use crate::image::LoadedImage;
    use object::write::{Object as WriteObject, Symbol as WriteSymbol, SymbolSection};
    use object::{
        Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolScope,
    };
    use std::path::PathBuf;

    fn fixture_image(code: &[u8], value: u64, base: u64) -> LoadedImage {
        let mut obj = WriteObject::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
        obj.append_section_data(text, &vec![0u8; value as usize], 1);
        obj.append_section_data(text, code, 1);
        obj.add_symbol(WriteSymbol {
            name: b"entry".to_vec(),
            value,
            size: code.len() as u64,
            kind: object::SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
        LoadedImage::from_bytes("fixture", obj.write().expect("synthesize ELF"), base)
            .expect("ingest")
    }

    fn resolver_with_split(split: u64) -> Resolver {
        Resolver::new(KernelMapConfig {
            split_address: split,
            debug_image_path: PathBuf::from("/nonexistent/Kernel.debug"),
        })
    }

    #[test]
    fn unmapped_address_is_a_miss_not_an_error() {
        let registry = ImageRegistry::new();
        let resolver = resolver_with_split(KERNEL_SPLIT_TEST);
        match resolver.resolve(&registry, 0xdead) {
            Err(ResolveMiss::AddressNotMapped { address }) => assert_eq!(address, 0xdead),
            other => panic!("expected address-not-mapped, got {:?}", other.err()),
        }
    }

    const KERNEL_SPLIT_TEST: u64 = 0x8000;

    #[test]
    fn user_function_resolves_through_its_library() {
        let mut registry = ImageRegistry::new();
        registry.insert(fixture_image(&[0x90, 0x90, 0xc3], 0x100, 0x400000));
        let resolver = resolver_with_split(KERNEL_SPLIT_TEST);

        let resolved = resolver.resolve(&registry, 0x400101).expect("resolve");
        assert_eq!(resolved.function_name, "entry");
        assert_eq!(resolved.base_address(), 0x100);
        assert_eq!(resolved.bytes(), Some(&[0x90, 0x90, 0xc3][..]));
    }

    #[test]
    fn function_below_split_never_touches_the_kernel_image() {
        let mut registry = ImageRegistry::new();
        let mut image = fixture_image(&[0xc3], 0x100, 0);
        image.extent = KERNEL_SPLIT_TEST * 2;
        // A function just below the split with no matching symbol: the miss
        // must come from the user-space symbol lookup, not the kernel path.
        image
            .debug
            .insert_function("below".to_string(), KERNEL_SPLIT_TEST - 1, KERNEL_SPLIT_TEST);
        registry.insert(image);
        let resolver = resolver_with_split(KERNEL_SPLIT_TEST);

        match resolver.resolve(&registry, KERNEL_SPLIT_TEST - 1) {
            Err(ResolveMiss::SymbolUnknown { value, .. }) => {
                assert_eq!(value, KERNEL_SPLIT_TEST - 1)
            }
            other => panic!("expected symbol-unknown, got {:?}", other.err()),
        }
    }

    #[test]
    fn function_at_split_attempts_the_kernel_image() {
        let mut registry = ImageRegistry::new();
        let mut image = fixture_image(&[0xc3], 0x100, 0);
        image.extent = KERNEL_SPLIT_TEST * 2;
        image.debug.insert_function(
            "kernelish".to_string(),
            KERNEL_SPLIT_TEST,
            KERNEL_SPLIT_TEST + 0x10,
        );
        registry.insert(image);
        let resolver = resolver_with_split(KERNEL_SPLIT_TEST);

        match resolver.resolve(&registry, KERNEL_SPLIT_TEST) {
            Err(miss @ ResolveMiss::KernelImageUnavailable { .. }) => {
                assert!(miss.is_kernel_miss())
            }
            other => panic!("expected kernel miss, got {:?}", other.err()),
        }
    }

    #[test]
    fn real_split_constants_gate_the_kernel_branch() {
        use crate::kernel::KERNEL_SPLIT_64;

        let mut registry = ImageRegistry::new();
        let mut image = fixture_image(&[0xc3], 0x100, 0);
        image.extent = KERNEL_SPLIT_64 + 0x10000;
        image
            .debug
            .insert_function("just_below".to_string(), KERNEL_SPLIT_64 - 1, KERNEL_SPLIT_64);
        image.debug.insert_function(
            "at_split".to_string(),
            KERNEL_SPLIT_64,
            KERNEL_SPLIT_64 + 0x10,
        );
        registry.insert(image);

        let resolver = Resolver::new(KernelMapConfig {
            split_address: KernelMapConfig::for_width(ArchWidth::Bits64).split_address,
            debug_image_path: PathBuf::from("/nonexistent/Kernel.debug"),
        });

        assert!(matches!(
            resolver.resolve(&registry, KERNEL_SPLIT_64 - 1),
            Err(ResolveMiss::SymbolUnknown { .. })
        ));
        assert!(matches!(
            resolver.resolve(&registry, KERNEL_SPLIT_64),
            Err(ResolveMiss::KernelImageUnavailable { .. })
        ));
    }

    #[test]
    fn kernel_image_backs_the_resolved_function() {
        let dir = tempfile::tempdir().unwrap();
        let kernel_path = dir.path().join("Kernel.debug");
        let kernel_code = [0x66, 0x90, 0xc3];
        let kernel_image = {
            let mut obj =
                WriteObject::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
            let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
            obj.append_section_data(text, &vec![0u8; KERNEL_SPLIT_TEST as usize], 1);
            obj.append_section_data(text, &kernel_code, 1);
            obj.add_symbol(WriteSymbol {
                name: b"kernel_entry".to_vec(),
                value: KERNEL_SPLIT_TEST,
                size: kernel_code.len() as u64,
                kind: object::SymbolKind::Text,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
            obj.write().expect("synthesize kernel ELF")
        };
        std::fs::write(&kernel_path, kernel_image).unwrap();

        let mut registry = ImageRegistry::new();
        let mut image = fixture_image(&[0xc3], 0x100, 0);
        image.extent = KERNEL_SPLIT_TEST * 2;
        image.debug.insert_function(
            "kernel_entry".to_string(),
            KERNEL_SPLIT_TEST,
            KERNEL_SPLIT_TEST + kernel_code.len() as u64,
        );
        registry.insert(image);

        let resolver = Resolver::new(KernelMapConfig {
            split_address: KERNEL_SPLIT_TEST,
            debug_image_path: kernel_path,
        });

        let resolved = resolver.resolve(&registry, KERNEL_SPLIT_TEST).expect("resolve");
        assert_eq!(resolved.function_name, "kernel_entry");
        assert_eq!(resolved.base_address(), KERNEL_SPLIT_TEST);
        assert_eq!(resolved.bytes(), Some(&kernel_code[..]));
        assert_eq!(resolved.image().name, "Kernel.debug");
    }
}
