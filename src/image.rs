// Copyright (c) 2026 Disasm-View Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::File;
use std::path::Path;

use log::debug;
use memmap2::Mmap;
use object::{Object, ObjectSection, ObjectSymbol};

use crate::debug_info::DebugInfo;
use crate::decoder::ArchWidth;
use crate::error::ImageError;
use crate::symbols::{Symbol, SymbolKind, SymbolTable};

/// Backing storage for an image: heap bytes for in-memory ingestion, a
/// read-only mapping for on-disk images (the kernel debug image path).
pub enum ImageData {
    Bytes(Vec<u8>),
    Mapped(Mmap),
}

impl ImageData {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ImageData::Bytes(bytes) => bytes,
            ImageData::Mapped(map) => map,
        }
    }
}

/// One loaded executable image with its extracted tables.
///
/// Everything queryable (symbols, function index) is owned and extracted at
/// ingest; nothing borrows the parsed object view, so the image can move
/// freely and the backing data stays valid as long as the image does.
pub struct LoadedImage {
    pub name: String,
    /// Runtime load base; image-relative addresses are `runtime - base`.
    pub base_address: u64,
    /// Size of the image-relative address range this image answers for.
    pub extent: u64,
    pub arch: ArchWidth,
    pub symbols: SymbolTable,
    pub debug: DebugInfo,
    data: ImageData,
}

impl LoadedImage {
    /// Memory-map and ingest an image file.
    pub fn from_file<P: AsRef<Path>>(path: P, base_address: u64) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // Safety: the mapping is read-only and kept for the image's lifetime.
        let map = unsafe { Mmap::map(&file)? };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::ingest(name, ImageData::Mapped(map), base_address)
    }

    /// Ingest an image already held in memory.
    pub fn from_bytes(name: &str, bytes: Vec<u8>, base_address: u64) -> Result<Self, ImageError> {
        Self::ingest(name.to_string(), ImageData::Bytes(bytes), base_address)
    }

    fn ingest(name: String, data: ImageData, base_address: u64) -> Result<Self, ImageError> {
        let (arch, extent, symbols, debug) = {
            let obj_file = object::File::parse(data.as_slice())?;

            let arch = if obj_file.is_64() {
                ArchWidth::Bits64
            } else {
                ArchWidth::Bits32
            };

            let mut extent = 0u64;
            for section in obj_file.sections() {
                extent = extent.max(section.address() + section.size());
            }

            let symbols = extract_symbols(&obj_file);

            let mut debug = DebugInfo::load(&obj_file)?;
            debug.merge_text_symbols(&symbols);

            (arch, extent, symbols, debug)
        };

        debug!(
            "ingested {}: base {:#x}, extent {:#x}, {} symbols, {} functions",
            name,
            base_address,
            extent,
            symbols.len(),
            debug.function_count()
        );

        Ok(Self {
            name,
            base_address,
            extent,
            arch,
            symbols,
            debug,
            data,
        })
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base_address && address < self.base_address + self.extent
    }

    /// The symbol's raw bytes within this image's data, exactly its declared
    /// size. `None` for symbols without file data (NOBITS, absolute).
    pub fn symbol_data(&self, symbol: &Symbol) -> Option<&[u8]> {
        let range = symbol.file_range.clone()?;
        self.data.as_slice().get(range)
    }
}

fn extract_symbols(obj_file: &object::File) -> SymbolTable {
    let mut table = SymbolTable::new();
    for symbol in obj_file.symbols() {
        if !symbol.is_definition() {
            continue;
        }
        let kind = match symbol.kind() {
            object::SymbolKind::Text => SymbolKind::Function,
            object::SymbolKind::Data => SymbolKind::Data,
            _ => SymbolKind::Unknown,
        };
        if kind == SymbolKind::Unknown {
            continue;
        }
        let name = match symbol.name() {
            Ok(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        table.insert(Symbol {
            name,
            value: symbol.address(),
            size: symbol.size(),
            kind,
            file_range: symbol_file_range(obj_file, &symbol),
        });
    }
    table
}

/// File-offset range of a symbol's data, from its section's file range plus
/// the symbol's offset within the section.
fn symbol_file_range(
    obj_file: &object::File,
    symbol: &object::read::Symbol,
) -> Option<std::ops::Range<usize>> {
    let section_index = symbol.section_index()?;
    let section = obj_file.section_by_index(section_index).ok()?;
    let (file_offset, file_size) = section.file_range()?;

    let offset_in_section = symbol.address().checked_sub(section.address())?;
    if offset_in_section + symbol.size() > file_size {
        return None;
    }
    let start = usize::try_from(file_offset + offset_in_section).ok()?;
    let len = usize::try_from(symbol.size()).ok()?;
    Some(start..start + len)
}
