use std::borrow::Cow;
use std::collections::BTreeMap;
use std::rc::Rc;

use gimli::{EndianRcSlice, Reader, RunTimeEndian};
use log::debug;
use object::{Object, ObjectSection};

use crate::symbols::{SymbolKind, SymbolTable};

type DwarfReader = EndianRcSlice<RunTimeEndian>;

/// Address range of one function, image-relative, `[low, high)`.
#[derive(Debug, Clone)]
pub struct FunctionRange {
    pub name: String,
    pub low: u64,
    pub high: u64,
}

impl FunctionRange {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.low && address < self.high
    }
}

/// Function index and source-line lookup for one image.
///
/// Functions come from DWARF subprogram entries; ELF text symbols not already
/// covered are merged in as a fallback so stripped-of-DWARF images still
/// resolve. Source locations go through addr2line over the same DWARF.
pub struct DebugInfo {
    functions: BTreeMap<u64, FunctionRange>,
    ctx: Option<addr2line::Context<DwarfReader>>,
}

impl Default for DebugInfo {
    fn default() -> Self {
        Self::empty()
    }
}

impl DebugInfo {
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
            ctx: None,
        }
    }

    /// Walk the object's DWARF for subprogram ranges and keep an addr2line
    /// context over the same sections for line lookups.
    pub fn load(obj_file: &object::File) -> Result<Self, gimli::Error> {
        let endian = if obj_file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> Result<DwarfReader, gimli::Error> {
            let data = obj_file
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or(Cow::Borrowed(&[][..]));

            let data_rc: Rc<[u8]> = match data {
                Cow::Borrowed(b) => Rc::from(b),
                Cow::Owned(o) => Rc::from(o),
            };
            Ok(EndianRcSlice::new(data_rc, endian))
        };

        let dwarf = gimli::Dwarf::load(load_section)?;
        let mut info = Self::empty();

        // Iterate over compilation units to find subprograms
        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            let mut entries = unit.entries();
            while let Some((_, entry)) = entries.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_subprogram {
                    continue;
                }

                let mut name = "unknown".to_string();
                if let Some(name_attr) = entry.attr_value(gimli::DW_AT_name)? {
                    if let Ok(s) = dwarf.attr_string(&unit, name_attr) {
                        if let Ok(str_val) = s.to_string_lossy() {
                            name = str_val.to_string();
                        }
                    }
                }

                // low_pc is usually an absolute address
                let mut low = 0;
                if let Some(gimli::AttributeValue::Addr(addr)) =
                    entry.attr_value(gimli::DW_AT_low_pc)?
                {
                    low = addr;
                }

                // high_pc can be an address OR an offset (length)
                let mut high = 0;
                if let Some(high_attr) = entry.attr_value(gimli::DW_AT_high_pc)? {
                    match high_attr {
                        gimli::AttributeValue::Addr(addr) => high = addr,
                        gimli::AttributeValue::Udata(size) => high = low + size,
                        _ => {}
                    }
                }

                if low != 0 && high > low {
                    info.insert_function(name, low, high);
                }
            }
        }

        // addr2line wants its own copy of the sections; the Rc-backed slices
        // make the second load cheap.
        info.ctx = gimli::Dwarf::load(load_section)
            .ok()
            .and_then(|dwarf| addr2line::Context::from_dwarf(dwarf).ok());

        debug!("debug info: {} functions from DWARF", info.functions.len());
        Ok(info)
    }

    pub fn insert_function(&mut self, name: String, low: u64, high: u64) {
        self.functions.insert(low, FunctionRange { name, low, high });
    }

    /// Merge ELF text symbols the DWARF walk did not already cover.
    pub fn merge_text_symbols(&mut self, symbols: &SymbolTable) {
        for symbol in symbols.iter() {
            if symbol.kind != SymbolKind::Function || symbol.size == 0 {
                continue;
            }
            if self.containing_function(symbol.value).is_some() {
                continue;
            }
            self.insert_function(symbol.name.clone(), symbol.value, symbol.value + symbol.size);
        }
    }

    /// The function whose range contains the image-relative address, if any.
    pub fn containing_function(&self, relative: u64) -> Option<&FunctionRange> {
        let (_, function) = self.functions.range(..=relative).next_back()?;
        if function.contains(relative) {
            Some(function)
        } else {
            None
        }
    }

    /// Source file and line for an image-relative address, when DWARF line
    /// info is present.
    pub fn source_location(&self, relative: u64) -> Option<(String, u32)> {
        let ctx = self.ctx.as_ref()?;
        let location = ctx.find_location(relative).ok()??;
        let file = location.file?.to_string();
        let line = location.line?;
        Some((file, line))
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}
