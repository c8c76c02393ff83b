use log::debug;
use serde::Serialize;

use crate::decoder::{DecodedInstruction, Disassembler};
use crate::error::DisasmError;
use crate::registry::ImageRegistry;
use crate::resolver::{ResolvedFunction, Resolver};

/// One display row: address, instruction bytes as hex pairs, disassembly
/// text. Owned strings so the row outlives the decode pass's byte views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionRow {
    pub address: u64,
    pub bytes: String,
    pub text: String,
}

impl InstructionRow {
    fn from_decoded(decoded: &DecodedInstruction) -> Self {
        let bytes = decoded
            .raw_bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            address: decoded.address,
            bytes,
            text: decoded.text.clone(),
        }
    }
}

/// What a rebuild produced; the refresh signal handed to presentation code.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildSummary {
    pub generation: u64,
    pub row_count: usize,
    pub function: Option<String>,
}

/// Immutable row snapshot feeding the disassembly table.
///
/// `rebuild` replaces the whole snapshot each time the stop address changes;
/// rows are never mutated in place. A failed resolution leaves an empty
/// snapshot, which the table shows as "no disassembly available".
pub struct DisassemblyView {
    resolver: Resolver,
    rows: Vec<InstructionRow>,
    function: Option<String>,
    generation: u64,
}

impl DisassemblyView {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            rows: Vec::new(),
            function: None,
            generation: 0,
        }
    }

    /// Rebuild the snapshot for a new instruction pointer. Resolution misses
    /// degrade to an empty snapshot; only a decoder defect is an error.
    pub fn rebuild(
        &mut self,
        registry: &ImageRegistry,
        instruction_pointer: u64,
    ) -> Result<RebuildSummary, DisasmError> {
        let (rows, function) = match self.resolver.resolve(registry, instruction_pointer) {
            Ok(resolved) => {
                let rows = decode_rows(&resolved)?;
                (rows, Some(resolved.function_name.clone()))
            }
            Err(miss) => {
                debug!("no disassembly for {:#x}: {}", instruction_pointer, miss);
                (Vec::new(), None)
            }
        };

        self.rows = rows;
        self.function = function;
        self.generation += 1;
        Ok(self.summary())
    }

    pub fn summary(&self) -> RebuildSummary {
        RebuildSummary {
            generation: self.generation,
            row_count: self.rows.len(),
            function: self.function.clone(),
        }
    }

    pub fn rows(&self) -> &[InstructionRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&InstructionRow> {
        self.rows.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Run the decode pass for one resolved function. The resolved function (and
/// with it the kernel image mapping, when that branch was taken) stays alive
/// until the rows are fully built.
fn decode_rows(resolved: &ResolvedFunction) -> Result<Vec<InstructionRow>, DisasmError> {
    let bytes = match resolved.bytes() {
        Some(bytes) => bytes,
        None => {
            debug!("{} has no file data to decode", resolved.function_name);
            return Ok(Vec::new());
        }
    };

    let disasm = Disassembler::new(resolved.image().arch)?;
    let provider = resolved.provider();
    let mut rows = Vec::new();
    for record in disasm.stream(bytes, resolved.base_address(), &provider) {
        rows.push(InstructionRow::from_decoded(&record?));
    }
    Ok(rows)
}
