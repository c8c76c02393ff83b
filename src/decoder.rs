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

use capstone::arch::x86::X86OperandType;
use capstone::arch::ArchOperand;
use capstone::prelude::*;
use capstone::{Insn, InsnDetail, InsnGroupType};

use crate::error::DisasmError;
use crate::symbols::SymbolProvider;

/// Pointer width of the target image; selects the decode mode and the
/// kernel/user split constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchWidth {
    Bits32,
    Bits64,
}

pub struct Disassembler {
    cs: Capstone,
}

impl Disassembler {
    pub fn new(width: ArchWidth) -> Result<Self, capstone::Error> {
        let mode = match width {
            ArchWidth::Bits32 => arch::x86::ArchMode::Mode32,
            ArchWidth::Bits64 => arch::x86::ArchMode::Mode64,
        };
        let cs = Capstone::new()
            .x86()
            .mode(mode)
            .syntax(arch::x86::ArchSyntax::Intel)
            .detail(true) // Required for instruction groups/operands
            .build()?;

        Ok(Self { cs })
    }

    /// Lazy instruction sequence over `code`, where byte offset 0 sits at
    /// absolute address `base`. Rebuilding the stream from the same inputs
    /// reproduces the same sequence.
    pub fn stream<'a>(
        &'a self,
        code: &'a [u8],
        base: u64,
        provider: &'a dyn SymbolProvider,
    ) -> InstructionStream<'a> {
        InstructionStream {
            cs: &self.cs,
            code,
            base,
            provider,
            offset: 0,
            failed: false,
        }
    }
}

/// One decoded instruction. `raw_bytes` points into the code buffer the
/// stream was built over and is exactly the decoder-reported length.
#[derive(Debug, Clone)]
pub struct DecodedInstruction<'a> {
    pub address: u64,
    pub raw_bytes: &'a [u8],
    pub text: String,
}

/// Iterator driving the decoder one instruction at a time.
///
/// Reaching the end of the code buffer is the only normal termination. A
/// decoder that stops making progress mid-buffer yields a hard error and the
/// stream fuses, so a truncated sequence is never mistaken for a complete
/// one.
pub struct InstructionStream<'a> {
    cs: &'a Capstone,
    code: &'a [u8],
    base: u64,
    provider: &'a dyn SymbolProvider,
    offset: usize,
    failed: bool,
}

impl<'a> Iterator for InstructionStream<'a> {
    type Item = Result<DecodedInstruction<'a>, DisasmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }

        // Copy the reference out so returned slices carry the code buffer's
        // lifetime, not this borrow of the stream.
        let code = self.code;
        let address = self.base + self.offset as u64;
        let remaining = code.len() - self.offset;

        let decoded = match self.cs.disasm_count(&code[self.offset..], address, 1) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.failed = true;
                return Some(Err(DisasmError::Decoder(err)));
            }
        };

        if let Some(insn) = decoded.iter().next() {
            let length = insn.bytes().len();
            if length > 0 && length <= remaining {
                let text = render_instruction(self.cs, insn, self.provider);
                let raw_bytes = &code[self.offset..self.offset + length];
                self.offset += length;
                return Some(Ok(DecodedInstruction {
                    address,
                    raw_bytes,
                    text,
                }));
            }
        }

        // Zero-length step or undecodable bytes before the end of the span:
        // a decoder defect, surfaced instead of silently truncating.
        self.failed = true;
        Some(Err(DisasmError::DecoderStalled { address, remaining }))
    }
}

/// Render one instruction as display text: `mnemonic op_str`, with a
/// ` <name>` suffix when a call/jump target is an address the provider
/// knows. Pure function of its inputs, no I/O.
pub fn render_instruction(cs: &Capstone, insn: &Insn, provider: &dyn SymbolProvider) -> String {
    let mut text = match (insn.mnemonic(), insn.op_str()) {
        (Some(mnemonic), Some(op_str)) if !op_str.is_empty() => {
            format!("{} {}", mnemonic, op_str)
        }
        (Some(mnemonic), _) => mnemonic.to_string(),
        _ => String::new(),
    };

    if let Ok(detail) = cs.insn_detail(insn) {
        if is_branch(&detail) {
            if let Some(target) = immediate_target(&detail) {
                if let Some(name) = provider.name_for_address(target) {
                    text.push_str(&format!(" <{}>", name));
                }
            }
        }
    }

    text
}

fn is_branch(detail: &InsnDetail) -> bool {
    detail.groups().iter().any(|group| {
        let id = u32::from(group.0);
        id == InsnGroupType::CS_GRP_CALL || id == InsnGroupType::CS_GRP_JUMP
    })
}

fn immediate_target(detail: &InsnDetail) -> Option<u64> {
    detail.arch_detail().operands().into_iter().find_map(|op| {
        if let ArchOperand::X86Operand(op) = op {
            if let X86OperandType::Imm(imm) = op.op_type {
                return Some(imm as u64);
            }
        }
        None
    })
}
