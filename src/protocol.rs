/// Wire shapes handed to the presentation layer: the compact row listing and
/// the refresh notification sent after each rebuild.
use serde_json::{json, Value};

use crate::view::{InstructionRow, RebuildSummary};

/// Serialize rows into a compact JSON message.
/// Format:
/// {
///   "t": "disasm_view",
///   "start": "0x...",
///   "lines": [ [addr_hex, bytes, text], ... ]
/// }
pub fn serialize_compact_rows(rows: &[InstructionRow]) -> Value {
    let mut lines: Vec<Value> = Vec::with_capacity(rows.len());
    for row in rows {
        // Address as hex string for JS safe handling
        let addr_hex = format!("0x{:x}", row.address);
        lines.push(json!([addr_hex, row.bytes.clone(), row.text.clone()]));
    }

    let start = rows
        .first()
        .map(|row| format!("0x{:x}", row.address))
        .unwrap_or_else(|| "0x0".to_string());

    json!({
        "t": "disasm_view",
        "start": start,
        "lines": Value::Array(lines),
    })
}

/// Wrap a rebuild summary in a JSON-RPC notification envelope.
pub fn disassembly_ready_notification(summary: &RebuildSummary) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "DisassemblyReady",
        "params": summary
    })
}
