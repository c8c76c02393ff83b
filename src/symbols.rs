use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Function,
    Data,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// Symbol value: the image-relative address of the symbol's first byte.
    pub value: u64,
    pub size: u64,
    pub kind: SymbolKind,
    /// Byte range of the symbol's data within the image file, precomputed
    /// from section file offsets at ingest. `None` for NOBITS and absolute
    /// symbols, which carry no file data.
    pub file_range: Option<Range<usize>>,
}

pub struct SymbolTable {
    // Map value -> Symbol
    // BTreeMap gives us O(log n) exact lookups plus the range queries the
    // containing-address lookup needs.
    symbols_by_value: BTreeMap<u64, Arc<Symbol>>,
    symbols_by_name: HashMap<String, Arc<Symbol>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols_by_value: BTreeMap::new(),
            symbols_by_name: HashMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: Symbol) {
        // Duplicate values overwrite; alias symbols are rare enough that the
        // last one wins.
        let arc_symbol = Arc::new(symbol);
        let name = arc_symbol.name.clone();

        self.symbols_by_value
            .insert(arc_symbol.value, arc_symbol.clone());
        self.symbols_by_name.insert(name, arc_symbol);
    }

    /// Exact-value lookup: the symbol whose value equals `value`, if any.
    ///
    /// Returns a clone of the shared handle so callers can hold the symbol
    /// past borrows of the table (the resolver keeps it alongside an owned
    /// kernel image).
    pub fn find_symbol(&self, value: u64) -> Option<Arc<Symbol>> {
        self.symbols_by_value.get(&value).cloned()
    }

    /// Find the symbol whose `[value, value + size)` range contains `address`.
    pub fn lookup(&self, address: u64) -> Option<&Symbol> {
        // range(..=address).next_back() gives the closest start to our left.
        if let Some((&value, symbol)) = self.symbols_by_value.range(..=address).next_back() {
            if symbol.size > 0 && address < value + symbol.size {
                return Some(symbol.as_ref());
            }
            // Size-0 marker symbols only match their exact address.
            if symbol.size == 0 && address == value {
                return Some(symbol.as_ref());
            }
        }
        None
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbols_by_name.get(name).map(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Symbol>> {
        self.symbols_by_value.values()
    }

    pub fn len(&self) -> usize {
        self.symbols_by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols_by_value.is_empty()
    }
}

/// Answers "what name should this address display as" while operands are
/// being rendered. Decoupled from how the underlying tables are populated.
pub trait SymbolProvider {
    fn name_for_address(&self, address: u64) -> Option<String>;
}

/// Symbol provider over one image's symbol table.
///
/// Addresses inside a named symbol render as `name` or `name+0xOFF`, with
/// mangled names demangled for display.
pub struct TableSymbolProvider<'a> {
    table: &'a SymbolTable,
}

impl<'a> TableSymbolProvider<'a> {
    pub fn new(table: &'a SymbolTable) -> Self {
        Self { table }
    }
}

impl SymbolProvider for TableSymbolProvider<'_> {
    fn name_for_address(&self, address: u64) -> Option<String> {
        let symbol = self.table.lookup(address)?;
        let name = demangle_name(&symbol.name);
        let offset = address - symbol.value;
        if offset == 0 {
            Some(name)
        } else {
            Some(format!("{}+{:#x}", name, offset))
        }
    }
}

/// Demangle a symbol name for display: Rust first, then Itanium C++,
/// otherwise the name as-is.
pub fn demangle_name(name: &str) -> String {
    if let Ok(demangled) = rustc_demangle::try_demangle(name) {
        return format!("{:#}", demangled);
    }
    if let Ok(symbol) = cpp_demangle::Symbol::new(name) {
        if let Ok(demangled) = symbol.demangle() {
            return demangled;
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, value: u64, size: u64) -> Symbol {
        Symbol {
            name: name.to_string(),
            value,
            size,
            kind: SymbolKind::Function,
            file_range: None,
        }
    }

    #[test]
    fn exact_lookup_matches_value_only() {
        let mut table = SymbolTable::new();
        table.insert(sym("entry", 0x1000, 0x20));

        assert!(table.find_symbol(0x1000).is_some());
        assert!(table.find_symbol(0x1001).is_none());
    }

    #[test]
    fn containing_lookup_respects_size() {
        let mut table = SymbolTable::new();
        table.insert(sym("entry", 0x1000, 0x20));

        assert_eq!(table.lookup(0x101f).map(|s| s.name.as_str()), Some("entry"));
        assert!(table.lookup(0x1020).is_none());
        assert!(table.lookup(0xfff).is_none());
    }

    #[test]
    fn size_zero_symbol_matches_exact_address_only() {
        let mut table = SymbolTable::new();
        table.insert(sym("marker", 0x2000, 0));

        assert!(table.lookup(0x2000).is_some());
        assert!(table.lookup(0x2001).is_none());
    }

    #[test]
    fn provider_renders_offsets() {
        let mut table = SymbolTable::new();
        table.insert(sym("do_thing", 0x2000, 0x10));
        let provider = TableSymbolProvider::new(&table);

        assert_eq!(provider.name_for_address(0x2000).as_deref(), Some("do_thing"));
        assert_eq!(
            provider.name_for_address(0x2004).as_deref(),
            Some("do_thing+0x4")
        );
        assert!(provider.name_for_address(0x3000).is_none());
    }

    #[test]
    fn demangles_rust_and_cpp_names() {
        assert_eq!(demangle_name("_ZN4core3fmt5write17h0123456789abcdefE"), "core::fmt::write");
        assert_eq!(demangle_name("_Z3foov"), "foo()");
        assert_eq!(demangle_name("plain_c_name"), "plain_c_name");
    }
}
