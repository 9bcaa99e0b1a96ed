//! The symbol-library seam.
//!
//! The replay driver only needs two things from a debug-information
//! backend: load a module's symbols somewhere, and name an address. On
//! Windows that backend is dbghelp; tests script their own; hosts without
//! dbghelp fall back to [`NullSymbolSource`] and still get module
//! attribution and raw addresses.

/// Symbol-level detail for one resolved address. Line information is a
/// best-effort extra on top of the symbol name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// A debug-information session for one replay.
pub trait SymbolSource {
    /// Load a module's symbols, preferably at `base` (the caller's
    /// synthetic, non-overlapping base). Returns the base the library
    /// actually chose, or `None` when the module's symbols cannot be
    /// loaded - replay then degrades those frames rather than stopping.
    fn load_module(&mut self, path: &stackreel_common::WidePath, base: u64, size: u32)
        -> Option<u64>;

    /// Name the symbol (and, when available, source line) at `addr`, which
    /// is relative to a base previously returned by
    /// [`load_module`](Self::load_module).
    fn locate(&mut self, addr: u64) -> Option<SymbolInfo>;
}

/// A symbol source that knows nothing: every load is accepted at the
/// requested base, every lookup misses. Keeps the replay pipeline usable
/// where dbghelp is unavailable.
#[derive(Debug, Default)]
pub struct NullSymbolSource;

impl SymbolSource for NullSymbolSource {
    fn load_module(
        &mut self,
        _path: &stackreel_common::WidePath,
        base: u64,
        _size: u32,
    ) -> Option<u64> {
        Some(base)
    }

    fn locate(&mut self, _addr: u64) -> Option<SymbolInfo> {
        None
    }
}
