//! Entry point resolution
//!
//! Intercepted functions forward to the real implementation, which has to be
//! looked up once. The dynamic linker is abstracted behind
//! [`SymbolResolver`]; [`LazySymbol`] memoizes one lookup.

use std::sync::OnceLock;

use hashbrown::HashMap;
use tracing::{debug, error};

/// Address of a resolved entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol {name} not found")]
    NotFound { name: String },

    #[error("symbol {name} not found, also tried {library}")]
    NotFoundIn { name: String, library: String },
}

/// Dynamic symbol lookup service
pub trait SymbolResolver: Send + Sync {
    /// Look `name` up in the default namespace.
    fn lookup(&self, name: &str) -> Option<SymbolAddress>;

    /// Look `name` up in a specific library.
    fn lookup_in(&self, library: &str, name: &str) -> Option<SymbolAddress>;

    /// Default namespace first, then `library` if given.
    fn resolve(&self, name: &str, library: Option<&str>) -> Result<SymbolAddress, SymbolError> {
        if let Some(addr) = self.lookup(name) {
            return Ok(addr);
        }
        match library {
            Some(library) => self.lookup_in(library, name).ok_or_else(|| SymbolError::NotFoundIn {
                name: name.to_string(),
                library: library.to_string(),
            }),
            None => Err(SymbolError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}

/// Resolver over a fixed table, for hosts that register entry points
/// themselves.
#[derive(Debug, Default)]
pub struct TableResolver {
    global: HashMap<String, SymbolAddress>,
    libraries: HashMap<String, HashMap<String, SymbolAddress>>,
}

impl TableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, addr: SymbolAddress) {
        self.global.insert(name.to_string(), addr);
    }

    pub fn insert_in(&mut self, library: &str, name: &str, addr: SymbolAddress) {
        self.libraries
            .entry(library.to_string())
            .or_default()
            .insert(name.to_string(), addr);
    }
}

impl SymbolResolver for TableResolver {
    fn lookup(&self, name: &str) -> Option<SymbolAddress> {
        self.global.get(name).copied()
    }

    fn lookup_in(&self, library: &str, name: &str) -> Option<SymbolAddress> {
        self.libraries.get(library)?.get(name).copied()
    }
}

/// One entry point, resolved on first use.
///
/// The outcome is memoized, failures included, so a missing symbol is
/// logged once and then silently reported as absent.
pub struct LazySymbol {
    name: &'static str,
    library: Option<&'static str>,
    resolved: OnceLock<Result<SymbolAddress, SymbolError>>,
}

impl LazySymbol {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            library: None,
            resolved: OnceLock::new(),
        }
    }

    /// Fall back to `library` when the default namespace lacks the symbol.
    pub const fn with_library(name: &'static str, library: &'static str) -> Self {
        Self {
            name,
            library: Some(library),
            resolved: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, resolver: &dyn SymbolResolver) -> Option<SymbolAddress> {
        self.resolved
            .get_or_init(|| {
                let result = resolver.resolve(self.name, self.library);
                match &result {
                    Ok(addr) => debug!("Resolved {} at {:#x}", self.name, addr.0),
                    Err(e) => error!("Could not load {}: {}", self.name, e),
                }
                result
            })
            .as_ref()
            .ok()
            .copied()
    }

    /// `None` until the first [`LazySymbol::get`]
    pub fn status(&self) -> Option<Result<SymbolAddress, SymbolError>> {
        self.resolved.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingResolver {
        inner: TableResolver,
        lookups: AtomicUsize,
    }

    impl SymbolResolver for CountingResolver {
        fn lookup(&self, name: &str) -> Option<SymbolAddress> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup(name)
        }

        fn lookup_in(&self, library: &str, name: &str) -> Option<SymbolAddress> {
            self.inner.lookup_in(library, name)
        }
    }

    #[test]
    fn test_default_namespace_first() {
        let mut table = TableResolver::new();
        table.insert("nanosleep", SymbolAddress(0x10));
        table.insert_in("libc.so.6", "nanosleep", SymbolAddress(0x20));
        assert_eq!(
            table.resolve("nanosleep", Some("libc.so.6")),
            Ok(SymbolAddress(0x10))
        );
    }

    #[test]
    fn test_library_fallback() {
        let mut table = TableResolver::new();
        table.insert_in("libSDL2-2.0.so.0", "SDL_GetTicks", SymbolAddress(0x30));
        assert_eq!(
            table.resolve("SDL_GetTicks", Some("libSDL2-2.0.so.0")),
            Ok(SymbolAddress(0x30))
        );
        assert_eq!(
            table.resolve("SDL_GetTicks", None),
            Err(SymbolError::NotFound {
                name: "SDL_GetTicks".to_string()
            })
        );
    }

    #[test]
    fn test_lazy_symbol_memoizes_failure() {
        let resolver = CountingResolver {
            inner: TableResolver::new(),
            lookups: AtomicUsize::new(0),
        };
        let symbol = LazySymbol::new("alcGetString");
        assert_eq!(symbol.status(), None);

        assert_eq!(symbol.get(&resolver), None);
        assert_eq!(symbol.get(&resolver), None);
        assert_eq!(resolver.lookups.load(Ordering::SeqCst), 1);
        assert!(matches!(symbol.status(), Some(Err(SymbolError::NotFound { .. }))));
    }

    #[test]
    fn test_lazy_symbol_resolves_once() {
        let mut table = TableResolver::new();
        table.insert("SDL_Delay", SymbolAddress(0x40));
        let symbol = LazySymbol::with_library("SDL_Delay", "libSDL2-2.0.so.0");
        assert_eq!(symbol.get(&table), Some(SymbolAddress(0x40)));
        assert_eq!(symbol.status(), Some(Ok(SymbolAddress(0x40))));
    }
}
