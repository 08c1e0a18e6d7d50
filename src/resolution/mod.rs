//! Cross-file symbol resolution: the Pass-2 registry and resolver.

pub mod registry;
pub mod resolver;

pub use registry::SymbolRegistry;
pub use resolver::{Resolver, SymbolSource};
