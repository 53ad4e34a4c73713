//! The layer-type registry and the textual stack-description grammar:
//! `name(=arg)(,name(=arg))*`, application layer first.
//!
//! A [`LayerRegistry`] maps a wire name (`"raw"`, `"arq"`, ...) to a
//! constructor closure. The built-in registry carries every layer this
//! crate ships; a caller can register additional names (`bridge` adds
//! `pubterm`) or override a built-in one before calling [`build_stack`].

use crate::error::StackBuildError;
use crate::layer::Layer;
use crate::layers::{arq, ascii, crc, loopback, raw, segment, terminal};
use crate::stack::Stack;
use dashmap::DashMap;
use std::sync::Arc;

/// A layer constructor: takes the optional `=arg` text and builds the
/// layer, or rejects a malformed argument.
pub type LayerConstructor =
    Arc<dyn Fn(Option<&str>) -> Result<Box<dyn Layer>, StackBuildError> + Send + Sync>;

/// A name-keyed table of layer constructors.
///
/// Cloning a `LayerRegistry` is cheap: it shares the same underlying map
/// (via an `Arc`-backed [`DashMap`]), matching how the rest of this crate
/// treats the registry as a single shared, concurrently-extensible table
/// rather than something rebuilt per stack.
#[derive(Clone)]
pub struct LayerRegistry {
    constructors: Arc<DashMap<String, LayerConstructor>>,
}

impl LayerRegistry {
    /// An empty registry with no layer types at all.
    pub fn empty() -> Self {
        Self {
            constructors: Arc::new(DashMap::new()),
        }
    }

    /// A registry pre-populated with every layer this crate ships.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register("raw", |arg| Ok(Box::new(raw::RawLayer::from_arg(arg)?)));
        registry.register("loop", |arg| Ok(Box::new(loopback::LoopbackLayer::from_arg(arg)?)));
        registry.register("ascii", |arg| Ok(Box::new(ascii::AsciiEscapeLayer::from_arg(arg)?)));
        registry.register("term", |arg| Ok(Box::new(terminal::TerminalLayer::from_arg(arg)?)));
        registry.register("segment", |arg| Ok(Box::new(segment::SegmentationLayer::from_arg(arg)?)));
        registry.register("crc8", |arg| Ok(Box::new(crc::Crc8Layer::from_arg(arg)?)));
        registry.register("crc16", |arg| Ok(Box::new(crc::Crc16Layer::from_arg(arg)?)));
        registry.register("crc32", |arg| Ok(Box::new(crc::Crc32Layer::from_arg(arg)?)));
        registry.register("arq", |arg| Ok(Box::new(arq::ArqLayer::from_arg(arg)?)));
        registry
    }

    /// Registers `name`, replacing any existing constructor under it.
    pub fn register(
        &self,
        name: impl Into<String>,
        constructor: impl Fn(Option<&str>) -> Result<Box<dyn Layer>, StackBuildError> + Send + Sync + 'static,
    ) {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// Removes `name` from the registry, if present.
    pub fn unregister(&self, name: &str) {
        self.constructors.remove(name);
    }

    /// Every currently-registered name.
    pub fn names(&self) -> Vec<String> {
        self.constructors.iter().map(|e| e.key().clone()).collect()
    }

    fn build_layer(&self, name: &str, arg: Option<&str>) -> Result<Box<dyn Layer>, StackBuildError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| StackBuildError::UnknownLayerType(name.to_string()))?;
        constructor(arg)
    }
}

/// Parses a stack description and builds it against `registry`.
///
/// The grammar is `entry(,entry)*` where each `entry` is `name` or
/// `name=arg`, application layer (`L[0]`) first, physical layer last.
/// Whitespace around names, args, and commas is ignored.
///
/// # Examples
///
/// ```
/// # use dbgstack_core::registry::{build_stack, LayerRegistry};
/// let registry = LayerRegistry::with_builtins();
/// let stack = build_stack("ascii,term,segment=64,arq,crc16,raw", &registry).unwrap();
/// assert_eq!(stack.len(), 6);
/// ```
pub fn build_stack(description: &str, registry: &LayerRegistry) -> Result<Stack, StackBuildError> {
    if description.trim().is_empty() {
        return Ok(Stack::new(Vec::new()));
    }

    let mut layers = Vec::new();
    for entry in description.split(',') {
        let entry = entry.trim();
        let (name, arg) = match entry.split_once('=') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (entry, None),
        };
        if name.is_empty() {
            return Err(StackBuildError::MissingLayerType);
        }
        layers.push(registry.build_layer(name, arg)?);
    }
    Ok(Stack::new(layers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_builtin_layer() {
        let registry = LayerRegistry::with_builtins();
        let stack = build_stack("raw,loop,ascii,term,segment,crc8,crc16,crc32,arq", &registry).unwrap();
        assert_eq!(stack.len(), 9);
    }

    #[test]
    fn passes_arguments_through() {
        let registry = LayerRegistry::with_builtins();
        let stack = build_stack("segment=32", &registry).unwrap();
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn unknown_layer_type_is_an_error() {
        let registry = LayerRegistry::with_builtins();
        assert_eq!(
            build_stack("nope", &registry).unwrap_err(),
            StackBuildError::UnknownLayerType("nope".into())
        );
    }

    #[test]
    fn missing_layer_type_is_an_error() {
        let registry = LayerRegistry::with_builtins();
        assert_eq!(build_stack("raw,,term", &registry).unwrap_err(), StackBuildError::MissingLayerType);
    }

    #[test]
    fn empty_description_is_an_empty_stack() {
        let registry = LayerRegistry::with_builtins();
        let stack = build_stack("  ", &registry).unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn invalid_argument_is_reported_with_layer_name() {
        let registry = LayerRegistry::with_builtins();
        let err = build_stack("raw=unexpected", &registry).unwrap_err();
        assert_eq!(
            err,
            StackBuildError::InvalidArgument {
                layer: "raw".into(),
                reason: "does not take an argument".into(),
            }
        );
    }

    #[test]
    fn custom_registration_is_visible_to_build_stack() {
        let registry = LayerRegistry::empty();
        registry.register("raw", |arg| Ok(Box::new(raw::RawLayer::from_arg(arg)?)));
        let stack = build_stack("raw", &registry).unwrap();
        assert_eq!(stack.len(), 1);
    }
}
