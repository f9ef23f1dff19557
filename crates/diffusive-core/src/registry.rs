//! Method registry and module loading
//!
//! Invocations name their method by signature. The registry maps each
//! signature to a callable that decodes the receiver and arguments from the
//! request, runs, and encodes its return value. Types the registry does not
//! know can be installed at run time: their code bytes are resolved through
//! a [`RemoteCodeSource`](crate::code_source::RemoteCodeSource) and handed to
//! a [`ModuleLoader`], which registers the type's methods.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use diffusive_common::protocol::signature::split_top_level;
use diffusive_common::protocol::{InvocationRequest, Signature};

/// A registered callable.
pub type MethodFn = dyn Fn(&Invocation<'_>) -> anyhow::Result<Vec<u8>> + Send + Sync;

/// Types every peer understands without loading code.
const BUILTIN_TYPES: &[&str] = &[
    "()", "bool", "char", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128",
    "usize", "f32", "f64", "str", "String",
];

const BUILTIN_CONTAINERS: &[&str] = &["Vec", "Option", "HashMap", "BTreeMap", "HashSet", "BTreeSet"];

/// View of a request handed to a callable.
pub struct Invocation<'a> {
    request: &'a InvocationRequest,
}

impl<'a> Invocation<'a> {
    pub fn new(request: &'a InvocationRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &InvocationRequest {
        self.request
    }

    /// Decodes the receiver.
    pub fn target<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(self.request.decode_target()?)
    }

    /// Decodes the argument at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        Ok(self.request.decode_argument(index)?)
    }

    /// Encodes a return value with the request's serializer.
    pub fn encode<R: Serialize + ?Sized>(&self, value: &R) -> anyhow::Result<Vec<u8>> {
        Ok(self.request.serializer().encode(value)?)
    }
}

/// Signature-keyed table of callables, plus the set of known types.
#[derive(Default)]
pub struct MethodRegistry {
    methods: RwLock<HashMap<Signature, Arc<MethodFn>>>,
    types: RwLock<HashSet<String>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `method` under `signature` and marks its target type as known.
    ///
    /// Re-registering a signature replaces the previous callable.
    pub fn register<F>(&self, signature: Signature, method: F)
    where
        F: Fn(&Invocation<'_>) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
    {
        debug!("Registering {}", signature);
        self.register_type(signature.target_type.clone());
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signature, Arc::new(method));
    }

    pub fn register_type(&self, type_name: impl Into<String>) {
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name.into());
    }

    /// `true` for builtin types, registered types, and builtin containers
    /// whose element types are all known.
    pub fn knows_type(&self, type_name: &str) -> bool {
        self.missing_types(type_name).is_empty()
    }

    /// Type names inside `type_name` that still need code.
    ///
    /// Builtin containers are looked through, so `Vec<demo.Point>` needs
    /// `demo.Point`. Names are returned once each, innermost last.
    pub fn missing_types(&self, type_name: &str) -> Vec<String> {
        let mut missing = Vec::new();
        self.collect_missing(type_name.trim(), &mut missing);
        missing
    }

    fn collect_missing(&self, type_name: &str, missing: &mut Vec<String>) {
        if BUILTIN_TYPES.contains(&type_name) {
            return;
        }
        if let Some((base, rest)) = type_name.split_once('<') {
            if BUILTIN_CONTAINERS.contains(&base.trim()) && rest.ends_with('>') {
                for element in split_top_level(&rest[..rest.len() - 1]) {
                    self.collect_missing(&element, missing);
                }
                return;
            }
        }
        let known = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(type_name);
        if !known && !missing.iter().any(|m| m == type_name) {
            missing.push(type_name.to_string());
        }
    }

    pub fn lookup(&self, signature: &Signature) -> Option<Arc<MethodFn>> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signature)
            .cloned()
    }

    /// Registered signatures, sorted.
    pub fn signatures(&self) -> Vec<Signature> {
        let mut signatures: Vec<_> = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        signatures.sort();
        signatures
    }
}

/// Installs the methods of a type from its code bytes.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, type_name: &str, code: &[u8], registry: &MethodRegistry) -> anyhow::Result<()>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&str, &[u8], &MethodRegistry) -> anyhow::Result<()> + Send + Sync,
{
    fn load(&self, type_name: &str, code: &[u8], registry: &MethodRegistry) -> anyhow::Result<()> {
        self(type_name, code, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffusive_common::serializer::SerializerKind;

    fn add_signature() -> Signature {
        Signature::new("Counter", "add", ["i64"])
    }

    #[test]
    fn test_register_and_invoke() {
        let registry = MethodRegistry::new();
        registry.register(add_signature(), |inv| {
            let base: i64 = inv.target()?;
            let delta: i64 = inv.arg(0)?;
            inv.encode(&(base + delta))
        });

        let request = InvocationRequest::builder(SerializerKind::Json, "Counter", "add")
            .target(&40i64)
            .argument("i64", &2i64)
            .returns("i64")
            .build()
            .unwrap();

        let method = registry.lookup(&request.signature()).unwrap();
        let bytes = method(&Invocation::new(&request)).unwrap();
        assert_eq!(SerializerKind::Json.decode::<i64>(&bytes).unwrap(), 42);
    }

    #[test]
    fn test_known_types() {
        let registry = MethodRegistry::new();
        assert!(registry.knows_type("i64"));
        assert!(registry.knows_type("String"));
        assert!(registry.knows_type("Vec<i64>"));
        assert!(registry.knows_type("HashMap<String,i64>"));
        assert!(!registry.knows_type("demo.Point"));
        assert!(!registry.knows_type("Vec<demo.Point>"));

        registry.register(Signature::new("demo.Point", "norm", Vec::<String>::new()), |inv| {
            inv.encode(&0.0f64)
        });
        assert!(registry.knows_type("demo.Point"));
        assert!(registry.knows_type("Vec<demo.Point>"));

        registry.register_type("demo.Shape");
        assert!(registry.knows_type("demo.Shape"));
    }

    #[test]
    fn test_missing_types_looks_inside_containers() {
        let registry = MethodRegistry::new();
        assert_eq!(registry.missing_types("Vec<demo.Point>"), vec!["demo.Point"]);
        assert_eq!(
            registry.missing_types("HashMap<String, Vec<demo.Point>>"),
            vec!["demo.Point"]
        );
        assert_eq!(
            registry.missing_types("BTreeMap<demo.Key,Option<demo.Point>>"),
            vec!["demo.Key", "demo.Point"]
        );
        assert_eq!(registry.missing_types("HashSet<demo.Point>"), vec!["demo.Point"]);
        assert!(registry.missing_types("Option<Vec<u8>>").is_empty());

        // a user type named like a container is not looked through
        assert_eq!(registry.missing_types("demo.Box<i64>"), vec!["demo.Box<i64>"]);

        registry.register_type("demo.Point");
        assert!(registry.missing_types("HashMap<String,Vec<demo.Point>>").is_empty());
    }

    #[test]
    fn test_lookup_distinguishes_overloads() {
        let registry = MethodRegistry::new();
        registry.register(Signature::new("T", "m", ["i64"]), |inv| inv.encode("int"));
        registry.register(Signature::new("T", "m", ["String"]), |inv| inv.encode("string"));

        assert!(registry.lookup(&Signature::new("T", "m", ["i64"])).is_some());
        assert!(registry.lookup(&Signature::new("T", "m", ["f64"])).is_none());
        assert_eq!(registry.signatures().len(), 2);
    }

    #[test]
    fn test_closure_loader() {
        let registry = MethodRegistry::new();
        let loader = |type_name: &str, code: &[u8], registry: &MethodRegistry| -> anyhow::Result<()> {
            anyhow::ensure!(code == b"module", "bad module");
            registry.register_type(type_name);
            Ok(())
        };

        assert!(loader.load("demo.Point", b"junk", &registry).is_err());
        loader.load("demo.Point", b"module", &registry).unwrap();
        assert!(registry.knows_type("demo.Point"));
    }
}
