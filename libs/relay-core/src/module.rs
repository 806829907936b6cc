//! The module contract and its static-plugin registry (spec §4.1, §4.2).
//!
//! Modules are ordinary Rust types that self-register at link time via
//! `inventory::submit!`, the pack's idiom for static plugin registries
//! (`Alb-O-xeno/crates/editor/.../invocation/tests/mod.rs`). The
//! *enabled* set and its order are still driven by the filesystem, per
//! spec: `ModuleRegistry::load` scans a directory of zero-byte marker
//! files named `<module_name>.module`, sorts the stems lexicographically,
//! and resolves each one against the global registry.

use std::path::Path;

use tracing::warn;

use crate::error::ModuleLoadError;
use crate::types::MessageContext;

/// Suffix a marker file must carry to be considered (spec §6's
/// "source-module suffix").
pub const MODULE_SUFFIX: &str = ".module";

/// A uniform transformation unit (spec §4.2).
///
/// `transform` cannot return `Result`: a conforming module recovers from
/// its own internal failures and returns the payload unchanged, emitting
/// a `tracing::warn!` if it wants the operator to notice. The registry
/// additionally wraps every call in a panic boundary so a buggy module
/// can never bring a worker down (spec §9).
pub trait Module: Send + Sync {
    /// Human-readable description, shown when the module is loaded.
    fn description(&self) -> &'static str;

    /// Transform one message. May inspect, log, or mutate `payload`.
    /// Must not touch any socket.
    fn transform(&self, ctx: &MessageContext, payload: Vec<u8>) -> Vec<u8>;
}

/// One static registration: a stable name (the filename-without-extension
/// analogue) plus a constructor.
pub struct RegisteredModule {
    pub name: &'static str,
    pub construct: fn() -> Box<dyn Module>,
}

inventory::collect!(RegisteredModule);

/// Registers a `Module` under `$name`, constructible with `$ctor`.
///
/// ```ignore
/// register_module!("display_client", DisplayModule::new_client);
/// ```
#[macro_export]
macro_rules! register_module {
    ($name:expr, $ctor:expr) => {
        inventory::submit! {
            $crate::module::RegisteredModule {
                name: $name,
                construct: $ctor,
            }
        }
    };
}

/// An ordered, immutable pipeline for one direction (spec §4.1).
///
/// Built once at startup by [`ModuleRegistry::load`]; shared read-only
/// across every connection worker thereafter.
pub struct ModuleRegistry {
    modules: Vec<(String, Box<dyn Module>)>,
}

impl ModuleRegistry {
    /// Enumerate `dir`, resolve every `*.module` marker file (other than
    /// none — there is no package-init file in this scheme, but the rule
    /// is stated for parity with spec §4.1) in sorted filename order, and
    /// bind each name against the global `inventory` registry.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ModuleLoadError> {
        let dir = dir.as_ref();
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| ModuleLoadError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        })? {
            let entry = entry.map_err(|e| ModuleLoadError::ReadDir {
                path: dir.to_path_buf(),
                source: e,
            })?;
            if let Some(stem) = Self::marker_stem(&entry.file_name()) {
                names.push(stem);
            }
        }
        names.sort();

        let mut modules = Vec::with_capacity(names.len());
        for name in names {
            let registered = inventory::iter::<RegisteredModule>()
                .into_iter()
                .find(|m| m.name == name)
                .ok_or_else(|| ModuleLoadError::UnregisteredModule(name.clone()))?;
            modules.push((name, (registered.construct)()));
        }

        Ok(Self { modules })
    }

    /// An empty pipeline (identity transform), used for the byte-fidelity
    /// property test (spec §8 property 1) and as a safe default.
    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Build a pipeline directly from an explicit, already-ordered module
    /// list, bypassing the marker-file mechanism. Used by relay-engine's
    /// hermetic loopback tests (spec §8), which exercise pipeline
    /// composition without touching the filesystem.
    pub fn from_modules(modules: Vec<(String, Box<dyn Module>)>) -> Self {
        Self { modules }
    }

    fn marker_stem(file_name: &std::ffi::OsStr) -> Option<String> {
        let name = file_name.to_str()?;
        name.strip_suffix(MODULE_SUFFIX).map(str::to_owned)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Name and human-readable [`Module::description`] for every loaded
    /// module, in pipeline order — used for the startup load banner
    /// (spec §2, `original_source/parley.py`'s
    /// `print(f"\t<-> {module_name} - {module.module_description}")`).
    pub fn module_descriptions(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.modules
            .iter()
            .map(|(name, module)| (name.as_str(), module.description()))
    }

    /// Run `payload` through every module in order, module k's output
    /// feeding module k+1 (spec §4.5.3 step 3, §8 property 2).
    pub fn run_pipeline(&self, ctx: &MessageContext, payload: Vec<u8>) -> Vec<u8> {
        let mut payload = payload;
        for (name, module) in &self.modules {
            payload = Self::invoke_with_fault_boundary(name, module.as_ref(), ctx, payload);
        }
        payload
    }

    /// Call `module.transform`, recovering the original payload if the
    /// module panics instead of returning (spec §9: no module fault may
    /// crash the relay).
    fn invoke_with_fault_boundary(
        name: &str,
        module: &dyn Module,
        ctx: &MessageContext,
        payload: Vec<u8>,
    ) -> Vec<u8> {
        let fallback = payload.clone();
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            module.transform(ctx, payload)
        })) {
            Ok(out) => out,
            Err(_) => {
                warn!(module = name, "module panicked; forwarding payload unchanged");
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    struct Upper;
    impl Module for Upper {
        fn description(&self) -> &'static str {
            "uppercase ASCII"
        }
        fn transform(&self, _ctx: &MessageContext, payload: Vec<u8>) -> Vec<u8> {
            payload.into_iter().map(|b| b.to_ascii_uppercase()).collect()
        }
    }

    struct Suffix;
    impl Module for Suffix {
        fn description(&self) -> &'static str {
            "append !"
        }
        fn transform(&self, _ctx: &MessageContext, mut payload: Vec<u8>) -> Vec<u8> {
            payload.push(b'!');
            payload
        }
    }

    struct Panics;
    impl Module for Panics {
        fn description(&self) -> &'static str {
            "always panics"
        }
        fn transform(&self, _ctx: &MessageContext, _payload: Vec<u8>) -> Vec<u8> {
            panic!("boom")
        }
    }

    fn ctx() -> MessageContext {
        let a: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:2".parse().unwrap();
        MessageContext::new(1, a, b)
    }

    #[test]
    fn module_descriptions_pairs_name_with_description_in_order() {
        let reg = ModuleRegistry {
            modules: vec![
                ("01_upper".to_string(), Box::new(Upper)),
                ("02_suffix".to_string(), Box::new(Suffix)),
            ],
        };
        let pairs: Vec<_> = reg.module_descriptions().collect();
        assert_eq!(
            pairs,
            vec![("01_upper", "uppercase ASCII"), ("02_suffix", "append !")]
        );
    }

    #[test]
    fn empty_registry_is_identity() {
        let reg = ModuleRegistry::empty();
        let out = reg.run_pipeline(&ctx(), b"hello".to_vec());
        assert_eq!(out, b"hello");
    }

    #[test]
    fn pipeline_composes_in_insertion_order() {
        let reg = ModuleRegistry {
            modules: vec![
                ("01_upper".to_string(), Box::new(Upper)),
                ("02_suffix".to_string(), Box::new(Suffix)),
            ],
        };
        let out = reg.run_pipeline(&ctx(), b"abc".to_vec());
        assert_eq!(out, b"ABC!");
    }

    #[test]
    fn panicking_module_yields_original_payload() {
        let reg = ModuleRegistry {
            modules: vec![("panics".to_string(), Box::new(Panics))],
        };
        let out = reg.run_pipeline(&ctx(), b"untouched".to_vec());
        assert_eq!(out, b"untouched");
    }

    #[test]
    fn load_rejects_unregistered_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nope.module"), b"").unwrap();
        let err = ModuleRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, ModuleLoadError::UnregisteredModule(name) if name == "nope"));
    }

    #[test]
    fn load_ignores_files_without_the_module_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), b"").unwrap();
        let reg = ModuleRegistry::load(dir.path()).unwrap();
        assert!(reg.is_empty());
    }
}
