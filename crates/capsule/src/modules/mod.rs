//! Builtin module registry.
//!
//! A fixed catalog of emulated runtime modules that sandboxed scripts reach
//! through `require`. Each module exposes a narrow method surface and is
//! instantiated into the script's engine context on first `require`.
//!
//! The catalog is assembled once and never mutated afterwards; share it
//! behind an `Arc`.

mod buffer;
mod fs;
mod http;
mod lodash;
pub mod path;
mod url;
pub mod util;

pub use buffer::BufferModule;
pub use fs::FsModule;
pub use http::HttpModule;
pub use lodash::LodashModule;
pub use path::PathModule;
pub use url::{ParsedUrl, UrlError, UrlModule, parse_url};
pub use util::UtilModule;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rquickjs::{Ctx, Exception, Object};
use serde::Serialize;
use thiserror::Error;

use crate::sandbox::{EventLoop, OutputSink};

/// Errors from module lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// Name is neither a builtin nor an allow-listed third-party module
    #[error("Cannot find module '{0}'")]
    NotFound(String),
}

/// Whether a module emulates a runtime builtin or an allow-listed package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleOrigin {
    /// Emulated runtime builtin
    Builtin,
    /// Allow-listed third-party utility
    ThirdParty,
}

/// Name and method surface of a registered module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    /// Name passed to `require`
    pub name: &'static str,
    /// Exposed members
    pub methods: &'static [&'static str],
    /// Builtin or third-party
    pub origin: ModuleOrigin,
}

/// Host services available to modules while they are instantiated.
#[derive(Clone)]
pub struct ModuleEnv {
    /// Where diagnostics from module code go
    pub sink: Arc<dyn OutputSink>,
    /// Virtual working directory
    pub cwd: String,
    /// The execution's timer queue
    pub events: EventLoop,
}

impl fmt::Debug for ModuleEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEnv")
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

/// An emulated module.
pub trait BuiltinModule: Send + Sync {
    /// Name passed to `require`.
    fn name(&self) -> &'static str;

    /// Members exposed on the module object.
    fn methods(&self) -> &'static [&'static str];

    /// Build the module object inside an engine context.
    fn instantiate<'js>(&self, ctx: &Ctx<'js>, env: &ModuleEnv) -> rquickjs::Result<Object<'js>>;
}

struct Entry {
    module: Box<dyn BuiltinModule>,
    origin: ModuleOrigin,
}

/// The module catalog.
pub struct ModuleRegistry {
    modules: BTreeMap<&'static str, Entry>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ModuleRegistry {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }

    /// The standard catalog: `path`, `buffer`, `url`, `util`, `fs`, `http`,
    /// plus the allow-listed `lodash`.
    pub fn standard() -> Self {
        Self::empty()
            .with_builtin(PathModule)
            .with_builtin(BufferModule)
            .with_builtin(UrlModule)
            .with_builtin(UtilModule)
            .with_builtin(FsModule)
            .with_builtin(HttpModule)
            .with_third_party(LodashModule)
    }

    /// Add an emulated builtin, replacing any module with the same name.
    pub fn with_builtin(self, module: impl BuiltinModule + 'static) -> Self {
        self.with(Box::new(module), ModuleOrigin::Builtin)
    }

    /// Add an allow-listed third-party module.
    pub fn with_third_party(self, module: impl BuiltinModule + 'static) -> Self {
        self.with(Box::new(module), ModuleOrigin::ThirdParty)
    }

    fn with(mut self, module: Box<dyn BuiltinModule>, origin: ModuleOrigin) -> Self {
        self.modules.insert(module.name(), Entry { module, origin });
        self
    }

    /// Look a module up by the name given to `require`.
    pub fn lookup(&self, name: &str) -> Result<&dyn BuiltinModule, ModuleError> {
        self.modules
            .get(name)
            .map(|entry| entry.module.as_ref())
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))
    }

    /// Whether `name` resolves.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Descriptors for every registered module, sorted by name.
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.modules
            .values()
            .map(|entry| ModuleDescriptor {
                name: entry.module.name(),
                methods: entry.module.methods(),
                origin: entry.origin,
            })
            .collect()
    }
}

/// Resolve `name` for a script, instantiating it on first use.
///
/// Repeated requires within one execution return the same object. A missing
/// module is thrown into the script as an `Error`.
pub(crate) fn load_module<'js>(
    ctx: &Ctx<'js>,
    registry: &ModuleRegistry,
    env: &ModuleEnv,
    name: &str,
) -> rquickjs::Result<Object<'js>> {
    if let Some(cached) = env.events.cached_module(ctx, name)? {
        return Ok(cached);
    }
    let module = match registry.lookup(name) {
        Ok(module) => module,
        Err(e) => {
            tracing::debug!(module = name, "module not found");
            return Err(Exception::throw_message(ctx, &e.to_string()));
        }
    };
    let object = module.instantiate(ctx, env)?;
    env.events.cache_module(ctx, name, object.clone());
    Ok(object)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog() {
        let registry = ModuleRegistry::standard();
        for name in ["path", "buffer", "url", "util", "fs", "http", "lodash"] {
            assert!(registry.contains(name), "{} missing", name);
        }
        assert_eq!(registry.lookup("path").unwrap().name(), "path");
    }

    #[test]
    fn test_unknown_module() {
        let registry = ModuleRegistry::standard();
        let err = registry.lookup("not-a-real-module").err().unwrap();
        assert_eq!(err.to_string(), "Cannot find module 'not-a-real-module'");
    }

    #[test]
    fn test_descriptors() {
        let registry = ModuleRegistry::standard();
        let descriptors = registry.descriptors();
        let path = descriptors.iter().find(|d| d.name == "path").unwrap();
        for method in ["join", "resolve", "dirname", "basename", "extname"] {
            assert!(path.methods.contains(&method));
        }
        let lodash = descriptors.iter().find(|d| d.name == "lodash").unwrap();
        assert_eq!(lodash.origin, ModuleOrigin::ThirdParty);
    }
}
