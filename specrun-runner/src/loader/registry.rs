// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Loader, SpecModule};
use crate::{
    errors::{LoadError, LoadErrorKind, ModuleError},
    suite::SuiteBuilder,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

/// A compiled-in module: a function that registers suites.
pub type RegisterFn = fn(&mut SuiteBuilder) -> Result<(), ModuleError>;

/// Compiled-in spec modules, keyed by path.
///
/// A path matches a registration if it is equal to the registered path, or ends with it
/// component-wise. For example, `spec/math_spec.rs` matches both `/project/spec/math_spec.rs` and
/// `spec/math_spec.rs`.
#[derive(Clone, Default)]
pub struct SpecRegistry {
    modules: BTreeMap<Utf8PathBuf, RegisterFn>,
}

impl SpecRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module for `path`, replacing any earlier registration.
    pub fn register(&mut self, path: impl Into<Utf8PathBuf>, f: RegisterFn) -> &mut Self {
        self.modules.insert(path.into(), f);
        self
    }

    /// Returns the number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Looks up the module for `path`.
    pub fn get(&self, path: &Utf8Path) -> Option<RegisterFn> {
        if let Some(f) = self.modules.get(path) {
            return Some(*f);
        }
        // Prefer the longest registered path that matches.
        self.modules
            .iter()
            .filter(|(registered, _)| path.ends_with(registered))
            .max_by_key(|(registered, _)| registered.components().count())
            .map(|(_, f)| *f)
    }
}

impl fmt::Debug for SpecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}

/// Loads compiled-in modules from a [`SpecRegistry`].
#[derive(Clone, Debug)]
pub struct StaticLoader {
    registry: Arc<SpecRegistry>,
}

impl StaticLoader {
    /// Creates a new `StaticLoader`.
    pub fn new(registry: Arc<SpecRegistry>) -> Self {
        Self { registry }
    }
}

impl Loader for StaticLoader {
    fn load(&self, path: &Utf8Path) -> Result<Box<dyn SpecModule>, LoadError> {
        match self.registry.get(path) {
            Some(f) => {
                debug!("loaded compiled-in module for {path}");
                Ok(Box::new(CompiledModule(f)))
            }
            None => Err(LoadError::new(path, LoadErrorKind::NotRegistered)),
        }
    }
}

struct CompiledModule(RegisterFn);

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompiledModule(..)")
    }
}

impl SpecModule for CompiledModule {
    fn register(self: Box<Self>, builder: &mut SuiteBuilder) -> Result<(), ModuleError> {
        (self.0)(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::Body;

    fn one(builder: &mut SuiteBuilder) -> Result<(), ModuleError> {
        builder.it("one", Body::from_fn(|_| Ok(())));
        Ok(())
    }

    fn two(builder: &mut SuiteBuilder) -> Result<(), ModuleError> {
        builder.it("two", Body::from_fn(|_| Ok(())));
        Ok(())
    }

    fn names_for(registry: &SpecRegistry, path: &str) -> Option<Vec<String>> {
        let f = registry.get(Utf8Path::new(path))?;
        let mut builder = SuiteBuilder::new(false);
        f(&mut builder).unwrap();
        Some(
            builder
                .finish()
                .spec_names()
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
        )
    }

    #[test]
    fn suffix_matching() {
        let mut registry = SpecRegistry::new();
        registry
            .register("one_spec.rs", one)
            .register("nested/one_spec.rs", two);
        assert_eq!(registry.len(), 2);

        assert_eq!(names_for(&registry, "spec/one_spec.rs").unwrap(), ["one"]);
        assert_eq!(
            names_for(&registry, "spec/nested/one_spec.rs").unwrap(),
            ["two"]
        );
        assert!(names_for(&registry, "spec/xone_spec.rs").is_none());
    }
}
