// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Body, Child, Hook, Mark, SpecNode, SuiteNode, SuiteTree, tree::join_full_name};
use crate::{
    errors::ModuleError,
    helpers::{location_str, panic_message},
};
use camino::{Utf8Path, Utf8PathBuf};
use specrun_metadata::{FailureRecord, HookKind};
use std::{panic::AssertUnwindSafe, time::Duration};
use tracing::debug;

/// The role a file plays in a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModuleKind {
    /// Loaded first, before helpers. Typically sets up the environment.
    Require,

    /// Loaded by every worker before spec files. May register top-level hooks.
    Helper,

    /// A spec file.
    Spec,
}

/// A suite declaration passed to [`SuiteBuilder::open_suite`].
#[derive(Clone, Debug, Default)]
pub struct SuiteDecl {
    /// The suite's description.
    pub description: String,

    /// Focus or exclusion.
    pub mark: Mark,

    /// Where the suite was declared.
    pub location: Option<String>,
}

/// A spec declaration passed to [`SuiteBuilder::add_spec`].
#[derive(Debug, Default)]
pub struct SpecDecl {
    /// The spec's description.
    pub description: String,

    /// The body. A spec without a body is pending.
    pub body: Option<Body>,

    /// Focus or exclusion.
    pub mark: Mark,

    /// If set, the spec is pending and its body never runs.
    pub pending_reason: Option<String>,

    /// Overrides the default timeout.
    pub timeout: Option<Duration>,

    /// Where the spec was declared.
    pub location: Option<String>,
}

/// Collects suites, specs and hooks registered by spec modules into a [`SuiteTree`].
///
/// Registration happens one file at a time through [`register_file`](Self::register_file), which
/// is transactional: if a file fails to register, nothing it registered is kept.
#[derive(Debug)]
pub struct SuiteBuilder {
    parallel: bool,
    // stack[0] is the root suite; the last element is the suite currently being declared.
    stack: Vec<SuiteNode>,
    global_failures: Vec<FailureRecord>,
    current: Option<(Utf8PathBuf, ModuleKind)>,
    configuration_error: Option<ModuleError>,
}

impl SuiteBuilder {
    /// Creates a new builder. In parallel mode, spec files may not register top-level
    /// `before-each` or `after-each` hooks, and no file may focus a suite or spec.
    pub fn new(parallel: bool) -> Self {
        Self {
            parallel,
            stack: vec![SuiteNode::root()],
            global_failures: Vec::new(),
            current: None,
            configuration_error: None,
        }
    }

    /// Registers everything declared by `f` as coming from `file`.
    ///
    /// If `f` returns an error, panics, or registers something it isn't allowed to, everything
    /// it registered is discarded and the error is returned.
    pub fn register_file<F>(
        &mut self,
        file: &Utf8Path,
        kind: ModuleKind,
        f: F,
    ) -> Result<(), ModuleError>
    where
        F: FnOnce(&mut SuiteBuilder) -> Result<(), ModuleError>,
    {
        let checkpoint = Checkpoint::new(self.root());
        self.current = Some((file.to_owned(), kind));
        self.configuration_error = None;

        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(result) => result,
            Err(payload) => Err(ModuleError::Panicked {
                message: panic_message(&*payload),
            }),
        };
        let result = result.and_then(|()| match self.configuration_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        });

        match &result {
            Ok(()) => {
                while self.stack.len() > 1 {
                    self.close_suite();
                }
            }
            Err(error) => {
                debug!("discarding registrations from {file}: {error}");
                self.stack.truncate(1);
                checkpoint.restore(&mut self.stack[0]);
            }
        }

        self.current = None;
        self.configuration_error = None;
        result
    }

    /// Returns the file currently being registered, if any.
    pub fn current_file(&self) -> Option<&Utf8Path> {
        self.current.as_ref().map(|(file, _)| file.as_path())
    }

    /// Returns true if the builder enforces parallel-mode restrictions.
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Records a failure that isn't attributed to any spec or suite.
    pub fn add_global_failure(&mut self, failure: FailureRecord) {
        self.global_failures.push(failure);
    }

    /// Opens a nested suite. Everything registered until the matching
    /// [`close_suite`](Self::close_suite) belongs to it.
    pub fn open_suite(&mut self, decl: SuiteDecl) {
        if decl.mark == Mark::Focus {
            self.reject_focus_in_parallel("fdescribe");
        }
        let full_name = join_full_name(&self.current_suite().full_name, &decl.description);
        let suite = SuiteNode::new(
            decl.description,
            full_name,
            self.current_file().map(ToOwned::to_owned),
            decl.mark,
            decl.location,
        );
        self.stack.push(suite);
    }

    /// Closes the innermost open suite.
    pub fn close_suite(&mut self) {
        if self.stack.len() <= 1 {
            debug!("close_suite called with no open suite");
            return;
        }
        if let Some(suite) = self.stack.pop() {
            self.current_suite_mut().children.push(Child::Suite(suite));
        }
    }

    /// Adds a spec to the innermost open suite.
    pub fn add_spec(&mut self, decl: SpecDecl) {
        if decl.mark == Mark::Focus {
            self.reject_focus_in_parallel("fit");
        }
        let full_name = join_full_name(&self.current_suite().full_name, &decl.description);
        let spec = SpecNode {
            id: String::new(),
            description: decl.description,
            full_name,
            file: self.current_file().map(ToOwned::to_owned),
            body: decl.body,
            pending_reason: decl.pending_reason,
            timeout: decl.timeout,
            mark: decl.mark,
            location: decl.location,
        };
        self.current_suite_mut().children.push(Child::Spec(spec));
    }

    /// Adds a hook to the innermost open suite.
    pub fn add_hook(&mut self, hook: Hook) {
        let at_top_level = self.stack.len() == 1;
        let in_spec_file = matches!(self.current, Some((_, ModuleKind::Spec)));
        if self.parallel && at_top_level && in_spec_file && hook.kind.is_each() {
            self.configuration_error
                .get_or_insert_with(|| ModuleError::Configuration {
                    message: format!(
                        "In parallel mode, {} must be in a describe block or in a helper file",
                        hook.kind
                    ),
                });
        }
        self.current_suite_mut().hooks.list_mut(hook.kind).push(hook);
    }

    /// Finishes registration, assigning identifiers in declaration order.
    pub fn finish(mut self) -> SuiteTree {
        while self.stack.len() > 1 {
            self.close_suite();
        }
        let mut root = self.stack.pop().unwrap_or_else(SuiteNode::root);
        let (mut next_suite, mut next_spec) = (0, 0);
        root.assign_ids(&mut next_suite, &mut next_spec);
        SuiteTree {
            root,
            global_failures: self.global_failures,
        }
    }

    // ---
    // Closure-style registration
    // ---

    /// Declares a suite.
    #[track_caller]
    pub fn describe(&mut self, description: &str, f: impl FnOnce(&mut Self)) -> &mut Self {
        let location = caller_location();
        self.describe_impl(description, Mark::None, location, f)
    }

    /// Declares a focused suite.
    #[track_caller]
    pub fn fdescribe(&mut self, description: &str, f: impl FnOnce(&mut Self)) -> &mut Self {
        let location = caller_location();
        self.describe_impl(description, Mark::Focus, location, f)
    }

    /// Declares an excluded suite.
    #[track_caller]
    pub fn xdescribe(&mut self, description: &str, f: impl FnOnce(&mut Self)) -> &mut Self {
        let location = caller_location();
        self.describe_impl(description, Mark::Exclude, location, f)
    }

    /// Declares a spec.
    #[track_caller]
    pub fn it(&mut self, description: &str, body: Body) -> &mut Self {
        let location = caller_location();
        self.it_impl(description, Some(body), Mark::None, location)
    }

    /// Declares a focused spec.
    #[track_caller]
    pub fn fit(&mut self, description: &str, body: Body) -> &mut Self {
        let location = caller_location();
        self.it_impl(description, Some(body), Mark::Focus, location)
    }

    /// Declares an excluded spec.
    #[track_caller]
    pub fn xit(&mut self, description: &str, body: Body) -> &mut Self {
        let location = caller_location();
        self.it_impl(description, Some(body), Mark::Exclude, location)
    }

    /// Declares a spec without a body. It is reported as pending.
    #[track_caller]
    pub fn it_pending(&mut self, description: &str) -> &mut Self {
        let location = caller_location();
        self.it_impl(description, None, Mark::None, location)
    }

    /// Declares a `before-all` hook on the innermost suite.
    #[track_caller]
    pub fn before_all(&mut self, body: Body) -> &mut Self {
        self.hook_impl(HookKind::BeforeAll, body, caller_location())
    }

    /// Declares an `after-all` hook on the innermost suite.
    #[track_caller]
    pub fn after_all(&mut self, body: Body) -> &mut Self {
        self.hook_impl(HookKind::AfterAll, body, caller_location())
    }

    /// Declares a `before-each` hook on the innermost suite.
    #[track_caller]
    pub fn before_each(&mut self, body: Body) -> &mut Self {
        self.hook_impl(HookKind::BeforeEach, body, caller_location())
    }

    /// Declares an `after-each` hook on the innermost suite.
    #[track_caller]
    pub fn after_each(&mut self, body: Body) -> &mut Self {
        self.hook_impl(HookKind::AfterEach, body, caller_location())
    }

    // ---
    // Helper methods
    // ---

    fn describe_impl(
        &mut self,
        description: &str,
        mark: Mark,
        location: String,
        f: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.open_suite(SuiteDecl {
            description: description.to_owned(),
            mark,
            location: Some(location),
        });
        f(self);
        self.close_suite();
        self
    }

    fn it_impl(
        &mut self,
        description: &str,
        body: Option<Body>,
        mark: Mark,
        location: String,
    ) -> &mut Self {
        self.add_spec(SpecDecl {
            description: description.to_owned(),
            body,
            mark,
            location: Some(location),
            ..Default::default()
        });
        self
    }

    fn hook_impl(&mut self, kind: HookKind, body: Body, location: String) -> &mut Self {
        self.add_hook(Hook::new(kind, body).with_location(Some(location)));
        self
    }

    fn reject_focus_in_parallel(&mut self, what: &str) {
        if self.parallel {
            self.configuration_error
                .get_or_insert_with(|| ModuleError::Configuration {
                    message: format!("In parallel mode, {what} is not supported"),
                });
        }
    }

    fn root(&self) -> &SuiteNode {
        &self.stack[0]
    }

    fn current_suite(&self) -> &SuiteNode {
        let index = self.stack.len() - 1;
        &self.stack[index]
    }

    fn current_suite_mut(&mut self) -> &mut SuiteNode {
        let index = self.stack.len() - 1;
        &mut self.stack[index]
    }
}

#[track_caller]
fn caller_location() -> String {
    let caller = std::panic::Location::caller();
    location_str(caller.file(), caller.line())
}

/// Lengths of everything on the root suite, for rolling back a failed registration.
#[derive(Clone, Copy, Debug)]
struct Checkpoint {
    children: usize,
    before_all: usize,
    after_all: usize,
    before_each: usize,
    after_each: usize,
}

impl Checkpoint {
    fn new(root: &SuiteNode) -> Self {
        Self {
            children: root.children.len(),
            before_all: root.hooks.before_all.len(),
            after_all: root.hooks.after_all.len(),
            before_each: root.hooks.before_each.len(),
            after_each: root.hooks.after_each.len(),
        }
    }

    fn restore(self, root: &mut SuiteNode) {
        root.children.truncate(self.children);
        root.hooks.before_all.truncate(self.before_all);
        root.hooks.after_all.truncate(self.after_all);
        root.hooks.before_each.truncate(self.before_each);
        root.hooks.after_each.truncate(self.after_each);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pass() -> Body {
        Body::from_fn(|_| Ok(()))
    }

    #[test]
    fn names_and_ids_follow_declaration_order() {
        let mut builder = SuiteBuilder::new(false);
        builder
            .register_file(Utf8Path::new("spec/a.toml"), ModuleKind::Spec, |b| {
                b.describe("outer", |b| {
                    b.it("first", pass());
                    b.describe("inner", |b| {
                        b.it("second", pass());
                    });
                });
                b.it("top level", pass());
                Ok(())
            })
            .unwrap();

        let tree = builder.finish();
        assert_eq!(
            tree.spec_names(),
            vec!["outer first", "outer inner second", "top level"]
        );
        assert_eq!(tree.spec_count(), 3);

        let Child::Suite(outer) = &tree.root().children()[0] else {
            panic!("expected a suite");
        };
        assert_eq!(outer.id, "suite1");
        assert_eq!(outer.file.as_deref(), Some(Utf8Path::new("spec/a.toml")));
        let Child::Spec(first) = &outer.children()[0] else {
            panic!("expected a spec");
        };
        assert_eq!(first.id, "spec0");
    }

    #[test]
    fn failed_registration_is_rolled_back() {
        let mut builder = SuiteBuilder::new(false);
        builder
            .register_file(Utf8Path::new("spec/ok.toml"), ModuleKind::Spec, |b| {
                b.it("kept", pass());
                Ok(())
            })
            .unwrap();

        let error = builder
            .register_file(Utf8Path::new("spec/bad.toml"), ModuleKind::Spec, |b| {
                b.it("dropped", pass());
                b.before_all(pass());
                b.open_suite(SuiteDecl {
                    description: "left open".to_owned(),
                    ..Default::default()
                });
                Err(ModuleError::thrown("nope"))
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "nope");

        let tree = builder.finish();
        assert_eq!(tree.spec_names(), vec!["kept"]);
        assert!(tree.root().hooks().list(HookKind::BeforeAll).is_empty());
    }

    #[test]
    fn panics_during_registration_are_caught() {
        let mut builder = SuiteBuilder::new(false);
        let error = builder
            .register_file(Utf8Path::new("spec/panics.toml"), ModuleKind::Spec, |b| {
                b.it("dropped", pass());
                panic!("registration blew up");
            })
            .unwrap_err();
        assert!(matches!(error, ModuleError::Panicked { .. }));
        assert_eq!(error.to_string(), "registration blew up");
        assert_eq!(builder.finish().spec_count(), 0);
    }

    #[test]
    fn parallel_mode_rejects_top_level_each_hooks_in_spec_files() {
        let mut builder = SuiteBuilder::new(true);
        let error = builder
            .register_file(Utf8Path::new("spec/a.toml"), ModuleKind::Spec, |b| {
                b.after_each(pass());
                b.it("spec", pass());
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(error, ModuleError::Configuration { .. }));
        assert_eq!(
            error.to_string(),
            "In parallel mode, afterEach must be in a describe block or in a helper file"
        );

        // Allowed in helpers, inside suites, and for before-all.
        builder
            .register_file(Utf8Path::new("spec/helpers/h.toml"), ModuleKind::Helper, |b| {
                b.before_each(pass());
                Ok(())
            })
            .unwrap();
        builder
            .register_file(Utf8Path::new("spec/b.toml"), ModuleKind::Spec, |b| {
                b.before_all(pass());
                b.describe("suite", |b| {
                    b.before_each(pass());
                    b.it("spec", pass());
                });
                Ok(())
            })
            .unwrap();

        let tree = builder.finish();
        assert_eq!(tree.spec_names(), vec!["suite spec"]);
        assert_eq!(tree.root().hooks().list(HookKind::BeforeEach).len(), 1);
    }

    #[test]
    fn non_parallel_mode_allows_top_level_each_hooks() {
        let mut builder = SuiteBuilder::new(false);
        builder
            .register_file(Utf8Path::new("spec/a.toml"), ModuleKind::Spec, |b| {
                b.before_each(pass());
                Ok(())
            })
            .unwrap();
        assert_eq!(
            builder
                .finish()
                .root()
                .hooks()
                .list(HookKind::BeforeEach)
                .len(),
            1
        );
    }

    #[test]
    fn focus_is_detected() {
        let mut builder = SuiteBuilder::new(false);
        builder.describe("plain", |b| {
            b.fit("focused", pass());
        });
        assert!(builder.finish().has_focus());
    }

    #[test]
    fn parallel_mode_rejects_focus() {
        let mut builder = SuiteBuilder::new(true);
        let error = builder
            .register_file(Utf8Path::new("spec/a.toml"), ModuleKind::Spec, |b| {
                b.it("plain", pass());
                b.fit("focused", pass());
                Ok(())
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "In parallel mode, fit is not supported");

        let error = builder
            .register_file(Utf8Path::new("spec/b.toml"), ModuleKind::Spec, |b| {
                b.fdescribe("focused", |b| {
                    b.it("spec", pass());
                });
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(error, ModuleError::Configuration { .. }));
        assert_eq!(
            error.to_string(),
            "In parallel mode, fdescribe is not supported"
        );

        let tree = builder.finish();
        assert!(!tree.has_focus());
        assert_eq!(tree.spec_count(), 0);
    }
}
