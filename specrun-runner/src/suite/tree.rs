// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Body;
use camino::Utf8PathBuf;
use specrun_metadata::{FailureRecord, HookKind, SpecInfo, SuiteInfo};
use std::time::Duration;

/// A focus or exclusion mark on a suite or spec.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mark {
    /// No mark.
    #[default]
    None,

    /// Focused (`fdescribe`/`fit`). If anything in a tree is focused, only focused subtrees run.
    Focus,

    /// Excluded (`xdescribe`/`xit`). Exclusion is inherited by everything inside.
    Exclude,
}

/// A fully registered suite tree, ready to be run by an engine.
#[derive(Debug)]
pub struct SuiteTree {
    pub(crate) root: SuiteNode,
    pub(crate) global_failures: Vec<FailureRecord>,
}

impl SuiteTree {
    /// Returns the top-level suite. It has no description, and is never reported on its own.
    pub fn root(&self) -> &SuiteNode {
        &self.root
    }

    /// Failures recorded while building the tree, such as spec files that failed to load.
    pub fn global_failures(&self) -> &[FailureRecord] {
        &self.global_failures
    }

    /// Returns the number of specs in the tree, including excluded ones.
    pub fn spec_count(&self) -> usize {
        self.root.spec_count()
    }

    /// Returns true if any suite or spec in the tree is focused.
    pub fn has_focus(&self) -> bool {
        self.root.has_focus()
    }

    /// Returns the full names of all specs, in declaration order.
    pub fn spec_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.root.collect_spec_names(&mut names);
        names
    }
}

/// A `describe` block.
#[derive(Debug)]
pub struct SuiteNode {
    pub(crate) id: String,
    pub(crate) description: String,
    pub(crate) full_name: String,
    pub(crate) file: Option<Utf8PathBuf>,
    pub(crate) mark: Mark,
    pub(crate) location: Option<String>,
    pub(crate) children: Vec<Child>,
    pub(crate) hooks: Hooks,
}

impl SuiteNode {
    pub(crate) fn new(
        description: String,
        full_name: String,
        file: Option<Utf8PathBuf>,
        mark: Mark,
        location: Option<String>,
    ) -> Self {
        Self {
            id: String::new(),
            description,
            full_name,
            file,
            mark,
            location,
            children: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    pub(crate) fn root() -> Self {
        Self::new(String::new(), String::new(), None, Mark::None, None)
    }

    /// The suite's own description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Descriptions of all enclosing suites and this one, joined by spaces.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The suite's children in declaration order.
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// The suite's hooks.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub(crate) fn info(&self) -> SuiteInfo {
        SuiteInfo {
            id: self.id.clone(),
            description: self.description.clone(),
            full_name: self.full_name.clone(),
            file: self.file.clone(),
        }
    }

    fn spec_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Child::Suite(suite) => suite.spec_count(),
                Child::Spec(_) => 1,
            })
            .sum()
    }

    fn has_focus(&self) -> bool {
        self.mark == Mark::Focus
            || self.children.iter().any(|child| match child {
                Child::Suite(suite) => suite.has_focus(),
                Child::Spec(spec) => spec.mark == Mark::Focus,
            })
    }

    fn collect_spec_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        for child in &self.children {
            match child {
                Child::Suite(suite) => suite.collect_spec_names(names),
                Child::Spec(spec) => names.push(&spec.full_name),
            }
        }
    }

    /// Assigns identifiers in declaration order.
    pub(crate) fn assign_ids(&mut self, next_suite: &mut usize, next_spec: &mut usize) {
        self.id = format!("suite{next_suite}");
        *next_suite += 1;
        for child in &mut self.children {
            match child {
                Child::Suite(suite) => suite.assign_ids(next_suite, next_spec),
                Child::Spec(spec) => {
                    spec.id = format!("spec{next_spec}");
                    *next_spec += 1;
                }
            }
        }
    }
}

/// A child of a [`SuiteNode`].
#[derive(Debug)]
pub enum Child {
    /// A nested suite.
    Suite(SuiteNode),

    /// A spec.
    Spec(SpecNode),
}

/// The hooks registered directly on a suite, each list in declaration order.
#[derive(Debug, Default)]
pub struct Hooks {
    pub(crate) before_all: Vec<Hook>,
    pub(crate) after_all: Vec<Hook>,
    pub(crate) before_each: Vec<Hook>,
    pub(crate) after_each: Vec<Hook>,
}

impl Hooks {
    pub(crate) fn list_mut(&mut self, kind: HookKind) -> &mut Vec<Hook> {
        match kind {
            HookKind::BeforeAll => &mut self.before_all,
            HookKind::AfterAll => &mut self.after_all,
            HookKind::BeforeEach => &mut self.before_each,
            HookKind::AfterEach => &mut self.after_each,
        }
    }

    /// Returns the hooks of the given kind.
    pub fn list(&self, kind: HookKind) -> &[Hook] {
        match kind {
            HookKind::BeforeAll => &self.before_all,
            HookKind::AfterAll => &self.after_all,
            HookKind::BeforeEach => &self.before_each,
            HookKind::AfterEach => &self.after_each,
        }
    }
}

/// A before or after hook.
#[derive(Debug)]
pub struct Hook {
    pub(crate) kind: HookKind,
    pub(crate) body: Body,
    pub(crate) timeout: Option<Duration>,
    pub(crate) location: Option<String>,
}

impl Hook {
    /// Creates a new hook.
    pub fn new(kind: HookKind, body: Body) -> Self {
        Self {
            kind,
            body,
            timeout: None,
            location: None,
        }
    }

    /// Overrides the default timeout for this hook.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the location the hook was declared at.
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    /// The kind of hook.
    pub fn kind(&self) -> HookKind {
        self.kind
    }
}

/// A single spec.
#[derive(Debug)]
pub struct SpecNode {
    pub(crate) id: String,
    pub(crate) description: String,
    pub(crate) full_name: String,
    pub(crate) file: Option<Utf8PathBuf>,
    pub(crate) body: Option<Body>,
    pub(crate) pending_reason: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) mark: Mark,
    pub(crate) location: Option<String>,
}

impl SpecNode {
    /// The spec's own description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Descriptions of all enclosing suites and this spec, joined by spaces.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns true if the spec is pending without running: it has no body, or was declared
    /// pending.
    pub fn is_statically_pending(&self) -> bool {
        self.body.is_none() || self.pending_reason.is_some()
    }

    pub(crate) fn info(&self) -> SpecInfo {
        SpecInfo {
            id: self.id.clone(),
            description: self.description.clone(),
            full_name: self.full_name.clone(),
            file: self.file.clone(),
        }
    }
}

/// Joins a parent's full name and a child's description.
pub(crate) fn join_full_name(parent: &str, description: &str) -> String {
    if parent.is_empty() {
        description.to_owned()
    } else {
        format!("{parent} {description}")
    }
}
