// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::FilterBuildError,
    suite::{Child, Mark, SpecNode, SuiteNode},
};
use regex::Regex;

/// A `--filter` expression, matched against spec full names.
#[derive(Clone, Debug)]
pub struct NameFilter {
    regex: Regex,
}

impl NameFilter {
    /// Compiles a filter.
    pub fn new(filter: &str) -> Result<Self, FilterBuildError> {
        let regex = Regex::new(filter).map_err(|error| FilterBuildError::new(filter, error))?;
        Ok(Self { regex })
    }

    /// Returns true if the full name matches.
    pub fn is_match(&self, full_name: &str) -> bool {
        self.regex.is_match(full_name)
    }
}

/// What is inherited from enclosing suites when deciding whether a spec runs.
#[derive(Clone, Copy, Debug)]
pub(super) struct Selection<'f> {
    filter: Option<&'f NameFilter>,
    // Whether anything in the whole tree is focused.
    tree_has_focus: bool,
    in_focus: bool,
    excluded: bool,
}

impl<'f> Selection<'f> {
    pub(super) fn new(filter: Option<&'f NameFilter>, tree_has_focus: bool) -> Self {
        Self {
            filter,
            tree_has_focus,
            in_focus: false,
            excluded: false,
        }
    }

    /// Returns the selection for the children of `suite`.
    pub(super) fn enter(self, suite: &SuiteNode) -> Self {
        Self {
            in_focus: self.in_focus || suite.mark == Mark::Focus,
            excluded: self.excluded || suite.mark == Mark::Exclude,
            ..self
        }
    }

    /// Returns true if `spec` is selected to run.
    pub(super) fn selects(&self, spec: &SpecNode) -> bool {
        if self.excluded || spec.mark == Mark::Exclude {
            return false;
        }
        if self.tree_has_focus && !(self.in_focus || spec.mark == Mark::Focus) {
            return false;
        }
        self.filter
            .is_none_or(|filter| filter.is_match(&spec.full_name))
    }

    /// Returns true if any spec under `suite` is selected. `self` is the selection for `suite`'s
    /// children.
    pub(super) fn selects_any(&self, suite: &SuiteNode) -> bool {
        suite.children.iter().any(|child| match child {
            Child::Suite(nested) => self.enter(nested).selects_any(nested),
            Child::Spec(spec) => self.selects(spec),
        })
    }
}
