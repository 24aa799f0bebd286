// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative TOML spec files.
//!
//! ```toml
//! on-load = [{ print = "loaded" }]
//!
//! [[before-each]]
//! steps = [{ print = "before each spec" }]
//!
//! [[describe]]
//! description = "math"
//!
//!   [[describe.it]]
//!   description = "adds"
//!   steps = [{ expect = { actual = 2, expected = 2 } }]
//! ```
//!
//! Suites and specs are registered in the order they appear in the file. Every step, hook, suite
//! and spec is located as `at <file>:<line>`.

use super::{Loader, SpecModule};
use crate::{
    errors::{LoadError, LoadErrorKind, ModuleError},
    helpers::location_str,
    steps::{LocatedStep, Step, StepProgram},
    suite::{Hook, Mark, SpecDecl, SuiteBuilder, SuiteDecl},
};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use specrun_metadata::HookKind;
use std::time::Duration;
use toml::Spanned;
use tracing::debug;

/// Loads declarative TOML spec files from disk.
#[derive(Clone, Debug)]
pub struct DynamicLoader {
    root_dir: Utf8PathBuf,
}

impl DynamicLoader {
    /// Creates a loader that resolves paths against `root_dir`.
    pub fn new(root_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Parses `contents` as the spec file at `path`.
    pub fn parse(path: &Utf8Path, contents: &str) -> Result<DeclaredModule, LoadError> {
        let lines = LineIndex::new(contents);
        let document: SpecDocument = toml::from_str(contents).map_err(|error| {
            LoadError::new(
                path,
                LoadErrorKind::Parse {
                    message: error.message().trim_end().to_owned(),
                    line: error.span().map(|span| lines.line_of(span.start)),
                },
            )
        })?;
        Ok(DeclaredModule {
            path: path.to_owned(),
            lines,
            document,
        })
    }
}

impl Loader for DynamicLoader {
    fn load(&self, path: &Utf8Path) -> Result<Box<dyn SpecModule>, LoadError> {
        let full_path = self.root_dir.join(path);
        let contents = std::fs::read_to_string(&full_path)
            .map_err(|error| LoadError::new(path, LoadErrorKind::Read { error }))?;
        debug!("parsing spec file {full_path}");
        Ok(Box::new(Self::parse(path, &contents)?))
    }
}

/// A parsed declarative spec file.
#[derive(Debug)]
pub struct DeclaredModule {
    path: Utf8PathBuf,
    lines: LineIndex,
    document: SpecDocument,
}

impl SpecModule for DeclaredModule {
    fn register(self: Box<Self>, builder: &mut SuiteBuilder) -> Result<(), ModuleError> {
        let DeclaredModule {
            path,
            lines,
            document,
        } = *self;
        let cx = RegisterCx {
            path: &path,
            lines: &lines,
        };

        cx.program(document.on_load).run_at_load()?;
        if let Some(message) = document.load_error {
            return Err(ModuleError::Thrown {
                location: Some(cx.location(message.span().start)),
                message: message.into_inner(),
            });
        }

        cx.register_hooks(
            builder,
            HookDocs {
                before_all: document.before_all,
                after_all: document.after_all,
                before_each: document.before_each,
                after_each: document.after_each,
            },
        );
        cx.register_children(builder, document.describe, document.it)
    }
}

/// Converts byte offsets into 1-based line numbers.
#[derive(Clone, Debug)]
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(contents: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(contents.match_indices('\n').map(|(index, _)| index + 1))
            .collect();
        Self { line_starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }
}

struct RegisterCx<'a> {
    path: &'a Utf8Path,
    lines: &'a LineIndex,
}

impl RegisterCx<'_> {
    fn location(&self, offset: usize) -> String {
        location_str(self.path.as_str(), self.lines.line_of(offset))
    }

    fn program(&self, steps: Vec<Spanned<Step>>) -> StepProgram {
        StepProgram::new(steps.into_iter().map(|step| LocatedStep {
            location: Some(self.location(step.span().start)),
            step: step.into_inner(),
        }))
    }

    fn register_hooks(&self, builder: &mut SuiteBuilder, hooks: HookDocs) {
        let HookDocs {
            before_all,
            after_all,
            before_each,
            after_each,
        } = hooks;
        for (kind, list) in [
            (HookKind::BeforeAll, before_all),
            (HookKind::AfterAll, after_all),
            (HookKind::BeforeEach, before_each),
            (HookKind::AfterEach, after_each),
        ] {
            for hook in list {
                let location = self.location(hook.span().start);
                let HookDoc { steps, timeout } = hook.into_inner();
                builder.add_hook(
                    Hook::new(kind, self.program(steps).into_body())
                        .with_timeout(timeout)
                        .with_location(Some(location)),
                );
            }
        }
    }

    fn register_children(
        &self,
        builder: &mut SuiteBuilder,
        describes: Vec<Spanned<DescribeDoc>>,
        its: Vec<Spanned<ItDoc>>,
    ) -> Result<(), ModuleError> {
        let mut children: Vec<(usize, ChildDoc)> = describes
            .into_iter()
            .map(|d| (d.span().start, ChildDoc::Describe(d.into_inner())))
            .chain(
                its.into_iter()
                    .map(|it| (it.span().start, ChildDoc::It(it.into_inner()))),
            )
            .collect();
        children.sort_by_key(|(offset, _)| *offset);

        for (offset, child) in children {
            match child {
                ChildDoc::Describe(describe) => self.register_describe(builder, offset, describe)?,
                ChildDoc::It(it) => self.register_it(builder, offset, it)?,
            }
        }
        Ok(())
    }

    fn register_describe(
        &self,
        builder: &mut SuiteBuilder,
        offset: usize,
        describe: DescribeDoc,
    ) -> Result<(), ModuleError> {
        let mark = self.mark(&describe.description, describe.focus, describe.exclude)?;
        builder.open_suite(SuiteDecl {
            description: describe.description,
            mark,
            location: Some(self.location(offset)),
        });
        self.register_hooks(
            builder,
            HookDocs {
                before_all: describe.before_all,
                after_all: describe.after_all,
                before_each: describe.before_each,
                after_each: describe.after_each,
            },
        );
        self.register_children(builder, describe.describe, describe.it)?;
        builder.close_suite();
        Ok(())
    }

    fn register_it(
        &self,
        builder: &mut SuiteBuilder,
        offset: usize,
        it: ItDoc,
    ) -> Result<(), ModuleError> {
        let mark = self.mark(&it.description, it.focus, it.exclude)?;
        builder.add_spec(SpecDecl {
            description: it.description,
            body: it.steps.map(|steps| self.program(steps).into_body()),
            mark,
            pending_reason: it.pending,
            timeout: it.timeout,
            location: Some(self.location(offset)),
        });
        Ok(())
    }

    fn mark(&self, description: &str, focus: bool, exclude: bool) -> Result<Mark, ModuleError> {
        match (focus, exclude) {
            (false, false) => Ok(Mark::None),
            (true, false) => Ok(Mark::Focus),
            (false, true) => Ok(Mark::Exclude),
            (true, true) => Err(ModuleError::Configuration {
                message: format!("`{description}` cannot be both focused and excluded"),
            }),
        }
    }
}

enum ChildDoc {
    Describe(DescribeDoc),
    It(ItDoc),
}

// ---
// Document schema
// ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SpecDocument {
    #[serde(default)]
    on_load: Vec<Spanned<Step>>,
    #[serde(default)]
    load_error: Option<Spanned<String>>,
    #[serde(default)]
    before_all: Vec<Spanned<HookDoc>>,
    #[serde(default)]
    after_all: Vec<Spanned<HookDoc>>,
    #[serde(default)]
    before_each: Vec<Spanned<HookDoc>>,
    #[serde(default)]
    after_each: Vec<Spanned<HookDoc>>,
    #[serde(default)]
    describe: Vec<Spanned<DescribeDoc>>,
    #[serde(default)]
    it: Vec<Spanned<ItDoc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct DescribeDoc {
    description: String,
    #[serde(default)]
    focus: bool,
    #[serde(default)]
    exclude: bool,
    #[serde(default)]
    before_all: Vec<Spanned<HookDoc>>,
    #[serde(default)]
    after_all: Vec<Spanned<HookDoc>>,
    #[serde(default)]
    before_each: Vec<Spanned<HookDoc>>,
    #[serde(default)]
    after_each: Vec<Spanned<HookDoc>>,
    #[serde(default)]
    describe: Vec<Spanned<DescribeDoc>>,
    #[serde(default)]
    it: Vec<Spanned<ItDoc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ItDoc {
    description: String,
    // A spec without steps is pending.
    #[serde(default)]
    steps: Option<Vec<Spanned<Step>>>,
    #[serde(default)]
    focus: bool,
    #[serde(default)]
    exclude: bool,
    #[serde(default)]
    pending: Option<String>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct HookDoc {
    #[serde(default)]
    steps: Vec<Spanned<Step>>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

struct HookDocs {
    before_all: Vec<Spanned<HookDoc>>,
    after_all: Vec<Spanned<HookDoc>>,
    before_each: Vec<Spanned<HookDoc>>,
    after_each: Vec<Spanned<HookDoc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{Child, ModuleKind, SuiteTree};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn register(contents: &str) -> Result<SuiteTree, ModuleError> {
        let path = Utf8Path::new("spec/one.toml");
        let module = DynamicLoader::parse(path, contents).unwrap();
        let mut builder = SuiteBuilder::new(false);
        builder.register_file(path, ModuleKind::Spec, |b| Box::new(module).register(b))?;
        Ok(builder.finish())
    }

    #[test]
    fn registers_in_file_order() {
        let tree = register(indoc! {r#"
            [[it]]
            description = "top first"
            steps = []

            [[describe]]
            description = "Spec file 1"

              [[describe.after-all]]
              steps = [{ print = "after all" }]

              [[describe.it]]
              description = "a failing spec"
              steps = [{ expect = { actual = 1, expected = 2 } }]

              [[describe.describe]]
              description = "nested"
              exclude = true

                [[describe.describe.it]]
                description = "skipped"

            [[it]]
            description = "top last"
            pending = "not yet"
        "#})
        .unwrap();

        assert_eq!(
            tree.spec_names(),
            vec![
                "top first",
                "Spec file 1 a failing spec",
                "Spec file 1 nested skipped",
                "top last",
            ]
        );

        let Child::Suite(suite) = &tree.root().children()[1] else {
            panic!("expected a suite");
        };
        assert!(
            suite
                .location
                .as_deref()
                .is_some_and(|l| l.starts_with("at spec/one.toml:")),
        );
        assert_eq!(suite.hooks().list(HookKind::AfterAll).len(), 1);

        let Child::Spec(pending) = &tree.root().children()[2] else {
            panic!("expected a spec");
        };
        assert!(pending.is_statically_pending());
    }

    #[test]
    fn load_error_is_thrown_at_its_line() {
        let error = register(indoc! {r#"
            on-load = [{ print = "loading" }]
            load-error = "nope"
        "#})
        .unwrap_err();
        assert!(matches!(
            error,
            ModuleError::Thrown { ref message, ref location }
                if message == "nope" && location.as_deref() == Some("at spec/one.toml:2")
        ));
    }

    #[test]
    fn parse_errors_have_lines() {
        let error = DynamicLoader::parse(
            Utf8Path::new("spec/bad.toml"),
            "[[it]]\ndescription = \"x\"\nbogus = 1\n",
        )
        .unwrap_err();
        let LoadErrorKind::Parse { message, .. } = error.kind() else {
            panic!("expected a parse error, got {error:?}");
        };
        assert!(message.contains("bogus"), "{message}");
        assert!(error.to_string().starts_with("Error loading spec/bad.toml: "));
    }

    #[test]
    fn focus_and_exclude_conflict() {
        let error = register(indoc! {r#"
            [[it]]
            description = "confused"
            focus = true
            exclude = true
        "#})
        .unwrap_err();
        assert_eq!(
            error.to_string(),
            "`confused` cannot be both focused and excluded"
        );
    }

    #[test]
    fn line_index() {
        let lines = LineIndex::new("a\nbc\n\nd");
        assert_eq!(lines.line_of(0), 1);
        assert_eq!(lines.line_of(2), 2);
        assert_eq!(lines.line_of(3), 2);
        assert_eq!(lines.line_of(5), 3);
        assert_eq!(lines.line_of(6), 4);
    }
}
