// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery of spec and helper files.

use crate::{config::SpecrunConfig, errors::DiscoveryError};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

/// The files a run loads, relative to the config's base directory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiscoveredFiles {
    /// Spec files, sorted and deduplicated.
    pub spec_files: Vec<Utf8PathBuf>,

    /// Helper files, sorted and deduplicated.
    pub helper_files: Vec<Utf8PathBuf>,
}

impl DiscoveredFiles {
    /// Discovers files according to `config`.
    ///
    /// If `explicit_specs` is non-empty, those files are used as the spec files instead of the
    /// `spec-files` globs. Helpers are always discovered through the `helpers` globs, and are never
    /// treated as spec files.
    pub fn discover(
        config: &SpecrunConfig,
        explicit_specs: &[Utf8PathBuf],
    ) -> Result<Self, DiscoveryError> {
        let helper_globs = build_glob_set(config.helpers())?;
        let helper_files = walk_matching(config, |rel| helper_globs.is_match(rel))?;

        let spec_files = if explicit_specs.is_empty() {
            let spec_globs = build_glob_set(config.spec_files())?;
            walk_matching(config, |rel| {
                spec_globs.is_match(rel) && !helper_globs.is_match(rel)
            })?
        } else {
            let mut files = explicit_specs.to_vec();
            files.sort();
            files.dedup();
            files
        };

        debug!(
            "discovered {} spec files and {} helper files",
            spec_files.len(),
            helper_files.len(),
        );
        Ok(Self {
            spec_files,
            helper_files,
        })
    }
}

fn build_glob_set(globs: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        let compiled = Glob::new(glob).map_err(|error| DiscoveryError::InvalidGlob {
            glob: glob.clone(),
            error,
        })?;
        builder.add(compiled);
    }
    builder.build().map_err(|error| DiscoveryError::InvalidGlob {
        glob: globs.join(", "),
        error,
    })
}

/// Returns files under the spec directory whose spec-dir-relative path satisfies `matches`.
fn walk_matching(
    config: &SpecrunConfig,
    matches: impl Fn(&Utf8Path) -> bool,
) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
    let dir = config.base_dir().join(config.spec_dir());
    if !dir.is_dir() {
        debug!("spec directory {dir} does not exist");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&dir).follow_links(true) {
        let entry = entry.map_err(|error| DiscoveryError::WalkDir {
            dir: dir.clone(),
            error,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8Path::from_path(entry.path()).ok_or_else(|| DiscoveryError::NonUtf8Path {
            path: entry.path().to_owned(),
        })?;
        // Paths yielded by walkdir always start with the directory being walked.
        let Ok(rel) = path.strip_prefix(&dir) else {
            continue;
        };
        if matches(rel) {
            files.push(config.spec_dir().join(rel));
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn touch(root: &Utf8Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    fn paths(names: &[&str]) -> Vec<Utf8PathBuf> {
        names.iter().map(|name| Utf8PathBuf::from(*name)).collect()
    }

    #[test]
    fn discovers_specs_and_helpers() {
        let dir = Utf8TempDir::new().unwrap();
        for rel in [
            "spec/b.toml",
            "spec/a.toml",
            "spec/nested/c.toml",
            "spec/helpers/h.toml",
            "spec/notes.txt",
        ] {
            touch(dir.path(), rel);
        }

        let config = SpecrunConfig::from_sources(dir.path(), None).unwrap();
        let files = DiscoveredFiles::discover(&config, &[]).unwrap();
        assert_eq!(
            files.spec_files,
            paths(&["spec/a.toml", "spec/b.toml", "spec/nested/c.toml"])
        );
        assert_eq!(files.helper_files, paths(&["spec/helpers/h.toml"]));
    }

    #[test]
    fn missing_spec_dir_is_empty() {
        let dir = Utf8TempDir::new().unwrap();
        let config = SpecrunConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(
            DiscoveredFiles::discover(&config, &[]).unwrap(),
            DiscoveredFiles::default()
        );
    }

    #[test]
    fn explicit_specs_override_globs() {
        let dir = Utf8TempDir::new().unwrap();
        touch(dir.path(), "spec/a.toml");
        touch(dir.path(), "spec/b.toml");

        let config = SpecrunConfig::from_sources(dir.path(), None).unwrap();
        let files = DiscoveredFiles::discover(
            &config,
            &paths(&["spec/b.toml", "spec/b.toml", "other/x.toml"]),
        )
        .unwrap();
        assert_eq!(files.spec_files, paths(&["other/x.toml", "spec/b.toml"]));
    }

    #[test]
    fn invalid_glob() {
        let dir = Utf8TempDir::new().unwrap();
        let mut config = SpecrunConfig::from_sources(dir.path(), None).unwrap();
        config.add_helpers(["[unclosed".to_owned()]);
        let error = DiscoveredFiles::discover(&config, &[]).unwrap_err();
        assert!(matches!(error, DiscoveryError::InvalidGlob { ref glob, .. } if glob == "[unclosed"));
    }
}
