// Copyright (c) The specrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for partitioning spec files across worker processes.
//!
//! At the moment this only supports a stable round-robin split: file *i* of the sorted, discovered
//! set goes to worker *i mod N*. Every worker gets a disjoint subset, and together they cover the
//! whole set.

use crate::errors::ParallelismParseError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, de::Unexpected};
use std::{cmp::Ordering, fmt, num::NonZeroUsize, str::FromStr};

/// The number of worker processes to run specs with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Parallelism {
    /// Run with a specific number of workers.
    Count(NonZeroUsize),

    /// Run with one worker per available CPU, minus one for the coordinator.
    Auto,
}

impl Parallelism {
    /// Gets the actual number of workers computed at runtime.
    pub fn compute(self) -> NonZeroUsize {
        match self {
            Self::Count(count) => count,
            Self::Auto => {
                let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
                NonZeroUsize::new(cpus.saturating_sub(1)).unwrap_or(NonZeroUsize::MIN)
            }
        }
    }
}

impl FromStr for Parallelism {
    type Err = ParallelismParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            return Ok(Self::Auto);
        }

        match s.parse::<usize>() {
            Err(_) => Err(ParallelismParseError::new(
                s,
                "expected a positive integer or \"auto\"",
            )),
            Ok(count) => NonZeroUsize::new(count)
                .map(Self::Count)
                .ok_or_else(|| ParallelismParseError::new(s, "must be at least 1")),
        }
    }
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl<'de> Deserialize<'de> for Parallelism {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = Parallelism;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a positive integer or the string \"auto\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "auto" {
                    Ok(Parallelism::Auto)
                } else {
                    Err(serde::de::Error::invalid_value(Unexpected::Str(v), &self))
                }
            }

            // Note that TOML uses i64, not u64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v.cmp(&0) {
                    Ordering::Greater => NonZeroUsize::new(v as usize)
                        .map(Parallelism::Count)
                        .ok_or_else(|| {
                            serde::de::Error::invalid_value(Unexpected::Signed(v), &self)
                        }),
                    Ordering::Less | Ordering::Equal => Err(serde::de::Error::invalid_value(
                        Unexpected::Signed(v),
                        &self,
                    )),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                NonZeroUsize::new(v as usize)
                    .map(Parallelism::Count)
                    .ok_or_else(|| serde::de::Error::invalid_value(Unexpected::Unsigned(v), &self))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// How spec files are split across workers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionPlan {
    workers: Vec<Vec<Utf8PathBuf>>,
}

impl PartitionPlan {
    /// Splits `files` round-robin across exactly `worker_count` workers.
    ///
    /// Workers beyond the number of files get an empty list; they still start, load helpers, and
    /// report zero specs.
    pub fn round_robin(files: &[Utf8PathBuf], worker_count: NonZeroUsize) -> Self {
        let mut workers = vec![Vec::new(); worker_count.get()];
        for (index, file) in files.iter().enumerate() {
            workers[index % worker_count].push(file.clone());
        }
        Self { workers }
    }

    /// Returns the number of workers in this plan.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Returns the files assigned to `worker_index`, in order.
    pub fn files_for(&self, worker_index: usize) -> &[Utf8PathBuf] {
        self.workers
            .get(worker_index)
            .map_or(&[][..], |files| files.as_slice())
    }

    /// Iterates over `(worker index, files)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[Utf8PathBuf])> + '_ {
        self.workers
            .iter()
            .enumerate()
            .map(|(index, files)| (index, files.as_slice()))
    }

    /// Returns the worker a file is assigned to, if any.
    pub fn worker_for(&self, file: &Utf8Path) -> Option<usize> {
        self.workers
            .iter()
            .position(|files| files.iter().any(|f| f == file))
    }

    /// Consumes the plan, returning each worker's files.
    pub fn into_workers(self) -> Vec<Vec<Utf8PathBuf>> {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use test_case::test_case;
    use test_strategy::proptest;

    fn files(names: &[&str]) -> Vec<Utf8PathBuf> {
        names.iter().map(|name| Utf8PathBuf::from(*name)).collect()
    }

    #[test]
    fn round_robin_assignment() {
        let all = files(&["a.toml", "b.toml", "c.toml"]);
        let plan = PartitionPlan::round_robin(&all, NonZeroUsize::new(2).unwrap());

        assert_eq!(plan.worker_count(), 2);
        assert_eq!(plan.files_for(0), files(&["a.toml", "c.toml"]).as_slice());
        assert_eq!(plan.files_for(1), files(&["b.toml"]).as_slice());
        assert_eq!(plan.worker_for(Utf8Path::new("c.toml")), Some(0));
        assert_eq!(plan.worker_for(Utf8Path::new("missing.toml")), None);
    }

    #[test]
    fn more_workers_than_files() {
        let all = files(&["only.toml"]);
        let plan = PartitionPlan::round_robin(&all, NonZeroUsize::new(3).unwrap());

        assert_eq!(plan.worker_count(), 3, "exactly N workers are planned");
        assert!(plan.files_for(1).is_empty());
        assert!(plan.files_for(2).is_empty());
    }

    #[test_case("1", Parallelism::Count(NonZeroUsize::new(1).unwrap()); "one")]
    #[test_case("12", Parallelism::Count(NonZeroUsize::new(12).unwrap()); "twelve")]
    #[test_case("auto", Parallelism::Auto; "auto")]
    fn parse_valid(input: &str, expected: Parallelism) {
        assert_eq!(input.parse::<Parallelism>().unwrap(), expected);
    }

    #[test_case("0"; "zero")]
    #[test_case("-2"; "negative")]
    #[test_case("many"; "word")]
    fn parse_invalid(input: &str) {
        input
            .parse::<Parallelism>()
            .expect_err("input should be rejected");
    }

    #[derive(Debug, Deserialize)]
    struct Holder {
        parallel: Parallelism,
    }

    #[test_case("parallel = 4", Some(Parallelism::Count(NonZeroUsize::new(4).unwrap())); "int")]
    #[test_case("parallel = \"auto\"", Some(Parallelism::Auto); "auto")]
    #[test_case("parallel = 0", None; "zero")]
    #[test_case("parallel = \"many\"", None; "bad string")]
    fn deserialize(input: &str, expected: Option<Parallelism>) {
        let parsed = toml::from_str::<Holder>(input).ok().map(|h| h.parallel);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn auto_is_at_least_one() {
        assert!(Parallelism::Auto.compute().get() >= 1);
    }

    #[proptest]
    fn partitions_are_disjoint_and_complete(
        #[strategy(proptest::collection::btree_set("[a-z]{1,8}", 0..40))] names: BTreeSet<String>,
        #[strategy(1usize..9)] worker_count: usize,
    ) {
        let all: Vec<Utf8PathBuf> = names.iter().map(|n| Utf8PathBuf::from(format!("{n}.toml"))).collect();
        let plan = PartitionPlan::round_robin(&all, NonZeroUsize::new(worker_count).unwrap());

        proptest::prop_assert_eq!(plan.worker_count(), worker_count);

        let mut seen = BTreeSet::new();
        for (_, files) in plan.iter() {
            for file in files {
                // Pairwise intersections are empty.
                proptest::prop_assert!(seen.insert(file.clone()), "{} assigned twice", file);
            }
        }
        // The union is the whole set.
        proptest::prop_assert_eq!(seen, all.iter().cloned().collect::<BTreeSet<_>>());

        // Each worker's files keep their relative order.
        for (_, files) in plan.iter() {
            proptest::prop_assert!(files.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
