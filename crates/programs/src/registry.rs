//! Discovers compiled effect programs on disk and keeps them in a stable,
//! indexable order.
//!
//! A program is a pair of SPIR-V binaries sharing a base name:
//! `<name>.vert.spv` and `<name>.frag.spv`. Discovery walks each search
//! location in the order given, sorts the names found inside one location, and
//! drops candidates whose vertex stage is missing. Nothing here touches the
//! GPU; the registry only hands out paths.
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{FRAGMENT_SUFFIX, VERTEX_SUFFIX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor {
    pub name: String,
    pub vertex_path: PathBuf,
    pub fragment_path: PathBuf,
}

impl ProgramDescriptor {
    pub fn new(name: impl Into<String>, root: &Path) -> Self {
        let name = name.into();
        Self {
            vertex_path: root.join(format!("{name}{VERTEX_SUFFIX}")),
            fragment_path: root.join(format!("{name}{FRAGMENT_SUFFIX}")),
            name,
        }
    }

    fn is_complete(&self) -> bool {
        self.vertex_path.is_file() && self.fragment_path.is_file()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgramRegistry {
    programs: Vec<ProgramDescriptor>,
}

impl ProgramRegistry {
    pub fn from_programs(programs: Vec<ProgramDescriptor>) -> Self {
        Self { programs }
    }

    /// Scans `locations` in order. Missing or unreadable locations are skipped;
    /// an empty registry is a valid result.
    pub fn discover<P: AsRef<Path>>(locations: &[P]) -> Self {
        let mut programs = Vec::new();
        for location in locations {
            let location = location.as_ref();
            let found = scan_location(location);
            debug!(
                location = %location.display(),
                count = found.len(),
                "scanned program location"
            );
            programs.extend(found);
        }
        Self { programs }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProgramDescriptor> {
        self.programs.get(index)
    }

    /// Returns the first program registered under `name`.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.programs.iter().position(|program| program.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.programs
            .iter()
            .map(|program| program.name.as_str())
            .collect()
    }

    /// Index after `current`, wrapping to the start. Returns 0 when empty.
    pub fn next(&self, current: usize) -> usize {
        next_index(current, self.programs.len())
    }

    /// Index before `current`, wrapping to the end. Returns 0 when empty.
    pub fn previous(&self, current: usize) -> usize {
        previous_index(current, self.programs.len())
    }
}

pub fn next_index(current: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (current % count + 1) % count
}

pub fn previous_index(current: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (current % count + count - 1) % count
}

fn scan_location(location: &Path) -> Vec<ProgramDescriptor> {
    let entries = match fs::read_dir(location) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(location = %location.display(), error = %err, "skipping program location");
            return Vec::new();
        }
    };

    let mut names = BTreeSet::new();
    for entry in entries.flatten() {
        if !entry.file_type().map(|kind| kind.is_file()).unwrap_or(false) {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(stem) = file_name.strip_suffix(FRAGMENT_SUFFIX) {
            if !stem.is_empty() {
                names.insert(stem.to_string());
            }
        }
    }

    names
        .into_iter()
        .map(|name| ProgramDescriptor::new(name, location))
        .filter(|program| {
            let complete = program.is_complete();
            if !complete {
                debug!(
                    program = %program.name,
                    missing = %program.vertex_path.display(),
                    "skipping program without a vertex stage"
                );
            }
            complete
        })
        .collect()
}
