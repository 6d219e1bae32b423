mod registry;

pub use registry::{next_index, previous_index, ProgramDescriptor, ProgramRegistry};

use std::path::Path;

/// File suffix of a compiled vertex stage.
pub const VERTEX_SUFFIX: &str = ".vert.spv";
/// File suffix of a compiled fragment stage.
pub const FRAGMENT_SUFFIX: &str = ".frag.spv";

/// Reduces user input to the bare program name used for registry lookups.
///
/// `shaders/plasma.frag.spv`, `./plasma.frag` and `plasma` all resolve to
/// `plasma`.
pub fn program_name_from_input(input: &str) -> String {
    let trimmed = input.trim();
    let base = Path::new(trimmed)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(trimmed);

    [FRAGMENT_SUFFIX, VERTEX_SUFFIX, ".frag", ".vert"]
        .iter()
        .find_map(|suffix| base.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(base)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_directories_and_stage_suffixes() {
        assert_eq!(program_name_from_input("plasma"), "plasma");
        assert_eq!(program_name_from_input("shaders/plasma"), "plasma");
        assert_eq!(program_name_from_input("./shaders/plasma.frag"), "plasma");
        assert_eq!(program_name_from_input("/opt/x/plasma.frag.spv"), "plasma");
        assert_eq!(program_name_from_input("plasma.vert.spv"), "plasma");
    }

    #[test]
    fn keeps_names_that_are_only_a_suffix() {
        assert_eq!(program_name_from_input(".frag"), ".frag");
    }
}
