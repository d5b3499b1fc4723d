//! Naming and path conventions for translation units.

use std::path::{Path, PathBuf};

use crate::core::types::{Classification, UnitKind};

const VARIABLE_PREFIX: &str = "var_";
const FUNCTION_PREFIX: &str = "fun_";

/// Classify a unit by its filename prefix (`var_` / `fun_`).
///
/// Only the final path component is inspected, so directories named `var_*`
/// do not affect the result.
pub fn classify(path: &Path) -> Classification {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Classification::Unrecognized;
    };
    if name.starts_with(VARIABLE_PREFIX) {
        Classification::Recognized(UnitKind::Variable)
    } else if name.starts_with(FUNCTION_PREFIX) {
        Classification::Recognized(UnitKind::Function)
    } else {
        Classification::Unrecognized
    }
}

/// Derive the source counterpart of a unit by extension substitution.
///
/// Does not check existence.
pub fn source_counterpart(target_path: &Path, source_ext: &str) -> PathBuf {
    target_path.with_extension(source_ext)
}

/// A unit is unresolved iff its content is empty after trimming whitespace.
pub fn is_unresolved(content: &str) -> bool {
    content.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_prefix() {
        assert_eq!(
            classify(Path::new("rust/var_counter.rs")),
            Classification::Recognized(UnitKind::Variable)
        );
        assert_eq!(
            classify(Path::new("rust/fun_main.rs")),
            Classification::Recognized(UnitKind::Function)
        );
        assert_eq!(
            classify(Path::new("rust/other_thing.rs")),
            Classification::Unrecognized
        );
    }

    #[test]
    fn classify_ignores_directory_names() {
        assert_eq!(
            classify(Path::new("var_dir/helper.rs")),
            Classification::Unrecognized
        );
    }

    #[test]
    fn classify_requires_full_prefix() {
        assert_eq!(classify(Path::new("var.rs")), Classification::Unrecognized);
        assert_eq!(classify(Path::new("funx.rs")), Classification::Unrecognized);
    }

    #[test]
    fn source_counterpart_swaps_extension() {
        assert_eq!(
            source_counterpart(Path::new("/tree/rust/var_counter.rs"), "c"),
            PathBuf::from("/tree/rust/var_counter.c")
        );
    }

    #[test]
    fn whitespace_only_is_unresolved() {
        assert!(is_unresolved(""));
        assert!(is_unresolved("  \n\t\n"));
        assert!(!is_unresolved("static X: i32 = 0;"));
    }
}
