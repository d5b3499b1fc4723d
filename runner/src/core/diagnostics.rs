//! Best-effort attribution of build diagnostics to translation units.
//!
//! This is a textual heuristic over compiler output, not a structural analysis.
//! It can report false positives (incidental substring matches) and false
//! negatives (paths printed in an unexpected form). Callers treat the result as
//! a hint for whether a fix attempt is worthwhile.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Compiler "location arrow" marker, e.g. `  --> src/var_x.rs:10:5`.
static LOCATION_ARROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-->\s*([^:\s][^:]*)").expect("valid location regex"));

/// Collect the file portion of every location arrow in `diagnostic_text`.
///
/// Duplicates are dropped; discovery order is kept.
pub fn extract_implicated_paths(diagnostic_text: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for line in diagnostic_text.lines() {
        let Some(captures) = LOCATION_ARROW.captures(line) else {
            continue;
        };
        let Some(file) = captures.get(1) else {
            continue;
        };
        let path = PathBuf::from(file.as_str().trim());
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// True if the unit's filename or full path appears anywhere in the text.
pub fn implicates(diagnostic_text: &str, unit_path: &Path) -> bool {
    if let Some(name) = unit_path.file_name().and_then(|n| n.to_str())
        && diagnostic_text.contains(name)
    {
        return true;
    }
    let full = unit_path.to_string_lossy();
    !full.is_empty() && diagnostic_text.contains(full.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARGO_OUTPUT: &str = r#"
error[E0425]: cannot find value `x` in this scope
  --> src/var_x.rs:10:5
   |
10 |     x
   |     ^ not found in this scope

error[E0308]: mismatched types
 --> src/fun_helper.rs:3:1
error: aborting due to 2 previous errors
  --> src/var_x.rs:12:1
"#;

    #[test]
    fn extracts_arrow_paths_in_order_without_duplicates() {
        let paths = extract_implicated_paths(CARGO_OUTPUT);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("src/var_x.rs"),
                PathBuf::from("src/fun_helper.rs")
            ]
        );
    }

    #[test]
    fn no_arrows_yields_empty() {
        assert!(extract_implicated_paths("error: linker `cc` not found").is_empty());
    }

    #[test]
    fn implicates_matching_filename() {
        assert!(implicates(
            "error ... --> var_x.rs:10:5 ...",
            Path::new("/work/.c2rust/f/rust/var_x.rs")
        ));
    }

    #[test]
    fn does_not_implicate_other_file() {
        assert!(!implicates(
            "error ... --> other.rs:3:1 ...",
            Path::new("/work/.c2rust/f/rust/var_x.rs")
        ));
    }

    #[test]
    fn implicates_full_path_mention() {
        assert!(implicates(
            "could not read /work/rust/fun_a.rs",
            Path::new("/work/rust/fun_a.rs")
        ));
    }
}
