use std::path::{Component, Path, PathBuf};

/// Joins `raw` onto `working_dir` when it is relative, then cleans the result lexically.
pub fn absolutize(raw: &Path, working_dir: &Path) -> PathBuf {
    if raw.is_absolute() {
        clean(raw)
    } else {
        clean(&working_dir.join(raw))
    }
}

/// Lexical cleanup: drops `.` segments and folds `..` into its parent without touching the
/// filesystem. A `..` directly under the root stays at the root.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// The parts of an absolute path that templates see as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParts {
    pub dir: String,
    pub base: String,
    pub ext: String,
    pub base_name: String,
}

/// Splits an absolute path into directory, base name and extension.
///
/// The extension runs from the last `.` of the base name, so `.profile` is all extension
/// and `archive.tar.gz` has extension `.gz`. `base == base_name + ext` always holds.
pub fn split_parts(absolute: &Path) -> PathParts {
    let dir = absolute
        .parent()
        .unwrap_or(absolute)
        .to_string_lossy()
        .into_owned();
    let base = absolute
        .file_name()
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_else(|| absolute.to_string_lossy().into_owned());
    let ext = base
        .rfind('.')
        .map(|i| base[i..].to_string())
        .unwrap_or_default();
    let base_name = base[..base.len() - ext.len()].to_string();

    PathParts {
        dir,
        base,
        ext,
        base_name,
    }
}

#[cfg(test)]
mod tests {
    use super::{absolutize, clean, split_parts};
    use std::path::{Path, PathBuf};

    #[test]
    fn clean_folds_dot_segments() {
        assert_eq!(clean(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(clean(Path::new("a/../..")), PathBuf::from(".."));
        assert_eq!(clean(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn absolutize_joins_relative_paths_only() {
        let wd = Path::new("/work/dir");
        assert_eq!(
            absolutize(Path::new("sub/../photo.jpg"), wd),
            PathBuf::from("/work/dir/photo.jpg")
        );
        assert_eq!(
            absolutize(Path::new("/tmp/x/photo.jpg"), wd),
            PathBuf::from("/tmp/x/photo.jpg")
        );
    }

    #[test]
    fn split_parts_keeps_base_equal_to_name_plus_ext() {
        for raw in ["/tmp/x/photo.jpg", "/tmp/archive.tar.gz", "/home/u/.profile", "/tmp/README"] {
            let parts = split_parts(Path::new(raw));
            assert_eq!(parts.base, format!("{}{}", parts.base_name, parts.ext), "{raw}");
        }

        let parts = split_parts(Path::new("/tmp/x/photo.jpg"));
        assert_eq!(parts.dir, "/tmp/x");
        assert_eq!(parts.base, "photo.jpg");
        assert_eq!(parts.ext, ".jpg");
        assert_eq!(parts.base_name, "photo");
    }

    #[test]
    fn split_parts_treats_leading_dot_as_extension() {
        let parts = split_parts(Path::new("/home/u/.profile"));
        assert_eq!(parts.ext, ".profile");
        assert_eq!(parts.base_name, "");
    }
}
