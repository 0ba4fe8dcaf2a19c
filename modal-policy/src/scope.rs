//! Allowed-root bookkeeping and lexical path normalization.

use std::path::{Component, Path, PathBuf};

/// One allowed root, kept in lexical and (when resolvable) canonical form.
#[derive(Debug, Clone)]
pub(crate) struct Root {
    lexical: PathBuf,
    canonical: Option<PathBuf>,
}

impl Root {
    pub(crate) fn new(path: &Path) -> Self {
        let lexical = normalize(&absolutize(path));
        let canonical = std::fs::canonicalize(&lexical).ok();
        Self { lexical, canonical }
    }

    pub(crate) fn lexical(&self) -> &Path {
        &self.lexical
    }

    fn contains_lexical(&self, path: &Path) -> bool {
        path.starts_with(&self.lexical)
    }

    fn contains_resolved(&self, path: &Path) -> bool {
        path.starts_with(&self.lexical)
            || self
                .canonical
                .as_ref()
                .is_some_and(|canonical| path.starts_with(canonical))
    }
}

/// Set of roots every local reference must stay under.
#[derive(Debug, Clone)]
pub(crate) struct RootSet {
    roots: Vec<Root>,
}

impl RootSet {
    pub(crate) fn new(paths: &[PathBuf]) -> Self {
        Self {
            roots: paths.iter().map(|path| Root::new(path)).collect(),
        }
    }

    pub(crate) fn primary(&self) -> Option<&Root> {
        self.roots.first()
    }

    pub(crate) fn contains_lexical(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| root.contains_lexical(path))
    }

    pub(crate) fn contains_resolved(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| root.contains_resolved(path))
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Folds `.` and `..` components without touching the filesystem.
///
/// `..` never climbs above the filesystem root.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_parent_segments() {
        assert_eq!(
            normalize(Path::new("/data/in/../out/./a.png")),
            PathBuf::from("/data/out/a.png")
        );
        assert_eq!(normalize(Path::new("/../../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn lexical_containment_is_component_wise() {
        let roots = RootSet::new(&[PathBuf::from("/data/work")]);
        assert!(roots.contains_lexical(Path::new("/data/work/a.png")));
        assert!(!roots.contains_lexical(Path::new("/data/workshop/a.png")));
        assert!(!roots.contains_lexical(Path::new("/data")));
    }
}
