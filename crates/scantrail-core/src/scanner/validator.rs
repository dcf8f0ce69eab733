/// Path validation: decides whether a discovered entry is in scope and safe
/// to examine.
///
/// Every entry the walker yields passes through [`PathValidator::check`]
/// before it is recorded or descended into. The checks enforce two security
/// invariants:
///
/// - **Containment**: the canonical form of an accepted path is the scan root
///   or a descendant of it, so neither `..` segments nor symlinks can lead the
///   scan outside its boundary.
/// - **Cycle prevention**: a symlink whose canonical target was already
///   traversed in this session is rejected, which bounds traversal even when
///   links point back up the tree.
///
/// The visited set lives in a [`SymlinkVisitSet`] owned by one validator for
/// one scan. Nothing here is global, so concurrent scans never interfere.
use crate::config::ScanConfiguration;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Why an entry was excluded from the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The path could not be canonicalised (dangling link, vanished entry,
    /// permission denied on an ancestor).
    Unresolvable(String),
    /// The canonical path lies outside the scan root.
    OutsideRoot,
    /// A symlink whose canonical target was already traversed.
    SymlinkCycle(PathBuf),
    ExcludedDir(String),
    ExcludedExtension(String),
    Hidden,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolvable(err) => write!(f, "cannot resolve path: {err}"),
            Self::OutsideRoot => f.write_str("resolves outside the scan root"),
            Self::SymlinkCycle(target) => {
                write!(f, "symlink target {} already traversed", target.display())
            }
            Self::ExcludedDir(name) => write!(f, "inside excluded directory {name:?}"),
            Self::ExcludedExtension(ext) => write!(f, "excluded extension {ext:?}"),
            Self::Hidden => f.write_str("hidden entry"),
        }
    }
}

/// Canonical paths already traversed through a symbolic link during one scan.
#[derive(Debug, Default, Clone)]
pub struct SymlinkVisitSet {
    visited: HashSet<PathBuf>,
}

impl SymlinkVisitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `target` as traversed. Returns `false` if it already was.
    pub fn insert(&mut self, target: PathBuf) -> bool {
        self.visited.insert(target)
    }

    pub fn contains(&self, target: &Path) -> bool {
        self.visited.contains(target)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

/// Check one path against the scan rules.
///
/// `root` must already be canonical. On acceptance the canonical form of
/// `path` is returned, and if `path` is a symlink its target has been added
/// to `session`. A rejected path never mutates `session`.
pub fn check_path(
    path: &Path,
    root: &Path,
    config: &ScanConfiguration,
    session: &mut SymlinkVisitSet,
) -> Result<PathBuf, RejectReason> {
    let canonical =
        fs::canonicalize(path).map_err(|e| RejectReason::Unresolvable(e.to_string()))?;

    if !canonical.starts_with(root) {
        return Err(RejectReason::OutsideRoot);
    }

    // Name rules apply to the path as discovered, relative to the root. Fall
    // back to the canonical form for callers passing paths built elsewhere.
    let relative = path
        .strip_prefix(root)
        .or_else(|_| canonical.strip_prefix(root))
        .unwrap_or(Path::new(""));
    let is_dir = fs::metadata(&canonical)
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    check_names(relative, is_dir, config)?;

    let is_symlink = fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if is_symlink && !session.insert(canonical.clone()) {
        return Err(RejectReason::SymlinkCycle(canonical));
    }

    Ok(canonical)
}

/// `true` when [`check_path`] accepts `path`.
pub fn is_valid(
    path: &Path,
    root: &Path,
    config: &ScanConfiguration,
    session: &mut SymlinkVisitSet,
) -> bool {
    check_path(path, root, config, session).is_ok()
}

fn check_names(
    relative: &Path,
    is_dir: bool,
    config: &ScanConfiguration,
) -> Result<(), RejectReason> {
    // The scan root itself is always in scope, whatever it is called.
    let Some(name) = relative.file_name() else {
        return Ok(());
    };

    for component in relative.components() {
        if let Component::Normal(segment) = component {
            let segment = segment.to_string_lossy();
            if config.excluded_dirs.contains(&*segment) {
                return Err(RejectReason::ExcludedDir(segment.into_owned()));
            }
        }
    }

    // Extensions name file types; `cache.tmp/` is still walked.
    if let Some(ext) = relative.extension().filter(|_| !is_dir) {
        let ext = ext.to_string_lossy();
        if config.excludes_extension(&ext) {
            return Err(RejectReason::ExcludedExtension(ext.to_lowercase()));
        }
    }

    if config.skip_hidden_files && name.to_string_lossy().starts_with('.') {
        return Err(RejectReason::Hidden);
    }

    Ok(())
}

/// Validator bound to one scan root and one session.
pub struct PathValidator<'a> {
    root: PathBuf,
    config: &'a ScanConfiguration,
    session: SymlinkVisitSet,
}

impl<'a> PathValidator<'a> {
    /// Create a validator for `root`. The root is canonicalised when possible
    /// and seeded into the visited set, so a link pointing back at the root
    /// is rejected the first time it is seen.
    pub fn new(root: &Path, config: &'a ScanConfiguration) -> Self {
        let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let mut session = SymlinkVisitSet::new();
        session.insert(root.clone());
        Self {
            root,
            config,
            session,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session(&self) -> &SymlinkVisitSet {
        &self.session
    }

    pub fn check(&mut self, path: &Path) -> Result<PathBuf, RejectReason> {
        let result = check_path(path, &self.root, self.config, &mut self.session);
        if let Err(reason) = &result {
            debug!("Rejected {}: {reason}", path.display());
        }
        result
    }

    pub fn is_valid(&mut self, path: &Path) -> bool {
        self.check(path).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> ScanConfiguration {
        ScanConfiguration {
            excluded_dirs: ["node_modules".to_string()].into_iter().collect(),
            excluded_extensions: ["pyc".to_string()].into_iter().collect(),
            skip_hidden_files: true,
            ..Default::default()
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn plain_file_inside_root_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let file = validator.root().join("notes.txt");
        touch(&file);
        assert_eq!(validator.check(&file), Ok(file.clone()));
    }

    #[test]
    fn root_is_accepted_despite_hidden_name() {
        // tempfile names its directories ".tmpXXXX".
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let root = validator.root().to_path_buf();
        assert!(validator.is_valid(&root));
    }

    #[test]
    fn path_outside_root_is_rejected() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let outside = other.path().join("outside.txt");
        touch(&outside);

        let cfg = config();
        let mut validator = PathValidator::new(root.path(), &cfg);
        assert_eq!(validator.check(&outside), Err(RejectReason::OutsideRoot));
    }

    #[test]
    fn dot_dot_escape_is_rejected() {
        let parent = TempDir::new().unwrap();
        let root = parent.path().join("root");
        fs::create_dir(&root).unwrap();
        touch(&parent.path().join("secret.txt"));

        let cfg = config();
        let mut validator = PathValidator::new(&root, &cfg);
        let sneaky = validator.root().join("..").join("secret.txt");
        assert_eq!(validator.check(&sneaky), Err(RejectReason::OutsideRoot));
    }

    #[test]
    fn missing_path_is_unresolvable() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let ghost = validator.root().join("ghost.txt");
        assert!(matches!(
            validator.check(&ghost),
            Err(RejectReason::Unresolvable(_))
        ));
    }

    #[test]
    fn excluded_directory_segment_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let nested = validator.root().join("app/node_modules/lib/index.js");
        touch(&nested);
        assert_eq!(
            validator.check(&nested),
            Err(RejectReason::ExcludedDir("node_modules".into()))
        );
    }

    #[test]
    fn excluded_extension_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let compiled = validator.root().join("module.PYC");
        touch(&compiled);
        assert_eq!(
            validator.check(&compiled),
            Err(RejectReason::ExcludedExtension("pyc".into()))
        );
    }

    #[test]
    fn extension_rule_skips_directories() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config();
        cfg.excluded_extensions.insert("tmp".into());
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let dir = validator.root().join("session.tmp");
        let inner = dir.join("evidence.txt");
        touch(&inner);

        assert!(validator.is_valid(&dir));
        assert!(validator.is_valid(&inner));
        let stray = dir.join("scratch.tmp");
        touch(&stray);
        assert_eq!(
            validator.check(&stray),
            Err(RejectReason::ExcludedExtension("tmp".into()))
        );
    }

    #[test]
    fn hidden_file_follows_config_flag() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config();
        let hidden = fs::canonicalize(tmp.path()).unwrap().join(".hidden");
        touch(&hidden);

        assert_eq!(
            PathValidator::new(tmp.path(), &cfg).check(&hidden),
            Err(RejectReason::Hidden)
        );

        cfg.skip_hidden_files = false;
        assert!(PathValidator::new(tmp.path(), &cfg).is_valid(&hidden));
    }

    #[test]
    fn rejection_does_not_depend_on_check_order() {
        // Hidden and excluded at once: rejected either way, session untouched.
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let both = validator.root().join(".cache.pyc");
        touch(&both);
        assert!(!validator.is_valid(&both));
        assert_eq!(validator.session().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_target_is_traversed_once() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let root = validator.root().to_path_buf();
        fs::create_dir(root.join("data")).unwrap();
        symlink(root.join("data"), root.join("first")).unwrap();
        symlink(root.join("data"), root.join("second")).unwrap();

        assert!(validator.is_valid(&root.join("first")));
        assert_eq!(
            validator.check(&root.join("second")),
            Err(RejectReason::SymlinkCycle(root.join("data")))
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_back_to_root_is_rejected() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let mut validator = PathValidator::new(tmp.path(), &cfg);
        let root = validator.root().to_path_buf();
        symlink(&root, root.join("loop")).unwrap();

        assert!(matches!(
            validator.check(&root.join("loop")),
            Err(RejectReason::SymlinkCycle(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_rejected() {
        use std::os::unix::fs::symlink;

        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        touch(&other.path().join("evidence.txt"));

        let cfg = config();
        let mut validator = PathValidator::new(root.path(), &cfg);
        let link = validator.root().join("escape");
        symlink(other.path(), &link).unwrap();

        assert_eq!(validator.check(&link), Err(RejectReason::OutsideRoot));
        assert!(!validator.is_valid(&link.join("evidence.txt")));
        // Rejected links never enter the visited set.
        assert_eq!(validator.session().len(), 1);
    }

    #[test]
    fn free_function_uses_caller_session() {
        let tmp = TempDir::new().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        let file = root.join("a.txt");
        touch(&file);

        let cfg = config();
        let mut session = SymlinkVisitSet::new();
        assert!(is_valid(&file, &root, &cfg, &mut session));
        assert!(session.is_empty());
    }
}
