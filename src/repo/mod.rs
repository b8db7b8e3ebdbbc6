use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Serialize;

use crate::package::{load_manifest, PackageManifest, MANIFEST_FILENAME};
use crate::spec::parse_spec;

/// A package repository: a directory whose immediate subdirectories each
/// hold one `package.toml`.
pub struct Repo {
    root: PathBuf,
}

impl Repo {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("package repository not found: {}", root.display());
        }
        Ok(Repo { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load one package by name. The manifest's declared name must match the
    /// directory name.
    pub fn load(&self, name: &str) -> Result<PackageManifest> {
        let manifest_path = self.root.join(name).join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            bail!(
                "no package named {:?} in {}",
                name,
                self.root.display()
            );
        }
        let manifest = load_manifest(&manifest_path)?;
        if manifest.package.name != name {
            bail!(
                "manifest in {} declares name {:?}, expected {:?}",
                manifest_path.display(),
                manifest.package.name,
                name
            );
        }
        Ok(manifest)
    }

    /// Names of all packages in the repository, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        let mut builder = WalkBuilder::new(&self.root);
        builder.hidden(false).max_depth(Some(2));

        for entry in builder.build() {
            let entry = entry.context("error reading repository entry")?;
            if entry.depth() != 2
                || !entry.file_type().is_some_and(|ft| ft.is_file())
                || entry.file_name() != std::ffi::OsStr::new(MANIFEST_FILENAME)
            {
                continue;
            }
            if let Some(name) = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Load every package in parallel, collecting per-package failures
    /// instead of stopping at the first bad manifest.
    pub fn load_all(&self) -> Result<(Vec<PackageManifest>, Vec<String>)> {
        let names = self.list()?;
        let results: Vec<(String, Result<PackageManifest>)> = names
            .par_iter()
            .map(|name| (name.clone(), self.load(name)))
            .collect();

        let mut manifests = Vec::new();
        let mut errors = Vec::new();
        for (name, result) in results {
            match result {
                Ok(m) => manifests.push(m),
                Err(e) => errors.push(format!("{}: {:#}", name, e)),
            }
        }
        Ok((manifests, errors))
    }

    /// Packages providing the named virtual package, sorted.
    pub fn providers(&self, virtual_name: &str) -> Result<Vec<String>> {
        let (manifests, _) = self.load_all()?;
        let mut out = Vec::new();
        for manifest in &manifests {
            if manifest.provides_virtual(virtual_name, None)? {
                out.push(manifest.package.name.clone());
            }
        }
        Ok(out)
    }

    /// Declared dependency names for a package, as pure metadata traversal.
    ///
    /// The result includes the package itself. Dependencies naming packages
    /// the repository does not have go into `missing`, keyed by the package
    /// that declared them; traversal is cycle-safe.
    pub fn possible_dependencies(&self, name: &str, transitive: bool) -> Result<PossibleDeps> {
        let manifest = self.load(name)?;
        let mut deps = PossibleDeps::default();
        self.walk_dependencies(&manifest, transitive, &mut deps)?;
        Ok(deps)
    }

    fn walk_dependencies(
        &self,
        manifest: &PackageManifest,
        transitive: bool,
        deps: &mut PossibleDeps,
    ) -> Result<()> {
        let name = manifest.package.name.clone();
        deps.visited.entry(name.clone()).or_default();

        for decl in &manifest.dependencies {
            let dep_name = parse_spec(&decl.spec)
                .with_context(|| format!("bad dependency spec in {}: {:?}", name, decl.spec))?
                .name;

            deps.visited
                .entry(name.clone())
                .or_default()
                .insert(dep_name.clone());

            if deps.visited.contains_key(&dep_name) {
                continue;
            }
            if !transitive {
                deps.visited.entry(dep_name).or_default();
                continue;
            }
            match self.load(&dep_name) {
                Ok(dep_manifest) => {
                    self.walk_dependencies(&dep_manifest, transitive, deps)?;
                }
                Err(_) => {
                    deps.visited.entry(dep_name.clone()).or_default();
                    deps.missing
                        .entry(name.clone())
                        .or_default()
                        .insert(dep_name);
                }
            }
        }
        Ok(())
    }
}

/// Result of a dependency-metadata walk: each visited package mapped to its
/// immediate declared dependencies, plus the unknown names encountered.
#[derive(Debug, Default, Serialize)]
pub struct PossibleDeps {
    pub visited: BTreeMap<String, BTreeSet<String>>,
    pub missing: BTreeMap<String, BTreeSet<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_package(root: &Path, name: &str, manifest: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILENAME), manifest).unwrap();
    }

    fn setup_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        write_package(
            root,
            "mpileaks",
            r#"
[package]
name = "mpileaks"

[[dependencies]]
spec = "callpath"

[[dependencies]]
spec = "mpi"
"#,
        );
        write_package(
            root,
            "callpath",
            r#"
[package]
name = "callpath"

[[dependencies]]
spec = "dyninst"

[[dependencies]]
spec = "mpi"
"#,
        );
        write_package(
            root,
            "mpich",
            r#"
[package]
name = "mpich"

[[provides]]
virtual = "mpi"
"#,
        );
        // A directory without a manifest is not a package.
        fs::create_dir_all(root.join("scratch")).unwrap();

        dir
    }

    #[test]
    fn test_open_missing_root() {
        assert!(Repo::open("/nonexistent/path/to/repo").is_err());
    }

    #[test]
    fn test_list_packages() {
        let dir = setup_repo();
        let repo = Repo::open(dir.path()).unwrap();
        assert_eq!(repo.list().unwrap(), vec!["callpath", "mpich", "mpileaks"]);
    }

    #[test]
    fn test_load_package() {
        let dir = setup_repo();
        let repo = Repo::open(dir.path()).unwrap();
        let m = repo.load("mpileaks").unwrap();
        assert_eq!(m.name(), "mpileaks");
        assert_eq!(m.dependencies.len(), 2);
    }

    #[test]
    fn test_load_missing_package() {
        let dir = setup_repo();
        let repo = Repo::open(dir.path()).unwrap();
        let err = repo.load("nope").unwrap_err();
        assert!(err.to_string().contains("no package named"));
    }

    #[test]
    fn test_load_name_mismatch() {
        let dir = setup_repo();
        write_package(dir.path(), "alias", "[package]\nname = \"other\"\n");
        let repo = Repo::open(dir.path()).unwrap();
        let err = repo.load("alias").unwrap_err();
        assert!(err.to_string().contains("declares name"));
    }

    #[test]
    fn test_load_all_collects_errors() {
        let dir = setup_repo();
        write_package(dir.path(), "broken", "[package]\nnot even toml");
        let repo = Repo::open(dir.path()).unwrap();
        let (manifests, errors) = repo.load_all().unwrap();
        assert_eq!(manifests.len(), 3);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("broken:"));
    }

    #[test]
    fn test_providers() {
        let dir = setup_repo();
        let repo = Repo::open(dir.path()).unwrap();
        assert_eq!(repo.providers("mpi").unwrap(), vec!["mpich"]);
        assert!(repo.providers("blas").unwrap().is_empty());
    }

    #[test]
    fn test_possible_dependencies_transitive() {
        let dir = setup_repo();
        let repo = Repo::open(dir.path()).unwrap();
        let deps = repo.possible_dependencies("mpileaks", true).unwrap();

        // Includes the package itself and everything reachable.
        assert!(deps.visited.contains_key("mpileaks"));
        assert!(deps.visited.contains_key("callpath"));
        assert!(deps.visited.contains_key("mpi"));
        assert_eq!(
            deps.visited["mpileaks"],
            BTreeSet::from(["callpath".to_string(), "mpi".to_string()])
        );

        // mpi and dyninst have no packages in this repo; both are first
        // encountered while walking callpath.
        assert!(deps.missing["callpath"].contains("dyninst"));
        assert!(deps.missing["callpath"].contains("mpi"));
        assert!(!deps.missing.contains_key("mpileaks"));
    }

    #[test]
    fn test_possible_dependencies_direct_only() {
        let dir = setup_repo();
        let repo = Repo::open(dir.path()).unwrap();
        let deps = repo.possible_dependencies("mpileaks", false).unwrap();

        assert!(deps.visited.contains_key("callpath"));
        // Direct-only walk records callpath but does not descend into it.
        assert!(deps.visited["callpath"].is_empty());
        assert!(!deps.visited.contains_key("dyninst"));
        assert!(deps.missing.is_empty());
    }

    #[test]
    fn test_possible_dependencies_cycle_safe() {
        let dir = TempDir::new().unwrap();
        write_package(
            dir.path(),
            "a",
            "[package]\nname = \"a\"\n\n[[dependencies]]\nspec = \"b\"\n",
        );
        write_package(
            dir.path(),
            "b",
            "[package]\nname = \"b\"\n\n[[dependencies]]\nspec = \"a\"\n",
        );
        let repo = Repo::open(dir.path()).unwrap();
        let deps = repo.possible_dependencies("a", true).unwrap();
        assert_eq!(deps.visited["a"], BTreeSet::from(["b".to_string()]));
        assert_eq!(deps.visited["b"], BTreeSet::from(["a".to_string()]));
    }
}
