use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::spec::{parse_spec, Spec, VariantValue, Version};

pub mod urls;

/// Manifest file name inside each package directory.
pub const MANIFEST_FILENAME: &str = "package.toml";

/// A package manifest: everything a repository knows about one package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageManifest {
    pub package: PackageMeta,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
    #[serde(default)]
    pub variants: BTreeMap<String, VariantDecl>,
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
    #[serde(default)]
    pub provides: Vec<ProvideDecl>,
}

/// The `[package]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageMeta {
    pub name: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    /// Version-templated download URL; the embedded version gets substituted.
    pub url: Option<String>,
    /// Where to look for new versions.
    pub list_url: Option<String>,
    #[serde(default)]
    pub maintainers: Vec<String>,
}

/// One `[[versions]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionEntry {
    pub version: String,
    pub url: Option<String>,
    pub sha256: Option<String>,
}

impl VersionEntry {
    pub fn parsed(&self) -> Result<Version> {
        self.version
            .parse()
            .with_context(|| format!("bad version entry {:?}", self.version))
    }
}

/// One `[variants.<name>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantDecl {
    pub default: VariantValue,
    pub description: Option<String>,
    /// Allowed values for a string-valued variant.
    pub values: Option<Vec<String>>,
}

/// Dependency category, mirroring build/link/run deptypes. Absent means all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepKind {
    Build,
    Link,
    Run,
}

impl DepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepKind::Build => "build",
            DepKind::Link => "link",
            DepKind::Run => "run",
        }
    }
}

impl FromStr for DepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(DepKind::Build),
            "link" => Ok(DepKind::Link),
            "run" => Ok(DepKind::Run),
            _ => Err(format!("unknown dependency kind: {}", s)),
        }
    }
}

impl fmt::Display for DepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[[dependencies]]` entry: a spec string, optionally gated by a `when`
/// constraint on this package, optionally narrowed to one kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyDecl {
    pub spec: String,
    pub when: Option<String>,
    pub kind: Option<DepKind>,
}

/// One `[[provides]]` entry: this package provides a virtual package,
/// optionally only under a `when` constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvideDecl {
    #[serde(rename = "virtual")]
    pub virtual_name: String,
    pub when: Option<String>,
}

impl PackageManifest {
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// Declared versions, parsed and sorted ascending.
    pub fn version_list(&self) -> Result<Vec<Version>> {
        let mut versions = self
            .versions
            .iter()
            .map(|e| e.parsed())
            .collect::<Result<Vec<_>>>()?;
        versions.sort();
        Ok(versions)
    }

    /// Dependencies that can be of the given kind. Entries without an
    /// explicit kind count for every kind.
    pub fn dependencies_of_kind(&self, kind: DepKind) -> Vec<&DependencyDecl> {
        self.dependencies
            .iter()
            .filter(|d| d.kind.is_none() || d.kind == Some(kind))
            .collect()
    }

    /// True if this package provides the named virtual package.
    ///
    /// With `at`, only `[[provides]]` entries whose `when` clause the given
    /// spec satisfies are considered; without it the `when` gate is ignored.
    pub fn provides_virtual(&self, virtual_name: &str, at: Option<&Spec>) -> Result<bool> {
        for decl in &self.provides {
            let provided = parse_spec(&decl.virtual_name).with_context(|| {
                format!("bad provides entry in {}: {:?}", self.name(), decl.virtual_name)
            })?;
            if provided.name != virtual_name {
                continue;
            }
            let Some(at) = at else {
                return Ok(true);
            };
            match &decl.when {
                None => return Ok(true),
                Some(when) => {
                    let constraint = parse_spec(when).with_context(|| {
                        format!("bad when clause in {}: {:?}", self.name(), when)
                    })?;
                    if at.satisfies(&constraint) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Structural checks that TOML deserialization cannot express.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.package.name) {
            bail!("invalid package name: {:?}", self.package.name);
        }

        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.versions {
            let version = entry.parsed()?;
            if !seen.insert(version.clone()) {
                bail!("duplicate version entry: {}", version);
            }
        }

        for (name, decl) in &self.variants {
            if !is_valid_name(name) {
                bail!("invalid variant name: {:?}", name);
            }
            if let (VariantValue::Single(default), Some(values)) = (&decl.default, &decl.values) {
                if !values.contains(default) {
                    bail!(
                        "variant {:?}: default {:?} is not among its values {:?}",
                        name,
                        default,
                        values
                    );
                }
            }
        }

        for decl in &self.dependencies {
            let spec = parse_spec(&decl.spec)
                .with_context(|| format!("bad dependency spec {:?}", decl.spec))?;
            if spec.name.is_empty() {
                bail!("dependency spec {:?} names no package", decl.spec);
            }
            if let Some(when) = &decl.when {
                parse_spec(when).with_context(|| format!("bad when clause {:?}", when))?;
            }
        }

        for decl in &self.provides {
            parse_spec(&decl.virtual_name)
                .with_context(|| format!("bad provides entry {:?}", decl.virtual_name))?;
            if let Some(when) = &decl.when {
                parse_spec(when).with_context(|| format!("bad when clause {:?}", when))?;
            }
        }

        Ok(())
    }
}

/// Package and variant names: a leading alphanumeric, then word characters,
/// dots, or dashes.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// Load and validate a manifest from a TOML file.
pub fn load_manifest(path: &Path) -> Result<PackageManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let manifest =
        parse_manifest(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    manifest
        .validate()
        .with_context(|| format!("Invalid manifest {}", path.display()))?;
    Ok(manifest)
}

/// Parse a manifest from a TOML string (no validation).
pub fn parse_manifest(toml_str: &str) -> Result<PackageManifest> {
    let manifest: PackageManifest = toml::from_str(toml_str)?;
    Ok(manifest)
}
