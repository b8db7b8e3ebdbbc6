use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub mod parser;

pub use parser::parse_spec;

/// Errors produced while parsing or combining spec components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("empty spec string")]
    Empty,
    #[error("unexpected input at byte {pos}: {found:?}")]
    Unexpected { pos: usize, found: String },
    #[error("repeated variant: {0}")]
    DuplicateVariant(String),
    #[error("repeated arch component: {0}")]
    DuplicateArch(&'static str),
    #[error("repeated version specifier")]
    DuplicateVersion,
    #[error("repeated compiler specifier")]
    DuplicateCompiler,
    #[error("repeated dependency: {0}")]
    DuplicateDependency(String),
    #[error("invalid version: {0:?}")]
    InvalidVersion(String),
    #[error("invalid arch value: {0:?} (expected platform-os-cpu[-gpu])")]
    InvalidArch(String),
}

/// A package version: `major[.minor[.patch]][ext]`.
///
/// Minor and patch are kept optional so that `1.2` and `1.2.0` stay
/// distinguishable when a spec is printed back out. The extension tag holds
/// trailing pre-release markers like `rc1` or `b2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    pub ext: String,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor: Some(minor),
            patch: Some(patch),
            ext: String::new(),
        }
    }

    /// True if this version matches `prefix` on every component the prefix
    /// spells out. `1.2.3` matches the prefix `1.2`, but not `1.2.0`.
    pub fn satisfies_prefix(&self, prefix: &Version) -> bool {
        if self.major != prefix.major {
            return false;
        }
        if let Some(m) = prefix.minor {
            if self.minor.unwrap_or(0) != m {
                return false;
            }
        }
        if let Some(p) = prefix.patch {
            if self.patch.unwrap_or(0) != p {
                return false;
            }
        }
        prefix.ext.is_empty() || self.ext == prefix.ext
    }
}

impl FromStr for Version {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn take_number(s: &str) -> Option<(u64, &str)> {
            let end = s
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(s.len());
            if end == 0 {
                return None;
            }
            let n = s[..end].parse().ok()?;
            Some((n, &s[end..]))
        }

        let invalid = || SpecError::InvalidVersion(s.to_string());

        let (major, mut rest) = take_number(s).ok_or_else(invalid)?;
        let mut minor = None;
        let mut patch = None;

        if let Some(r) = rest.strip_prefix('.') {
            let (n, r) = take_number(r).ok_or_else(invalid)?;
            minor = Some(n);
            rest = r;
            if let Some(r) = rest.strip_prefix('.') {
                let (n, r) = take_number(r).ok_or_else(invalid)?;
                patch = Some(n);
                rest = r;
            }
        }

        if !rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid());
        }

        Ok(Version {
            major,
            minor,
            patch,
            ext: rest.to_string(),
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let key = |v: &Version| (v.major, v.minor.unwrap_or(0), v.patch.unwrap_or(0));
        key(self)
            .cmp(&key(other))
            .then_with(|| self.ext.cmp(&other.ext))
            .then_with(|| self.minor.is_some().cmp(&other.minor.is_some()))
            .then_with(|| self.patch.is_some().cmp(&other.patch.is_some()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if let Some(m) = self.minor {
            write!(f, ".{}", m)?;
        }
        if let Some(p) = self.patch {
            write!(f, ".{}", p)?;
        }
        f.write_str(&self.ext)
    }
}

/// A version constraint: either an exact (prefix-matched) version or an
/// inclusive range `lo:hi` where either end may be open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionReq {
    Exact(Version),
    Range {
        lo: Option<Version>,
        hi: Option<Version>,
    },
}

impl VersionReq {
    pub fn any() -> Self {
        VersionReq::Range { lo: None, hi: None }
    }

    pub fn satisfies(&self, v: &Version) -> bool {
        match self {
            VersionReq::Exact(e) => v.satisfies_prefix(e),
            VersionReq::Range { lo, hi } => {
                if let Some(lo) = lo {
                    if v < lo && !v.satisfies_prefix(lo) {
                        return false;
                    }
                }
                if let Some(hi) = hi {
                    if v > hi && !v.satisfies_prefix(hi) {
                        return false;
                    }
                }
                true
            }
        }
    }
}

impl FromStr for VersionReq {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None => Ok(VersionReq::Exact(s.parse()?)),
            Some((lo, hi)) => {
                let parse_end = |end: &str| -> Result<Option<Version>, SpecError> {
                    if end.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some(end.parse()?))
                    }
                };
                Ok(VersionReq::Range {
                    lo: parse_end(lo)?,
                    hi: parse_end(hi)?,
                })
            }
        }
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionReq::Exact(v) => write!(f, "{}", v),
            VersionReq::Range { lo, hi } => {
                if let Some(lo) = lo {
                    write!(f, "{}", lo)?;
                }
                f.write_str(":")?;
                if let Some(hi) = hi {
                    write!(f, "{}", hi)?;
                }
                Ok(())
            }
        }
    }
}

/// The value assigned to a variant: a boolean toggle, a single string, or a
/// comma-separated list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    Bool(bool),
    Single(String),
    List(Vec<String>),
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantValue::Bool(true) => f.write_str("true"),
            VariantValue::Bool(false) => f.write_str("false"),
            VariantValue::Single(s) => f.write_str(s),
            VariantValue::List(vs) => f.write_str(&vs.join(",")),
        }
    }
}

/// A compiler requirement: `%gcc` or `%gcc@12.1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compiler {
    pub name: String,
    pub version: Option<VersionReq>,
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(v) = &self.version {
            write!(f, "@{}", v)?;
        }
        Ok(())
    }
}

/// Target architecture components. Unset components are wildcards; the
/// literal value `nil` in spec syntax also means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchSpec {
    pub platform: Option<String>,
    pub os: Option<String>,
    pub cpu: Option<String>,
    pub gpu: Option<String>,
}

impl ArchSpec {
    pub fn is_empty(&self) -> bool {
        self.platform.is_none() && self.os.is_none() && self.cpu.is_none() && self.gpu.is_none()
    }

    /// Fold another arch spec into this one. Setting a component that is
    /// already set is an error.
    pub fn merge(&mut self, other: ArchSpec) -> Result<(), SpecError> {
        fn put(
            slot: &mut Option<String>,
            val: Option<String>,
            key: &'static str,
        ) -> Result<(), SpecError> {
            if let Some(v) = val {
                if slot.is_some() {
                    return Err(SpecError::DuplicateArch(key));
                }
                *slot = Some(v);
            }
            Ok(())
        }
        put(&mut self.platform, other.platform, "platform")?;
        put(&mut self.os, other.os, "os")?;
        put(&mut self.cpu, other.cpu, "target")?;
        put(&mut self.gpu, other.gpu, "gpu_arch")?;
        Ok(())
    }
}

/// A parsed spec: a (possibly anonymous) package name plus constraints on
/// version, compiler, variants, architecture, and direct dependencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub name: String,
    pub version: Option<VersionReq>,
    pub compiler: Option<Compiler>,
    pub variants: BTreeMap<String, VariantValue>,
    pub arch: ArchSpec,
    pub deps: BTreeMap<String, Spec>,
}

impl Spec {
    pub fn new(name: impl Into<String>) -> Self {
        Spec {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Record a variant value, rejecting repeats.
    pub fn set_variant(&mut self, name: &str, value: VariantValue) -> Result<(), SpecError> {
        if self.variants.contains_key(name) {
            return Err(SpecError::DuplicateVariant(name.to_string()));
        }
        self.variants.insert(name.to_string(), value);
        Ok(())
    }

    /// True when this spec meets every constraint spelled out by `constraint`.
    ///
    /// An anonymous constraint (empty name) matches any package name. Version
    /// constraints are only considered met when this spec pins an exact
    /// version that satisfies them. Dependencies on the constraint side are
    /// ignored; `when` clauses in manifests never carry them.
    pub fn satisfies(&self, constraint: &Spec) -> bool {
        if !constraint.name.is_empty() && constraint.name != self.name {
            return false;
        }
        if let Some(req) = &constraint.version {
            match &self.version {
                Some(VersionReq::Exact(v)) => {
                    if !req.satisfies(v) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        if let Some(cc) = &constraint.compiler {
            let Some(sc) = &self.compiler else {
                return false;
            };
            if sc.name != cc.name {
                return false;
            }
            if let Some(req) = &cc.version {
                match &sc.version {
                    Some(VersionReq::Exact(v)) => {
                        if !req.satisfies(v) {
                            return false;
                        }
                    }
                    _ => return false,
                }
            }
        }
        for (name, value) in &constraint.variants {
            if self.variants.get(name) != Some(value) {
                return false;
            }
        }
        let arch_pairs = [
            (&constraint.arch.platform, &self.arch.platform),
            (&constraint.arch.os, &self.arch.os),
            (&constraint.arch.cpu, &self.arch.cpu),
            (&constraint.arch.gpu, &self.arch.gpu),
        ];
        for (want, have) in arch_pairs {
            if want.is_some() && want != have {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(v) = &self.version {
            write!(f, "@{}", v)?;
        }
        if let Some(c) = &self.compiler {
            write!(f, "%{}", c)?;
        }
        for (name, value) in &self.variants {
            match value {
                VariantValue::Bool(true) => write!(f, "+{}", name)?,
                VariantValue::Bool(false) => write!(f, "~{}", name)?,
                other => write!(f, " {}={}", name, other)?,
            }
        }
        let arch_pairs = [
            ("platform", &self.arch.platform),
            ("os", &self.arch.os),
            ("target", &self.arch.cpu),
            ("gpu_arch", &self.arch.gpu),
        ];
        for (key, value) in arch_pairs {
            if let Some(v) = value {
                write!(f, " {}={}", key, v)?;
            }
        }
        for dep in self.deps.values() {
            write!(f, " ^{}", dep)?;
        }
        Ok(())
    }
}
