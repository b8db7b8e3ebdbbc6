use std::path::Path;

use anyhow::{Context, Result};

use crate::bootstrap::{self, Plan, VirtualEnv};
use crate::package::{urls, PackageManifest};
use crate::repo::Repo;
use crate::spec::{parse_spec, Spec, VariantValue, Version};

use super::output::{format_fields, format_json};
use super::OutputFormat;

/// Run the `parse` command.
pub fn run_parse(spec_str: &str, format: &OutputFormat) -> Result<String> {
    let spec = parse_spec(spec_str)
        .with_context(|| format!("failed to parse spec {:?}", spec_str))?;
    match format {
        OutputFormat::Text => Ok(format_spec_text(&spec)),
        other => Ok(format_json(&spec, other)),
    }
}

fn format_spec_text(spec: &Spec) -> String {
    let name = if spec.name.is_empty() {
        "(anonymous)".to_string()
    } else {
        spec.name.clone()
    };

    let variants = spec
        .variants
        .iter()
        .map(|(k, v)| match v {
            VariantValue::Bool(true) => format!("+{}", k),
            VariantValue::Bool(false) => format!("~{}", k),
            other => format!("{}={}", k, other),
        })
        .collect::<Vec<_>>()
        .join(" ");

    let arch_pairs = [
        ("platform", &spec.arch.platform),
        ("os", &spec.arch.os),
        ("target", &spec.arch.cpu),
        ("gpu_arch", &spec.arch.gpu),
    ];
    let arch = arch_pairs
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| format!("{}={}", k, v)))
        .collect::<Vec<_>>()
        .join(" ");

    let deps = spec
        .deps
        .values()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format_fields(&[
        ("spec", spec.to_string()),
        ("name", name),
        (
            "version",
            spec.version.as_ref().map(|v| v.to_string()).unwrap_or_default(),
        ),
        (
            "compiler",
            spec.compiler.as_ref().map(|c| c.to_string()).unwrap_or_default(),
        ),
        ("variants", variants),
        ("arch", arch),
        ("dependencies", deps),
    ])
}

/// Run the `info` command.
pub fn run_info(repo_root: &Path, package: &str, format: &OutputFormat) -> Result<String> {
    let repo = Repo::open(repo_root)?;
    let manifest = repo.load(package)?;
    match format {
        OutputFormat::Text => Ok(format_info_text(&manifest)),
        other => Ok(format_json(&manifest, other)),
    }
}

fn format_info_text(manifest: &PackageManifest) -> String {
    let mut out = String::new();
    out.push_str(manifest.name());
    if let Some(desc) = &manifest.package.description {
        out.push_str(&format!(" -- {}", desc));
    }
    out.push('\n');

    if let Some(homepage) = &manifest.package.homepage {
        out.push_str(&format!("homepage: {}\n", homepage));
    }
    if !manifest.package.maintainers.is_empty() {
        out.push_str(&format!(
            "maintainers: {}\n",
            manifest.package.maintainers.join(", ")
        ));
    }

    if !manifest.versions.is_empty() {
        out.push_str("\nversions:\n");
        for entry in &manifest.versions {
            match &entry.url {
                Some(url) => out.push_str(&format!("  {:<12} {}\n", entry.version, url)),
                None => out.push_str(&format!("  {}\n", entry.version)),
            }
        }
    }

    if !manifest.variants.is_empty() {
        out.push_str("\nvariants:\n");
        for (name, decl) in &manifest.variants {
            let default = match &decl.default {
                VariantValue::Bool(b) => b.to_string(),
                other => other.to_string(),
            };
            out.push_str(&format!("  {:<16} [{}]", name, default));
            if let Some(desc) = &decl.description {
                out.push_str(&format!("  {}", desc));
            }
            out.push('\n');
        }
    }

    if !manifest.dependencies.is_empty() {
        out.push_str("\ndependencies:\n");
        for dep in &manifest.dependencies {
            out.push_str(&format!("  {}", dep.spec));
            if let Some(kind) = dep.kind {
                out.push_str(&format!("  [{}]", kind));
            }
            if let Some(when) = &dep.when {
                out.push_str(&format!("  when: {}", when));
            }
            out.push('\n');
        }
    }

    if !manifest.provides.is_empty() {
        out.push_str("\nprovides:\n");
        for p in &manifest.provides {
            out.push_str(&format!("  {}", p.virtual_name));
            if let Some(when) = &p.when {
                out.push_str(&format!("  when: {}", when));
            }
            out.push('\n');
        }
    }

    out
}

/// Run the `list` command.
pub fn run_list(repo_root: &Path, format: &OutputFormat) -> Result<String> {
    let repo = Repo::open(repo_root)?;
    let names = repo.list()?;
    match format {
        OutputFormat::Text => Ok(names.join("\n")),
        other => Ok(format_json(&names, other)),
    }
}

#[derive(serde::Serialize)]
struct VersionRow {
    version: String,
    url: Option<String>,
}

/// Run the `versions` command.
pub fn run_versions(repo_root: &Path, package: &str, format: &OutputFormat) -> Result<String> {
    let repo = Repo::open(repo_root)?;
    let manifest = repo.load(package)?;

    // Newest first.
    let mut versions = manifest.version_list()?;
    versions.reverse();

    let rows: Vec<VersionRow> = versions
        .iter()
        .map(|v| VersionRow {
            version: v.to_string(),
            url: urls::url_for_version(&manifest, v).ok(),
        })
        .collect();

    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for row in &rows {
                out.push_str(&format!(
                    "{:<12} {}\n",
                    row.version,
                    row.url.as_deref().unwrap_or("-")
                ));
            }
            Ok(out)
        }
        other => Ok(format_json(&rows, other)),
    }
}

/// Run the `url` command.
pub fn run_url(
    repo_root: &Path,
    package: &str,
    version: &str,
    format: &OutputFormat,
) -> Result<String> {
    let repo = Repo::open(repo_root)?;
    let manifest = repo.load(package)?;
    let version: Version = version.parse()?;
    let url = urls::url_for_version(&manifest, &version)?;
    match format {
        OutputFormat::Text => Ok(url),
        other => Ok(format_json(&serde_json::json!({ "url": url }), other)),
    }
}

/// Run the `providers` command.
pub fn run_providers(repo_root: &Path, virtual_name: &str, format: &OutputFormat) -> Result<String> {
    let repo = Repo::open(repo_root)?;
    let providers = repo.providers(virtual_name)?;
    match format {
        OutputFormat::Text => Ok(providers.join("\n")),
        other => Ok(format_json(&providers, other)),
    }
}

/// Run the `audit` command. The boolean is true when any manifest is invalid.
pub fn run_audit(repo_root: &Path, format: &OutputFormat) -> Result<(String, bool)> {
    let repo = Repo::open(repo_root)?;
    let (manifests, errors) = repo.load_all()?;

    let output = match format {
        OutputFormat::Text => {
            let mut out = format!(
                "Audited {} packages: {} invalid",
                manifests.len() + errors.len(),
                errors.len()
            );
            for err in &errors {
                out.push_str(&format!("\n  {}", err));
            }
            out
        }
        other => format_json(
            &serde_json::json!({
                "packages": manifests.len() + errors.len(),
                "errors": errors,
            }),
            other,
        ),
    };

    Ok((output, !errors.is_empty()))
}

/// Run the `bootstrap` command. Returns the pipeline's exit code.
pub fn run_bootstrap(dry_run: bool) -> Result<i32> {
    let env = VirtualEnv::detect()?;
    let plan = Plan::for_env(&env);

    if dry_run {
        println!("install prefix: {}", env.prefix().display());
        for step in &plan.steps {
            println!("{:<12} {} {}", step.label, step.program, step.args.join(" "));
        }
        return Ok(0);
    }

    bootstrap::run(&plan)
}
