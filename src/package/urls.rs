use anyhow::{bail, Result};
use regex::Regex;

use super::PackageManifest;
use crate::spec::Version;

/// Versions with an explicitly declared URL, sorted ascending by version.
pub fn version_urls(manifest: &PackageManifest) -> Result<Vec<(Version, String)>> {
    let mut pairs = Vec::new();
    for entry in &manifest.versions {
        if let Some(url) = &entry.url {
            pairs.push((entry.parsed()?, url.clone()));
        }
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(pairs)
}

/// The explicit URL "closest" to `version`.
///
/// Precedence: the next lowest-or-equal version with a URL, then the next
/// higher one, then None.
pub fn nearest_url(manifest: &PackageManifest, version: &Version) -> Result<Option<String>> {
    let pairs = version_urls(manifest)?;

    if let Some((_, url)) = pairs.iter().find(|(v, _)| v == version) {
        return Ok(Some(url.clone()));
    }

    let mut last_url = None;
    for (v, url) in pairs {
        if v > *version {
            if last_url.is_some() {
                return Ok(last_url);
            }
        }
        last_url = Some(url);
    }
    Ok(last_url)
}

/// Every URL the manifest mentions: the templated package URL plus all
/// per-version URLs.
pub fn all_urls(manifest: &PackageManifest) -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(url) = &manifest.package.url {
        urls.push(url.clone());
    }
    for entry in &manifest.versions {
        if let Some(url) = &entry.url {
            urls.push(url.clone());
        }
    }
    urls
}

/// All candidate download URLs for `version`, most specific first.
///
/// An explicitly declared URL wins; otherwise version-bearing URLs
/// (the package URL, then `list_url`) get the version substituted in.
/// When nothing carries a detectable version, the bare package URL or the
/// nearest explicit URL is tried raw.
pub fn all_urls_for_version(manifest: &PackageManifest, version: &Version) -> Result<Vec<String>> {
    let mut urls: Vec<String> = Vec::new();

    for (v, url) in version_urls(manifest)? {
        if v == *version {
            urls.push(url);
        }
    }

    let sub_and_add = |candidate: Option<&String>, urls: &mut Vec<String>| {
        if let Some(candidate) = candidate {
            // Skip URLs with no recognizable version to replace.
            if let Some(substituted) = substitute_version(candidate, version) {
                if !urls.contains(&substituted) {
                    urls.push(substituted);
                }
            }
        }
    };

    sub_and_add(manifest.package.url.as_ref(), &mut urls);
    sub_and_add(manifest.package.list_url.as_ref(), &mut urls);

    if urls.is_empty() {
        let fallback = match &manifest.package.url {
            Some(url) => Some(url.clone()),
            None => nearest_url(manifest, version)?,
        };
        match fallback {
            Some(url) => {
                urls.push(substitute_version(&url, version).unwrap_or(url));
            }
            None => bail!("no URL known for {} @ {}", manifest.name(), version),
        }
    }

    Ok(urls)
}

/// The download URL for `version`.
pub fn url_for_version(manifest: &PackageManifest, version: &Version) -> Result<String> {
    let urls = all_urls_for_version(manifest, version)?;
    match urls.into_iter().next() {
        Some(url) => Ok(url),
        None => bail!("no URL known for {} @ {}", manifest.name(), version),
    }
}

/// Replace the version embedded in a URL with `version`.
///
/// Matches the last dotted-number run (with an optional trailing tag, e.g.
/// `1.10.8rc1`); returns None when the URL carries no detectable version.
pub fn substitute_version(url: &str, version: &Version) -> Option<String> {
    let re = Regex::new(r"\d+(?:\.\d+)+[A-Za-z0-9]*").expect("version pattern is valid");
    let last = re.find_iter(url).last()?;
    let mut out = String::with_capacity(url.len());
    out.push_str(&url[..last.start()]);
    out.push_str(&version.to_string());
    out.push_str(&url[last.end()..]);
    Some(out)
}
