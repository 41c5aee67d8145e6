//! Shared helpers for CLI commands: manifest loading and validation.

use std::error::Error;
use std::path::Path;

use convoy::RepoKey;
use url::Url;

/// Load and parse a migration manifest.
///
/// One migration per line: source remote, then target remote, separated by
/// whitespace or `->`. Blank lines and `#` comments are skipped.
pub(crate) fn load_manifest(path: &Path) -> Result<Vec<RepoKey>, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read manifest {}: {e}", path.display()))?;
    parse_manifest(&text)
}

pub(crate) fn parse_manifest(text: &str) -> Result<Vec<RepoKey>, Box<dyn Error>> {
    let mut keys = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (source, target) = if let Some((s, t)) = line.split_once("->") {
            (s.trim(), t.trim())
        } else {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(s), Some(t), None) => (s, t),
                _ => {
                    return Err(format!(
                        "manifest line {}: expected `source target` or `source -> target`",
                        idx + 1
                    )
                    .into());
                }
            }
        };

        if source.is_empty() || target.is_empty() {
            return Err(format!("manifest line {}: missing source or target", idx + 1).into());
        }
        validate_remote(source).map_err(|e| format!("manifest line {}: {e}", idx + 1))?;
        validate_remote(target).map_err(|e| format!("manifest line {}: {e}", idx + 1))?;

        keys.push(RepoKey::new(source, target));
    }

    if keys.is_empty() {
        return Err("manifest contains no migrations".into());
    }

    Ok(keys)
}

/// Accept URL remotes (validated), scp-like remotes (`git@host:path`), and
/// local paths. Anything else is probably a typo.
fn validate_remote(remote: &str) -> Result<(), String> {
    if remote.contains("://") {
        Url::parse(remote).map_err(|e| format!("invalid remote URL `{remote}`: {e}"))?;
        return Ok(());
    }
    if remote.contains(':') || remote.contains('/') {
        return Ok(());
    }
    Err(format!(
        "remote `{remote}` is neither a URL, an scp-like remote, nor a path"
    ))
}
