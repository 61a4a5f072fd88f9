use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version '{0}' has no release component")]
    MissingRelease(String),
    #[error("release '{release}' of version '{version}' is not numeric")]
    BadRelease { version: String, release: String },
}

/// Version to build given upstream's version and the one already built
///
/// When both share the same pkgver (text before the first `-`), the release
/// is bumped past both by 0.1 so the rebuild sorts after the existing
/// package. Otherwise upstream's version is used as is.
pub fn target_version(upstream: &str, built: Option<&str>) -> Result<String, VersionError> {
    let Some(built) = built else {
        return Ok(upstream.to_string());
    };
    if pkgver(upstream) != pkgver(built) {
        return Ok(upstream.to_string());
    }

    let (base, up_rel) = split_release(upstream)?;
    let (_, built_rel) = split_release(built)?;
    let up = parse_release(upstream, up_rel)?;
    let old = parse_release(built, built_rel)?;

    let decimals = decimals(up_rel).max(decimals(built_rel)).max(1);
    let bumped = up.max(old) + 0.1;
    Ok(format!("{}-{:.*}", base, decimals, bumped))
}

fn pkgver(version: &str) -> &str {
    version.split('-').next().unwrap_or(version)
}

fn split_release(version: &str) -> Result<(&str, &str), VersionError> {
    version
        .rsplit_once('-')
        .filter(|(_, rel)| !rel.is_empty())
        .ok_or_else(|| VersionError::MissingRelease(version.to_string()))
}

fn parse_release(version: &str, release: &str) -> Result<f64, VersionError> {
    let bad = || VersionError::BadRelease {
        version: version.to_string(),
        release: release.to_string(),
    };
    if !release.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(bad());
    }
    release.parse().map_err(|_| bad())
}

fn decimals(release: &str) -> usize {
    release.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_upstream_version_adopted() {
        assert_eq!(target_version("1.3-2", Some("1.2-1")).unwrap(), "1.3-2");
    }

    #[test]
    fn test_no_built_version() {
        assert_eq!(target_version("1.3-2", None).unwrap(), "1.3-2");
    }

    #[test]
    fn test_same_pkgver_bumps_release() {
        assert_eq!(target_version("1.3-1", Some("1.3-1")).unwrap(), "1.3-1.1");
        assert_eq!(target_version("1.3-1", Some("1.3-1.1")).unwrap(), "1.3-1.2");
        assert_eq!(target_version("1.3-2", Some("1.3-1.4")).unwrap(), "1.3-2.1");
    }

    #[test]
    fn test_epoch_is_part_of_pkgver() {
        assert_eq!(target_version("1:2.0-3", Some("1:2.0-3")).unwrap(), "1:2.0-3.1");
        assert_eq!(target_version("1:2.0-3", Some("2.0-3")).unwrap(), "1:2.0-3");
    }

    #[test]
    fn test_bad_release() {
        assert!(matches!(
            target_version("1.3-rc1", Some("1.3-1")),
            Err(VersionError::BadRelease { .. })
        ));
        assert!(matches!(
            target_version("1.3", Some("1.3")),
            Err(VersionError::MissingRelease(_))
        ));
    }
}
