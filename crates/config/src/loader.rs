use crate::error::{ErrorKind, Result};
use crate::types::project_dirs;
use crate::{Config, validate};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

const ENV_PREFIX: &str = "FOLIO_";

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

/// Files consulted when no explicit path is given, lowest precedence first.
/// Missing files are skipped.
pub fn default_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dirs) = project_dirs() {
        locations.push(dirs.config_dir().join("folio.yaml"));
        locations.push(dirs.config_dir().join("folio.toml"));
    }
    locations.push(PathBuf::from("folio.yaml"));
    locations.push(PathBuf::from("folio.toml"));
    locations
}

/// Build the layered figment without extracting it: defaults, then the
/// configuration file(s), then `FOLIO_*` environment variables (`__`
/// separates nested keys, e.g. `FOLIO_LIMITS__PROBE_TIMEOUT_SECS`).
pub fn figment(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    match path {
        Some(path) => {
            if !path.exists() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = merge_file(figment, path);
        },
        None => {
            for location in default_locations() {
                figment = merge_file(figment, &location);
            }
        },
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

/// Load and validate configuration.
#[instrument]
pub fn load(path: Option<&Path>) -> Result<Config> {
    let config: Config = figment(path)?.extract().or_raise(|| ErrorKind::Parse)?;
    validate(&config)?;
    debug!(root = %config.archives.root.display(), "loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lister;
    use figment::Jail;
    use folio_archive::Format;

    const TOML: &str = r#"
        [archives]
        root = "/srv/library"
        lister = "command"

        [assets]
        root = "/var/cache/folio"

        [limits]
        purge_batch_size = 100
    "#;

    #[test]
    fn test_load_explicit_file() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", TOML)?;
            let config = load(Some(Path::new("custom.toml"))).unwrap();
            assert_eq!(config.archives.root, PathBuf::from("/srv/library"));
            assert_eq!(config.archives.lister, Lister::Command);
            assert_eq!(config.archives.attachments, "covers.zip");
            assert_eq!(config.limits.purge_batch_size, 100);
            assert_eq!(config.limits.max_concurrent_extractions, 2);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("folio.toml", TOML)?;
            jail.set_env("FOLIO_LIMITS__PROBE_TIMEOUT_SECS", "3");
            jail.set_env("FOLIO_ARCHIVES__INCLUDE_EXPERIMENTAL", "true");
            let config = load(None).unwrap();
            assert_eq!(config.limits.probe_timeout_secs, 3);
            assert!(config.archives.include_experimental);
            Ok(())
        });
    }

    #[test]
    fn test_coverage_formats() {
        Jail::expect_with(|jail| {
            jail.create_file("folio.toml", TOML)?;
            assert_eq!(load(None).unwrap().archives.coverage_formats, vec![Format::Fb2]);
            jail.set_env("FOLIO_ARCHIVES__COVERAGE_FORMATS", "[fb2, epub]");
            let config = load(None).unwrap();
            assert_eq!(config.archives.coverage_formats, vec![Format::Fb2, Format::Epub]);
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "folio.yaml",
                "archives:\n  root: /srv/yaml\nassets:\n  root: /var/cache/yaml\n  cache_book_files: true\n",
            )?;
            let config = load(Some(Path::new("folio.yaml"))).unwrap();
            assert_eq!(config.archives.root, PathBuf::from("/srv/yaml"));
            assert!(config.assets.cache_book_files);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = load(Some(Path::new("/nonexistent/folio.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("folio.toml", TOML)?;
            jail.set_env("FOLIO_LIMITS__MAX_CONCURRENT_EXTRACTIONS", "0");
            let err = load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file() {
        Jail::expect_with(|jail| {
            jail.create_file("folio.toml", "[limits]\npurge_batch_size = \"many\"\n")?;
            let err = load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Parse));
            Ok(())
        });
    }
}
