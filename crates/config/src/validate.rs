use crate::Config;
use folio_archive::Format;
use crate::error::{ErrorKind, Result};

/// Reject values the library cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    let invalid = |msg: &str| ErrorKind::Invalid(msg.to_string());
    if !config.archives.root.is_absolute() {
        exn::bail!(invalid("archives.root must be an absolute path"));
    }
    if config.archives.attachments.trim().is_empty() {
        exn::bail!(invalid("archives.attachments cannot be empty"));
    }
    if config.archives.coverage_formats.contains(&Format::Unknown) {
        exn::bail!(invalid("archives.coverage_formats cannot contain unknown"));
    }
    if !config.assets.root.is_absolute() {
        exn::bail!(invalid("assets.root must be an absolute path"));
    }
    if config.limits.max_concurrent_extractions == 0 {
        exn::bail!(invalid("limits.max_concurrent_extractions cannot be 0"));
    }
    if config.limits.probe_timeout_secs == 0 {
        exn::bail!(invalid("limits.probe_timeout_secs cannot be 0"));
    }
    if config.limits.purge_batch_size == 0 {
        exn::bail!(invalid("limits.purge_batch_size cannot be 0"));
    }
    Ok(())
}
