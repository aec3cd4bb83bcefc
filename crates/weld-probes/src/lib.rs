use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use weld_config::ProbeSettings;
use weld_platform::{Os, Platform};
use weld_toolchain::CommandRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The trace tool produced the header (and on Linux/FreeBSD the probe
    /// object to link in).
    Generated { object: Option<PathBuf> },
    /// The trace tool is unavailable or failed; the feature macro was
    /// commented out of the config header. `patched` is false when the
    /// header already had it disabled.
    Disabled { patched: bool },
    Skipped,
}

impl ProbeOutcome {
    pub fn summary(&self) -> String {
        match self {
            ProbeOutcome::Generated { object: None } => {
                "probes generated (header only)".to_string()
            }
            ProbeOutcome::Generated {
                object: Some(object),
            } => format!("probes generated with {}", object.display()),
            ProbeOutcome::Disabled { patched: true } => {
                "probes disabled (config header patched)".to_string()
            }
            ProbeOutcome::Disabled { patched: false } => {
                "probes disabled (config header already patched)".to_string()
            }
            ProbeOutcome::Skipped => "probes skipped on this platform".to_string(),
        }
    }
}

/// Runs the probe stage. Tool failures never escape: every failing path
/// lands in the header fallback. Only fallback I/O itself is a hard error.
pub fn generate(
    project_dir: &Path,
    settings: &ProbeSettings,
    platform: Platform,
    runner: &dyn CommandRunner,
) -> Result<ProbeOutcome> {
    if platform.os == Os::Windows {
        info!("trace probes are not supported on windows; skipping");
        return Ok(ProbeOutcome::Skipped);
    }

    let source = project_dir.join(&settings.source);
    let header = project_dir.join(&settings.header);
    let object = project_dir.join(&settings.object);

    if let Some(parent) = object.parent() {
        ensure_build_dir(parent);
    }

    let generated = match platform.os {
        Os::MacOs => run_probe_tool(
            runner,
            &["-h", "-xnolibs"],
            &source,
            &header,
            "generating trace probes",
        )
        .then(|| ProbeOutcome::Generated { object: None }),
        Os::Linux | Os::FreeBsd => {
            let done = run_probe_tool(
                runner,
                &["-h", "-C"],
                &source,
                &header,
                "generating the probes header",
            ) && run_probe_tool(
                runner,
                &["-G", "-C"],
                &source,
                &object,
                "generating the probes object",
            );
            done.then(|| ProbeOutcome::Generated {
                object: Some(object.clone()),
            })
        }
        Os::Windows => unreachable!("handled above"),
    };

    if let Some(outcome) = generated {
        return Ok(outcome);
    }

    let config_header = project_dir.join(&settings.config_header);
    info!(
        "dtrace is unavailable or failed; disabling probes in {}",
        config_header.display()
    );
    let patched = disable_in_header(&config_header, &settings.feature_macro)?;
    Ok(ProbeOutcome::Disabled { patched })
}

fn run_probe_tool(
    runner: &dyn CommandRunner,
    flags: &[&str],
    source: &Path,
    output: &Path,
    step: &str,
) -> bool {
    let mut command = Command::new("dtrace");
    command.args(flags).arg("-s").arg(source).arg("-o").arg(output);
    match runner.run(&mut command, step) {
        Ok(outcome) => outcome.success,
        Err(err) => {
            debug!("{step}: {err:#}");
            false
        }
    }
}

fn ensure_build_dir(dir: &Path) {
    if dir.exists() {
        return;
    }
    info!("creating the build folder {}", dir.display());
    if let Err(err) = fs::create_dir_all(dir) {
        warn!("failed creating the build folder {}: {err}", dir.display());
    }
}

/// Comments the `#define <MACRO> 1` line out of the config header, keeping
/// a one-time `.bak` of the original. The match is newline-anchored, so an
/// already-commented line is left alone.
fn disable_in_header(config_header: &Path, feature_macro: &str) -> Result<bool> {
    let original = fs::read_to_string(config_header)
        .with_context(|| format!("failed reading config header {}", config_header.display()))?;

    let target = format!("\n#define {feature_macro} 1");
    let replacement = format!("\n//#define {feature_macro} 1");
    let modified = original.replace(&target, &replacement);

    if modified == original {
        return Ok(false);
    }

    let backup = backup_path_for(config_header);
    if backup.exists() {
        fs::remove_file(&backup)
            .with_context(|| format!("failed removing stale backup {}", backup.display()))?;
    }
    fs::rename(config_header, &backup).with_context(|| {
        format!(
            "failed moving {} to {}",
            config_header.display(),
            backup.display()
        )
    })?;
    fs::write(config_header, modified)
        .with_context(|| format!("failed writing patched config header {}", config_header.display()))?;
    Ok(true)
}

fn backup_path_for(file: &Path) -> PathBuf {
    let mut backup = file.as_os_str().to_os_string();
    backup.push(".bak");
    PathBuf::from(backup)
}
