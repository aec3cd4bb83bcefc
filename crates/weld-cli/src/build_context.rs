use anyhow::{Context, Result};
use weld_config::{self, CliOverrides, EnvConfig};
use weld_core::BuildContext;
use weld_platform::Platform;

use crate::Cli;

pub(crate) fn resolve(cli: &Cli, no_probes: bool) -> Result<BuildContext> {
    let platform = Platform::detect()?;

    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed resolving current directory")?,
    };

    let file = weld_config::load_file_config(cli.config.as_deref(), &project_dir)?;
    let env = EnvConfig::from_current_env();
    let overrides = CliOverrides {
        engine_home: cli.engine_home.clone(),
        support_home: cli.support_home.clone(),
        interp_home: cli.interp_home.clone(),
        include: (!cli.include.is_empty()).then(|| cli.include.clone()),
        lib: (!cli.lib.is_empty()).then(|| cli.lib.clone()),
        debug: cli.debug.then_some(true),
        make: cli.make.clone(),
        no_probes: no_probes.then_some(true),
    };

    let settings = weld_config::resolve_build_settings(&overrides, &env, file.as_ref(), platform);
    Ok(BuildContext::new(project_dir, settings, platform))
}
