use anyhow::{Context, Result};
use weld_core::{BuildContext, DoctorReport, execute_build, resolve_plan};
use weld_probes as probes;
use weld_toolchain::SystemRunner;

use crate::{Cli, Commands, build_context};

pub(crate) fn execute(cli: Cli) -> Result<()> {
    init_logging(cli.quiet, cli.verbose);

    let (force, no_probes) = match &cli.command {
        Some(Commands::Build { force, no_probes }) => (*force, *no_probes),
        _ => (false, false),
    };
    let ctx = build_context::resolve(&cli, no_probes)?;

    match cli.command {
        None | Some(Commands::Build { .. }) => build_command(&ctx, force),
        Some(Commands::Plan { json }) => plan_command(&ctx, json),
        Some(Commands::Probes) => probes_command(&ctx),
        Some(Commands::Doctor) => doctor_command(&ctx),
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn build_command(ctx: &BuildContext, force: bool) -> Result<()> {
    let report = execute_build(ctx, &SystemRunner, force)?;
    if let Some(outcome) = &report.probes {
        println!("{}", outcome.summary());
    }
    if report.up_to_date {
        println!("{} is up to date", report.artifact.display());
    } else {
        println!("built {}", report.artifact.display());
    }
    Ok(())
}

fn plan_command(ctx: &BuildContext, json: bool) -> Result<()> {
    let plan = resolve_plan(ctx);
    if json {
        let rendered =
            serde_json::to_string_pretty(&plan.render_json()).context("failed serializing plan")?;
        println!("{rendered}");
    } else {
        print!("{}", plan.render_text());
    }
    Ok(())
}

fn probes_command(ctx: &BuildContext) -> Result<()> {
    let outcome = probes::generate(
        &ctx.project_dir,
        &ctx.settings.probes,
        ctx.platform,
        &SystemRunner,
    )?;
    println!("{}", outcome.summary());
    Ok(())
}

fn doctor_command(ctx: &BuildContext) -> Result<()> {
    let report = DoctorReport::gather(ctx);
    print!("{}", report.render_text());
    Ok(())
}
