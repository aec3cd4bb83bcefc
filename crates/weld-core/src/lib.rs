use anyhow::{Context, Result};
use log::{info, warn};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use weld_config::BuildSettings;
use weld_dist::{EngineDist, Interpreter, SupportRuntime};
use weld_plan::BuildPlan;
use weld_platform::{BuildMode, Platform};
use weld_probes::ProbeOutcome;
use weld_toolchain::{CommandRunner, CxxToolchain, object_path, tool_available};

pub const FINGERPRINT_FILE: &str = "weld.fingerprint";

pub struct BuildContext {
    pub project_dir: PathBuf,
    pub settings: BuildSettings,
    pub platform: Platform,
    pub mode: BuildMode,
}

impl BuildContext {
    pub fn new(project_dir: PathBuf, settings: BuildSettings, platform: Platform) -> Self {
        let mode = BuildMode::from_debug_flag(settings.debug);
        Self {
            project_dir,
            settings,
            platform,
            mode,
        }
    }

    pub fn build_dir(&self) -> PathBuf {
        self.project_dir.join("build")
    }
}

pub fn resolve_plan(ctx: &BuildContext) -> BuildPlan {
    let engine = EngineDist::resolve(&ctx.settings.engine, ctx.platform, ctx.mode);
    let support = SupportRuntime::resolve(&ctx.settings.support, ctx.platform, ctx.mode);
    let interp = Interpreter::resolve(&ctx.settings.interp, ctx.platform);
    weld_plan::assemble(&ctx.settings, ctx.platform, ctx.mode, &engine, &support, &interp)
}

#[derive(Debug)]
pub struct BuildReport {
    pub artifact: PathBuf,
    pub probes: Option<ProbeOutcome>,
    pub up_to_date: bool,
}

pub fn execute_build(
    ctx: &BuildContext,
    runner: &dyn CommandRunner,
    force: bool,
) -> Result<BuildReport> {
    let mut plan = resolve_plan(ctx);

    let probes = if ctx.settings.probes.enabled {
        let outcome =
            weld_probes::generate(&ctx.project_dir, &ctx.settings.probes, ctx.platform, runner)?;
        if let ProbeOutcome::Generated {
            object: Some(object),
        } = &outcome
        {
            plan.extra_objects.push(object.clone());
        }
        Some(outcome)
    } else {
        info!("probe generation is disabled");
        None
    };

    let build_dir = ctx.build_dir();
    if let Err(err) = fs::create_dir_all(&build_dir) {
        warn!("failed creating the build folder {}: {err}", build_dir.display());
    }
    let artifact = build_dir.join(&plan.artifact);

    let fingerprint = compute_fingerprint(&ctx.project_dir, &plan)?;
    let fingerprint_path = build_dir.join(FINGERPRINT_FILE);
    if !force
        && artifact.exists()
        && stored_fingerprint(&fingerprint_path).as_deref() == Some(fingerprint.as_str())
    {
        info!("{} is up to date", artifact.display());
        return Ok(BuildReport {
            artifact,
            probes,
            up_to_date: true,
        });
    }

    let toolchain = CxxToolchain::discover(ctx.platform)?;
    info!("using C++ compiler {}", toolchain.compiler_path().display());

    let mut objects = Vec::with_capacity(plan.sources.len() + plan.extra_objects.len());
    for source in &plan.sources {
        // Name the object from the manifest path, not the joined absolute one.
        let object = object_path(&build_dir, source, toolchain.is_msvc())?;
        let source_path = ctx.project_dir.join(source);
        toolchain.compile_object(runner, &plan, &source_path, &object)?;
        objects.push(object);
    }
    objects.extend(plan.extra_objects.iter().cloned());

    toolchain.link_module(runner, &plan, &objects, &artifact)?;

    if let Err(err) = fs::write(&fingerprint_path, &fingerprint) {
        warn!("failed writing {}: {err}", fingerprint_path.display());
    }
    info!("built {}", artifact.display());

    Ok(BuildReport {
        artifact,
        probes,
        up_to_date: false,
    })
}

/// Hash of the rendered plan plus every source file's bytes. An unchanged
/// fingerprint with an existing artifact means the whole compile/link can be
/// skipped.
fn compute_fingerprint(project_dir: &Path, plan: &BuildPlan) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(plan.render_text().as_bytes());
    for source in &plan.sources {
        let path = project_dir.join(source);
        let bytes = fs::read(&path)
            .with_context(|| format!("failed reading source {}", path.display()))?;
        hasher.update(b"\n--source--\n");
        hasher.update(source.display().to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(&bytes);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn stored_fingerprint(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorReport {
    pub platform: Platform,
    pub mode: BuildMode,
    pub engine_home: Option<PathBuf>,
    pub engine_found: bool,
    pub support_library_dirs: Vec<PathBuf>,
    pub interp_home: Option<PathBuf>,
    pub compiler: Option<PathBuf>,
    pub make: ToolStatus,
    pub trace_tool: ToolStatus,
}

impl DoctorReport {
    pub fn gather(ctx: &BuildContext) -> Self {
        let engine = EngineDist::resolve(&ctx.settings.engine, ctx.platform, ctx.mode);
        let support = SupportRuntime::resolve(&ctx.settings.support, ctx.platform, ctx.mode);
        let compiler = CxxToolchain::discover(ctx.platform)
            .map(|toolchain| toolchain.compiler_path().to_path_buf())
            .ok();

        Self {
            platform: ctx.platform,
            mode: ctx.mode,
            engine_home: engine.home,
            engine_found: engine.found,
            support_library_dirs: support.library_dirs,
            interp_home: ctx.settings.interp.home.clone(),
            compiler,
            make: probe_tool(&ctx.settings.make),
            trace_tool: probe_tool("dtrace"),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "platform      {} {}",
            self.platform.os.name(),
            self.platform.arch.label()
        );
        let _ = writeln!(out, "mode          {}", self.mode.label());

        match (&self.engine_home, self.engine_found) {
            (Some(home), true) => {
                let _ = writeln!(out, "engine        {} (umbrella header found)", home.display());
            }
            (Some(home), false) => {
                let _ = writeln!(
                    out,
                    "engine        {} (umbrella header missing)",
                    home.display()
                );
            }
            (None, _) => {
                let _ = writeln!(out, "engine        (home not set)");
            }
        }

        if self.support_library_dirs.is_empty() {
            let _ = writeln!(out, "support lib   (none resolved)");
        } else {
            for dir in &self.support_library_dirs {
                let _ = writeln!(out, "support lib   {}", dir.display());
            }
        }

        match &self.interp_home {
            Some(home) => {
                let _ = writeln!(out, "interpreter   {}", home.display());
            }
            None => {
                let _ = writeln!(out, "interpreter   (home not set)");
            }
        }

        match &self.compiler {
            Some(path) => {
                let _ = writeln!(out, "compiler      {}", path.display());
            }
            None => {
                let _ = writeln!(out, "compiler      (not found)");
            }
        }

        let _ = writeln!(out, "make          {} ({})", self.make.name, availability(&self.make));
        let _ = writeln!(
            out,
            "trace tool    {} ({})",
            self.trace_tool.name,
            availability(&self.trace_tool)
        );
        out
    }
}

fn availability(status: &ToolStatus) -> &'static str {
    if status.available { "available" } else { "not found" }
}

fn probe_tool(name: &str) -> ToolStatus {
    ToolStatus {
        name: name.to_string(),
        available: tool_available(name),
    }
}
