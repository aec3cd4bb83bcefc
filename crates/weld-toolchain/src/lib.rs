use anyhow::{Context, Result, anyhow};
use log::{debug, error, info};
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use weld_plan::BuildPlan;
use weld_platform::{Arch, Os, Platform};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no usable C++ compiler: {reason}")]
    CompilerUnavailable { reason: String },
    #[error("{program} failed ({status}) while {step}: {details}")]
    StepFailed {
        program: String,
        status: String,
        step: String,
        details: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external tools and captures their output. The process-level failure
/// (could not spawn) is an error; a nonzero exit is data the caller judges.
pub trait CommandRunner {
    fn run(&self, command: &mut Command, step: &str) -> Result<CommandOutcome>;
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &mut Command, step: &str) -> Result<CommandOutcome> {
        info!("{step} ...");
        debug!("> {}", render_command(command));

        let output = command.output().with_context(|| {
            format!(
                "failed to execute '{}'",
                command.get_program().to_string_lossy()
            )
        })?;

        let outcome = CommandOutcome {
            success: output.status.success(),
            status: status_label(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !outcome.success {
            error!("{step} failed: {}", outcome.status);
            debug!("{}", outcome.stderr);
        }

        Ok(outcome)
    }
}

pub fn render_command(command: &Command) -> String {
    let mut rendered = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

fn status_label(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

pub fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// The Rust target triple matching a detected platform; drives compiler
/// discovery through the `cc` crate.
pub fn rust_target(platform: Platform) -> &'static str {
    match (platform.os, platform.arch) {
        (Os::Linux, Arch::X64) => "x86_64-unknown-linux-gnu",
        (Os::Linux, Arch::Ia32) => "i686-unknown-linux-gnu",
        (Os::Linux, Arch::Arm) => "aarch64-unknown-linux-gnu",
        (Os::FreeBsd, Arch::X64) => "x86_64-unknown-freebsd",
        (Os::FreeBsd, Arch::Ia32) => "i686-unknown-freebsd",
        (Os::FreeBsd, Arch::Arm) => "aarch64-unknown-freebsd",
        (Os::MacOs, Arch::X64) => "x86_64-apple-darwin",
        (Os::MacOs, Arch::Ia32) => "i686-apple-darwin",
        (Os::MacOs, Arch::Arm) => "aarch64-apple-darwin",
        (Os::Windows, Arch::X64) => "x86_64-pc-windows-msvc",
        (Os::Windows, Arch::Ia32) => "i686-pc-windows-msvc",
        (Os::Windows, Arch::Arm) => "aarch64-pc-windows-msvc",
    }
}

pub struct CxxToolchain {
    tool: cc::Tool,
    platform: Platform,
}

impl CxxToolchain {
    /// Locates the host C++ compiler. Optimization, debug info, and warning
    /// flags all come from the build plan, so the discovery config stays
    /// neutral.
    pub fn discover(platform: Platform) -> Result<Self, ToolError> {
        let target = rust_target(platform);
        let mut build = cc::Build::new();
        build
            .cpp(true)
            .cargo_metadata(false)
            .warnings(false)
            .debug(false)
            .opt_level(0)
            .target(target)
            .host(target);

        let tool = build
            .try_get_compiler()
            .map_err(|err| ToolError::CompilerUnavailable {
                reason: err.to_string(),
            })?;

        Ok(Self { tool, platform })
    }

    pub fn compiler_path(&self) -> &Path {
        self.tool.path()
    }

    pub fn is_msvc(&self) -> bool {
        self.tool.is_like_msvc()
    }

    pub fn compile_command(&self, plan: &BuildPlan, source: &Path, object: &Path) -> Command {
        let mut command = if self.is_msvc() {
            let mut command = Command::new(self.tool.path());
            command.arg("/nologo");
            command
        } else {
            self.tool.to_command()
        };
        command.args(compile_args(plan, self.is_msvc(), source, object));
        command
    }

    pub fn link_command(&self, plan: &BuildPlan, objects: &[PathBuf], artifact: &Path) -> Command {
        let mut command = Command::new(self.tool.path());
        if self.is_msvc() {
            command.arg("/nologo");
        }
        command.args(link_args(plan, self.is_msvc(), objects, artifact));
        command
    }

    pub fn compile_object(
        &self,
        runner: &dyn CommandRunner,
        plan: &BuildPlan,
        source: &Path,
        object: &Path,
    ) -> Result<()> {
        if let Some(parent) = object.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let step = format!("compiling {}", source.display());
        let outcome = runner.run(&mut self.compile_command(plan, source, object), &step)?;
        if !outcome.success {
            return Err(self.step_failed(step, outcome).into());
        }
        Ok(())
    }

    pub fn link_module(
        &self,
        runner: &dyn CommandRunner,
        plan: &BuildPlan,
        objects: &[PathBuf],
        artifact: &Path,
    ) -> Result<()> {
        let step = format!("linking {}", artifact.display());
        let outcome = runner.run(&mut self.link_command(plan, objects, artifact), &step)?;
        if !outcome.success {
            return Err(self.step_failed(step, outcome).into());
        }
        Ok(())
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    fn step_failed(&self, step: String, outcome: CommandOutcome) -> ToolError {
        // MSVC reports diagnostics on stdout.
        let details = if outcome.stderr.trim().is_empty() {
            &outcome.stdout
        } else {
            &outcome.stderr
        };
        ToolError::StepFailed {
            program: self.tool.path().display().to_string(),
            status: outcome.status,
            step,
            details: output_tail(details),
        }
    }
}

/// Object files mirror the source tree under the build dir, so sources that
/// differ only by folder keep distinct objects. Root and `..` components are
/// dropped to keep every object inside the build dir.
pub fn object_path(build_dir: &Path, source: &Path, msvc: bool) -> Result<PathBuf> {
    let mut object = build_dir.to_path_buf();
    let mut named = false;
    for component in source.components() {
        if let Component::Normal(part) = component {
            object.push(part);
            named = true;
        }
    }
    if !named {
        return Err(anyhow!("source file {} has no usable name", source.display()));
    }
    object.set_extension(if msvc { "obj" } else { "o" });
    Ok(object)
}

fn compile_args(plan: &BuildPlan, msvc: bool, source: &Path, object: &Path) -> Vec<OsString> {
    let mut args = Vec::new();
    let define_flag = if msvc { "/D" } else { "-D" };
    for define in &plan.defines {
        args.push(OsString::from(format!("{define_flag}{define}")));
    }
    for dir in &plan.include_dirs {
        if msvc {
            args.push(OsString::from(format!("/I{}", dir.display())));
        } else {
            args.push(OsString::from("-I"));
            args.push(dir.as_os_str().to_os_string());
        }
    }
    args.extend(plan.compile_args.iter().map(|arg| OsString::from(arg.as_str())));
    if msvc {
        args.push(OsString::from("/c"));
        args.push(source.as_os_str().to_os_string());
        args.push(OsString::from(format!("/Fo{}", object.display())));
    } else {
        args.push(OsString::from("-c"));
        args.push(source.as_os_str().to_os_string());
        args.push(OsString::from("-o"));
        args.push(object.as_os_str().to_os_string());
    }
    args
}

fn link_args(plan: &BuildPlan, msvc: bool, objects: &[PathBuf], artifact: &Path) -> Vec<OsString> {
    let mut args = Vec::new();
    if msvc {
        for object in objects {
            args.push(object.as_os_str().to_os_string());
        }
        args.push(OsString::from("/link"));
        args.extend(plan.link_args.iter().map(|arg| OsString::from(arg.as_str())));
        args.push(OsString::from(format!("/OUT:{}", artifact.display())));
        for dir in &plan.library_dirs {
            args.push(OsString::from(format!("/LIBPATH:{}", dir.display())));
        }
        for lib in &plan.libraries {
            args.push(OsString::from(format!("{lib}.lib")));
        }
    } else {
        if plan.platform.os == Os::MacOs {
            args.extend(
                ["-bundle", "-undefined", "dynamic_lookup"]
                    .into_iter()
                    .map(OsString::from),
            );
        } else {
            args.push(OsString::from("-shared"));
        }
        for object in objects {
            args.push(object.as_os_str().to_os_string());
        }
        for dir in &plan.library_dirs {
            args.push(OsString::from("-L"));
            args.push(dir.as_os_str().to_os_string());
        }
        for lib in &plan.libraries {
            args.push(OsString::from(format!("-l{lib}")));
        }
        args.extend(plan.link_args.iter().map(|arg| OsString::from(arg.as_str())));
        args.push(OsString::from("-o"));
        args.push(artifact.as_os_str().to_os_string());
    }
    args
}

fn output_tail(text: &str) -> String {
    const MAX_LINES: usize = 12;
    let lines: Vec<&str> = text.trim_end().lines().collect();
    if lines.len() <= MAX_LINES {
        return lines.join("\n");
    }
    let skipped = lines.len() - MAX_LINES;
    let mut tail = format!("... {skipped} lines skipped ...\n");
    tail.push_str(&lines[skipped..].join("\n"));
    tail
}
