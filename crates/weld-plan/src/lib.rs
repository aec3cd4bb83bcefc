use serde_json::{Value, json};
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use weld_config::BuildSettings;
use weld_dist::{EngineDist, Interpreter, SupportRuntime};
use weld_platform::{Arch, BuildMode, Os, Platform};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    pub name: String,
    pub value: Option<String>,
}

impl Define {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
        }
    }

    /// Parses a manifest entry of the form `NAME` or `NAME=VALUE`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('=') {
            Some((name, value)) => Self {
                name: name.to_string(),
                value: Some(value.to_string()),
            },
            None => Self {
                name: raw.to_string(),
                value: None,
            },
        }
    }
}

impl fmt::Display for Define {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The fully resolved inputs for compiling and linking the extension module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub platform: Platform,
    pub mode: BuildMode,
    pub module_name: String,
    pub artifact: String,
    pub sources: Vec<PathBuf>,
    pub defines: Vec<Define>,
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    pub libraries: Vec<String>,
    pub compile_args: Vec<String>,
    pub link_args: Vec<String>,
    pub extra_objects: Vec<PathBuf>,
}

pub fn assemble(
    settings: &BuildSettings,
    platform: Platform,
    mode: BuildMode,
    engine: &EngineDist,
    support: &SupportRuntime,
    interp: &Interpreter,
) -> BuildPlan {
    let mut defines: Vec<Define> = settings
        .module
        .defines
        .iter()
        .map(|raw| Define::parse(raw))
        .collect();

    // Search order: overrides go ahead of the discovered support and
    // interpreter dirs. The engine include dirs stay in front; its
    // library dir goes last.
    let mut include_dirs = engine.include_dirs.clone();
    include_dirs.extend(settings.include.iter().cloned());
    include_dirs.extend(support.include_dirs.iter().cloned());
    include_dirs.extend(interp.include_dirs.iter().cloned());

    let mut library_dirs: Vec<PathBuf> = settings.lib.clone();
    library_dirs.extend(support.library_dirs.iter().cloned());
    library_dirs.extend(interp.library_dirs.iter().cloned());
    library_dirs.extend(engine.library_dir.iter().cloned());

    let mut libraries = support.link_libraries.clone();
    let mut compile_args = Vec::new();
    let mut link_args = Vec::new();

    if platform.os.is_unix() {
        compile_args.push("-std=c++11".to_string());
        link_args.push("-std=c++11".to_string());
    }

    match platform.os {
        Os::Windows => {
            defines.push(Define::new(match platform.arch {
                Arch::X64 => "V8_TARGET_ARCH_X64",
                Arch::Ia32 => "V8_TARGET_ARCH_IA32",
                Arch::Arm => "V8_TARGET_ARCH_ARM64",
            }));
            defines.push(Define::new("WIN32"));
            if platform.arch == Arch::Ia32 {
                defines.push(Define::new("_USE_32BIT_TIME_T"));
            }

            libraries.push("winmm".to_string());
            libraries.push("ws2_32".to_string());

            if mode.is_debug() {
                compile_args.extend(strings(&["/Od", "/MTd", "/EHsc", "/Gy", "/Zi"]));
            } else {
                compile_args.extend(strings(&["/O2", "/GL", "/MT", "/EHsc", "/Gy", "/Zi"]));
            }

            link_args.extend(strings(&["/DLL", "/OPT:REF", "/OPT:ICF"]));
            link_args.push(
                match platform.arch {
                    Arch::X64 => "/MACHINE:X64",
                    Arch::Ia32 => "/MACHINE:X86",
                    Arch::Arm => "/MACHINE:ARM64",
                }
                .to_string(),
            );
            if mode.is_debug() {
                link_args.push("/DEBUG".to_string());
            }
        }
        Os::Linux | Os::FreeBsd => {
            compile_args.push("-Wno-write-strings".to_string());
            if mode.is_debug() {
                compile_args.extend(strings(&["-g", "-O0", "-fno-inline"]));
            } else {
                compile_args.extend(strings(&["-g", "-O3"]));
            }

            for archive in &support.static_archives {
                link_args.push(archive.display().to_string());
            }
            if platform.arch.is_64bit() {
                link_args.push("-fPIC".to_string());
            }

            if platform.os == Os::FreeBsd {
                libraries.push("execinfo".to_string());
            }
            libraries.push("rt".to_string());
        }
        Os::MacOs => {
            if mode.is_debug() {
                compile_args.extend(strings(&["-g", "-O0", "-fno-inline"]));
            } else {
                compile_args.extend(strings(&["-g", "-O3"]));
            }
            compile_args.extend(strings(&["-Wdeprecated-writable-strings", "-stdlib=libc++"]));

            let arch_flag = match platform.arch {
                Arch::X64 => "x86_64",
                Arch::Ia32 => "i386",
                Arch::Arm => "arm64",
            };
            compile_args.push("-arch".to_string());
            compile_args.push(arch_flag.to_string());

            if platform.arch.is_64bit() {
                link_args.push("-fPIC".to_string());
            }
            link_args.push("-arch".to_string());
            link_args.push(arch_flag.to_string());
        }
    }

    libraries.extend(engine.libraries.iter().cloned());
    libraries.extend(settings.module.libraries.iter().cloned());

    let artifact = settings.module.artifact.clone().unwrap_or_else(|| {
        let ext = if platform.os == Os::Windows { "dll" } else { "so" };
        format!("{}.{ext}", settings.module.name)
    });

    BuildPlan {
        platform,
        mode,
        module_name: settings.module.name.clone(),
        artifact,
        sources: settings.module.sources.clone(),
        defines,
        include_dirs,
        library_dirs,
        libraries,
        compile_args,
        link_args,
        extra_objects: Vec::new(),
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

impl BuildPlan {
    /// Line-oriented dump, one item per line. Empty sections are omitted.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "module        {}", self.module_name);
        let _ = writeln!(out, "artifact      {}", self.artifact);
        let _ = writeln!(
            out,
            "platform      {} {}",
            self.platform.os.name(),
            self.platform.arch.label()
        );
        let _ = writeln!(out, "mode          {}", self.mode.label());

        section(&mut out, "sources", self.sources.iter().map(display));
        section(&mut out, "defines", self.defines.iter().map(|d| d.to_string()));
        section(&mut out, "include dirs", self.include_dirs.iter().map(display));
        section(&mut out, "library dirs", self.library_dirs.iter().map(display));
        section(&mut out, "libraries", self.libraries.iter().cloned());
        section(&mut out, "compile args", self.compile_args.iter().cloned());
        section(&mut out, "link args", self.link_args.iter().cloned());
        section(&mut out, "extra objects", self.extra_objects.iter().map(display));
        out
    }

    pub fn render_json(&self) -> Value {
        json!({
            "module": self.module_name,
            "artifact": self.artifact,
            "platform": {
                "os": self.platform.os.name(),
                "arch": self.platform.arch.label(),
            },
            "mode": self.mode.label(),
            "sources": self.sources.iter().map(display).collect::<Vec<_>>(),
            "defines": self.defines.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "include_dirs": self.include_dirs.iter().map(display).collect::<Vec<_>>(),
            "library_dirs": self.library_dirs.iter().map(display).collect::<Vec<_>>(),
            "libraries": self.libraries,
            "compile_args": self.compile_args,
            "link_args": self.link_args,
            "extra_objects": self.extra_objects.iter().map(display).collect::<Vec<_>>(),
        })
    }
}

fn display(path: &PathBuf) -> String {
    path.display().to_string()
}

fn section(out: &mut String, title: &str, items: impl Iterator<Item = String>) {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}");
    for item in items {
        let _ = writeln!(out, "  {item}");
    }
}
