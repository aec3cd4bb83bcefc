use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use weld_platform::{Os, Platform};

pub const CONFIG_FILE_NAME: &str = "weld.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineLayout {
    /// GN-style distribution: libraries under `out.gn/<arch>.<mode>/obj`.
    Gn,
    /// MSVC-style distribution: libraries under `build/<mode>/lib`.
    Msvc,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ModuleSection {
    pub name: Option<String>,
    pub artifact: Option<String>,
    pub sources: Option<Vec<String>>,
    pub defines: Option<Vec<String>>,
    pub libraries: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    pub home: Option<String>,
    pub umbrella_header: Option<String>,
    pub layout: Option<EngineLayout>,
    pub libraries: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SupportSection {
    pub home: Option<String>,
    pub libraries: Option<Vec<String>>,
    pub mt: Option<bool>,
    pub static_link: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct InterpSection {
    pub home: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProbesSection {
    pub enabled: Option<bool>,
    pub source: Option<String>,
    pub header: Option<String>,
    pub object: Option<String>,
    pub config_header: Option<String>,
    pub feature_macro: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub module: Option<ModuleSection>,
    pub engine: Option<EngineSection>,
    pub support: Option<SupportSection>,
    pub interp: Option<InterpSection>,
    pub probes: Option<ProbesSection>,
    pub include: Option<Vec<String>>,
    pub lib: Option<Vec<String>>,
    pub debug: Option<bool>,
    pub make: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvConfig {
    pub engine_home: Option<PathBuf>,
    pub support_home: Option<PathBuf>,
    pub support_mt: Option<bool>,
    pub interp_home: Option<PathBuf>,
    pub include: Option<Vec<PathBuf>>,
    pub lib: Option<Vec<PathBuf>>,
    pub debug: Option<bool>,
    pub make: Option<String>,
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self {
            engine_home: env::var("ENGINE_HOME").ok().map(PathBuf::from),
            support_home: env::var("SUPPORT_HOME").ok().map(PathBuf::from),
            support_mt: env::var("SUPPORT_MT").ok().and_then(|v| parse_bool(&v)),
            interp_home: env::var("INTERP_HOME").ok().map(PathBuf::from),
            include: env::var("INCLUDE").ok().map(|v| split_path_list(&v)),
            lib: env::var("LIB").ok().map(|v| split_path_list(&v)),
            debug: env::var("DEBUG").ok().and_then(|v| parse_bool(&v)),
            make: env::var("MAKE").ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    pub engine_home: Option<PathBuf>,
    pub support_home: Option<PathBuf>,
    pub interp_home: Option<PathBuf>,
    pub include: Option<Vec<PathBuf>>,
    pub lib: Option<Vec<PathBuf>>,
    pub debug: Option<bool>,
    pub make: Option<String>,
    pub no_probes: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSettings {
    pub name: String,
    pub artifact: Option<String>,
    pub sources: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub libraries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub home: Option<PathBuf>,
    pub umbrella_header: String,
    pub layout: EngineLayout,
    pub libraries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportSettings {
    pub home: Option<PathBuf>,
    pub libraries: Vec<String>,
    pub mt: bool,
    pub static_link: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpSettings {
    pub home: Option<PathBuf>,
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub enabled: bool,
    pub source: PathBuf,
    pub header: PathBuf,
    pub object: PathBuf,
    pub config_header: PathBuf,
    pub feature_macro: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub module: ModuleSettings,
    pub engine: EngineSettings,
    pub support: SupportSettings,
    pub interp: InterpSettings,
    pub probes: ProbeSettings,
    pub include: Vec<PathBuf>,
    pub lib: Vec<PathBuf>,
    pub debug: bool,
    pub make: String,
}

const DEFAULT_BRIDGE_SOURCES: &[&str] = &[
    "src/Utils.cpp",
    "src/Exception.cpp",
    "src/Context.cpp",
    "src/Engine.cpp",
    "src/Wrapper.cpp",
    "src/Debug.cpp",
    "src/Locker.cpp",
    "src/AST.cpp",
    "src/PrettyPrinter.cpp",
    "src/Bridge.cpp",
];

const DEFAULT_SUPPORT_LIBRARIES: &[&str] = &["boost_python", "boost_thread", "boost_system"];

impl BuildSettings {
    pub fn defaults(platform: Platform) -> Self {
        Self {
            module: ModuleSettings {
                name: "_bridge".to_string(),
                artifact: None,
                sources: DEFAULT_BRIDGE_SOURCES.iter().map(PathBuf::from).collect(),
                defines: vec!["BOOST_PYTHON_STATIC_LIB".to_string()],
                libraries: Vec::new(),
            },
            engine: EngineSettings {
                home: None,
                umbrella_header: "v8.h".to_string(),
                layout: if platform.os == Os::Windows {
                    EngineLayout::Msvc
                } else {
                    EngineLayout::Gn
                },
                libraries: Vec::new(),
            },
            support: SupportSettings {
                home: None,
                libraries: DEFAULT_SUPPORT_LIBRARIES
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                mt: platform.os == Os::MacOs,
                static_link: false,
            },
            interp: InterpSettings {
                home: None,
                name: "python".to_string(),
                version: None,
            },
            probes: ProbeSettings {
                enabled: true,
                source: PathBuf::from("src/probes.d"),
                header: PathBuf::from("src/probes.h"),
                object: PathBuf::from("build/probes.o"),
                config_header: PathBuf::from("src/Config.h"),
                feature_macro: "SUPPORT_PROBES".to_string(),
            },
            include: Vec::new(),
            lib: Vec::new(),
            debug: false,
            make: if platform.os == Os::FreeBsd {
                "gmake".to_string()
            } else {
                "make".to_string()
            },
        }
    }
}

pub fn load_file_config(explicit_path: Option<&Path>, project_dir: &Path) -> Result<Option<FileConfig>> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = project_dir.join(CONFIG_FILE_NAME);
            if !candidate.exists() {
                return Ok(None);
            }
            candidate
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

pub fn resolve_build_settings(
    cli: &CliOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
    platform: Platform,
) -> BuildSettings {
    let base = BuildSettings::defaults(platform);

    let file_module = file_cfg.and_then(|c| c.module.as_ref());
    let file_engine = file_cfg.and_then(|c| c.engine.as_ref());
    let file_support = file_cfg.and_then(|c| c.support.as_ref());
    let file_interp = file_cfg.and_then(|c| c.interp.as_ref());
    let file_probes = file_cfg.and_then(|c| c.probes.as_ref());

    let module = ModuleSettings {
        name: file_module
            .and_then(|m| m.name.clone())
            .unwrap_or(base.module.name),
        artifact: file_module.and_then(|m| m.artifact.clone()),
        sources: file_module
            .and_then(|m| m.sources.clone())
            .map(|sources| sources.into_iter().map(PathBuf::from).collect())
            .unwrap_or(base.module.sources),
        defines: file_module
            .and_then(|m| m.defines.clone())
            .unwrap_or(base.module.defines),
        libraries: file_module
            .and_then(|m| m.libraries.clone())
            .unwrap_or(base.module.libraries),
    };

    let engine = EngineSettings {
        home: cli
            .engine_home
            .clone()
            .or_else(|| env_cfg.engine_home.clone())
            .or_else(|| file_engine.and_then(|e| e.home.clone()).map(PathBuf::from)),
        umbrella_header: file_engine
            .and_then(|e| e.umbrella_header.clone())
            .unwrap_or(base.engine.umbrella_header),
        layout: file_engine
            .and_then(|e| e.layout)
            .unwrap_or(base.engine.layout),
        libraries: file_engine
            .and_then(|e| e.libraries.clone())
            .unwrap_or(base.engine.libraries),
    };

    let support = SupportSettings {
        home: cli
            .support_home
            .clone()
            .or_else(|| env_cfg.support_home.clone())
            .or_else(|| file_support.and_then(|s| s.home.clone()).map(PathBuf::from)),
        libraries: file_support
            .and_then(|s| s.libraries.clone())
            .unwrap_or(base.support.libraries),
        mt: env_cfg
            .support_mt
            .or(file_support.and_then(|s| s.mt))
            .unwrap_or(base.support.mt),
        static_link: file_support
            .and_then(|s| s.static_link)
            .unwrap_or(base.support.static_link),
    };

    let interp = InterpSettings {
        home: cli
            .interp_home
            .clone()
            .or_else(|| env_cfg.interp_home.clone())
            .or_else(|| file_interp.and_then(|i| i.home.clone()).map(PathBuf::from)),
        name: file_interp
            .and_then(|i| i.name.clone())
            .unwrap_or(base.interp.name),
        version: file_interp.and_then(|i| i.version.clone()),
    };

    let probes_enabled_from_layers = file_probes
        .and_then(|p| p.enabled)
        .unwrap_or(base.probes.enabled);
    let probes = ProbeSettings {
        enabled: if cli.no_probes == Some(true) {
            false
        } else {
            probes_enabled_from_layers
        },
        source: file_probes
            .and_then(|p| p.source.clone())
            .map(PathBuf::from)
            .unwrap_or(base.probes.source),
        header: file_probes
            .and_then(|p| p.header.clone())
            .map(PathBuf::from)
            .unwrap_or(base.probes.header),
        object: file_probes
            .and_then(|p| p.object.clone())
            .map(PathBuf::from)
            .unwrap_or(base.probes.object),
        config_header: file_probes
            .and_then(|p| p.config_header.clone())
            .map(PathBuf::from)
            .unwrap_or(base.probes.config_header),
        feature_macro: file_probes
            .and_then(|p| p.feature_macro.clone())
            .unwrap_or(base.probes.feature_macro),
    };

    let include = cli
        .include
        .clone()
        .or_else(|| env_cfg.include.clone())
        .or_else(|| {
            file_cfg
                .and_then(|c| c.include.clone())
                .map(|paths| paths.into_iter().map(PathBuf::from).collect())
        })
        .unwrap_or(base.include);

    let lib = cli
        .lib
        .clone()
        .or_else(|| env_cfg.lib.clone())
        .or_else(|| {
            file_cfg
                .and_then(|c| c.lib.clone())
                .map(|paths| paths.into_iter().map(PathBuf::from).collect())
        })
        .unwrap_or(base.lib);

    let debug = cli
        .debug
        .or(env_cfg.debug)
        .or(file_cfg.and_then(|c| c.debug))
        .unwrap_or(base.debug);

    let make = cli
        .make
        .clone()
        .or_else(|| env_cfg.make.clone())
        .or_else(|| file_cfg.and_then(|c| c.make.clone()))
        .unwrap_or(base.make);

    BuildSettings {
        module,
        engine,
        support,
        interp,
        probes,
        include,
        lib,
        debug,
        make,
    }
}

/// Split an `INCLUDE`/`LIB`-style list on the platform path separator,
/// dropping empty segments.
pub fn split_path_list(raw: &str) -> Vec<PathBuf> {
    env::split_paths(raw)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
