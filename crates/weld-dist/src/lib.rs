use log::{info, warn};
use std::path::{Path, PathBuf};
use weld_config::{EngineLayout, EngineSettings, InterpSettings, SupportSettings};
use weld_platform::{BuildMode, Os, Platform};

/// Filesystem lookups used while resolving dependency locations. Stubbed in
/// tests so resolution stays deterministic across hosts.
pub trait PathProbe {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
}

pub struct FsProbe;

impl PathProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDist {
    pub home: Option<PathBuf>,
    /// Whether the umbrella header was found under `<home>/include`.
    pub found: bool,
    pub include_dirs: Vec<PathBuf>,
    pub library_dir: Option<PathBuf>,
    pub libraries: Vec<String>,
}

impl EngineDist {
    pub fn resolve(settings: &EngineSettings, platform: Platform, mode: BuildMode) -> Self {
        Self::resolve_with(settings, platform, mode, &FsProbe)
    }

    pub fn resolve_with(
        settings: &EngineSettings,
        platform: Platform,
        mode: BuildMode,
        probe: &dyn PathProbe,
    ) -> Self {
        let Some(home) = settings.home.clone() else {
            warn!(
                "engine home is not set; compile and link paths will miss the engine distribution"
            );
            return Self {
                home: None,
                found: false,
                include_dirs: Vec::new(),
                library_dir: None,
                libraries: settings.libraries.clone(),
            };
        };

        let umbrella = home.join("include").join(&settings.umbrella_header);
        let found = probe.exists(&umbrella);
        if found {
            info!("found engine distribution at <{}>", home.display());
        } else {
            warn!(
                "engine home <{}> has no include/{}; continuing with the configured paths",
                home.display(),
                settings.umbrella_header
            );
        }

        let library_dir = library_dir_for(&home, settings.layout, platform, mode);

        Self {
            include_dirs: vec![home.clone(), home.join("include")],
            library_dir: Some(library_dir),
            libraries: settings.libraries.clone(),
            home: Some(home),
            found,
        }
    }
}

fn library_dir_for(home: &Path, layout: EngineLayout, platform: Platform, mode: BuildMode) -> PathBuf {
    match layout {
        EngineLayout::Gn => home
            .join("out.gn")
            .join(format!("{}.{}", platform.arch.label(), mode.label()))
            .join("obj"),
        EngineLayout::Msvc => home.join("build").join(mode.label()).join("lib"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportRuntime {
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    /// Decorated names for `-l` linking. Empty when the archives are linked
    /// statically, and on Windows where the toolchain auto-links them.
    pub link_libraries: Vec<String>,
    pub static_archives: Vec<PathBuf>,
}

impl SupportRuntime {
    pub fn resolve(settings: &SupportSettings, platform: Platform, mode: BuildMode) -> Self {
        Self::resolve_with(settings, platform, mode, &FsProbe)
    }

    pub fn resolve_with(
        settings: &SupportSettings,
        platform: Platform,
        mode: BuildMode,
        probe: &dyn PathProbe,
    ) -> Self {
        let names = decorated_names(settings, mode);

        match platform.os {
            Os::Windows => {
                let mut include_dirs = Vec::new();
                let mut library_dirs = Vec::new();
                if let Some(home) = &settings.home {
                    include_dirs.push(home.clone());
                    library_dirs.push(home.join("stage").join("lib"));
                    library_dirs.push(home.join("lib"));
                }
                Self {
                    include_dirs,
                    library_dirs,
                    link_libraries: Vec::new(),
                    static_archives: Vec::new(),
                }
            }
            Os::Linux | Os::FreeBsd => {
                let (include_dirs, primary_lib_dir) = match &settings.home {
                    Some(home) => (vec![home.clone()], home.join("stage").join("lib")),
                    None => (
                        vec![PathBuf::from("/usr/local/include")],
                        PathBuf::from("/usr/local/lib"),
                    ),
                };

                let (link_libraries, static_archives) = if settings.static_link {
                    let archives = names
                        .iter()
                        .map(|name| primary_lib_dir.join(format!("lib{name}.a")))
                        .collect();
                    (Vec::new(), archives)
                } else {
                    (names, Vec::new())
                };

                Self {
                    include_dirs,
                    library_dirs: vec![primary_lib_dir],
                    link_libraries,
                    static_archives,
                }
            }
            Os::MacOs => {
                let mut include_dirs = Vec::new();
                let mut library_dirs = Vec::new();
                match &settings.home {
                    Some(home) => {
                        include_dirs.push(home.clone());
                        library_dirs.push(home.join("stage").join("lib"));
                        library_dirs.push(home.join("lib"));
                    }
                    None => {
                        // MacPorts then Homebrew; only existing lib dirs count.
                        include_dirs.push(PathBuf::from("/opt/local/include"));
                        include_dirs.push(PathBuf::from("/usr/local/include"));
                        for dir in ["/opt/local/lib", "/usr/local/lib"] {
                            let dir = PathBuf::from(dir);
                            if probe.is_dir(&dir) {
                                library_dirs.push(dir);
                            }
                        }
                    }
                }
                Self {
                    include_dirs,
                    library_dirs,
                    link_libraries: names,
                    static_archives: Vec::new(),
                }
            }
        }
    }
}

/// Library names with the multithread and debug flavors applied, in that
/// order: `boost_python` becomes `boost_python-mt-d` with both set.
pub fn decorated_names(settings: &SupportSettings, mode: BuildMode) -> Vec<String> {
    settings
        .libraries
        .iter()
        .map(|name| {
            let mut decorated = name.clone();
            if settings.mt {
                decorated.push_str("-mt");
            }
            if mode.is_debug() {
                decorated.push_str("-d");
            }
            decorated
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
}

impl Interpreter {
    pub fn resolve(settings: &InterpSettings, platform: Platform) -> Self {
        let Some(home) = &settings.home else {
            return Self {
                include_dirs: Vec::new(),
                library_dirs: Vec::new(),
            };
        };

        if platform.os == Os::Windows {
            return Self {
                include_dirs: vec![home.join("include")],
                library_dirs: vec![home.join("libs")],
            };
        }

        let library_dirs = match &settings.version {
            Some(version) => vec![home.join("lib").join(format!("{}{version}", settings.name))],
            None => Vec::new(),
        };
        Self {
            include_dirs: vec![home.join("include")],
            library_dirs,
        }
    }
}
