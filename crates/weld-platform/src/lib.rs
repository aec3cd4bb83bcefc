use std::env;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unsupported host platform: os={os} arch={arch} (supported: linux, freebsd, macos, windows)")]
    Unsupported { os: String, arch: String },
    #[error(
        "MSYS/MinGW shells are not supported (MSYSTEM={msystem}); build from a native Windows toolchain instead"
    )]
    MinGwShell { msystem: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    FreeBsd,
    MacOs,
    Windows,
}

impl Os {
    pub fn name(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::FreeBsd => "freebsd",
            Os::MacOs => "macos",
            Os::Windows => "windows",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "linux" => Some(Os::Linux),
            "freebsd" => Some(Os::FreeBsd),
            "macos" | "darwin" => Some(Os::MacOs),
            "windows" => Some(Os::Windows),
            _ => None,
        }
    }

    pub fn is_unix(self) -> bool {
        !matches!(self, Os::Windows)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    Ia32,
    Arm,
}

impl Arch {
    /// Label used in engine library paths, e.g. `out.gn/x64.release/obj`.
    pub fn label(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Ia32 => "ia32",
            Arch::Arm => "arm",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Some(Arch::X64),
            "ia32" | "x86" | "i686" => Some(Arch::Ia32),
            "arm" | "aarch64" | "arm64" => Some(Arch::Arm),
            _ => None,
        }
    }

    pub fn is_64bit(self) -> bool {
        matches!(self, Arch::X64)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Release,
    Debug,
}

impl BuildMode {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug { BuildMode::Debug } else { BuildMode::Release }
    }

    /// Label used in engine library paths, e.g. `build/release/lib`.
    pub fn label(self) -> &'static str {
        match self {
            BuildMode::Release => "release",
            BuildMode::Debug => "debug",
        }
    }

    pub fn is_debug(self) -> bool {
        matches!(self, BuildMode::Debug)
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    pub fn detect() -> Result<Self, PlatformError> {
        Self::from_host(env::consts::OS, env::consts::ARCH, env::var("MSYSTEM").ok())
    }

    fn from_host(os: &str, arch: &str, msystem: Option<String>) -> Result<Self, PlatformError> {
        let resolved_os = Os::parse(os).ok_or_else(|| PlatformError::Unsupported {
            os: os.to_string(),
            arch: arch.to_string(),
        })?;

        if resolved_os == Os::Windows {
            if let Some(msystem) = msystem {
                if msystem.starts_with("MINGW") || msystem.starts_with("MSYS") {
                    return Err(PlatformError::MinGwShell { msystem });
                }
            }
        }

        let resolved_arch = Arch::parse(arch).ok_or_else(|| PlatformError::Unsupported {
            os: os.to_string(),
            arch: arch.to_string(),
        })?;

        Ok(Self {
            os: resolved_os,
            arch: resolved_arch,
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.os, self.arch)
    }
}
