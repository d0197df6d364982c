//! Operating system and CPU qualifiers for implementations.
//!
//! An [`Architecture`] is an `(Os, Cpu)` pair. Both halves have a wildcard
//! (`*`) that matches anything, and [`Cpu::Source`] marks an implementation
//! that must be built rather than executed. Names this build does not know
//! are kept as [`Os::Other`] / [`Cpu::Other`] and never match anything.
//!
//! # Example
//!
//! ```
//! use depot_schema::{Architecture, Cpu, Os};
//!
//! let target: Architecture = "Linux-x86_64".parse().unwrap();
//! let candidate = Architecture::new(Os::Posix, Cpu::I686);
//! assert!(candidate.is_compatible(&target));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// Operating system an implementation can run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Os {
    /// Wildcard: any operating system.
    #[default]
    All,
    /// Any POSIX-like system.
    Posix,
    /// Linux.
    Linux,
    /// Solaris.
    Solaris,
    /// FreeBSD.
    FreeBsd,
    /// Darwin without the macOS userland.
    Darwin,
    /// macOS.
    MacOsX,
    /// Cygwin on Windows.
    Cygwin,
    /// Native Windows.
    Windows,
    /// A name this build does not recognise.
    Other(String),
}

impl Os {
    /// Operating system of the running host.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOsX
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "freebsd") {
            Self::FreeBsd
        } else if cfg!(target_os = "solaris") {
            Self::Solaris
        } else {
            Self::All
        }
    }

    /// Canonical name used in feeds and on the command line.
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "*",
            Self::Posix => "POSIX",
            Self::Linux => "Linux",
            Self::Solaris => "Solaris",
            Self::FreeBsd => "FreeBSD",
            Self::Darwin => "Darwin",
            Self::MacOsX => "MacOSX",
            Self::Cygwin => "Cygwin",
            Self::Windows => "Windows",
            Self::Other(name) => name.as_str(),
        }
    }

    /// Whether a binary built for `self` can run on `target`.
    pub fn runs_on(&self, target: &Os) -> bool {
        match (self, target) {
            (Self::Other(_), _) | (_, Self::Other(_)) => false,
            (Self::All, _) | (_, Self::All) => true,
            (a, b) if a == b => true,
            (
                Self::Posix,
                Self::Linux | Self::Solaris | Self::FreeBsd | Self::Darwin | Self::MacOsX | Self::Cygwin,
            )
            | (Self::Darwin, Self::MacOsX)
            | (Self::Windows, Self::Cygwin) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "*" | "" | "all" => Ok(Self::All),
            "posix" => Ok(Self::Posix),
            "linux" => Ok(Self::Linux),
            "solaris" | "sunos" => Ok(Self::Solaris),
            "freebsd" => Ok(Self::FreeBsd),
            "darwin" => Ok(Self::Darwin),
            "macosx" | "macos" => Ok(Self::MacOsX),
            "cygwin" => Ok(Self::Cygwin),
            "windows" => Ok(Self::Windows),
            _ => Ok(Self::Other(s.to_string())),
        }
    }
}

/// Processor family an implementation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Cpu {
    /// Wildcard: any processor.
    #[default]
    All,
    /// Intel 80386.
    I386,
    /// Intel 80486.
    I486,
    /// Pentium.
    I586,
    /// Pentium Pro and later 32-bit x86.
    I686,
    /// 64-bit x86.
    X86_64,
    /// 32-bit `PowerPC`.
    Ppc,
    /// 64-bit `PowerPC`.
    Ppc64,
    /// `ARMv6` little endian.
    Armv6l,
    /// `ARMv7` little endian.
    Armv7l,
    /// 64-bit ARM.
    Aarch64,
    /// Source code: must be built, never executed directly.
    Source,
    /// A name this build does not recognise.
    Other(String),
}

impl Cpu {
    /// Processor of the running host.
    pub fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Self::X86_64
        } else if cfg!(target_arch = "x86") {
            Self::I686
        } else if cfg!(target_arch = "aarch64") {
            Self::Aarch64
        } else if cfg!(target_arch = "arm") {
            Self::Armv7l
        } else if cfg!(target_arch = "powerpc64") {
            Self::Ppc64
        } else if cfg!(target_arch = "powerpc") {
            Self::Ppc
        } else {
            Self::All
        }
    }

    /// Canonical name used in feeds and on the command line.
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "*",
            Self::I386 => "i386",
            Self::I486 => "i486",
            Self::I586 => "i586",
            Self::I686 => "i686",
            Self::X86_64 => "x86_64",
            Self::Ppc => "ppc",
            Self::Ppc64 => "ppc64",
            Self::Armv6l => "armv6l",
            Self::Armv7l => "armv7l",
            Self::Aarch64 => "aarch64",
            Self::Source => "src",
            Self::Other(name) => name.as_str(),
        }
    }

    fn x86_level(&self) -> Option<u8> {
        match self {
            Self::I386 => Some(0),
            Self::I486 => Some(1),
            Self::I586 => Some(2),
            Self::I686 => Some(3),
            Self::X86_64 => Some(4),
            _ => None,
        }
    }

    /// Whether code built for `self` can be used on `target`.
    ///
    /// Source implementations only satisfy a `src` or wildcard target, and a
    /// `src` target only accepts source implementations.
    pub fn runs_on(&self, target: &Cpu) -> bool {
        match (self, target) {
            (Self::Other(_), _) | (_, Self::Other(_)) => false,
            (Self::Source, t) => matches!(t, Self::Source | Self::All),
            (_, Self::Source) => false,
            (Self::All, _) | (_, Self::All) => true,
            (a, b) if a == b => true,
            (a, b) => match (a.x86_level(), b.x86_level()) {
                (Some(x), Some(y)) => x <= y,
                _ => matches!((a, b), (Self::Ppc, Self::Ppc64) | (Self::Armv6l, Self::Armv7l)),
            },
        }
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cpu {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "*" | "" | "all" => Ok(Self::All),
            "i386" => Ok(Self::I386),
            "i486" => Ok(Self::I486),
            "i586" => Ok(Self::I586),
            "i686" | "x86" => Ok(Self::I686),
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "ppc" | "powerpc" => Ok(Self::Ppc),
            "ppc64" => Ok(Self::Ppc64),
            "armv6l" => Ok(Self::Armv6l),
            "armv7l" | "arm" => Ok(Self::Armv7l),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "src" | "source" => Ok(Self::Source),
            _ => Ok(Self::Other(s.to_string())),
        }
    }
}

/// An `(Os, Cpu)` pair, written `Os-Cpu` (e.g. `Linux-x86_64`, `*-src`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Architecture {
    /// Operating system half.
    pub os: Os,
    /// Processor half.
    pub cpu: Cpu,
}

impl Architecture {
    /// Build an architecture from its halves.
    pub fn new(os: Os, cpu: Cpu) -> Self {
        Self { os, cpu }
    }

    /// Architecture of the running host.
    pub fn current() -> Self {
        Self::new(Os::current(), Cpu::current())
    }

    /// Whether an implementation with this architecture satisfies `target`.
    pub fn is_compatible(&self, target: &Architecture) -> bool {
        self.os.runs_on(&target.os) && self.cpu.runs_on(&target.cpu)
    }

    /// How specifically this architecture matches `target`: one point for
    /// each half that names exactly the target's value rather than a
    /// wildcard or family member.
    pub fn match_rank(&self, target: &Architecture) -> u8 {
        u8::from(self.os != Os::All && self.os == target.os)
            + u8::from(self.cpu != Cpu::All && self.cpu == target.cpu)
    }

    /// Whether either half is a name this build does not recognise.
    pub fn is_unknown(&self) -> bool {
        matches!(self.os, Os::Other(_)) || matches!(self.cpu, Cpu::Other(_))
    }

    /// Whether this names source code rather than a binary.
    pub fn is_source(&self) -> bool {
        self.cpu == Cpu::Source
    }

    /// Target used for dependencies: a source build still needs its
    /// dependencies as binaries, so `src` widens to any CPU.
    pub fn for_dependencies(&self) -> Self {
        if self.is_source() {
            Self::new(self.os.clone(), Cpu::All)
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.cpu)
    }
}

impl FromStr for Architecture {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os, cpu) = s
            .split_once('-')
            .ok_or_else(|| SchemaError::InvalidArchitecture(s.to_string()))?;
        Ok(Self::new(os.parse()?, cpu.parse()?))
    }
}

impl TryFrom<String> for Architecture {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Architecture> for String {
    fn from(arch: Architecture) -> Self {
        arch.to_string()
    }
}
