use crate::config::Settings;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

// Flags understood by the ViSQOL binary. The set is fixed: the tool always
// runs verbose, and the wrapper never adds or reorders flags.
const TOOL_VERBOSE_FLAG: &str = "--verbose";
const REFERENCE_FLAG: &str = "--reference_file";
const DEGRADED_FLAG: &str = "--degraded_file";
const MODEL_FLAG: &str = "--similarity_to_quality_model";

/// Model file shipped alongside the ViSQOL binary.
const DEFAULT_MODEL_FILE: &str = "libsvm_nu_svr_model.txt";

/// Shell-convention exit codes for "command not found" / "not executable",
/// kept distinct from anything the tool itself reports.
pub const EXIT_TOOL_NOT_FOUND: u8 = 127;
pub const EXIT_TOOL_NOT_RUNNABLE: u8 = 126;

/// Why the tool never ran.
#[derive(Debug)]
pub enum LaunchFailure {
    /// The configured binary spec matched nothing on disk or on PATH.
    NotFound { spec: String },
    /// The binary resolved but spawning it failed.
    Spawn { program: PathBuf, source: io::Error },
}

impl LaunchFailure {
    pub fn exit_code(&self) -> u8 {
        match self {
            LaunchFailure::NotFound { .. } => EXIT_TOOL_NOT_FOUND,
            LaunchFailure::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                EXIT_TOOL_NOT_FOUND
            }
            LaunchFailure::Spawn { .. } => EXIT_TOOL_NOT_RUNNABLE,
        }
    }
}

impl fmt::Display for LaunchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchFailure::NotFound { spec } => write!(
                f,
                "visqol binary `{spec}` not found (set `tool_binary` in the config, `--tool`, or SOUNDGRADE_TOOL)"
            ),
            LaunchFailure::Spawn { program, source } => {
                write!(f, "failed to launch {}: {source}", program.display())
            }
        }
    }
}

/// What `doctor` reports: the resolved binary and the model file it implies.
#[derive(Debug, Clone)]
pub struct ToolAvailability {
    pub binary: Option<PathBuf>,
    pub model: Option<PathBuf>,
}

impl ToolAvailability {
    pub fn detect(settings: &Settings) -> Self {
        let binary = resolve_executable(&settings.tool_binary);
        let model = match (&settings.model_file, &binary) {
            (Some(model), _) => Some(model.clone()),
            (None, Some(binary)) => Some(default_model_path(binary)),
            (None, None) => None,
        };
        Self { binary, model }
    }
}

/// A single prepared run of the ViSQOL binary.
///
/// The reference and degraded paths are embedded verbatim; whether they
/// exist or decode as audio is the tool's problem, not the wrapper's.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub model: PathBuf,
    pub reference: PathBuf,
    pub degraded: PathBuf,
}

impl Invocation {
    pub fn prepare(
        settings: &Settings,
        reference: PathBuf,
        degraded: PathBuf,
    ) -> Result<Self, LaunchFailure> {
        let program =
            resolve_executable(&settings.tool_binary).ok_or_else(|| LaunchFailure::NotFound {
                spec: settings.tool_binary.clone(),
            })?;
        let model = settings
            .model_file
            .clone()
            .unwrap_or_else(|| default_model_path(&program));
        Ok(Self {
            program,
            model,
            reference,
            degraded,
        })
    }

    /// The discrete argument vector handed to the tool. Each path lands in a
    /// single `OsString` argument; no shell ever sees it.
    pub fn argv(&self) -> Vec<OsString> {
        vec![
            OsString::from(TOOL_VERBOSE_FLAG),
            flag_with_path(REFERENCE_FLAG, &self.reference),
            flag_with_path(DEGRADED_FLAG, &self.degraded),
            flag_with_path(MODEL_FLAG, &self.model),
        ]
    }

    /// Spawns the tool with inherited stdout/stderr and blocks until it exits.
    pub fn status(&self) -> Result<ExitStatus, LaunchFailure> {
        Command::new(&self.program)
            .args(self.argv())
            .status()
            .map_err(|source| LaunchFailure::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    /// Display form for `--dry-run` and verbose output only.
    pub fn to_command_line(&self) -> String {
        let mut out = self.program.to_string_lossy().into_owned();
        for arg in self.argv() {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }
}

/// Maps a finished child to the wrapper's own exit code: the tool's code is
/// mirrored, a signal-killed child becomes 128+signal, and a code outside
/// the u8 range (Windows status values) becomes 1.
pub fn exit_code_for(status: &ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code).unwrap_or(1);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128u8.saturating_add(u8::try_from(signal).unwrap_or(0));
        }
    }
    1
}

pub fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {signal}");
        }
    }
    "unknown exit status".to_owned()
}

fn default_model_path(binary: &Path) -> PathBuf {
    binary
        .parent()
        .map(|dir| dir.join(DEFAULT_MODEL_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_FILE))
}

fn resolve_executable(spec: &str) -> Option<PathBuf> {
    let path = PathBuf::from(spec);
    if path.exists() {
        return Some(path);
    }
    which::which(spec).ok()
}

fn flag_with_path(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push("=");
    arg.push(path.as_os_str());
    arg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(reference: &str, degraded: &str) -> Invocation {
        Invocation {
            program: PathBuf::from("/opt/visqol/visqol"),
            model: PathBuf::from("/opt/visqol/libsvm_nu_svr_model.txt"),
            reference: PathBuf::from(reference),
            degraded: PathBuf::from(degraded),
        }
    }

    #[test]
    fn argv_carries_the_fixed_flags_in_order() {
        let argv = invocation("ref.wav", "deg.wav").argv();
        assert_eq!(
            argv,
            vec![
                OsString::from("--verbose"),
                OsString::from("--reference_file=ref.wav"),
                OsString::from("--degraded_file=deg.wav"),
                OsString::from(
                    "--similarity_to_quality_model=/opt/visqol/libsvm_nu_svr_model.txt"
                ),
            ]
        );
    }

    #[test]
    fn shell_metacharacters_stay_single_literal_arguments() {
        let argv = invocation("a b;rm.wav", "$(deg) | out.wav").argv();
        assert_eq!(argv.len(), 4);
        assert_eq!(argv[1], OsString::from("--reference_file=a b;rm.wav"));
        assert_eq!(argv[2], OsString::from("--degraded_file=$(deg) | out.wav"));
    }

    #[test]
    fn default_model_sits_next_to_the_binary() {
        assert_eq!(
            default_model_path(Path::new("/opt/visqol/visqol")),
            PathBuf::from("/opt/visqol/libsvm_nu_svr_model.txt")
        );
    }

    #[test]
    fn configured_model_wins_over_the_co_located_default() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("visqol");
        std::fs::write(&binary, "").unwrap();

        let settings = Settings {
            tool_binary: binary.to_string_lossy().to_string(),
            model_file: Some(PathBuf::from("/models/custom.txt")),
        };
        let availability = ToolAvailability::detect(&settings);
        assert_eq!(availability.binary, Some(binary));
        assert_eq!(availability.model, Some(PathBuf::from("/models/custom.txt")));
    }

    #[test]
    fn missing_binary_is_a_distinct_launch_failure() {
        let settings = Settings {
            tool_binary: "/nonexistent/visqol-test-binary".to_owned(),
            model_file: None,
        };
        let err = Invocation::prepare(&settings, PathBuf::from("r.wav"), PathBuf::from("d.wav"))
            .unwrap_err();
        assert!(matches!(err, LaunchFailure::NotFound { .. }));
        assert_eq!(err.exit_code(), EXIT_TOOL_NOT_FOUND);
    }

    #[cfg(unix)]
    #[test]
    fn child_argv_arrives_verbatim() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-visqol");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             [ \"$1\" = \"--verbose\" ] || exit 9\n\
             [ \"$2\" = \"--reference_file=a b;rm.wav\" ] || exit 9\n\
             [ \"$3\" = \"--degraded_file=deg.wav\" ] || exit 9\n\
             [ \"$#\" = 4 ] || exit 9\n\
             exit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let inv = Invocation {
            program: script,
            model: dir.path().join("libsvm_nu_svr_model.txt"),
            reference: PathBuf::from("a b;rm.wav"),
            degraded: PathBuf::from("deg.wav"),
        };
        let status = inv.status().unwrap();
        assert_eq!(exit_code_for(&status), 0);
    }

    #[cfg(unix)]
    #[test]
    fn mirrors_the_child_exit_code() {
        let status = Command::new("/bin/sh").args(["-c", "exit 2"]).status().unwrap();
        assert_eq!(exit_code_for(&status), 2);
    }

    #[cfg(unix)]
    #[test]
    fn maps_signal_death_to_128_plus_signal() {
        let status = Command::new("/bin/sh")
            .args(["-c", "kill -KILL $$"])
            .status()
            .unwrap();
        assert_eq!(exit_code_for(&status), 137);
    }

    #[cfg(unix)]
    #[test]
    fn spawning_a_non_executable_file_is_not_runnable() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("visqol");
        std::fs::write(&fake, "not a binary").unwrap();

        let inv = Invocation {
            program: fake,
            model: dir.path().join("libsvm_nu_svr_model.txt"),
            reference: PathBuf::from("r.wav"),
            degraded: PathBuf::from("d.wav"),
        };
        let err = inv.status().unwrap_err();
        assert!(matches!(err, LaunchFailure::Spawn { .. }));
        assert_eq!(err.exit_code(), EXIT_TOOL_NOT_RUNNABLE);
    }
}
