use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use depot_schema::{Cpu, Os, Requirements, Selections};
use tracing::debug;
use wait_timeout::ChildExt;

use super::{Solver, SolverError};

/// Delegates solving to an external program.
///
/// The program is called as
/// `PROGRAM [BASE_ARGS] [--before V] [--not-before V] [--source | --os OS --cpu CPU] [--command NAME] INTERFACE`
/// and must print a selections document on stdout. Exit status 1 means the
/// requirements cannot be met, with the explanation on stderr; any other
/// failure is reported as a process error.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ProcessSolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from a command line such as `["solver", "--offline"]`.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone()).with_args(args.iter().cloned()))
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.base_args.extend(args);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn arguments(&self, requirements: &Requirements) -> Vec<String> {
        let mut args = self.base_args.clone();
        if let Some(before) = &requirements.versions.before {
            args.extend(["--before".to_string(), before.to_string()]);
        }
        if let Some(not_before) = &requirements.versions.not_before {
            args.extend(["--not-before".to_string(), not_before.to_string()]);
        }
        let arch = &requirements.architecture;
        if arch.is_source() {
            args.push("--source".to_string());
        } else {
            if arch.os != Os::All {
                args.extend(["--os".to_string(), arch.os.to_string()]);
            }
            if arch.cpu != Cpu::All {
                args.extend(["--cpu".to_string(), arch.cpu.to_string()]);
            }
        }
        if let Some(command) = &requirements.command {
            args.extend(["--command".to_string(), command.clone()]);
        }
        args.push(requirements.interface.clone());
        args
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        text
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl Solver for ProcessSolver {
    fn solve(&self, requirements: &Requirements) -> Result<Selections, SolverError> {
        let args = self.arguments(requirements);
        debug!("Running solver: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SolverError::Process(format!("cannot run {}: {e}", self.program)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill(&mut child);
                return Err(SolverError::Timeout(self.timeout));
            }
            Err(e) => {
                kill(&mut child);
                return Err(SolverError::Process(e.to_string()));
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        match status.code() {
            Some(0) => Ok(Selections::from_json(&stdout)?),
            Some(1) => Err(SolverError::Unsatisfiable {
                interface: requirements.interface.clone(),
                reason: stderr.trim().to_string(),
            }),
            _ => Err(SolverError::Process(format!(
                "{} exited with {status}: {}",
                self.program,
                stderr.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_schema::Architecture;

    #[test]
    fn argument_order() {
        let solver = ProcessSolver::new("solve").with_args(["--offline".to_string()]);
        let requirements = Requirements::new("https://example.org/app")
            .with_architecture(Architecture::new(Os::Linux, Cpu::X86_64))
            .not_before("1.0".parse().unwrap())
            .before("2.0".parse().unwrap())
            .with_command("run");
        assert_eq!(
            solver.arguments(&requirements),
            [
                "--offline",
                "--before",
                "2.0",
                "--not-before",
                "1.0",
                "--os",
                "Linux",
                "--cpu",
                "x86_64",
                "--command",
                "run",
                "https://example.org/app",
            ]
        );

        let source = Requirements::new("app").with_architecture("*-src".parse().unwrap());
        assert_eq!(solver.arguments(&source), ["--offline", "--source", "app"]);

        let any = Requirements::new("app").with_architecture(Architecture::default());
        assert_eq!(solver.arguments(&any), ["--offline", "app"]);
    }

    #[test]
    fn from_command_line() {
        assert!(ProcessSolver::from_command_line(&[]).is_none());
        let solver =
            ProcessSolver::from_command_line(&["solve".to_string(), "-q".to_string()]).unwrap();
        assert_eq!(solver.program, "solve");
        assert_eq!(solver.base_args, ["-q"]);
    }

    #[cfg(unix)]
    fn shell(script: &str) -> ProcessSolver {
        ProcessSolver::new("sh").with_args(["-c".to_string(), script.to_string(), "sh".to_string()])
    }

    #[cfg(unix)]
    #[test]
    fn parses_selections_from_stdout() {
        let script = r#"echo '{"interface": "app", "implementations": [{"interface": "app", "id": "sha1new=abc", "version": "1.0", "digest": {"sha1new": "abc"}}]}'"#;
        let selections = shell(script).solve(&Requirements::new("app")).unwrap();
        assert_eq!(selections.interface, "app");
        assert_eq!(selections.implementations[0].id, "sha1new=abc");
    }

    #[cfg(unix)]
    #[test]
    fn exit_one_is_unsatisfiable() {
        let err = shell("echo 'no version of app fits' >&2; exit 1")
            .solve(&Requirements::new("app"))
            .unwrap_err();
        match err {
            SolverError::Unsatisfiable { interface, reason } => {
                assert_eq!(interface, "app");
                assert_eq!(reason, "no version of app fits");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn other_failures_are_process_errors() {
        let crash = shell("exit 3").solve(&Requirements::new("app")).unwrap_err();
        assert!(matches!(crash, SolverError::Process(_)));

        let garbage = shell("echo not json").solve(&Requirements::new("app")).unwrap_err();
        assert!(matches!(garbage, SolverError::Schema(_)));

        let missing = ProcessSolver::new("/nonexistent/solver")
            .solve(&Requirements::new("app"))
            .unwrap_err();
        assert!(matches!(missing, SolverError::Process(_)));
    }

    #[cfg(unix)]
    #[test]
    fn slow_solver_times_out() {
        let solver = shell("sleep 5").with_timeout(Duration::from_millis(100));
        let err = solver.solve(&Requirements::new("app")).unwrap_err();
        assert!(matches!(err, SolverError::Timeout(_)));
    }
}
