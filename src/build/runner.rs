use std::io;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use crate::build::control::OperatorAction;

/// Arguments for one run of the external build tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub pkgname: String,
    pub version: String,
    pub repo: String,
    pub builder: String,
    pub skip_pgp: bool,
}

impl Invocation {
    /// `<pkgname> --ver <version> --repo <repo> --builder <builder> [--skippgpcheck]`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.pkgname.clone(),
            "--ver".to_string(),
            self.version.clone(),
            "--repo".to_string(),
            self.repo.clone(),
            "--builder".to_string(),
            self.builder.clone(),
        ];
        if self.skip_pgp {
            args.push("--skippgpcheck".to_string());
        }
        args
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The tool exited; `None` when it was killed by a signal
    Exited(Option<i32>),
    /// The operator interrupted the run and the tool was stopped
    Interrupted(OperatorAction),
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RunOutcome::Exited(Some(0)))
    }
}

/// Runs the build tool for one attempt
pub trait BuildRunner {
    fn run(
        &mut self,
        invocation: &Invocation,
        control: Option<&Receiver<OperatorAction>>,
    ) -> io::Result<RunOutcome>;
}

/// Runs the build script as a child process
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    pub script: PathBuf,
    /// Directory the script runs in; its logs land here
    pub workdir: PathBuf,
    /// Wrap the script in a transient `systemd-run --user --scope` unit
    pub systemd_scope: bool,
    pub stop_grace: Duration,
    pub poll_interval: Duration,
}

impl ProcessRunner {
    pub fn new(script: PathBuf, workdir: PathBuf) -> Self {
        Self {
            script,
            workdir,
            systemd_scope: false,
            stop_grace: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
        }
    }

    fn command(&self, invocation: &Invocation, unit: &str) -> Command {
        let mut cmd = if self.systemd_scope {
            let mut cmd = Command::new("systemd-run");
            cmd.args(["--user", "--scope", "--collect"])
                .arg(format!("--unit={}", unit))
                .arg(&self.script);
            cmd
        } else {
            Command::new(&self.script)
        };
        cmd.args(invocation.args()).current_dir(&self.workdir);
        // Own process group, so a stop reaches every process the script forks
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    /// Stop the child: ask politely, wait out the grace period, then kill
    ///
    /// The polite request is `systemctl stop` on the scope unit when there is
    /// one, otherwise SIGTERM to the child's process group.
    fn stop(&self, child: &mut Child, unit: &str) -> io::Result<()> {
        if self.systemd_scope {
            match Command::new("systemctl").args(["--user", "stop", unit]).status() {
                Ok(status) if !status.success() => {
                    log::warn!("systemctl stop {} exited with {}", unit, status);
                }
                Err(e) => log::warn!("failed to run systemctl stop {}: {}", unit, e),
                Ok(_) => {}
            }
        } else {
            signal_group(child, GroupSignal::Terminate)?;
        }

        let deadline = Instant::now() + self.stop_grace;
        while Instant::now() < deadline {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }

        log::warn!("{} still running after {:?}, killing", unit, self.stop_grace);
        signal_group(child, GroupSignal::Kill)?;
        if let Err(e) = child.kill() {
            log::debug!("kill after group signal: {}", e);
        }
        child.wait()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Signal the child's whole process group; a group that is already gone is fine
#[cfg(unix)]
fn signal_group(child: &Child, signal: GroupSignal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    let pgid = i32::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "child pid out of range"))?;
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from_raw_os_error(errno as i32)),
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _signal: GroupSignal) -> io::Result<()> {
    child.kill()
}

impl BuildRunner for ProcessRunner {
    fn run(
        &mut self,
        invocation: &Invocation,
        control: Option<&Receiver<OperatorAction>>,
    ) -> io::Result<RunOutcome> {
        // Actions typed between builds do not apply to this one
        if let Some(rx) = control {
            while rx.try_recv().is_ok() {}
        }

        let unit = format!(
            "loongshot-{}-{}",
            invocation.pkgname,
            chrono::Utc::now().timestamp_millis()
        );
        let mut cmd = self.command(invocation, &unit);
        log::info!("running {:?}", cmd);
        let mut child = cmd.spawn()?;

        loop {
            if let Some(status) = child.try_wait()? {
                log::debug!("{} exited with {}", invocation.pkgname, status);
                return Ok(RunOutcome::Exited(status.code()));
            }
            if let Some(rx) = control {
                match rx.try_recv() {
                    Ok(action) => {
                        self.stop(&mut child, &unit)?;
                        return Ok(RunOutcome::Interrupted(action));
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
                }
            }
            thread::sleep(self.poll_interval);
        }
    }
}
