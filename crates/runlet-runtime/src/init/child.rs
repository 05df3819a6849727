//! Init entry point, running inside the container's namespaces.
//!
//! Reached through `runlet init <metadata-dir>` once the parent continues
//! the stopped child. Turns the process into the container process and
//! finally execs the user command in its place.

use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use runlet_common::constants;
use runlet_common::error::{Result, RunletError};
use runlet_common::spec::{NamespaceKind, Spec};
use runlet_core::capability::{self, ResolvedCapabilities};
use runlet_core::filesystem::{mount, pivot_root, protect};
use runlet_core::namespace::uts;
use runlet_core::syscall::{LinuxSyscall, Syscall};
use runlet_core::{identity, rlimit};

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Prepares the container and execs the user command.
///
/// Only returns on failure. The process is disposable at this point, so
/// nothing already mounted is undone.
///
/// # Errors
///
/// Returns the first setup step that fails.
pub fn run(metadata_dir: &Path) -> Result<Infallible> {
    let bundle = std::env::var_os(constants::BUNDLE_ENV)
        .filter(|b| !b.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            RunletError::validation(format!("{} is not set", constants::BUNDLE_ENV))
        })?;
    tracing::debug!(
        metadata_dir = %metadata_dir.display(),
        bundle = %bundle.display(),
        "init started"
    );

    let spec = Spec::load(&bundle)?;
    let rootfs = spec.rootfs(&bundle)?;
    let syscall = LinuxSyscall;
    prepare(&syscall, &spec, &rootfs)?;

    let process = spec
        .process
        .as_ref()
        .ok_or_else(|| RunletError::validation("spec has no process"))?;
    let name = process
        .args
        .first()
        .ok_or_else(|| RunletError::validation("process.args is empty"))?;
    let executable = resolve_executable(name, &process.env, Path::new("/"))?;
    exec(&executable, &process.args, &process.env)
}

/// Runs every in-namespace setup step, in order, up to the final exec.
///
/// # Errors
///
/// Returns the first step that fails.
pub fn prepare(syscall: &dyn Syscall, spec: &Spec, rootfs: &Path) -> Result<()> {
    let process = spec
        .process
        .as_ref()
        .ok_or_else(|| RunletError::validation("spec has no process"))?;

    if let Some(hostname) = &spec.hostname {
        uts::set_hostname(syscall, hostname, spec.has_namespace(NamespaceKind::Uts))?;
    }

    if spec.has_namespace(NamespaceKind::Mount) {
        mount::make_rprivate(syscall)?;
        mount::bind_rootfs(syscall, rootfs)?;
    }
    mount::mount_all(syscall, rootfs, &spec.mounts)?;
    pivot_root::pivot_root(syscall, rootfs)?;

    let root = Path::new("/");
    if let Some(linux) = &spec.linux {
        protect::mask_paths(syscall, root, &linux.masked_paths)?;
        protect::readonly_paths(syscall, root, &linux.readonly_paths)?;
        if linux.seccomp.is_some() {
            tracing::warn!("seccomp profile present but not enforced");
        }
    }
    if spec.root.as_ref().is_some_and(|r| r.readonly) {
        protect::readonly_root(syscall)?;
    }

    rlimit::apply(syscall, &process.rlimits)?;
    let caps = process
        .capabilities
        .as_ref()
        .map(ResolvedCapabilities::resolve)
        .transpose()?;
    if let Some(caps) = &caps {
        capability::drop_bounding(syscall, caps)?;
    }
    identity::apply(
        syscall,
        &process.user,
        spec.has_namespace(NamespaceKind::User),
    )?;
    if let Some(caps) = &caps {
        capability::install(syscall, caps)?;
    }
    if process.no_new_privileges {
        syscall.set_no_new_privileges()?;
    }
    syscall.chdir(&process.cwd)?;

    tracing::info!(cwd = %process.cwd.display(), "container prepared");
    Ok(())
}

/// Finds `name` through the `PATH` entry of `env`, checked under `root`.
///
/// Names containing `/` are returned unchanged. The returned path is as
/// seen from inside the container.
///
/// # Errors
///
/// Returns a validation error if no executable file matches.
pub fn resolve_executable(name: &str, env: &[String], root: &Path) -> Result<PathBuf> {
    if name.contains('/') {
        return Ok(PathBuf::from(name));
    }
    let search = env
        .iter()
        .rev()
        .find_map(|kv| kv.strip_prefix("PATH="))
        .unwrap_or(DEFAULT_PATH);

    for dir in search.split(':').filter(|d| !d.is_empty()) {
        let candidate = Path::new(dir).join(name);
        let on_disk = root.join(candidate.strip_prefix("/").unwrap_or(&candidate));
        let executable = std::fs::metadata(&on_disk)
            .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0);
        if executable {
            return Ok(candidate);
        }
    }
    Err(RunletError::validation(format!(
        "executable {name:?} not found in PATH"
    )))
}

fn cstrings(items: &[String]) -> Result<Vec<CString>> {
    items
        .iter()
        .map(|s| {
            CString::new(s.as_bytes())
                .map_err(|_| RunletError::validation(format!("{s:?} contains a NUL byte")))
        })
        .collect()
}

fn exec(executable: &Path, args: &[String], env: &[String]) -> Result<Infallible> {
    let path = CString::new(executable.as_os_str().as_encoded_bytes())
        .map_err(|_| RunletError::validation("executable path contains a NUL byte"))?;
    let argv = cstrings(args)?;
    let envp = cstrings(env)?;
    tracing::debug!(executable = %executable.display(), "exec");
    nix::unistd::execve(&path, &argv, &envp)
        .map_err(|e| RunletError::syscall(format!("execve {}", executable.display()), e))
}

#[cfg(test)]
mod tests {
    use std::fs::Permissions;

    use runlet_common::spec::{Capabilities, Linux, Namespace, Process, Rlimit, Root, User};
    use runlet_core::syscall::test::{Call, TestSyscall};

    use super::*;

    fn spec() -> Spec {
        Spec {
            process: Some(Process {
                args: vec!["sh".into()],
                cwd: PathBuf::from("/work"),
                user: User {
                    uid: 1000,
                    gid: 1000,
                    ..User::default()
                },
                capabilities: Some(Capabilities {
                    bounding: vec!["CAP_KILL".into()],
                    effective: vec!["CAP_KILL".into()],
                    permitted: vec!["CAP_KILL".into()],
                    inheritable: vec!["CAP_KILL".into()],
                    ambient: vec!["CAP_KILL".into()],
                }),
                rlimits: vec![Rlimit {
                    kind: "RLIMIT_NOFILE".into(),
                    soft: 512,
                    hard: 1024,
                }],
                no_new_privileges: true,
                ..Process::default()
            }),
            root: Some(Root {
                path: PathBuf::from("rootfs"),
                readonly: true,
            }),
            hostname: Some("box".into()),
            linux: Some(Linux {
                namespaces: vec![
                    Namespace::new(NamespaceKind::Uts),
                    Namespace::new(NamespaceKind::Mount),
                ],
                masked_paths: vec!["/definitely/not/here".into()],
                ..Linux::default()
            }),
            ..Spec::default()
        }
    }

    fn ops(sys: &TestSyscall) -> Vec<&'static str> {
        sys.calls().iter().map(Call::op).collect()
    }

    #[test]
    fn setup_runs_in_order() {
        let sys = TestSyscall::default();
        prepare(&sys, &spec(), Path::new("/bundles/demo/rootfs")).unwrap();

        let ops = ops(&sys);
        let position = |op: &str| ops.iter().position(|o| *o == op).unwrap();
        assert_eq!(ops[0], "set_hostname");
        assert!(position("mount") < position("pivot_root"));
        assert!(position("pivot_root") < position("set_rlimit"));
        assert!(position("set_rlimit") < position("drop_bounding_cap"));
        let last_drop = ops.iter().rposition(|o| *o == "drop_bounding_cap").unwrap();
        assert!(last_drop < position("set_id"));
        assert!(position("set_id") < position("set_capabilities"));
        assert!(position("set_capabilities") < position("raise_ambient_cap"));
        assert!(position("set_capabilities") < position("set_no_new_privileges"));
        assert_eq!(*ops.last().unwrap(), "chdir");
        assert_eq!(
            sys.calls().last().unwrap(),
            &Call::Chdir(PathBuf::from("/work"))
        );
    }

    #[test]
    fn readonly_root_is_remounted_after_pivot() {
        let sys = TestSyscall::default();
        prepare(&sys, &spec(), Path::new("/r")).unwrap();
        let calls = sys.calls();
        let pivot = calls.iter().position(|c| c.op() == "pivot_root").unwrap();
        let ro_root = calls.iter().rposition(|c| {
            matches!(c, Call::Mount { target, flags, .. }
                if target == Path::new("/") && flags.contains(nix::mount::MsFlags::MS_RDONLY))
        });
        assert!(ro_root.unwrap() > pivot);
    }

    #[test]
    fn failure_stops_setup() {
        let sys = TestSyscall::failing_on("pivot_root");
        assert!(prepare(&sys, &spec(), Path::new("/r")).is_err());
        assert!(!ops(&sys).contains(&"set_id"));
        assert!(!ops(&sys).contains(&"chdir"));
    }

    #[test]
    fn bounding_set_is_dropped_while_still_root() {
        let sys = TestSyscall::failing_on("drop_bounding_cap");
        assert!(prepare(&sys, &spec(), Path::new("/r")).is_err());
        assert!(!ops(&sys).contains(&"set_id"));
    }

    #[test]
    fn no_mount_namespace_skips_private_remount() {
        let mut spec = spec();
        spec.linux = None;
        spec.hostname = None;
        let sys = TestSyscall::default();
        prepare(&sys, &spec, Path::new("/r")).unwrap();
        assert_eq!(ops(&sys)[0], "open_dir");
    }

    #[test]
    fn executable_is_found_through_env_path() {
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("usr/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("tool"), "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(bin.join("tool"), Permissions::from_mode(0o755)).unwrap();
        std::fs::write(bin.join("data"), "").unwrap();

        let env = vec!["PATH=/sbin:/usr/bin".to_string()];
        assert_eq!(
            resolve_executable("tool", &env, root.path()).unwrap(),
            PathBuf::from("/usr/bin/tool")
        );
        assert!(resolve_executable("data", &env, root.path()).is_err());
        assert_eq!(
            resolve_executable("./local", &env, root.path()).unwrap(),
            PathBuf::from("./local")
        );
    }

    #[test]
    fn missing_bundle_env_is_rejected() {
        // SAFETY: tests in this module do not read the variable concurrently.
        unsafe { std::env::remove_var(constants::BUNDLE_ENV) };
        assert!(matches!(
            run(Path::new("/run/runlet/c1")),
            Err(RunletError::Validation { .. })
        ));
    }
}
