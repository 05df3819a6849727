//! POSIX resource limits for the container process.

use nix::sys::resource::Resource;
use runlet_common::error::{Result, RunletError};
use runlet_common::spec::Rlimit;

use crate::syscall::Syscall;

/// Maps an `RLIMIT_*` name to its resource.
///
/// # Errors
///
/// Returns a validation error for unknown names.
pub fn resource_from_name(name: &str) -> Result<Resource> {
    let resource = match name {
        "RLIMIT_AS" => Resource::RLIMIT_AS,
        "RLIMIT_CORE" => Resource::RLIMIT_CORE,
        "RLIMIT_CPU" => Resource::RLIMIT_CPU,
        "RLIMIT_DATA" => Resource::RLIMIT_DATA,
        "RLIMIT_FSIZE" => Resource::RLIMIT_FSIZE,
        "RLIMIT_LOCKS" => Resource::RLIMIT_LOCKS,
        "RLIMIT_MEMLOCK" => Resource::RLIMIT_MEMLOCK,
        "RLIMIT_MSGQUEUE" => Resource::RLIMIT_MSGQUEUE,
        "RLIMIT_NICE" => Resource::RLIMIT_NICE,
        "RLIMIT_NOFILE" => Resource::RLIMIT_NOFILE,
        "RLIMIT_NPROC" => Resource::RLIMIT_NPROC,
        "RLIMIT_RSS" => Resource::RLIMIT_RSS,
        "RLIMIT_RTPRIO" => Resource::RLIMIT_RTPRIO,
        "RLIMIT_RTTIME" => Resource::RLIMIT_RTTIME,
        "RLIMIT_SIGPENDING" => Resource::RLIMIT_SIGPENDING,
        "RLIMIT_STACK" => Resource::RLIMIT_STACK,
        other => {
            return Err(RunletError::validation(format!("unknown rlimit type {other:?}")));
        }
    };
    Ok(resource)
}

/// Applies every rlimit in order.
///
/// All names are resolved before the first limit is set.
///
/// # Errors
///
/// Returns a validation error for unknown names or a soft limit above the
/// hard limit, or the syscall error of the first `setrlimit` that fails.
pub fn apply(syscall: &dyn Syscall, rlimits: &[Rlimit]) -> Result<()> {
    let resolved = rlimits
        .iter()
        .map(|r| {
            if r.soft > r.hard {
                return Err(RunletError::validation(format!(
                    "{} soft limit {} exceeds hard limit {}",
                    r.kind, r.soft, r.hard
                )));
            }
            Ok((resource_from_name(&r.kind)?, r))
        })
        .collect::<Result<Vec<_>>>()?;

    for (resource, limit) in resolved {
        syscall.set_rlimit(resource, limit.soft, limit.hard)?;
        tracing::debug!(kind = %limit.kind, soft = limit.soft, hard = limit.hard, "rlimit set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::{Call, TestSyscall};

    fn rlimit(kind: &str, soft: u64, hard: u64) -> Rlimit {
        Rlimit {
            kind: kind.into(),
            soft,
            hard,
        }
    }

    #[test]
    fn applies_in_order() {
        let sys = TestSyscall::default();
        apply(
            &sys,
            &[rlimit("RLIMIT_NOFILE", 1024, 4096), rlimit("RLIMIT_CORE", 0, 0)],
        )
        .unwrap();
        assert_eq!(
            sys.calls(),
            vec![
                Call::SetRlimit(Resource::RLIMIT_NOFILE, 1024, 4096),
                Call::SetRlimit(Resource::RLIMIT_CORE, 0, 0),
            ]
        );
    }

    #[test]
    fn unknown_name_fails_before_any_call() {
        let sys = TestSyscall::default();
        let err = apply(
            &sys,
            &[rlimit("RLIMIT_NOFILE", 1, 1), rlimit("RLIMIT_BOGUS", 1, 1)],
        )
        .unwrap_err();
        assert!(matches!(err, RunletError::Validation { .. }));
        assert!(sys.calls().is_empty());
    }

    #[test]
    fn soft_above_hard_is_rejected() {
        let sys = TestSyscall::default();
        assert!(apply(&sys, &[rlimit("RLIMIT_NOFILE", 10, 5)]).is_err());
    }
}
