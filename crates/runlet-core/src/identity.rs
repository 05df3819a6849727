//! Process identity: umask, supplementary groups, GID, and UID.

use nix::unistd::{Gid, Uid};
use runlet_common::error::Result;
use runlet_common::spec::User;

use crate::syscall::Syscall;

/// Switches the calling process to the configured user.
///
/// Groups are set before the IDs change, while the process still has the
/// privilege to do so. Permitted capabilities survive the UID change so
/// they can be installed afterwards. Inside a user namespace `setgroups`
/// is denied, so an empty group list is left alone there.
///
/// # Errors
///
/// Returns the syscall error of the first step that fails.
pub fn apply(syscall: &dyn Syscall, user: &User, user_namespace: bool) -> Result<()> {
    if let Some(mask) = user.umask {
        syscall.set_umask(mask);
    }
    let groups: Vec<Gid> = user.additional_gids.iter().copied().map(Gid::from_raw).collect();
    if !(user_namespace && groups.is_empty()) {
        syscall.set_groups(&groups)?;
    }
    syscall.set_id(Uid::from_raw(user.uid), Gid::from_raw(user.gid))?;
    tracing::debug!(uid = user.uid, gid = user.gid, groups = groups.len(), "identity set");
    Ok(())
}
