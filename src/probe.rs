//! Capability probes for a store path.
//!
//! The engine leans on two filesystem behaviors: advisory locks must actually exclude,
//! and a directory must be removable while a file inside it is still open elsewhere
//! (publication reclaims superseded generations this way). Both are empirically checked
//! the first time a store path is used, before its lock file exists. A failed probe is
//! never fatal; it downgrades the store's guarantees and says so once via `warn!`.

use fs2::FileExt;
use std::{
    fs::{self, File},
    io,
    os::unix::fs::symlink,
    path::Path,
};
use tracing::{debug, warn};

/// Run both probes against `path`, warning on any degradation.
pub(crate) fn run(path: &Path) {
    match flock_works(path) {
        Ok(true) => {}
        Ok(false) => warn!(
            path = %path.display(),
            "filesystem does not enforce advisory locks; concurrent-access guarantees may not hold"
        ),
        Err(err) => debug!(%err, "lock probe did not complete"),
    }
    match dir_cleanup_works(path) {
        Ok(true) => {}
        Ok(false) => warn!(
            path = %path.display(),
            "filesystem does not allow removing in-use directories; superseded generations may accumulate and require out-of-band cleanup"
        ),
        Err(err) => debug!(%err, "directory cleanup probe did not complete"),
    }
}

/// Check that a second descriptor cannot take an exclusive advisory lock while a first
/// descriptor holds one on the same path.
fn flock_works(path: &Path) -> io::Result<bool> {
    let probe = path.join(format!(".probe_lock_{}", std::process::id()));
    let holder = File::create(&probe)?;
    holder.lock_exclusive()?;

    let contender = File::open(&probe)?;
    let excluded = contender.try_lock_exclusive().is_err();

    holder.unlock()?;
    fs::remove_file(&probe)?;
    Ok(excluded)
}

/// Reproduce the publish/reclaim pattern: hold a file open inside a generation
/// directory, swap a sibling symlink over it, then try to remove the directory while
/// the descriptor is still open. Returns whether the directory actually disappeared.
fn dir_cleanup_works(path: &Path) -> io::Result<bool> {
    let base = path.join(format!(".probe_dir_{}", std::process::id()));
    fs::create_dir_all(base.join("old"))?;
    fs::create_dir_all(base.join("new"))?;

    let pinned = File::create(base.join("old").join("data"))?;
    symlink("old", base.join("current.old"))?;
    fs::rename(base.join("current.old"), base.join("current"))?;

    // Swap the pointer to the sibling, then reclaim the superseded directory while
    // `pinned` is still open.
    symlink("new", base.join("current.new"))?;
    fs::rename(base.join("current.new"), base.join("current"))?;
    let removed = fs::remove_dir_all(base.join("old")).is_ok() && !base.join("old").exists();

    drop(pinned);
    fs::remove_dir_all(&base)?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flock_probe_passes_on_local_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        assert!(flock_works(dir.path()).unwrap());

        // Probe must clean up after itself.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dir_cleanup_probe_passes_on_local_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        assert!(dir_cleanup_works(dir.path()).unwrap());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
