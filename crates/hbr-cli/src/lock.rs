use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exclusive advisory lock that keeps two service loops off the same
/// database. Released on drop.
#[derive(Debug)]
pub struct ServiceLock {
    file: File,
    path: PathBuf,
}

impl ServiceLock {
    /// `<db>.lock`, next to the database file.
    pub fn path_for(db_path: &Path) -> PathBuf {
        let mut raw = db_path.as_os_str().to_owned();
        raw.push(".lock");
        PathBuf::from(raw)
    }

    /// `Ok(None)` when another process holds the lock.
    pub fn try_acquire(path: &Path, now: DateTime<Utc>) -> Result<Option<Self>, std::io::Error> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }

        let metadata = format!(
            "owner_pid={}\nacquired_at={}\n",
            std::process::id(),
            now.to_rfc3339()
        );
        file.set_len(0)?;
        file.write_all(metadata.as_bytes())?;
        file.flush()?;

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ServiceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_sits_next_to_database() {
        assert_eq!(
            ServiceLock::path_for(Path::new("/data/reminders.db")),
            PathBuf::from("/data/reminders.db.lock")
        );
    }

    #[test]
    fn second_acquire_fails_until_first_is_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("reminders.db.lock");
        let now = Utc::now();

        let held = ServiceLock::try_acquire(&path, now)
            .expect("acquire")
            .expect("lock should be free");
        assert_eq!(held.path(), path.as_path());
        assert!(ServiceLock::try_acquire(&path, now)
            .expect("second attempt")
            .is_none());

        let contents = std::fs::read_to_string(&path).expect("read lock file");
        assert!(contents.contains(&format!("owner_pid={}", std::process::id())));

        drop(held);
        assert!(ServiceLock::try_acquire(&path, now)
            .expect("reacquire")
            .is_some());
    }
}
