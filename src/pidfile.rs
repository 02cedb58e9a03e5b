//! Pidfile handling: at most one server instance per pidfile.

use anyhow::{bail, Context};
use std::io::Write;
use std::path::{Path, PathBuf};

/// An exclusively created pidfile, removed again on drop.
pub struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    /// Create the pidfile and write our pid into it. An already existing
    /// file means another instance is running.
    pub fn create(path: &Path) -> anyhow::Result<Pidfile> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())
                    .with_context(|| format!("could not write the pidfile {}", path.display()))?;
                Ok(Pidfile {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                bail!("the process is already running");
            }
            Err(e) => Err(e)
                .with_context(|| format!("could not create the pidfile {}", path.display())),
        }
    }
}

impl Drop for Pidfile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_writes_pid_and_drop_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rosterd.pid");

        let pidfile = Pidfile::create(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        drop(pidfile);
        assert!(!path.exists());
    }

    #[test]
    fn test_existing_pidfile_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rosterd.pid");
        std::fs::write(&path, "12345\n").unwrap();

        assert!(Pidfile::create(&path).is_err());
    }
}
