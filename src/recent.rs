use std::{
    collections::HashSet,
    fs::{self, OpenOptions},
    io::Write,
    ops::Deref,
    path::{Path, PathBuf},
};

use crate::session::Sessions;

/// Most-recent-first list of connected session names, one per line on disk.
#[derive(Debug)]
pub struct RecentSessions {
    path: PathBuf,
    names: Vec<String>,
    retention: usize,
}

impl RecentSessions {
    /// Opens the store, creating an empty file when there is none. An unreadable file
    /// is treated as empty.
    pub fn open<P: AsRef<Path>>(path: P, retention: usize) -> anyhow::Result<Self> {
        let path = PathBuf::from(path.as_ref());
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::File::create(&path)?;
        }

        let names = read_names(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Could not read recent sessions");
            Vec::new()
        });

        Ok(Self {
            path,
            names,
            retention,
        })
    }

    /// Up to `limit` unique names that still refer to a usable session, in stored order.
    pub fn visible(&self, usable: &Sessions, limit: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.names
            .iter()
            .filter(|name| usable.contains_key(name.as_str()))
            .filter(|name| seen.insert(name.as_str()))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Moves `name` to the front, dropping duplicates and anything past the retention cap.
    pub fn touch(&mut self, name: &str) {
        let mut names = Vec::with_capacity(self.retention);
        names.push(name.to_string());
        names.extend(
            self.names
                .iter()
                .filter(|n| n.as_str() != name)
                .take(self.retention.saturating_sub(1))
                .cloned(),
        );
        names.truncate(self.retention.max(1));
        self.names = names;
    }

    /// Records a connection to `name`: re-reads the file so entries written by other
    /// runs since [`open`](Self::open) survive, then moves `name` to the front and writes.
    pub fn record(&mut self, name: &str) -> anyhow::Result<()> {
        match read_names(&self.path) {
            Ok(names) => self.names = names,
            Err(e) => tracing::debug!(path = %self.path.display(), error = %e, "Keeping loaded recent sessions"),
        }
        self.touch(name);
        self.flush()
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        let mut content = self.names.join("\n");
        content.push('\n');
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn read_names(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

impl Deref for RecentSessions {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.names
    }
}
