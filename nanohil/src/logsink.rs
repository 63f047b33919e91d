// SPDX-License-Identifier: Apache-2.0

//! Explicit, injected log sink: one append-only file per logical target name under
//! a shared root. The sink is the only resource shared across concurrent runs;
//! appends to the same target are serialized by a per-target lock, appends to
//! distinct targets never contend.

use crate::{Error, Result};
use std::{
    collections::HashMap,
    fs::{create_dir_all, read_to_string, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex},
};

#[derive(Debug)]
pub struct LogSink {
    root: PathBuf,
    targets: Mutex<HashMap<String, Arc<Mutex<PathBuf>>>>,
}

impl LogSink {
    pub fn new<P>(root: P) -> Result<Self>
    where
        P: Into<PathBuf>,
    {
        let root = root.into();
        create_dir_all(&root).map_err(|e| Error::Write {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self {
            root,
            targets: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Append one line to the target's log file, creating it on first use
    pub fn append(&self, target: &str, line: &str) -> Result<()> {
        let handle = self.handle(target);
        let path = lock_recovering(&handle);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&*path)
            .map_err(|e| Error::Write {
                path: path.clone(),
                source: e,
            })?;
        writeln!(file, "{}", line).map_err(|e| Error::Write {
            path: path.clone(),
            source: e,
        })
    }

    /// Read back everything logged for a target. A target that never logged
    /// anything reads as empty rather than failing.
    pub fn read(&self, target: &str) -> Result<String> {
        let handle = self.handle(target);
        let path = lock_recovering(&handle);
        match read_to_string(&*path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::Write {
                path: path.clone(),
                source: e,
            }),
        }
    }

    fn handle(&self, target: &str) -> Arc<Mutex<PathBuf>> {
        let mut targets = lock_recovering_mut(&self.targets);
        targets
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(self.root.join(file_name(target)))))
            .clone()
    }
}

/// Target names come from artifacts and CLI input; keep the file name boring
fn file_name(target: &str) -> String {
    let sanitized = target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();
    format!("{}.log", sanitized)
}

fn lock_recovering<'a, T>(mutex: &'a Arc<Mutex<T>>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_recovering_mut<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
