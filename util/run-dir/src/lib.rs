// SPDX-License-Identifier: Apache-2.0

//! Scoped run directories for sandboxed executions. Each [`RunDir`] owns a
//! uniquely-named directory under the system temporary directory with owner-only
//! permissions, and removes it when dropped. Input artifacts are staged into the
//! directory under their original base names so a backend can assume co-located
//! inputs.

#![deny(clippy::unwrap_used)]
#![forbid(unsafe_code)]

use anyhow::{anyhow, bail, ensure, Result};
use derive_builder::Builder;
#[cfg(unix)]
use libc::S_IFDIR;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
#[cfg(unix)]
use std::os::unix::prelude::PermissionsExt;

use std::{
    env::temp_dir,
    fs::{copy, create_dir_all, remove_dir_all, set_permissions, Permissions},
    path::{Path, PathBuf},
};

#[derive(Builder, Debug)]
#[builder(build_fn(skip))]
/// An exclusively-owned run directory
pub struct RunDir {
    #[builder(setter(into))]
    /// A prefix identifying the owner of the directory, prepended to the generated
    /// unique name
    prefix: String,
    /// Whether the directory is removed when the [`RunDir`] is dropped. Defaults to
    /// true; a run directory that outlives its run is a leak.
    remove_on_drop: bool,
    #[builder(setter(skip))]
    /// The resulting path to the run directory
    path: PathBuf,
    #[builder(setter(into))]
    /// The maximum number of attempts to generate a non-colliding directory name
    tries: usize,
    #[builder(setter(into))]
    /// The number of random characters in the unique component of the directory name
    random_len: usize,
    #[builder(setter(into))]
    /// Permissions to set on the created directory. No effect on non-unix platforms.
    permissions: u32,
}

impl RunDir {
    const DEFAULT_REMOVE_ON_DROP: bool = true;
    const DEFAULT_TRIES: usize = 32;
    const DEFAULT_RANDOM_LEN: usize = 8;
    const DEFAULT_PERMISSIONS: u32 = 0o40700;
    const DEFAULT_PREFIX: &'static str = "run";

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn remove_on_drop(&mut self, remove_on_drop: bool) {
        self.remove_on_drop = remove_on_drop;
    }

    /// Copy an input artifact into the run directory under its base name and return
    /// the staged path
    pub fn stage<P>(&self, artifact: P) -> Result<PathBuf>
    where
        P: AsRef<Path>,
    {
        let artifact = artifact.as_ref();
        let name = artifact
            .file_name()
            .ok_or_else(|| anyhow!("Artifact {} has no base name", artifact.display()))?;
        let staged = self.path.join(name);
        copy(artifact, &staged).map_err(|e| {
            anyhow!(
                "Failed to stage {} into {}: {}",
                artifact.display(),
                self.path.display(),
                e
            )
        })?;
        Ok(staged)
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        if self.remove_on_drop {
            // Best-effort: a removal failure must not abort an unwinding run
            let _ = remove_dir_all(&self.path);
        }
    }
}

impl RunDirBuilder {
    pub fn build(&mut self) -> Result<RunDir> {
        #[cfg(unix)]
        let permissions =
            Permissions::from_mode(self.permissions.unwrap_or(RunDir::DEFAULT_PERMISSIONS));
        #[cfg(unix)]
        ensure!(
            permissions.mode() & S_IFDIR != 0,
            "Permissions for directory must have directory bit ({:#o}) set (got {:#o})",
            S_IFDIR,
            permissions.mode()
        );

        #[cfg(not(unix))]
        compile_error!("Non-unix-like operating systems are not supported because run directory permissions cannot be set securely");

        let prefix = self
            .prefix
            .clone()
            .unwrap_or(RunDir::DEFAULT_PREFIX.to_owned());
        let tries = self.tries.unwrap_or(RunDir::DEFAULT_TRIES);
        let random_len = self.random_len.unwrap_or(RunDir::DEFAULT_RANDOM_LEN);

        for _ in 0..tries {
            let name = format!(
                "{}.{}",
                prefix,
                thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(random_len)
                    .map(char::from)
                    .collect::<String>(),
            );
            let path = temp_dir().join(name);
            if let Err(e) = create_dir_all(&path) {
                match e.kind() {
                    std::io::ErrorKind::AlreadyExists => {
                        continue;
                    }
                    _ => bail!("Could not create run directory. Unrecoverable error: {}", e),
                }
            } else {
                return if let Err(e) = set_permissions(&path, permissions) {
                    remove_dir_all(&path).map_err(|ee| {
                        anyhow!(
                            "Failed to remove directory with err: {} after failing to set permissions: {}",
                            ee,
                            e
                        )
                    })?;
                    Err(e.into())
                } else {
                    Ok(RunDir {
                        prefix,
                        remove_on_drop: self
                            .remove_on_drop
                            .unwrap_or(RunDir::DEFAULT_REMOVE_ON_DROP),
                        path,
                        tries,
                        random_len,
                        permissions: self.permissions.unwrap_or(RunDir::DEFAULT_PERMISSIONS),
                    })
                };
            }
        }

        bail!("Unable to generate a unique run directory name in {} attempts", tries);
    }
}
