//! Conversion of PuTTY `.ppk` private keys to OpenSSH format.
//!
//! The converted key only lives as long as the returned [`TempKey`]: dropping it
//! deletes the file, whichever way the connection attempt ends.

use std::{
    fmt, io,
    path::Path,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tempfile::TempPath;
use tokio::{process::Command, time::timeout};

/// Converts a key file to something `ssh -i` accepts.
pub trait KeyConverter {
    fn convert(&self, ppk: &Path) -> Result<TempKey, ConvertError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("'{0}' not found. Run: sudo apt install putty-tools")]
    MissingProgram(String),

    #[error("key conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error("puttygen failed ({status}): {message}")]
    Failed { status: ExitStatus, message: String },

    #[error("key conversion error: {0}")]
    Io(#[from] io::Error),
}

/// A converted private key on disk, removed when dropped.
pub struct TempKey {
    path: TempPath,
}

impl TempKey {
    pub fn new(path: TempPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for TempKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TempKey").field(&self.path()).finish()
    }
}

/// Runs `puttygen <ppk> -O private-openssh -o <tmp>` with a deadline.
#[derive(Debug, Clone)]
pub struct Puttygen {
    program: String,
    timeout: Duration,
}

impl Puttygen {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, ppk: &Path, target: &Path) -> Result<std::process::Output, ConvertError> {
        let child = Command::new(&self.program)
            .arg(ppk)
            .args(["-O", "private-openssh", "-o"])
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match timeout(self.timeout, child).await {
            Err(_) => Err(ConvertError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                Err(ConvertError::MissingProgram(self.program.clone()))
            }
            Ok(result) => Ok(result?),
        }
    }
}

impl KeyConverter for Puttygen {
    fn convert(&self, ppk: &Path) -> Result<TempKey, ConvertError> {
        let target = tempfile::Builder::new()
            .prefix("puttymux-")
            .suffix(".key")
            .tempfile()?
            .into_temp_path();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let output = rt.block_on(self.run(ppk, &target))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(ConvertError::Failed {
                status: output.status,
                message: message.trim().to_string(),
            });
        }

        restrict_permissions(&target)?;
        Ok(TempKey::new(target))
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
