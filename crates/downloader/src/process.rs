//! Child-process helpers.
//!
//! The host is launched headless by the browser; on Windows a spawned
//! encoder or helper must not flash a console window.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Build a `tokio` command with platform-appropriate window suppression.
pub fn background_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    #[allow(unused_mut)]
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Ask a child to terminate. On unix this is SIGTERM so the process can
/// clean up partial output; elsewhere it is a hard kill.
pub async fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            return;
        }
    }
    let _ = child.kill().await;
}
