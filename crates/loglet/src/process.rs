use std::{ffi::OsString, path::Path, time::Duration};

use journal_export::Cursor;
use tokio::process::{Child, Command};

use crate::follower::FollowError;

/// Arguments for a following `journalctl` in export format.
///
/// With a saved cursor the journal resumes strictly after it without replaying the tail;
/// without one only entries written from now on are emitted.
pub(crate) fn journalctl_args(cursor: Option<&Cursor>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--output".into(), "export".into(), "--follow".into()];
    match cursor {
        Some(cursor) => {
            args.push("--no-tail".into());
            args.push("--after-cursor".into());
            args.push(cursor.as_str().into());
        }
        None => args.push("--lines=0".into()),
    }
    args
}

pub(crate) fn spawn_with_retry(command: &mut Command, binary: &Path) -> Result<Child, FollowError> {
    const ATTEMPTS: u32 = 5;

    let mut backoff = Duration::from_millis(2);
    let mut attempt = 1;
    loop {
        let source = match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => source,
        };

        // ETXTBSY: the binary is still open for writing, typically a freshly written script in
        // tests.
        let is_busy = cfg!(unix) && source.raw_os_error() == Some(26);
        if !is_busy || attempt == ATTEMPTS {
            return Err(FollowError::Spawn {
                binary: binary.to_path_buf(),
                source,
            });
        }

        std::thread::sleep(backoff);
        backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
        attempt += 1;
    }
}
