use std::path::Path;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::AgentError;

/// Spawns `command`, retrying on `ETXTBSY` (a binary mid-(re)write race) with
/// exponential backoff starting at 2ms and capped at 50ms, up to 5 attempts.
pub(crate) fn spawn_with_retry(command: &mut Command, binary: &Path) -> Result<Child, AgentError> {
    let mut backoff = Duration::from_millis(2);
    for attempt in 0..5 {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                let is_busy = matches!(source.kind(), std::io::ErrorKind::ExecutableFileBusy)
                    || source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(AgentError::Spawn {
                    binary: binary.to_path_buf(),
                    source,
                });
            }
        }
    }

    unreachable!("spawn_with_retry should return before exhausting retries")
}
