//! Rendering of command results into the caller-facing string shapes.

use crate::error::FluxError;

/// Field separator between the callback id and the payload.
pub const SEPARATOR: char = '\u{1}';

/// Outcome of one command: a status code (`0` on success) and the output string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: i32,
    pub output: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Build `callback_id + SEPARATOR + payload`.
///
/// The buffer is reserved up front at its exact size; if that fails the
/// success is replaced by the out-of-memory diagnostic.
pub fn format_success(callback_id: &str, payload: &str) -> Reply {
    let len = callback_id
        .len()
        .checked_add(SEPARATOR.len_utf8())
        .and_then(|n| n.checked_add(payload.len()));

    match len.ok_or(FluxError::OutOfMemory).and_then(reserve) {
        Ok(mut output) => {
            output.push_str(callback_id);
            output.push(SEPARATOR);
            output.push_str(payload);
            Reply { status: 0, output }
        }
        Err(err) => format_failure(&err),
    }
}

/// Render a failure as a bare diagnostic, no callback id.
pub fn format_failure(err: &FluxError) -> Reply {
    Reply {
        status: err.status_code(),
        output: err.to_string(),
    }
}

/// Like [`format_failure`], but with the command name leading the message.
pub fn format_command_failure(command: &str, err: &FluxError) -> Reply {
    Reply {
        status: err.status_code(),
        output: format!("{}: {}", command, err),
    }
}

fn reserve(len: usize) -> Result<String, FluxError> {
    let mut buf = String::new();
    buf.try_reserve_exact(len)
        .map_err(|_| FluxError::OutOfMemory)?;
    Ok(buf)
}
