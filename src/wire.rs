//! Framing used by the browser page: one call or reply per string, fields
//! split by the 0x01 separator.

use thiserror::Error;

use crate::format::{Reply, SEPARATOR};

/// Most parameters a single call may carry, callback id included.
pub const MAX_PARAMS: usize = 4;

/// Prefix the page looks for to tell failures apart from results.
pub const ERROR_PREFIX: &str = "Error: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("missing function name")]
    MissingName,

    #[error("{name}: too many parameters ({count}, max {max})", max = MAX_PARAMS)]
    TooManyParams { name: String, count: usize },
}

/// Split `name\x01callback_id\x01arg...` into a [`Call`].
pub fn parse_message(message: &str) -> Result<Call, WireError> {
    let mut fields = message.split(SEPARATOR);
    let name = fields.next().unwrap_or_default();
    if name.is_empty() {
        return Err(WireError::MissingName);
    }

    let params: Vec<String> = fields.map(str::to_string).collect();
    if params.len() > MAX_PARAMS {
        return Err(WireError::TooManyParams {
            name: name.to_string(),
            count: params.len(),
        });
    }

    Ok(Call {
        name: name.to_string(),
        params,
    })
}

/// Successful replies pass through untouched; failures get [`ERROR_PREFIX`].
pub fn render_reply(reply: &Reply) -> String {
    if reply.is_success() {
        reply.output.clone()
    } else {
        format!("{}{}", ERROR_PREFIX, reply.output)
    }
}

pub fn render_wire_error(err: &WireError) -> String {
    format!("{}{}", ERROR_PREFIX, err)
}
