//! Message names and their classification.
//!
//! Incoming messages are classified once, by name, into [`Incoming`]. Every
//! consumer downstream matches on the variant instead of looking at the name
//! again.

use crate::error::ProtocolError;
use crate::message::Message;

/// Well-known message names.
pub mod names {
    /// Sent once on start: `[protocol_version, host_name, host_version]`.
    pub const HELLO: &str = "!evalhost";
    /// Shutdown, in either direction.
    pub const END: &str = "!End";
    /// Cancel an evaluation: `[eval_id | null]`.
    pub const CANCEL: &str = "!/";
    /// A cancel-everything request has finished unwinding.
    pub const CANCELED_ALL: &str = "!CanceledAll";
    /// Store the trailing blob, respond with `[handle]`.
    pub const CREATE_BLOB: &str = "?CreateBlob";
    /// `[handle]`, respond with the blob as trailing bytes.
    pub const GET_BLOB: &str = "?GetBlob";
    /// `[handle, ...]`.
    pub const DESTROY_BLOB: &str = "!DestroyBlob";
    /// Console output: `[text]`.
    pub const OUTPUT: &str = "!";
    /// Console input: `[prompt]`, response `[text | null]`.
    pub const READ_INPUT: &str = "?>";
    /// Prefix of evaluation requests; flags follow.
    pub const EVAL_PREFIX: &str = "?=";
}

/// Environment an evaluation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvSelector {
    #[default]
    Global,
    Base,
    Empty,
}

/// Flags carried in the name of an evaluation request, after `?=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvalFlags {
    /// `B` or `E`; global when absent.
    pub env: EnvSelector,
    /// `N`: evaluate in a fresh child of `env`.
    pub new_env: bool,
    /// `@`: queued evaluations may run nested inside this one.
    pub reentrant: bool,
    /// `/`: this evaluation may be canceled.
    pub cancelable: bool,
    /// `0`: do not send the value back.
    pub no_result: bool,
    /// `r`: send the value back as a blob rather than JSON.
    pub raw: bool,
}

impl EvalFlags {
    /// Parse the flags of an evaluation request named `name`.
    pub fn parse(name: &str) -> Result<EvalFlags, ProtocolError> {
        let flags = name.strip_prefix(names::EVAL_PREFIX).unwrap_or_default();
        let mut result = EvalFlags::default();
        let mut env = None;

        for flag in flags.chars() {
            match flag {
                'B' | 'E' => {
                    if env.is_some() {
                        return Err(ProtocolError::ConflictingEnvironment(name.to_string()));
                    }
                    env = Some(if flag == 'B' {
                        EnvSelector::Base
                    } else {
                        EnvSelector::Empty
                    });
                }
                'N' => result.new_env = true,
                '@' => result.reentrant = true,
                '/' => result.cancelable = true,
                '0' => result.no_result = true,
                'r' => result.raw = true,
                flag => {
                    return Err(ProtocolError::UnrecognizedEvalFlag {
                        name: name.to_string(),
                        flag,
                    })
                }
            }
        }

        result.env = env.unwrap_or_default();
        Ok(result)
    }
}

/// What an incoming message asks of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    Response,
    Shutdown,
    Cancel,
    CreateBlob,
    GetBlob,
    DestroyBlob,
    Eval(EvalFlags),
}

impl Incoming {
    pub fn classify(message: &Message) -> Result<Incoming, ProtocolError> {
        let name = message.name();
        if name.starts_with(':') {
            let correlation_id = message.correlation_id();
            if correlation_id == 0 || correlation_id == crate::REQUEST_MARKER {
                return Err(ProtocolError::UncorrelatedResponse {
                    id: message.id(),
                    name: name.to_string(),
                });
            }
            return Ok(Incoming::Response);
        }

        match name {
            names::END => Ok(Incoming::Shutdown),
            names::CANCEL => Ok(Incoming::Cancel),
            names::CREATE_BLOB => Ok(Incoming::CreateBlob),
            names::GET_BLOB => Ok(Incoming::GetBlob),
            names::DESTROY_BLOB => Ok(Incoming::DestroyBlob),
            _ if name.starts_with(names::EVAL_PREFIX) => EvalFlags::parse(name).map(Incoming::Eval),
            _ => Err(ProtocolError::UnrecognizedMessage(name.to_string())),
        }
    }
}
