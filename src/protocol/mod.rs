// src/protocol/mod.rs — Line-delimited JSON protocol spoken with the orchestrator

pub mod codec;
pub mod types;

pub use codec::{decode, encode, write_response};
pub use types::{Kind, Request, Response, ResponseBody, Timing};
