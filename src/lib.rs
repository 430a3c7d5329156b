// src/lib.rs — Library root for futhark-tool

pub mod cli;
pub mod core;
pub mod infra;
pub mod problems;
pub mod protocol;
pub mod worker;
