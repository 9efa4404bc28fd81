//! Error types for pummel
//!
//! Only setup can fail. Once workers are running, every per-request fault is an
//! [`Outcome::Failure`](crate::executor::Outcome) instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The requested volume is over the safety ceiling
    #[error(
        "requested number of requests is very large ({requests} requests, {threads} threads); aborting for safety"
    )]
    Guardrail { threads: usize, requests: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to set up logging: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("failed to install interrupt handler: {0}")]
    Interrupt(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
