//! # Tool for HTTP load testing
//!
//! `pummel` sends a fixed number of HTTP requests to one URL from a fixed number of threads, and
//! tells you how many worked and how fast it went. If you're interested in reading the code, go
//! check out `coordinator.rs` for the interesting part!
//!
//! This library is used internally by the main.rs binary and the tests, and is not intended for
//! general use in other projects.
//!
//! ## Examples
//!
//! ```no_run
//! # use std::time::Duration;
//! # use pummel::{Coordinator, ConfigBuilder};
//! # fn main() -> pummel::Result<()> {
//! let config = ConfigBuilder::parse("http://localhost:8000/")?
//!     .threads(10)
//!     .requests(1000)
//!     .timeout(Duration::from_secs(2))
//!     .build();
//!
//! let coordinator = Coordinator::new(config);
//! let result = coordinator.run(&mut std::io::stdout())?;
//! print!("{}", result);
//! # Ok(())
//! # }
//! ```
//!
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod shutdown;
pub mod stats;
pub mod work;
pub mod worker;

pub use config::{parse_headers, Config, ConfigBuilder, RequestSpec};
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use executor::{Execute, Failure, HttpExecutor, Outcome};
pub use shutdown::{install_interrupt_handler, StopSignal};
pub use stats::{Counters, RunResult, Stats};
pub use work::WorkQueue;
pub use worker::{Exit, Progress, Worker};

use std::path::Path;

use log::LevelFilter;

/// Log to stderr, and to `log_file` if there is one. Stdout belongs to the progress lines.
pub fn setup_logger(log_level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;

    Ok(())
}
