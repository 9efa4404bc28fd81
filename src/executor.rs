//! Issuing a single request and deciding whether it worked.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use log::trace;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::config::RequestSpec;
use crate::Result;

/// Something a worker can call repeatedly to perform one unit of work.
///
/// Implementations must not panic or return early on a bad request; every fault is an
/// [`Outcome::Failure`].
pub trait Execute {
    fn execute(&mut self) -> Outcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(StatusCode),
    Failure(Failure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The server answered, but outside of 2xx/3xx
    Status(StatusCode),
    /// Timeout, DNS, refused connection, TLS, ...
    Error(String),
}

impl Outcome {
    /// 200 through 399 is a success; anything else the server sends back is a failure.
    pub fn from_status(status: StatusCode) -> Outcome {
        match status.as_u16() {
            200..=399 => Outcome::Success(status),
            _ => Outcome::Failure(Failure::Status(status)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(status) | Outcome::Failure(Failure::Status(status)) => {
                write!(f, "{}", status.as_u16())
            }
            Outcome::Failure(Failure::Error(message)) => write!(f, "ERROR: {}", message),
        }
    }
}

/// Executes requests over HTTP(S).
///
/// Each executor owns its own client, and with it its own keep-alive pool, so a worker keeps
/// reusing the connection it opened first.
pub struct HttpExecutor {
    client: Client,
    spec: RequestSpec,
}

impl HttpExecutor {
    pub fn new(spec: &RequestSpec) -> Result<HttpExecutor> {
        // proxies would come from the environment, and pummel doesn't read the environment
        let client = Client::builder()
            .no_proxy()
            .timeout(spec.timeout)
            .connect_timeout(spec.timeout)
            .default_headers(spec.headers.clone())
            .build()?;

        Ok(HttpExecutor {
            client,
            spec: spec.clone(),
        })
    }

    fn send(&self) -> std::result::Result<StatusCode, reqwest::Error> {
        let mut request = self
            .client
            .request(self.spec.method.clone(), self.spec.url.clone());

        if let Some(body) = &self.spec.body {
            request = request.body(body.clone());
        }

        let mut response = request.send()?;
        let status = response.status();

        // the body has to be read off the socket before the connection goes back in the pool
        response.copy_to(&mut io::sink())?;

        Ok(status)
    }
}

impl Execute for HttpExecutor {
    fn execute(&mut self) -> Outcome {
        match self.send() {
            Ok(status) => {
                trace!("{} {} -> {}", self.spec.method, self.spec.url, status);
                Outcome::from_status(status)
            }
            Err(e) => {
                trace!("{} {} -> {:?}", self.spec.method, self.spec.url, e);
                Outcome::Failure(Failure::Error(describe(&e, self.spec.timeout)))
            }
        }
    }
}

/// One line summary of a transport error, including everything in its source chain.
fn describe(err: &reqwest::Error, timeout: Duration) -> String {
    let mut message = if err.is_timeout() {
        format!("timed out after {}", humantime::format_duration(timeout))
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        "request failed".to_string()
    };

    let mut source: Option<&dyn StdError> = Some(err);
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }

    message
}
