use std::time::Duration;

use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};

use crate::{Error, Result};

/// Runs asking for more requests than this are suspicious...
pub const MAX_REQUESTS: usize = 100_000;
/// ...and are rejected if `threads * requests` is also over this.
pub const MAX_VOLUME: usize = 1_000_000;
/// Past this many workers the run gets a warning about OS thread usage.
pub const MANY_WORKERS: usize = 1_000;

/// Everything a worker needs to issue one request. Built once before the run and never mutated
/// afterwards; each worker gets its own copy.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: Url,
    pub method: Method,
    /// Header names are case-insensitive; the last duplicate wins.
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Upper bound on a single request, connect through to the last body byte.
    pub timeout: Duration,
    /// Pause each worker takes after every request. Zero means no pause.
    pub delay: Duration,
}

impl RequestSpec {
    pub fn new(url: Url) -> RequestSpec {
        RequestSpec {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(10),
            delay: Duration::default(),
        }
    }
}

/// Settings for the load test
#[derive(Debug, Clone)]
pub struct Config {
    pub spec: RequestSpec,
    /// Number of OS threads issuing requests. 0 becomes num_cpus.
    ///
    /// Each worker also owns an HTTP client with a runtime thread of its own, so the process runs
    /// roughly twice this many threads.
    pub threads: usize,
    /// Absolute number of requests to be made, shared by all threads.
    pub requests: usize,
    /// How long shutdown waits for in-flight requests before detaching the workers. This is one
    /// deadline for the whole pool, not per worker.
    pub join_timeout: Duration,
}

impl Config {
    pub fn new(url: Url) -> Config {
        Config {
            spec: RequestSpec::new(url),
            threads: 4,
            requests: 20,
            join_timeout: Duration::from_secs(1),
        }
    }

    /// Number of user-defined threads, or all the threads on the host.
    pub fn num_threads(&self) -> usize {
        match self.threads {
            0 => num_cpus::get(),
            n => n,
        }
    }

    /// Number of workers actually worth starting. A worker beyond the request count would find
    /// the queue empty on its first iteration.
    pub fn num_workers(&self) -> usize {
        self.num_threads().min(self.requests)
    }

    /// Whether there are enough workers for the thread count to be worth a warning.
    pub fn many_workers(&self) -> bool {
        self.num_workers() > MANY_WORKERS
    }

    /// Refuse runs that look like an accidental flood.
    pub fn check_guardrail(&self) -> Result<()> {
        let threads = self.num_threads();
        let requests = self.requests;

        if requests > MAX_REQUESTS && threads.saturating_mul(requests) > MAX_VOLUME {
            return Err(Error::Guardrail { threads, requests });
        }

        Ok(())
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(url: Url) -> ConfigBuilder {
        ConfigBuilder {
            config: Config::new(url),
        }
    }

    /// Parse `url` and start a builder for it.
    pub fn parse(url: &str) -> Result<ConfigBuilder> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("url '{}': {}", url, e)))?;

        Ok(ConfigBuilder::new(url))
    }

    /// Consume the builder and return the inner object
    pub fn build(self) -> Config {
        self.config
    }

    pub fn threads(mut self, threads: usize) -> ConfigBuilder {
        self.config.threads = threads;
        self
    }

    pub fn requests(mut self, requests: usize) -> ConfigBuilder {
        self.config.requests = requests;
        self
    }

    pub fn join_timeout(mut self, join_timeout: Duration) -> ConfigBuilder {
        self.config.join_timeout = join_timeout;
        self
    }

    pub fn method(mut self, method: Method) -> ConfigBuilder {
        self.config.spec.method = method;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> ConfigBuilder {
        self.config.spec.headers = headers;
        self
    }

    pub fn body(mut self, body: Option<String>) -> ConfigBuilder {
        self.config.spec.body = body;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> ConfigBuilder {
        self.config.spec.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> ConfigBuilder {
        self.config.spec.delay = delay;
        self
    }
}

/// Turn `"Name: Value"` strings into a header map.
///
/// Entries without a colon are skipped silently. Entries whose name or value isn't a legal HTTP
/// header are skipped with a warning. Later entries replace earlier ones with the same
/// (case-insensitive) name.
pub fn parse_headers<I, S>(raw: I) -> HeaderMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut headers = HeaderMap::new();

    for entry in raw {
        let entry = entry.as_ref();
        let (name, value) = match entry.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };

        let name = match HeaderName::from_bytes(name.trim().as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                warn!("dropping header '{}': {}", entry, e);
                continue;
            }
        };

        let value = match HeaderValue::from_str(value.trim()) {
            Ok(value) => value,
            Err(e) => {
                warn!("dropping header '{}': {}", entry, e);
                continue;
            }
        };

        headers.insert(name, value);
    }

    headers
}

/// Upper-case `method` and check that it's a valid HTTP method token.
pub fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.trim().to_uppercase().as_bytes())
        .map_err(|_| Error::Config(format!("method '{}' is not a valid HTTP method", method)))
}

/// Convert a CLI seconds value into a `Duration`. Negative, NaN and infinite values are rejected.
pub fn seconds(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::Config(format!(
            "{} must be a finite, non-negative number of seconds (got {})",
            name, secs
        )));
    }

    Ok(Duration::from_secs_f64(secs))
}

/// Like [`seconds`], but zero is rejected too.
pub fn positive_seconds(name: &str, secs: f64) -> Result<Duration> {
    match seconds(name, secs)? {
        d if d == Duration::default() => Err(Error::Config(format!(
            "{} must be greater than zero",
            name
        ))),
        d => Ok(d),
    }
}
