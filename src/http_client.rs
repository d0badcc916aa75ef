//! Shared ureq agent plus size-capped body reading and retry helpers.

use std::error::Error as _;
use std::io::{self, Read};
use std::time::Duration;

/// Socket timeouts applied to every request issued through an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AgentTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

/// How often and how patiently to repeat a failed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Total calls allowed, the first one included.
    pub attempts: usize,
    /// Pause after the first failure; doubles after each further failure.
    pub initial_delay: Duration,
    pub delay_cap: Duration,
}

impl RetryPolicy {
    /// Run `call` until it succeeds, the attempts are used up, or it fails with
    /// an error `retryable` rejects.
    pub(crate) fn run<T, E>(
        &self,
        mut call: impl FnMut() -> Result<T, E>,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E> {
        let attempts = self.attempts.max(1);
        let mut failures = 0usize;
        loop {
            let err = match call() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            failures += 1;
            if failures >= attempts || !retryable(&err) {
                return Err(err);
            }
            let pause = self.pause_after(failures);
            tracing::debug!(attempt = failures, ?pause, "Retrying after transport failure");
            std::thread::sleep(pause);
        }
    }

    fn pause_after(&self, failures: usize) -> Duration {
        let doublings = u32::try_from(failures.saturating_sub(1))
            .unwrap_or(u32::MAX)
            .min(31);
        self.initial_delay
            .saturating_mul(1u32 << doublings)
            .min(self.delay_cap)
    }
}

pub(crate) fn build_agent(timeouts: AgentTimeouts) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeouts.connect)
        .timeout_read(timeouts.read)
        .timeout_write(timeouts.write)
        .user_agent(concat!("atmos/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Body of `response`, refusing anything larger than `limit` bytes.
///
/// A declared `Content-Length` over the limit fails before any byte is read.
pub(crate) fn read_capped(response: ureq::Response, limit: usize) -> io::Result<Vec<u8>> {
    let declared = response
        .header("Content-Length")
        .and_then(|value| value.trim().parse::<u64>().ok());
    if let Some(declared) = declared.filter(|len| *len > limit as u64) {
        return Err(too_large(format!(
            "declared body of {declared} bytes exceeds the {limit} byte limit"
        )));
    }
    let mut body = Vec::new();
    response
        .into_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut body)?;
    if body.len() > limit {
        return Err(too_large(format!("body exceeds the {limit} byte limit")));
    }
    Ok(body)
}

/// [`read_capped`] for UTF-8 bodies, with errors flattened to text.
pub(crate) fn read_capped_text(response: ureq::Response, limit: usize) -> Result<String, String> {
    let body = read_capped(response, limit).map_err(|err| err.to_string())?;
    String::from_utf8(body).map_err(|err| format!("body is not UTF-8: {err}"))
}

/// True when a transport failure was caused by a socket timeout.
pub(crate) fn is_timeout(transport: &ureq::Transport) -> bool {
    if transport.kind() != ureq::ErrorKind::Io {
        return false;
    }
    transport
        .source()
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|io_err| {
            matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        })
}

fn too_large(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
