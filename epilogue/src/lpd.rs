//! `lpd`
//!
//! A minimal Line Printer Daemon client, just enough to hand one job to the
//! engraver's print queue.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{error::LpdStage, pcl::ComposedJob, DeliveryError, JobConfig};

/// The well known "printer" port.
pub const LPD_PORT: u16 = 515;

/// Where and how persistently to deliver a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterTarget {
    /// Host name or address of the engraver.
    pub host: String,
    /// The print queue, engravers accept any.
    pub queue: String,
    /// TCP port.
    pub port: u16,
    /// Rounds of resolve and connect before giving up.
    pub max_attempts: u32,
    /// Pause between rounds, in milliseconds.
    pub retry_interval_ms: u64,
    /// Longest one round of resolve and connect may take, in milliseconds.
    pub attempt_timeout_ms: u64,
    /// Name we give for ourselves, defaults to the short local hostname.
    pub client_host: Option<String>,
}

impl Default for PrinterTarget {
    fn default() -> Self {
        PrinterTarget {
            host: "localhost".to_string(),
            queue: String::new(),
            port: LPD_PORT,
            max_attempts: 300,
            retry_interval_ms: 1000,
            attempt_timeout_ms: 60_000,
            client_host: None,
        }
    }
}

impl PrinterTarget {
    /// Gets the pause between connection rounds.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Gets the limit on one round of resolve and connect.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// Gets the local hostname, cut at the first `.`.
///
/// # Returns
/// The short hostname, or `localhost` if it cannot be read.
pub fn local_hostname() -> String {
    short_hostname(&gethostname::gethostname().to_string_lossy())
}

/// Cuts a hostname at the first `.`.
///
/// # Returns
/// The short name, or `localhost` for an empty name.
fn short_hostname(name: &str) -> String {
    match name.split('.').next() {
        Some(short) if !short.is_empty() => short.to_string(),
        _ => "localhost".to_string(),
    }
}

/// Turns a job name into the identifier used to name the LPD files.
///
/// # Arguments
/// * `job_name`: The job name.
///
/// # Returns
/// The job name with whitespace replaced by `_`.
pub fn job_identifier(job_name: &str) -> String {
    job_name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Builds the LPD control file for a job.
///
/// # Arguments
/// * `client_host`: Our hostname.
/// * `job_id`: The job identifier.
/// * `user`: The user submitting the job.
/// * `title`: The job title.
///
/// # Returns
/// The control file, without its terminating NUL.
pub fn control_block(client_host: &str, job_id: &str, user: &str, title: &str) -> String {
    [
        format!("H{client_host}\n"),
        format!("P{user}\n"),
        format!("J{title}\n"),
        format!("ldfA{job_id}{client_host}\n"),
        format!("UdfA{job_id}{client_host}\n"),
        format!("N{title}\n"),
    ]
    .join("")
}

/// Resolves a host on a helper thread, giving up after a timeout.
///
/// A lookup that times out is abandoned, its thread finishes on its own.
///
/// # Returns
/// The candidate addresses, or `None` if resolution failed or timed out.
fn resolve(host: &str, port: u16, timeout: Duration) -> Option<Vec<SocketAddr>> {
    let (tx, rx) = oneshot::channel();
    let target = (host.to_string(), port);
    let spawned = thread::Builder::new()
        .name("lpd-resolve".to_string())
        .spawn(move || {
            let addrs = target
                .to_socket_addrs()
                .map(Iterator::collect::<Vec<_>>);
            // nobody is listening if the lookup timed out
            let _ = tx.send(addrs);
        });
    if let Err(err) = spawned {
        warn!("Cannot start resolver for {host}: {err}");
        return None;
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(addrs)) => Some(addrs),
        Ok(Err(err)) => {
            debug!("Cannot resolve {host}: {err}");
            None
        }
        Err(_) => {
            warn!("Resolving {host} timed out after {timeout:?}");
            None
        }
    }
}

/// Connects to the first candidate address that accepts before a deadline.
///
/// # Returns
/// The connection, or `None` if no address accepted in time.
fn connect_within(addrs: &[SocketAddr], deadline: Instant) -> Option<TcpStream> {
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("Out of time connecting to {addr}");
            return None;
        }

        debug!("trying to connect to {addr}");
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(stream) => return Some(stream),
            Err(err) => debug!("{addr}: {err}"),
        }
    }
    None
}

/// Connects to the engraver, retrying whole rounds of resolve and connect.
/// Each round shares one deadline between the lookup and every connection
/// attempt.
///
/// # Errors
/// [`DeliveryError::ConnectExhausted`] once every round has failed.
fn connect(target: &PrinterTarget) -> Result<TcpStream, DeliveryError> {
    let attempts = target.max_attempts.max(1);
    for attempt in 1..=attempts {
        let deadline = Instant::now() + target.attempt_timeout();
        if let Some(addrs) = resolve(&target.host, target.port, target.attempt_timeout()) {
            if let Some(stream) = connect_within(&addrs, deadline) {
                return Ok(stream);
            }
        }

        if attempt < attempts {
            thread::sleep(target.retry_interval());
        }
    }

    error!("Cannot connect to {}", target.host);
    Err(DeliveryError::ConnectExhausted {
        host: target.host.clone(),
        attempts,
    })
}

/// One conversation with the engraver's print queue.
pub struct DeliverySession {
    /// The host we are talking to.
    host: String,
    /// The connection.
    stream: TcpStream,
    /// Our hostname, part of every file name.
    client_host: String,
    /// The job identifier, part of every file name.
    job_id: String,
}

impl DeliverySession {
    /// Connects to the engraver.
    ///
    /// # Arguments
    /// * `target`: Where to deliver the job.
    /// * `job_name`: The job name, used to name the LPD files.
    ///
    /// # Returns
    /// A session ready to start the job.
    ///
    /// # Errors
    /// [`DeliveryError::ConnectExhausted`] if the engraver could not be reached.
    pub fn connect(target: &PrinterTarget, job_name: &str) -> Result<Self, DeliveryError> {
        let stream = connect(target)?;
        Ok(DeliverySession {
            host: target.host.clone(),
            stream,
            client_host: target.client_host.clone().unwrap_or_else(local_hostname),
            job_id: job_identifier(job_name),
        })
    }

    /// Wraps an I/O error with the host.
    fn io_error(&self, source: io::Error) -> DeliveryError {
        DeliveryError::Io {
            host: self.host.clone(),
            source,
        }
    }

    /// Writes bytes to the engraver.
    fn write(&mut self, bytes: &[u8]) -> Result<(), DeliveryError> {
        self.stream
            .write_all(bytes)
            .map_err(|source| self.io_error(source))
    }

    /// Reads the acknowledgement for a step, which must be zero.
    ///
    /// # Errors
    /// [`DeliveryError::Rejected`] for a non-zero acknowledgement.
    fn acknowledge(&mut self, stage: LpdStage) -> Result<(), DeliveryError> {
        let mut code = [0u8];
        self.stream
            .read_exact(&mut code)
            .map_err(|source| self.io_error(source))?;

        if code[0] != 0 {
            error!("Bad response from {}, {}", self.host, code[0]);
            return Err(DeliveryError::Rejected {
                host: self.host.clone(),
                stage,
                code: code[0],
            });
        }
        debug!("{stage} accepted");
        Ok(())
    }

    /// Asks the engraver to receive a job for a queue.
    ///
    /// # Errors
    /// Any [`DeliveryError`], after which nothing more should be sent.
    pub fn receive_job(&mut self, queue: &str) -> Result<(), DeliveryError> {
        self.write(format!("\x02{queue}\n").as_bytes())?;
        self.acknowledge(LpdStage::ReceiveJob)
    }

    /// Announces and sends the control file.
    ///
    /// # Arguments
    /// * `user`: The user submitting the job.
    /// * `title`: The job title.
    ///
    /// # Errors
    /// Any [`DeliveryError`], after which nothing more should be sent.
    pub fn send_control(&mut self, user: &str, title: &str) -> Result<(), DeliveryError> {
        let block = control_block(&self.client_host, &self.job_id, user, title);
        let announce = format!(
            "\x02{} cfA{}{}\n",
            block.len(),
            self.job_id,
            self.client_host
        );
        self.write(announce.as_bytes())?;
        self.acknowledge(LpdStage::ControlAnnounce)?;

        self.write(block.as_bytes())?;
        self.write(&[0])?;
        self.acknowledge(LpdStage::ControlFile)
    }

    /// Announces and sends the job itself.
    ///
    /// # Errors
    /// Any [`DeliveryError`].
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), DeliveryError> {
        let announce = format!(
            "\x03{} dfA{}{}\n",
            data.len(),
            self.job_id,
            self.client_host
        );
        info!("job '{}': size {}", self.job_id, data.len());
        self.write(announce.as_bytes())?;
        self.acknowledge(LpdStage::DataAnnounce)?;

        self.write(data)?;
        self.stream.flush().map_err(|source| self.io_error(source))
    }

    /// Closes the connection without waiting for the engraver to reply.
    pub fn close(self) {
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            warn!("Error closing connection to {}: {err}", self.host);
        }
    }
}

/// Delivers a composed job to the engraver.
///
/// # Arguments
/// * `target`: Where to deliver the job.
/// * `job`: The job.
/// * `config`: The job settings, for the job name, user and title.
///
/// # Errors
/// Any [`DeliveryError`]. Failed jobs are never resubmitted.
pub fn send(
    target: &PrinterTarget,
    job: &ComposedJob,
    config: &JobConfig,
) -> Result<(), DeliveryError> {
    debug!("printer host: '{}'", target.host);
    let mut session = DeliverySession::connect(target, &config.job_name)?;
    session.receive_job(&target.queue)?;
    session.send_control(&config.job_user, config.title())?;
    session.send_data(job.as_bytes())?;
    session.close();

    info!("Sent {} bytes to {}", job.len(), target.host);
    Ok(())
}
