//! beanstalkd client.
//!
//! Implements the subset of the beanstalkd text protocol the pipeline needs:
//! `use`, `watch`, `ignore`, `put`, `reserve` and `delete`. Commands and
//! replies are CRLF-terminated lines; job bodies follow their header line as
//! `<bytes>` raw bytes plus a trailing CRLF.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use super::{QueueError, QueueSettings, ReservedJob, WorkQueue};

/// Priority used for every put (beanstalkc's default, 2^31)
pub const DEFAULT_PRIORITY: u32 = 1 << 31;

/// Longest tube name the server accepts
const MAX_TUBE_NAME: usize = 200;

/// Largest job body beanstalkd can be configured to accept (`-z`)
const MAX_JOB_SIZE: usize = 1 << 30;

/// Tube every new connection watches
const DEFAULT_SERVER_TUBE: &str = "default";

/// beanstalkd connection over any byte stream
pub struct BeanstalkClient<S = TcpStream> {
    stream: BufReader<S>,
}

impl BeanstalkClient<TcpStream> {
    /// Open a TCP connection to `addr` (host:port)
    pub async fn connect(addr: &str) -> Result<Self, QueueError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| QueueError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        debug!(%addr, "Connected to beanstalkd");
        Ok(Self::new(stream))
    }

    /// Connect and select the tube new jobs are put into
    pub async fn open_producer(settings: &QueueSettings) -> Result<Self, QueueError> {
        let mut client = Self::connect(&settings.address).await?;
        client.use_tube(&settings.tube).await?;
        Ok(client)
    }

    /// Connect, watch the job tube and stop watching `default`
    pub async fn open_consumer(settings: &QueueSettings) -> Result<Self, QueueError> {
        let mut client = Self::connect(&settings.address).await?;
        client.watch(&settings.tube).await?;
        if settings.tube != DEFAULT_SERVER_TUBE {
            client.ignore(DEFAULT_SERVER_TUBE).await?;
        }
        Ok(client)
    }
}

impl<S> BeanstalkClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), QueueError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<String, QueueError> {
        let mut line = String::new();
        if self.stream.read_line(&mut line).await? == 0 {
            return Err(QueueError::Closed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Send a single-line command and read its one-line reply
    async fn command(&mut self, command: &str) -> Result<String, QueueError> {
        self.send(format!("{}\r\n", command).as_bytes()).await?;
        self.read_reply().await
    }

    /// Select the tube subsequent puts go to
    pub async fn use_tube(&mut self, tube: &str) -> Result<(), QueueError> {
        validate_tube(tube)?;
        let command = format!("use {}", tube);
        let reply = self.command(&command).await?;

        match reply.strip_prefix("USING ") {
            Some(name) if name == tube => Ok(()),
            _ => Err(unexpected(&command, reply)),
        }
    }

    /// Add a tube to the watch list; returns the number of watched tubes
    pub async fn watch(&mut self, tube: &str) -> Result<u32, QueueError> {
        validate_tube(tube)?;
        let command = format!("watch {}", tube);
        let reply = self.command(&command).await?;
        parse_watching(&command, reply)
    }

    /// Remove a tube from the watch list; returns the number still watched
    pub async fn ignore(&mut self, tube: &str) -> Result<u32, QueueError> {
        validate_tube(tube)?;
        let command = format!("ignore {}", tube);
        let reply = self.command(&command).await?;
        parse_watching(&command, reply)
    }

    /// Put a job with explicit priority and delay
    pub async fn put_with(
        &mut self,
        payload: &[u8],
        priority: u32,
        delay: Duration,
        ttr: Duration,
    ) -> Result<u64, QueueError> {
        // The server treats a ttr of 0 as 1 second anyway
        let ttr_secs = ttr.as_secs().max(1);
        let header = format!(
            "put {} {} {} {}",
            priority,
            delay.as_secs(),
            ttr_secs,
            payload.len()
        );

        let mut frame = Vec::with_capacity(header.len() + payload.len() + 4);
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(b"\r\n");
        frame.extend_from_slice(payload);
        frame.extend_from_slice(b"\r\n");
        self.send(&frame).await?;

        let reply = self.read_reply().await?;
        let mut parts = reply.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("INSERTED"), Some(id)) => parse_id(&header, id),
            (Some("BURIED"), Some(id)) => Err(QueueError::Buried(parse_id(&header, id)?)),
            (Some("JOB_TOO_BIG"), None) => Err(QueueError::JobTooBig),
            (Some("DRAINING"), None) => Err(QueueError::Draining),
            _ => Err(unexpected(&header, reply)),
        }
    }

    /// Block until a job is ready on a watched tube
    pub async fn reserve_job(&mut self) -> Result<ReservedJob, QueueError> {
        loop {
            let reply = self.command("reserve").await?;
            let mut parts = reply.split_whitespace();

            match (parts.next(), parts.next(), parts.next()) {
                (Some("RESERVED"), Some(id), Some(bytes)) => {
                    let id = parse_id("reserve", id)?;
                    let len: usize = bytes
                        .parse()
                        .map_err(|_| unexpected("reserve", reply.clone()))?;

                    let frame_len = len
                        .checked_add(2)
                        .filter(|_| len <= MAX_JOB_SIZE)
                        .ok_or_else(|| unexpected("reserve", reply.clone()))?;

                    let mut body = vec![0u8; frame_len];
                    self.stream.read_exact(&mut body).await?;
                    if !body.ends_with(b"\r\n") {
                        return Err(unexpected("reserve", reply));
                    }
                    body.truncate(len);

                    return Ok(ReservedJob { id, body });
                }
                // One of our reserved jobs is about to time out; nothing to do
                // but ask again.
                (Some("DEADLINE_SOON"), None, None) => {
                    debug!("beanstalkd reported DEADLINE_SOON, reserving again");
                }
                _ => return Err(unexpected("reserve", reply)),
            }
        }
    }

    /// Delete a job by id
    pub async fn delete_job(&mut self, id: u64) -> Result<(), QueueError> {
        let command = format!("delete {}", id);
        let reply = self.command(&command).await?;

        match reply.as_str() {
            "DELETED" => Ok(()),
            "NOT_FOUND" => Err(QueueError::NotFound(id)),
            _ => Err(unexpected(&command, reply)),
        }
    }
}

#[async_trait]
impl<S> WorkQueue for BeanstalkClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn put(&mut self, payload: &[u8], ttr: Duration) -> Result<u64, QueueError> {
        self.put_with(payload, DEFAULT_PRIORITY, Duration::ZERO, ttr)
            .await
    }

    async fn reserve(&mut self) -> Result<ReservedJob, QueueError> {
        self.reserve_job().await
    }

    async fn delete(&mut self, id: u64) -> Result<(), QueueError> {
        self.delete_job(id).await
    }
}

/// Tube names: 1-200 bytes of `A-Za-z0-9-+/;.$_()`, not starting with `-`
fn validate_tube(tube: &str) -> Result<(), QueueError> {
    let valid_char =
        |c: char| c.is_ascii_alphanumeric() || "-+/;.$_()".contains(c);

    if tube.is_empty()
        || tube.len() > MAX_TUBE_NAME
        || tube.starts_with('-')
        || !tube.chars().all(valid_char)
    {
        return Err(QueueError::InvalidTube(tube.to_string()));
    }
    Ok(())
}

fn parse_watching(command: &str, reply: String) -> Result<u32, QueueError> {
    if reply == "NOT_IGNORED" {
        return Err(QueueError::Server(format!(
            "{}: cannot ignore the only watched tube",
            command
        )));
    }

    reply
        .strip_prefix("WATCHING ")
        .and_then(|count| count.parse().ok())
        .ok_or_else(|| unexpected(command, reply.clone()))
}

fn parse_id(command: &str, id: &str) -> Result<u64, QueueError> {
    id.parse()
        .map_err(|_| unexpected(command, format!("bad job id '{}'", id)))
}

/// Classify a reply we did not expect, surfacing generic server errors
fn unexpected(command: &str, reply: String) -> QueueError {
    match reply.as_str() {
        "OUT_OF_MEMORY" | "INTERNAL_ERROR" | "BAD_FORMAT" | "UNKNOWN_COMMAND"
        | "EXPECTED_CRLF" => QueueError::Server(reply),
        _ => QueueError::UnexpectedReply {
            command: command.to_string(),
            reply,
        },
    }
}
