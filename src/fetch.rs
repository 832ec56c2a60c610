//! Single-attempt HTTP downloads

use crate::cancel::CancelToken;
use crate::error::*;
use crossbeam_channel::{Receiver, Sender};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const CHUNK_SIZE: usize = 64 * 1024;

/// Piece of a response body, or the reason the transfer stopped
type Chunk = CatResult<Vec<u8>>;

/// Retrieves the bytes behind a URL.
///
/// Implementations make exactly one attempt. Callers decide whether a failure is fatal.
pub trait Fetch: Send + Sync {
    /// Streams the response body of `url` into `out`, returning the number of bytes written.
    ///
    /// Must fail with [`Error::Aborted`] if `cancel` fires before or during the transfer,
    /// even if the server has stopped responding.
    fn fetch_into(&self, url: &str, out: &mut dyn Write, cancel: &CancelToken) -> CatResult<u64>;

    /// Creates (or truncates) `dest` and writes the whole body into it.
    fn fetch_to_file(&self, url: &str, dest: &Path, cancel: &CancelToken) -> CatResult<()> {
        let file = File::create(dest).map_err(|e| Error::FetchIo(url.to_owned(), e))?;
        let mut out = BufWriter::new(file);
        self.fetch_into(url, &mut out, cancel)?;
        out.flush().map_err(|e| Error::FetchIo(url.to_owned(), e))?;
        Ok(())
    }

    fn fetch_bytes(&self, url: &str, cancel: &CancelToken) -> CatResult<Vec<u8>> {
        let mut body = Vec::new();
        self.fetch_into(url, &mut body, cancel)?;
        Ok(body)
    }
}

/// [`Fetch`] over a blocking `reqwest` client
///
/// Each request runs on its own short-lived thread and hands the body over in chunks.
/// On cancellation the caller returns straight away, and the request thread is left
/// to notice the closed channel (or its connection dying) on its own.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// `timeout` applies to each whole request. `None` leaves requests unbounded,
    /// so only the cancellation token can stop them.
    pub fn new(timeout: Option<Duration>, user_agent: &str) -> CatResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(Error::HttpClient)?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch_into(&self, url: &str, out: &mut dyn Write, cancel: &CancelToken) -> CatResult<u64> {
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }
        debug!(url, "downloading");

        let (sender, chunks) = crossbeam_channel::bounded(4);
        let client = self.client.clone();
        let request_url = url.to_owned();
        std::thread::Builder::new().name("http".into()).spawn(move || {
            if let Err(e) = transfer(&client, &request_url, &sender) {
                let _ = sender.send(Err(e));
            }
        }).map_err(|e| Error::FetchIo(url.to_owned(), e))?;

        let written = receive_body(url, &chunks, out, cancel)?;
        debug!(url, bytes = written, "downloaded");
        Ok(written)
    }
}

fn transfer(client: &reqwest::blocking::Client, url: &str, chunks: &Sender<Chunk>) -> CatResult<()> {
    let mut res = client.get(url).send().map_err(|e| Error::Fetch(url.to_owned(), e))?;
    let status = res.status();
    if !status.is_success() {
        return Err(Error::HttpStatus(url.to_owned(), status));
    }

    loop {
        let mut buf = vec![0; CHUNK_SIZE];
        let len = match res.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::FetchIo(url.to_owned(), e)),
        };
        buf.truncate(len);
        if chunks.send(Ok(buf)).is_err() {
            // nobody is waiting for the body anymore
            return Ok(());
        }
    }
}

/// Writes chunks into `out` until the sender hangs up, or `cancel` fires
fn receive_body(url: &str, chunks: &Receiver<Chunk>, out: &mut dyn Write, cancel: &CancelToken) -> CatResult<u64> {
    let mut written = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }
        crossbeam_channel::select! {
            recv(chunks) -> chunk => match chunk {
                Ok(Ok(chunk)) => {
                    out.write_all(&chunk).map_err(|e| Error::FetchIo(url.to_owned(), e))?;
                    written += chunk.len() as u64;
                },
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(written),
            },
            recv(cancel.receiver()) -> _ => return Err(Error::Aborted),
        }
    }
}
