use radarloop::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Pretends to download, writing the URL itself as the body
struct MockFetcher {
    delay: Box<dyn Fn(&str) -> Duration + Send + Sync>,
    fail_url: Option<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    fn new(delay: impl Fn(&str) -> Duration + Send + Sync + 'static) -> Self {
        Self {
            delay: Box::new(delay),
            fail_url: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, url: &str) -> Self {
        self.fail_url = Some(url.to_owned());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetch for MockFetcher {
    fn fetch_into(&self, url: &str, out: &mut dyn Write, cancel: &CancelToken) -> CatResult<u64> {
        self.calls.lock().unwrap().push(url.to_owned());
        let now = self.in_flight.fetch_add(1, SeqCst) + 1;
        self.max_in_flight.fetch_max(now, SeqCst);

        thread::sleep((self.delay)(url));
        let res = if cancel.is_cancelled() {
            Err(Error::Aborted)
        } else if self.fail_url.as_deref() == Some(url) {
            Err(Error::HttpStatus(url.to_owned(), reqwest::StatusCode::NOT_FOUND))
        } else {
            out.write_all(url.as_bytes())
                .map(|_| url.len() as u64)
                .map_err(|e| Error::FetchIo(url.to_owned(), e))
        };

        self.in_flight.fetch_sub(1, SeqCst);
        res
    }
}

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://radar.example.com/frames/{i:03}.png")).collect()
}

/// Deterministic, uneven delays, so that completion order differs from input order
fn jitter(url: &str) -> Duration {
    let n: u64 = url.bytes().map(u64::from).sum();
    Duration::from_millis((n * 7919) % 17)
}

fn expected_paths(urls: &[String], workdir: &Path) -> Vec<PathBuf> {
    urls.iter().map(|u| workdir.join(u.rsplit('/').next().unwrap())).collect()
}

#[test]
fn keeps_input_order_when_later_frames_finish_first() {
    let dir = tempfile::tempdir().unwrap();
    let urls = vec!["a.png".to_string(), "b.png".to_string(), "c.png".to_string()];
    let fetcher = MockFetcher::new(|url| match url {
        "a.png" => Duration::from_millis(60),
        "b.png" => Duration::from_millis(30),
        _ => Duration::ZERO,
    });

    let paths = download_all(&urls, dir.path(), 2, &fetcher, &CancelToken::new()).unwrap();
    assert_eq!(paths, [dir.path().join("a.png"), dir.path().join("b.png"), dir.path().join("c.png")]);
    for (path, url) in paths.iter().zip(&urls) {
        assert_eq!(std::fs::read_to_string(path).unwrap(), *url);
    }
}

#[test]
fn order_is_independent_of_jitter() {
    for concurrency in [1, 2, 3, 8] {
        let dir = tempfile::tempdir().unwrap();
        let urls = urls(25);
        let fetcher = MockFetcher::new(jitter);
        let paths = download_all(&urls, dir.path(), concurrency, &fetcher, &CancelToken::new()).unwrap();
        assert_eq!(paths, expected_paths(&urls, dir.path()));
        for (path, url) in paths.iter().zip(&urls) {
            assert_eq!(std::fs::read_to_string(path).unwrap(), *url);
        }
    }
}

#[test]
fn every_url_is_fetched_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let urls = urls(40);
    let fetcher = MockFetcher::new(jitter);
    download_all(&urls, dir.path(), 5, &fetcher, &CancelToken::new()).unwrap();

    let mut calls = fetcher.calls();
    calls.sort();
    assert_eq!(calls, urls);
}

#[test]
fn concurrency_bound_is_respected() {
    for concurrency in [1, 2, 3, 5] {
        let dir = tempfile::tempdir().unwrap();
        let urls = urls(concurrency * 4);
        let fetcher = MockFetcher::new(|_| Duration::from_millis(10));
        download_all(&urls, dir.path(), concurrency, &fetcher, &CancelToken::new()).unwrap();

        let max = fetcher.max_in_flight.load(SeqCst);
        assert!(max >= 1 && max <= concurrency, "{max} in flight with concurrency {concurrency}");
        assert_eq!(fetcher.in_flight.load(SeqCst), 0);
    }
}

#[test]
fn one_failure_fails_the_batch() {
    let urls = urls(6);
    for failing in &urls {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::new(jitter).failing_on(failing);
        let res = download_all(&urls, dir.path(), 3, &fetcher, &CancelToken::new());
        assert!(matches!(&res, Err(Error::HttpStatus(url, _)) if url == failing), "{res:?}");
    }
}

#[test]
fn failure_stops_dispatching() {
    let dir = tempfile::tempdir().unwrap();
    let urls = urls(60);
    let fetcher = MockFetcher::new(|_| Duration::from_millis(5)).failing_on(&urls[4]);
    let res = download_all(&urls, dir.path(), 3, &fetcher, &CancelToken::new());
    assert!(matches!(res, Err(Error::HttpStatus(..))));
    assert!(fetcher.calls().len() < urls.len(), "all {} urls were fetched", urls.len());
}

#[test]
fn cancellation_interrupts_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let urls = urls(200);
    let fetcher = MockFetcher::new(|_| Duration::from_millis(10));
    let cancel = CancelToken::new();

    let remote = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        remote.cancel();
    });
    let res = download_all(&urls, dir.path(), 2, &fetcher, &cancel);
    canceller.join().unwrap();

    assert!(matches!(res, Err(Error::Aborted)), "{res:?}");
    assert!(fetcher.calls().len() < urls.len());
    assert_eq!(fetcher.in_flight.load(SeqCst), 0);
}

#[test]
fn already_cancelled_fetches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new(|_| Duration::ZERO);
    let cancel = CancelToken::new();
    cancel.cancel();
    let res = download_all(&urls(5), dir.path(), 3, &fetcher, &cancel);
    assert!(matches!(res, Err(Error::Aborted)));
    assert!(fetcher.calls().is_empty());
}

#[test]
fn empty_list_and_zero_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new(|_| Duration::ZERO);
    assert!(download_all(&[], dir.path(), 3, &fetcher, &CancelToken::new()).unwrap().is_empty());
    assert!(matches!(download_all(&urls(2), dir.path(), 0, &fetcher, &CancelToken::new()), Err(Error::InvalidSettings(_))));
}
