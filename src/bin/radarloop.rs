#[macro_use] extern crate clap;

use clap::{value_parser, Arg, ArgAction, Command};
use radarloop::progress::{NoProgress, ProgressReporter};
use radarloop::{CancelToken, DirPublisher, HttpFetcher, Repeat, ScrapeOutput, Settings};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {}", e);
        let mut source = e.source();
        while let Some(e) = source {
            eprintln!("  caused by: {}", e);
            source = e.source();
        }
        std::process::exit(1);
    }
}

fn bin_main() -> BinResult<()> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("Downloads radar frames listed by the scraper, and publishes them as an animated GIF along with the meteogram")
        .arg(Arg::new("scrape")
            .long("scrape")
            .short('s')
            .help("Scraper output: JSON with \"frameUrls\" and \"meteogramUrl\"; \"-\" means stdin")
            .value_name("scrape.json")
            .value_parser(value_parser!(PathBuf))
            .default_value("-"))
        .arg(Arg::new("output-dir")
            .long("output-dir")
            .short('o')
            .help("Directory to publish the animation and the meteogram to")
            .value_name("dir")
            .value_parser(value_parser!(PathBuf))
            .required_unless_present("debug"))
        .arg(Arg::new("concurrency")
            .long("concurrency")
            .short('j')
            .help("Number of frames to download at the same time")
            .value_name("num")
            .value_parser(value_parser!(usize))
            .default_value("3"))
        .arg(Arg::new("delay")
            .long("delay")
            .short('d')
            .help("How long to show each frame")
            .value_name("ms")
            .value_parser(value_parser!(u32))
            .default_value("750"))
        .arg(Arg::new("timeout")
            .long("timeout")
            .help("Give up on any single HTTP request after this long")
            .value_name("secs")
            .value_parser(value_parser!(u64)))
        .arg(Arg::new("once")
            .long("once")
            .help("Play the animation once instead of looping")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("debug")
            .long("debug")
            .help("Print the scraper output and exit")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("quiet")
            .long("quiet")
            .short('q')
            .help("Only log warnings and errors, and don't show progress")
            .action(ArgAction::SetTrue))
        .get_matches_from(wild::args_os());

    let quiet = matches.get_flag("quiet");
    init_logging(quiet);

    let scrape_path = matches.get_one::<PathBuf>("scrape").ok_or("Missing scraper output")?;
    let scrape = read_scrape_output(scrape_path)?;

    if matches.get_flag("debug") {
        serde_json::to_writer_pretty(io::stdout().lock(), &scrape)?;
        println!();
        return Ok(());
    }

    let output_dir = matches.get_one::<PathBuf>("output-dir").ok_or("Missing output directory")?;
    let settings = Settings {
        concurrency: *matches.get_one::<usize>("concurrency").ok_or("Missing concurrency")?,
        frame_delay_ms: *matches.get_one::<u32>("delay").ok_or("Missing delay")?,
        repeat: if matches.get_flag("once") { Repeat::Finite(0) } else { Repeat::Infinite },
        timeout: matches.get_one::<u64>("timeout").map(|&s| Duration::from_secs(s)),
        ..Settings::default()
    };
    settings.validate()?;
    if settings.frame_delay_ms < 20 {
        tracing::warn!("web browsers slow down animations with delays shorter than 20ms");
    }

    let fetcher = HttpFetcher::new(settings.timeout, &settings.user_agent)?;
    let publisher = DirPublisher::new(output_dir);
    let cancel = CancelToken::new();
    cancel_on_signal(cancel.clone())?;

    let mut pb;
    let mut nopb = NoProgress;
    let progress: &mut dyn ProgressReporter = if quiet {
        &mut nopb
    } else {
        pb = pbr::ProgressBar::on(io::stderr(), scrape.frame_urls.len() as u64);
        pb.show_speed = false;
        pb.show_percent = false;
        pb.format(" #_. ");
        pb.message("Frame ");
        pb.set_max_refresh_rate(Some(Duration::from_millis(250)));
        &mut pb
    };

    radarloop::run(&scrape, &settings, &fetcher, &publisher, &cancel, progress)?;
    tracing::info!(dir = %OutputDir(output_dir), "published");
    Ok(())
}

/// The first SIGINT/SIGTERM stops the run, so that temporary files get cleaned up.
/// The second one exits immediately.
fn cancel_on_signal(cancel: CancelToken) -> BinResult<()> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_io().build()?;
    let mut signals = {
        let _rt = rt.enter();
        Signals::new()?
    };
    std::thread::Builder::new().name("signals".into()).spawn(move || {
        rt.block_on(async {
            signals.recv().await;
            tracing::warn!("interrupted, stopping");
            cancel.cancel();
            signals.recv().await;
        });
        std::process::exit(130);
    })?;
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {},
            _ = self.terminate.recv() => {},
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("can't listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn read_scrape_output(path: &Path) -> BinResult<ScrapeOutput> {
    let reader: Box<dyn Read> = if path == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(path)
            .map_err(|e| format!("Can't read {}: {}", path.display(), e))?;
        Box::new(BufReader::new(file))
    };
    let scrape = ScrapeOutput::from_reader(reader)
        .map_err(|e| format!("Invalid scraper output in {}: {}", path.display(), e))?;
    if scrape.frame_urls.is_empty() {
        return Err("The scraper found no radar frames".into());
    }
    Ok(scrape)
}

struct OutputDir<'a>(&'a Path);

impl fmt::Display for OutputDir<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let abs_path = dunce::canonicalize(self.0);
        abs_path.as_ref().map(|p| p.as_path()).unwrap_or(self.0).display().fmt(f)
    }
}
