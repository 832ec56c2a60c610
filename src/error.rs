use std::io;
use std::path::PathBuf;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// Internal error
        ThreadSend {
            display("Internal error; unexpectedly aborted")
        }
        Aborted {
            display("aborted")
        }
        InvalidSettings(msg: &'static str) {
            display("Invalid settings: {}", msg)
        }
        BadUrl(url: String) {
            display("Can't derive a file name from {}", url)
        }
        DuplicateFileName(name: String) {
            display("More than one frame would be saved as {}", name)
        }
        HttpClient(err: reqwest::Error) {
            display("Can't set up the HTTP client: {}", err)
            source(err)
        }
        Fetch(url: String, err: reqwest::Error) {
            display("Can't fetch {}: {}", url, err)
            source(err)
        }
        HttpStatus(url: String, status: reqwest::StatusCode) {
            display("Can't fetch {}: server responded with {}", url, status)
        }
        FetchIo(url: String, err: io::Error) {
            display("Can't save {}: {}", url, err)
            source(err)
        }
        Decode(path: PathBuf, err: image::ImageError) {
            display("Can't decode {}: {}", path.display(), err)
            source(err)
        }
        FrameSizeMismatch(index: usize, width: u32, height: u32, expected_width: u32, expected_height: u32) {
            display("Frame {} has wrong size ({}×{}, expected {}×{})", index, width, height, expected_width, expected_height)
        }
        WrongSize(msg: String) {
            display("{}", msg)
        }
        NoFrames {
            display("Found no usable frames to encode")
        }
        Gif(err: gif::EncodingError) {
            display("GIF encoding error: {}", err)
        }
        Io(err: io::Error) {
            from()
            display("I/O: {}", err)
            source(err)
        }
        BadKey(key: String) {
            display("Invalid storage key {:?}", key)
        }
        Publish(key: String, err: io::Error) {
            display("Can't publish {}: {}", key, err)
            source(err)
        }
    }
}

pub type CatResult<T, E = Error> = Result<T, E>;

impl From<gif::EncodingError> for Error {
    #[cold]
    fn from(err: gif::EncodingError) -> Self {
        match err {
            gif::EncodingError::Io(err) => err.into(),
            other => Error::Gif(other),
        }
    }
}
