use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

pub const DEFAULT_BINARY: &str = "ffmpeg";
pub const DEFAULT_INPUT: &str = "public/test-video.mp4";
pub const DEFAULT_OUTPUT: &str = "public/streams/stream.m3u8";
pub const DEFAULT_ROOT: &str = "public";
pub const DEFAULT_PORT: u16 = 8000;

/// Signal delivered to the transcoder when it is asked to stop.
///
/// ffmpeg treats both as a request to finish cleanly; `Interrupt` is what an
/// operator pressing Ctrl-C in a terminal would send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopSignal {
    #[default]
    Interrupt,
    Terminate,
}

/// Startup parameters for the external transcoder.
///
/// Fixed once the supervisor is created; there is no runtime mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Executable name or path, resolved against `PATH`.
    pub binary: String,
    /// Input locator: a file path or an `rtsp://` URL.
    pub input: String,
    /// Playlist path; segments are written next to it.
    pub output: PathBuf,
    /// Target segment length in seconds (`-hls_time`).
    pub segment_duration: u32,
    /// Number of segments kept in the playlist window (`-hls_list_size`).
    pub list_size: u32,
    /// Demuxer delay bound (`-max_delay`).
    pub max_delay: u32,
    /// Delete segments that fall out of the window (`-hls_flags delete_segments`).
    pub delete_segments: bool,
    /// Pass the video stream through without re-encoding (`-vcodec copy`).
    pub copy_video: bool,
    /// Drop audio (`-an`).
    pub drop_audio: bool,
    /// Extra arguments placed before `-i`, e.g. `-hide_banner`.
    pub global_args: Vec<String>,
    pub stop_signal: StopSignal,
    /// Grace period before a stopped transcoder is force-killed.
    /// `None` waits indefinitely.
    pub stop_timeout_secs: Option<u64>,
    /// Create the playlist's parent directory before launching.
    pub create_output_dir: bool,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            input: DEFAULT_INPUT.to_string(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            segment_duration: 2,
            list_size: 3,
            max_delay: 2,
            delete_segments: true,
            copy_video: true,
            drop_audio: true,
            global_args: Vec::new(),
            stop_signal: StopSignal::default(),
            stop_timeout_secs: None,
            create_output_dir: true,
        }
    }
}

impl TranscoderConfig {
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_secs.map(Duration::from_secs)
    }
}

/// Static file server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
    /// Directory served at `/`. Should contain the transcoder's output.
    pub root: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            root: PathBuf::from(DEFAULT_ROOT),
        }
    }
}

/// Complete relay configuration, as loaded from a TOML file:
///
/// ```toml
/// [http]
/// bind = "0.0.0.0:8000"
/// root = "public"
///
/// [transcoder]
/// input = "rtsp://camera.local/stream"
/// output = "public/streams/stream.m3u8"
/// stop_timeout_secs = 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub http: HttpConfig,
    pub transcoder: TranscoderConfig,
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RelayError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&content).map_err(|reason| RelayError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}
