//! External transcoder invocation.
//!
//! The relay never touches media itself. It builds one fixed, ordered
//! argument vector from [`TranscoderConfig`] and hands it to ffmpeg:
//!
//! ```text
//! ffmpeg -i <input> -fflags flush_packets -max_delay 2 -an
//!        -flags -global_header -hls_time 2 -hls_list_size 3
//!        -hls_flags delete_segments -vcodec copy -y <playlist>
//! ```
//!
//! Segmentation, muxing and retention (rolling window, deletion of expired
//! segments) are entirely ffmpeg's job. Only its exit status and its
//! stdout/stderr lines are observed, see [`output`].

pub mod output;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::TranscoderConfig;
use crate::error::{RelayError, Result};

pub use output::{LineSink, OutputLine, OutputStream, TracingSink};

/// Build the transcoder's argument vector (without the program name).
pub fn arguments(config: &TranscoderConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = config.global_args.iter().map(OsString::from).collect();

    args.push("-i".into());
    args.push(config.input.as_str().into());
    args.push("-fflags".into());
    args.push("flush_packets".into());
    args.push("-max_delay".into());
    args.push(config.max_delay.to_string().into());
    if config.drop_audio {
        args.push("-an".into());
    }
    args.push("-flags".into());
    args.push("-global_header".into());
    args.push("-hls_time".into());
    args.push(config.segment_duration.to_string().into());
    args.push("-hls_list_size".into());
    args.push(config.list_size.to_string().into());
    if config.delete_segments {
        args.push("-hls_flags".into());
        args.push("delete_segments".into());
    }
    if config.copy_video {
        args.push("-vcodec".into());
        args.push("copy".into());
    }
    args.push("-y".into());
    args.push(config.output.as_os_str().to_os_string());

    args
}

/// Resolve the configured binary on `PATH` (or as a literal path).
pub fn resolve_binary(config: &TranscoderConfig) -> Result<PathBuf> {
    which::which(&config.binary).map_err(|_| RelayError::TranscoderNotFound(config.binary.clone()))
}

/// Prepare a ready-to-spawn command with piped stdout/stderr and null stdin.
///
/// The child is killed if its handle is dropped without being waited on,
/// e.g. when the runtime shuts down under a running transcoder.
pub fn command(config: &TranscoderConfig) -> Result<Command> {
    let program = resolve_binary(config)?;

    let mut cmd = Command::new(program);
    cmd.args(arguments(config))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Keep terminal Ctrl-C away from the child; the supervisor decides when it stops.
    #[cfg(unix)]
    cmd.process_group(0);
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn default_argument_order() {
        let config = TranscoderConfig {
            input: "test-video.mp4".to_string(),
            output: PathBuf::from("streams/stream.m3u8"),
            ..TranscoderConfig::default()
        };

        assert_eq!(
            strings(arguments(&config)),
            vec![
                "-i",
                "test-video.mp4",
                "-fflags",
                "flush_packets",
                "-max_delay",
                "2",
                "-an",
                "-flags",
                "-global_header",
                "-hls_time",
                "2",
                "-hls_list_size",
                "3",
                "-hls_flags",
                "delete_segments",
                "-vcodec",
                "copy",
                "-y",
                "streams/stream.m3u8",
            ]
        );
    }

    #[test]
    fn global_args_precede_input() {
        let config = TranscoderConfig {
            global_args: vec!["-hide_banner".to_string(), "-loglevel".to_string(), "warning".to_string()],
            ..TranscoderConfig::default()
        };
        let args = strings(arguments(&config));
        assert_eq!(&args[..4], &["-hide_banner", "-loglevel", "warning", "-i"]);
    }

    #[test]
    fn optional_flags_omitted() {
        let config = TranscoderConfig {
            drop_audio: false,
            delete_segments: false,
            copy_video: false,
            segment_duration: 6,
            list_size: 10,
            ..TranscoderConfig::default()
        };
        let args = strings(arguments(&config));

        assert!(!args.iter().any(|a| a == "-an"));
        assert!(!args.iter().any(|a| a == "-hls_flags"));
        assert!(!args.iter().any(|a| a == "-vcodec"));
        assert!(args.windows(2).any(|w| w == ["-hls_time", "6"]));
        assert!(args.windows(2).any(|w| w == ["-hls_list_size", "10"]));
        assert_eq!(args.last().map(String::as_str), Some("public/streams/stream.m3u8"));
    }

    #[test]
    fn missing_binary_is_reported() {
        let config = TranscoderConfig {
            binary: "definitely-not-an-installed-transcoder".to_string(),
            ..TranscoderConfig::default()
        };
        assert!(matches!(
            resolve_binary(&config),
            Err(RelayError::TranscoderNotFound(name)) if name == "definitely-not-an-installed-transcoder"
        ));
    }
}
