//! FFmpeg Command Builder Service
//!
//! Turns a source descriptor and the transcoder config into an ffmpeg argv.
//! Every invocation writes an HLS playlist into the session directory and
//! reports progress as `key=value` lines on stdout. When a relay base is
//! configured and the request names targets, a second FLV output pushes the
//! same stream to `<relay_base>/<device_id>`.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::TranscoderConfig;
use crate::config::defaults::PLAYLIST_FILE_NAME;
use crate::models::StreamProtocol;
use crate::utils::UrlUtils;

/// What to transcode and where the artifacts go
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub device_id: String,
    pub source_url: String,
    pub protocol: StreamProtocol,
    pub targets: Vec<String>,
    pub output_dir: PathBuf,
}

impl SourceDescriptor {
    pub fn playlist_path(&self) -> PathBuf {
        playlist_path(&self.output_dir)
    }
}

pub fn playlist_path(output_dir: &Path) -> PathBuf {
    output_dir.join(PLAYLIST_FILE_NAME)
}

/// Service for building FFmpeg command arguments
pub struct FFmpegCommandBuilder {
    config: TranscoderConfig,
}

impl FFmpegCommandBuilder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    pub fn program(&self) -> &str {
        &self.config.ffmpeg_command
    }

    /// Build the argument list (without the program name)
    pub fn build_args(&self, source: &SourceDescriptor) -> Vec<String> {
        debug!(
            device_id = %source.device_id,
            "Building ffmpeg command: input='{}', output='{}'",
            UrlUtils::obfuscate_credentials(&source.source_url),
            source.output_dir.display()
        );

        let mut args = Vec::new();
        self.add_global_args(&mut args);
        self.add_input_args(&mut args, source);
        self.add_codec_args(&mut args);
        self.add_hls_output(&mut args, source);
        if let Some(destination) = self.relay_destination(source) {
            self.add_codec_args(&mut args);
            args.extend(["-f".to_string(), "flv".to_string(), destination]);
        }
        args
    }

    /// argv as it would appear in `ps`, credentials masked
    pub fn display_command(&self, args: &[String]) -> Vec<String> {
        std::iter::once(self.config.ffmpeg_command.clone())
            .chain(args.iter().map(|arg| UrlUtils::obfuscate_credentials(arg)))
            .collect()
    }

    fn add_global_args(&self, args: &mut Vec<String>) {
        args.extend([
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-progress".to_string(),
            "pipe:1".to_string(),
        ]);
    }

    fn add_input_args(&self, args: &mut Vec<String>, source: &SourceDescriptor) {
        match source.protocol {
            StreamProtocol::Rtsp => {
                args.extend([
                    "-rtsp_transport".to_string(),
                    self.config.rtsp_transport.clone(),
                ]);
            }
            // Camera MJPEG endpoints rarely carry timestamps
            StreamProtocol::Mjpeg => {
                args.extend([
                    "-f".to_string(),
                    "mjpeg".to_string(),
                    "-use_wallclock_as_timestamps".to_string(),
                    "1".to_string(),
                ]);
            }
        }
        args.extend(["-i".to_string(), source.source_url.clone()]);
    }

    fn add_codec_args(&self, args: &mut Vec<String>) {
        args.extend([
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
        ]);
    }

    fn add_hls_output(&self, args: &mut Vec<String>, source: &SourceDescriptor) {
        args.extend([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.config.hls_segment_seconds.to_string(),
            "-hls_list_size".to_string(),
            self.config.hls_list_size.to_string(),
            "-hls_flags".to_string(),
            "delete_segments+append_list".to_string(),
            source.playlist_path().to_string_lossy().into_owned(),
        ]);
    }

    fn relay_destination(&self, source: &SourceDescriptor) -> Option<String> {
        if source.targets.is_empty() {
            return None;
        }
        self.config
            .relay_base
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), source.device_id))
    }
}
