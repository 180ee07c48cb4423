//! Transcoder progress parsing
//!
//! ffmpeg started with `-progress pipe:1` writes blocks of `key=value` lines to
//! stdout. Only `frame`, `fps` and `bitrate` are interesting here; everything
//! else (`out_time`, `speed`, `progress=continue`, banner noise) is dropped.
//! A malformed value degrades that one field and the stream keeps going.

use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::models::TelemetryUpdate;

const BITRATE_SUFFIX: &str = "kbits/s";

/// Parse a single progress line into at most one update.
pub fn parse_line(line: &str) -> Option<TelemetryUpdate> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();

    match key.trim() {
        "frame" => value.parse::<u64>().ok().map(TelemetryUpdate::Frame),
        "fps" => value
            .parse::<f64>()
            .ok()
            .filter(|fps| fps.is_finite() && *fps >= 0.0)
            .map(TelemetryUpdate::Fps),
        "bitrate" => Some(TelemetryUpdate::BitrateKbps(parse_bitrate(value))),
        _ => None,
    }
}

/// `"1500.3kbits/s"` -> 1500.3. Anything else, `N/A` included, is 0.0.
pub fn parse_bitrate(value: &str) -> f64 {
    value
        .trim()
        .strip_suffix(BITRATE_SUFFIX)
        .and_then(|number| number.trim().parse::<f64>().ok())
        .filter(|kbps| kbps.is_finite() && *kbps >= 0.0)
        .unwrap_or(0.0)
}

/// Lazily turn a progress channel into metric updates.
///
/// The stream ends when the reader hits EOF or an I/O error, which for a pipe
/// means the transcoder has gone away. Non UTF-8 bytes are replaced rather than
/// ending the stream.
pub fn telemetry_updates<R>(mut reader: R) -> impl Stream<Item = TelemetryUpdate>
where
    R: AsyncBufRead + Unpin,
{
    async_stream::stream! {
        let mut buf = Vec::with_capacity(128);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if let Some(update) = parse_line(&String::from_utf8_lossy(&buf)) {
                        yield update;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TelemetrySample;
    use futures::StreamExt;
    use rstest::rstest;

    #[rstest]
    #[case("bitrate=1500kbits/s", Some(TelemetryUpdate::BitrateKbps(1500.0)))]
    #[case("bitrate= 812.4kbits/s", Some(TelemetryUpdate::BitrateKbps(812.4)))]
    #[case("bitrate=garbage", Some(TelemetryUpdate::BitrateKbps(0.0)))]
    #[case("bitrate=N/A", Some(TelemetryUpdate::BitrateKbps(0.0)))]
    #[case("bitrate=1500bits/s", Some(TelemetryUpdate::BitrateKbps(0.0)))]
    #[case("frame=42", Some(TelemetryUpdate::Frame(42)))]
    #[case("frame=-1", None)]
    #[case("frame=abc", None)]
    #[case("fps=29.97", Some(TelemetryUpdate::Fps(29.97)))]
    #[case("fps=-3", None)]
    #[case("fps=NaN", None)]
    #[case("speed=1.01x", None)]
    #[case("progress=continue", None)]
    #[case("Input #0, rtsp, from 'rtsp://cam'", None)]
    #[case("", None)]
    fn parses_single_lines(#[case] line: &str, #[case] expected: Option<TelemetryUpdate>) {
        assert_eq!(parse_line(line), expected);
    }

    #[test]
    fn unrecognized_key_leaves_prior_fields_alone() {
        let mut sample = TelemetrySample::default();
        for line in ["frame=42", "fps=25", "drop_frames=3", "bitrate=900kbits/s"] {
            if let Some(update) = parse_line(line) {
                sample.apply(update);
            }
        }
        assert_eq!(sample.frame_count, 42);
        assert_eq!(sample.fps, 25.0);
        assert_eq!(sample.bitrate_kbps, 900.0);
    }

    #[tokio::test]
    async fn stream_skips_noise_and_ends_at_eof() {
        let input: &[u8] = b"frame=1\nfps=24.5\nout_time=00:00:01\nbitrate=garbage\n\xff\xfe\nframe=2\n";
        let updates: Vec<_> = telemetry_updates(input).collect().await;
        assert_eq!(
            updates,
            vec![
                TelemetryUpdate::Frame(1),
                TelemetryUpdate::Fps(24.5),
                TelemetryUpdate::BitrateKbps(0.0),
                TelemetryUpdate::Frame(2),
            ]
        );
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_parsed() {
        let input: &[u8] = b"fps=10\nframe=7";
        let updates: Vec<_> = telemetry_updates(input).collect().await;
        assert_eq!(updates.last(), Some(&TelemetryUpdate::Frame(7)));
    }
}
