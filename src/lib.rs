pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod utils;
pub mod web;

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;
    use uuid::Uuid;

    use crate::config::{SupervisorConfig, TranscoderConfig};
    use crate::models::StreamProtocol;
    use crate::services::ffmpeg_command_builder::{FFmpegCommandBuilder, SourceDescriptor};
    use crate::services::process_handle::ProcessHandle;
    use crate::services::session::{Session, SessionParams};
    use crate::services::{DisabledReporter, SessionRegistry, StatusReporter, StreamSupervisor};

    /// Stand-in transcoder that idles until SIGTERM
    pub const SLEEPING_TRANSCODER: &str = "trap 'exit 0' TERM\nwhile true; do sleep 0.1; done\n";

    pub fn write_script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    pub fn transcoder_config(dir: &Path, command: String) -> TranscoderConfig {
        TranscoderConfig {
            ffmpeg_command: command,
            output_root: dir.join("out"),
            startup_grace: Duration::from_millis(150),
            termination_grace: Duration::from_secs(2),
            ..TranscoderConfig::default()
        }
    }

    /// A session around a live sleeping process, not attached to any supervisor
    pub async fn sleeping_session(device_id: &str) -> (Session, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "sleeper.sh", SLEEPING_TRANSCODER);
        let builder = FFmpegCommandBuilder::new(transcoder_config(dir.path(), script));
        let id = Uuid::new_v4();
        let source = SourceDescriptor {
            device_id: device_id.to_string(),
            source_url: "rtsp://10.0.0.9/live".to_string(),
            protocol: StreamProtocol::Rtsp,
            targets: vec!["youtube".to_string()],
            output_dir: dir.path().join("out").join(device_id).join(id.to_string()),
        };

        let launched = ProcessHandle::start(&builder, &source, Duration::from_millis(50))
            .await
            .unwrap();
        let session = Session::new(
            SessionParams {
                id,
                device_id: device_id.to_string(),
                protocol: StreamProtocol::Rtsp,
                targets: source.targets.clone(),
                output_dir: source.output_dir.clone(),
                command: launched.args.clone(),
                stderr_tail_limit: 4,
            },
            launched.handle,
        );
        (session, dir)
    }

    /// Supervisor whose transcoder is a shell script with `body`
    pub fn test_supervisor(body: &str) -> (Arc<StreamSupervisor>, TempDir) {
        test_supervisor_with(body, Arc::new(DisabledReporter))
    }

    pub fn test_supervisor_with(
        body: &str,
        reporter: Arc<dyn StatusReporter>,
    ) -> (Arc<StreamSupervisor>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "transcoder.sh", body);
        let supervisor = StreamSupervisor::new(
            transcoder_config(dir.path(), script),
            SupervisorConfig {
                metrics_push_interval: Duration::from_millis(100),
                ..SupervisorConfig::default()
            },
            Arc::new(SessionRegistry::new()),
            reporter,
        );
        (Arc::new(supervisor), dir)
    }
}
