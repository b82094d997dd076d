//! Media job: one recording taken from the queue through transcode,
//! filesystem reconciliation and notification.
//!
//! ```text
//! Pending ─(status != OK)─────────────────────────────────────→ Skipped ─→ Notified
//! Pending ─→ Running ─→ Succeeded ─→ Reconciled ─→ Notified
//!                    └→ Failed ────────────────→ Notified
//! ```
//!
//! A job is created right before processing and dropped right after
//! `transcode` returns. Nothing about it is persisted or retried.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{TranscodeOutput, Transcoder};
use crate::config::TranscodeSettings;
use crate::domain::media::{AUDIO_OUTPUT_EXTENSION, DIAGNOSTIC_SUFFIX, VIDEO_OUTPUT_EXTENSION};
use crate::domain::{ExtensionSet, JobDescriptor, JobState, MediaType, OutputTarget};

use super::notifier::{Notice, NotificationRouter, NotifyError};

/// Errors that end a job early
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Input type not supported: {0}")]
    UnsupportedInputType(String),

    #[error("Transcoder output would overwrite the input: {0}")]
    OutputIsInput(String),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Process-wide settings every job is built with
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub audio_types: ExtensionSet,
    pub video_types: ExtensionSet,
    pub transcode_settings: TranscodeSettings,
    /// Never rename or delete anything after transcoding
    pub keep_original: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            audio_types: ExtensionSet::new([".mka"]),
            video_types: ExtensionSet::new([".mkv", ".ts"]),
            transcode_settings: TranscodeSettings::default(),
            keep_original: false,
        }
    }
}

/// Summary of a finished job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Final state (always `Notified` on return)
    pub state: JobState,

    /// State before notification: Skipped, Reconciled or Failed
    pub result: JobState,

    pub transcode_succeeded: bool,

    /// Recipients that were sent a message
    pub recipients: Vec<String>,
}

/// A single recording being processed
#[derive(Debug)]
pub struct MediaJob {
    path: PathBuf,
    fname: String,
    fname_base: String,
    channel: String,
    title: String,
    status: String,
    settings: Arc<JobSettings>,

    media_type: Option<MediaType>,
    output: Option<OutputTarget>,
    transcode_succeeded: bool,
    reconciled: bool,
    renamed: bool,
    state: JobState,
}

impl MediaJob {
    /// Create a job from a decoded descriptor
    pub fn new(descriptor: JobDescriptor, settings: Arc<JobSettings>) -> Self {
        let fname_base = Path::new(&descriptor.fname)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| descriptor.fname.clone());

        Self {
            path: PathBuf::from(descriptor.path),
            fname: descriptor.fname,
            fname_base,
            channel: descriptor.channel,
            title: descriptor.title,
            status: descriptor.status,
            settings,
            media_type: None,
            output: None,
            transcode_succeeded: false,
            reconciled: false,
            renamed: false,
            state: JobState::Pending,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fname(&self) -> &str {
        &self.fname
    }

    /// File name without its extension
    pub fn fname_base(&self) -> &str {
        &self.fname_base
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn transcode_succeeded(&self) -> bool {
        self.transcode_succeeded
    }

    pub fn keep_original(&self) -> bool {
        self.settings.keep_original
    }

    fn is_ok(&self) -> bool {
        self.status == crate::domain::STATUS_OK
    }

    /// Classify the input by extension. Resolved once, then cached.
    pub fn determine_type(&mut self) -> Result<MediaType, JobError> {
        if let Some(media_type) = self.media_type {
            return Ok(media_type);
        }

        let media_type = if self.settings.audio_types.matches(&self.fname) {
            MediaType::Audio
        } else if self.settings.video_types.matches(&self.fname) {
            MediaType::Video
        } else {
            return Err(JobError::UnsupportedInputType(self.fname.clone()));
        };

        self.media_type = Some(media_type);
        Ok(media_type)
    }

    /// Derive the transcoder output. Resolved once, then cached.
    ///
    /// Video is written to a random `<uuid>.mkv` next to the input and later
    /// swapped onto the input path. Audio is written to `<base>.mp3` next to
    /// the input, which is later removed.
    pub fn output_target(&mut self) -> Result<&OutputTarget, JobError> {
        let target = match self.output.take() {
            Some(target) => target,
            None => {
                let media_type = self.determine_type()?;
                let (name, is_rename) = match media_type {
                    MediaType::Video => {
                        (format!("{}.{}", Uuid::new_v4(), VIDEO_OUTPUT_EXTENSION), true)
                    }
                    MediaType::Audio => {
                        (format!("{}.{}", self.fname_base, AUDIO_OUTPUT_EXTENSION), false)
                    }
                };
                // An audio input already named `<base>.mp3` would be transcoded onto itself
                if name.eq_ignore_ascii_case(&self.fname) {
                    return Err(JobError::OutputIsInput(self.fname.clone()));
                }
                let path = self.directory().join(&name);

                OutputTarget {
                    name,
                    path,
                    is_rename,
                }
            }
        };

        Ok(self.output.insert(target))
    }

    fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// `<input dir>/<base>.tc_err`
    pub fn diagnostic_path(&self) -> PathBuf {
        self.directory()
            .join(format!("{}.{}", self.fname_base, DIAGNOSTIC_SUFFIX))
    }

    /// Transcoder arguments: `-i <input> <profile...> -y <output>`
    pub fn transcode_args(&mut self) -> Result<Vec<String>, JobError> {
        let media_type = self.determine_type()?;
        let output_path = self.output_target()?.path.to_string_lossy().to_string();

        let mut args = vec!["-i".to_string(), self.path.to_string_lossy().to_string()];
        args.extend(
            self.settings
                .transcode_settings
                .profile(media_type)
                .split_whitespace()
                .map(str::to_string),
        );
        args.push("-y".to_string());
        args.push(output_path);

        Ok(args)
    }

    /// Run the job to completion: transcode if the recording is usable,
    /// reconcile the filesystem, then notify.
    ///
    /// Transcoder and filesystem failures are handled here and reported
    /// through the notification. Errors are returned only for inputs that
    /// cannot be classified, for audio inputs whose output name would be the
    /// input itself, and for notification delivery failures.
    #[instrument(skip_all, fields(fname = %self.fname, title = %self.title))]
    pub async fn transcode(
        &mut self,
        transcoder: &dyn Transcoder,
        router: &NotificationRouter,
    ) -> Result<JobOutcome, JobError> {
        if !self.is_ok() {
            info!(
                status = %self.status,
                "Error '{}' for recording: {}. Sending notification.",
                self.status,
                self.fname
            );
            self.state = JobState::Skipped;
            return self.finish(router).await;
        }

        let args = match self.transcode_args() {
            Ok(args) => args,
            Err(e) => {
                error!(error = %e, "Unable to prepare transcode");
                self.state = JobState::Failed;
                self.finish(router).await?;
                return Err(e);
            }
        };

        self.state = JobState::Running;
        info!(path = %self.path.display(), "Starting transcode for {}", self.path.display());

        let output = match transcoder.run(&args).await {
            Ok(output) => output,
            Err(e) => TranscodeOutput {
                exit_code: -1,
                output: format!("Failed to start {}: {:#}\n", transcoder.name(), e),
            },
        };

        if output.success() {
            self.transcode_succeeded = true;
            self.state = JobState::Succeeded;
            info!("Transcode finished");
            self.reconcile().await;
        } else {
            self.state = JobState::Failed;
            warn!(exit_code = output.exit_code, "Transcode failed");
            self.record_failure(&output).await;
        }

        self.finish(router).await
    }

    /// Swap the output onto the input (video) or remove the input (audio)
    async fn reconcile(&mut self) {
        if self.reconciled || !self.transcode_succeeded {
            return;
        }
        self.reconciled = true;
        self.state = JobState::Reconciled;

        if self.settings.keep_original {
            debug!("Keeping original file");
            return;
        }

        let (target, media_type) = match (&self.output, self.media_type) {
            (Some(target), Some(media_type)) if target.path != self.path => {
                (target.clone(), media_type)
            }
            _ => return,
        };

        if target.is_rename {
            match fs::rename(&target.path, &self.path).await {
                Ok(()) => {
                    self.renamed = true;
                    debug!(from = %target.path.display(), to = %self.path.display(), "Moved converted file");
                }
                Err(e) => warn!(
                    from = %target.path.display(),
                    "Unable to move converted file, error: {}",
                    e
                ),
            }
        } else if media_type == MediaType::Audio {
            match fs::remove_file(&self.path).await {
                Ok(()) => debug!(path = %self.path.display(), "Removed original file"),
                Err(e) => warn!(
                    path = %self.path.display(),
                    "Unable to remove original file, error: {}",
                    e
                ),
            }
        }
    }

    /// Write the diagnostic file and clean up partial output
    async fn record_failure(&self, output: &TranscodeOutput) {
        let diagnostic = self.diagnostic_path();
        let contents = format!("Return code: {}\n\n{}", output.exit_code, output.output);

        match fs::write(&diagnostic, contents).await {
            Ok(()) => info!(path = %diagnostic.display(), "Wrote transcode diagnostics"),
            Err(e) => warn!(
                path = %diagnostic.display(),
                "Unable to write transcode diagnostics, error: {}",
                e
            ),
        }

        // The input itself is never cleaned up as partial output
        if let Some(target) = self.output.as_ref().filter(|t| t.path != self.path) {
            match fs::remove_file(&target.path).await {
                Ok(()) => debug!(path = %target.path.display(), "Removed partial output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %target.path.display(),
                    "Unable to remove failed converted file {}: {}",
                    target.path.display(),
                    e
                ),
            }
        }
    }

    /// Where the transcoded content lives now, if there is any
    fn delivered_path(&self) -> Option<&Path> {
        if !self.transcode_succeeded {
            return None;
        }
        if self.renamed {
            Some(&self.path)
        } else {
            self.output.as_ref().map(|target| target.path.as_path())
        }
    }

    /// Terminal step, taken on every path through the job
    async fn finish(&mut self, router: &NotificationRouter) -> Result<JobOutcome, JobError> {
        let result = self.state;
        let notice = Notice {
            title: &self.title,
            channel: &self.channel,
            fname: &self.fname,
            path: &self.path,
            output_path: self.delivered_path(),
            status: &self.status,
        };

        let recipients = router
            .route_and_send(&notice, self.transcode_succeeded)
            .await?;
        self.state = JobState::Notified;

        Ok(JobOutcome {
            state: self.state,
            result,
            transcode_succeeded: self.transcode_succeeded,
            recipients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(path: &str) -> MediaJob {
        let descriptor = JobDescriptor::from_recording(path, "BBC One", "Evening News", "OK").unwrap();
        MediaJob::new(descriptor, Arc::new(JobSettings::default()))
    }

    #[test]
    fn test_determine_type() {
        assert_eq!(job("/rec/movie.ts").determine_type().unwrap(), MediaType::Video);
        assert_eq!(job("/rec/movie.mkv").determine_type().unwrap(), MediaType::Video);
        assert_eq!(job("/rec/show.mka").determine_type().unwrap(), MediaType::Audio);
        assert!(matches!(
            job("/rec/notes.txt").determine_type(),
            Err(JobError::UnsupportedInputType(ref name)) if name == "notes.txt"
        ));
    }

    #[test]
    fn test_fname_base_strips_last_extension() {
        assert_eq!(job("/rec/News.2024-01-01.ts").fname_base(), "News.2024-01-01");
    }

    #[test]
    fn test_video_output_is_random_rename_target() {
        let mut job = job("/rec/movie.ts");
        let target = job.output_target().unwrap().clone();

        assert!(target.is_rename);
        assert!(target.name.ends_with(".mkv"));
        assert_eq!(target.path, PathBuf::from("/rec").join(&target.name));
        let stem = target.name.trim_end_matches(".mkv");
        assert!(Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn test_output_name_is_idempotent() {
        let mut job = job("/rec/movie.ts");
        let first = job.output_target().unwrap().clone();
        let second = job.output_target().unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_video_output_names_are_unique() {
        let names: std::collections::HashSet<String> = (0..1000)
            .map(|_| job("/rec/movie.ts").output_target().unwrap().name.clone())
            .collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_audio_output_keeps_base_name() {
        let mut job = job("/rec/show.mka");
        let target = job.output_target().unwrap();

        assert!(!target.is_rename);
        assert_eq!(target.name, "show.mp3");
        assert_eq!(target.path, PathBuf::from("/rec/show.mp3"));
    }

    #[test]
    fn test_audio_output_may_not_replace_input() {
        let settings = JobSettings {
            audio_types: ExtensionSet::new([".mka", ".mp3"]),
            ..Default::default()
        };
        let descriptor =
            JobDescriptor::from_recording("/rec/SHOW.MP3", "Radio 4", "The Archers", "OK").unwrap();
        let mut job = MediaJob::new(descriptor, Arc::new(settings));

        assert_eq!(job.determine_type().unwrap(), MediaType::Audio);
        assert!(matches!(
            job.output_target(),
            Err(JobError::OutputIsInput(ref name)) if name == "SHOW.MP3"
        ));
    }

    #[test]
    fn test_transcode_args() {
        let mut job = job("/rec/show.mka");
        let args = job.transcode_args().unwrap();

        assert_eq!(
            args,
            vec![
                "-i",
                "/rec/show.mka",
                "-c:a",
                "libmp3lame",
                "-q:a",
                "3",
                "-y",
                "/rec/show.mp3"
            ]
        );
    }

    #[test]
    fn test_diagnostic_path_is_next_to_input() {
        assert_eq!(
            job("/rec/movie.ts").diagnostic_path(),
            PathBuf::from("/rec/movie.tc_err")
        );
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job("/rec/movie.ts");
        assert_eq!(job.state(), JobState::Pending);
        assert!(!job.transcode_succeeded());
        assert!(!job.keep_original());
    }
}
