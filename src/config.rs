//! Configuration for the transcoding consumer.
//!
//! The consumer reads a single YAML file (default `/etc/tvhpp.conf`) once at
//! startup. It is resolved into `Settings`, which is then handed explicitly
//! to the components that need it; nothing reads configuration globally.
//!
//! ```yaml
//! notify_list:
//!   ops@example.com: ["News.*", "Weather"]
//! default_notify: fallback@example.com
//! from_addr: tvheadend@example.com
//! transcode_settings:
//!   video: "-c:v libx264 -preset veryfast -crf 21 -c:a ac3 -b:a 192 -sn"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use thiserror::Error;

use crate::core::job::JobSettings;
use crate::core::notifier::{NotifyRules, RecipientRule};
use crate::domain::{ExtensionSet, MediaType};

/// Where the consumer looks for its configuration by default
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tvhpp.conf";

const DEFAULT_AUDIO_ARGS: &str = "-c:a libmp3lame -q:a 3";
const DEFAULT_VIDEO_ARGS: &str = "-c:v libx264 -preset veryfast -crf 21 -c:a ac3 -b:a 192 -sn";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid title pattern '{pattern}' for {recipient}: {source}")]
    InvalidPattern {
        recipient: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Config value '{0}' must not be empty")]
    Empty(&'static str),
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Recipient address -> title patterns, in file order
    #[serde(default, deserialize_with = "ordered_notify_list")]
    pub notify_list: Vec<NotifyEntry>,

    /// Recipient when no pattern matches
    pub default_notify: String,

    /// Sender address for all notifications
    pub from_addr: String,

    #[serde(default)]
    pub transcode_settings: TranscodeSettings,

    #[serde(default = "default_video_types")]
    pub video_types: Vec<String>,

    #[serde(default = "default_audio_types")]
    pub audio_types: Vec<String>,

    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[serde(default)]
    pub mailer: MailerConfig,
}

/// One `notify_list` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEntry {
    pub recipient: String,
    pub patterns: Vec<String>,
}

/// Transcoder arguments per media type, appended after `-i <input>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TranscodeSettings {
    #[serde(default = "default_audio_args")]
    pub audio: String,

    #[serde(default = "default_video_args")]
    pub video: String,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            audio: default_audio_args(),
            video: default_video_args(),
        }
    }
}

impl TranscodeSettings {
    /// Argument profile for a media type
    pub fn profile(&self, media_type: MediaType) -> &str {
        match media_type {
            MediaType::Audio => &self.audio,
            MediaType::Video => &self.video,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_transcoder_binary")]
    pub binary: String,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: default_transcoder_binary(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailerConfig {
    #[serde(default = "default_sendmail")]
    pub sendmail: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            sendmail: default_sendmail(),
        }
    }
}

fn default_audio_args() -> String {
    DEFAULT_AUDIO_ARGS.to_string()
}
fn default_video_args() -> String {
    DEFAULT_VIDEO_ARGS.to_string()
}
fn default_video_types() -> Vec<String> {
    vec![".mkv".to_string(), ".ts".to_string()]
}
fn default_audio_types() -> Vec<String> {
    vec![".mka".to_string()]
}
fn default_transcoder_binary() -> String {
    "ffmpeg".to_string()
}
fn default_sendmail() -> String {
    "/usr/sbin/sendmail".to_string()
}

/// A pattern list may be written as a YAML list or a single string
#[derive(Deserialize)]
#[serde(untagged)]
enum PatternList {
    One(String),
    Many(Vec<String>),
}

impl From<PatternList> for Vec<String> {
    fn from(list: PatternList) -> Self {
        match list {
            PatternList::One(pattern) => vec![pattern],
            PatternList::Many(patterns) => patterns,
        }
    }
}

/// Deserialize `notify_list` keeping the recipients in file order
fn ordered_notify_list<'de, D>(deserializer: D) -> Result<Vec<NotifyEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedNotifyList;

    impl<'de> Visitor<'de> for OrderedNotifyList {
        type Value = Vec<NotifyEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of recipient address to title patterns")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::new();
            while let Some((recipient, patterns)) = map.next_entry::<String, PatternList>()? {
                entries.push(NotifyEntry {
                    recipient,
                    patterns: patterns.into(),
                });
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(OrderedNotifyList)
}

impl ConfigFile {
    /// Parse a config document; `path` is only used in error messages
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content, path)
    }
}

/// Resolved configuration, validated and ready to use
#[derive(Debug, Clone)]
pub struct Settings {
    /// File the settings were loaded from
    pub config_file: PathBuf,

    /// Compiled notification routing table
    pub rules: NotifyRules,

    /// Per-job processing settings (extension sets, profiles, keep flag)
    pub job: JobSettings,

    /// Transcoder binary
    pub transcoder_binary: String,

    /// sendmail-compatible binary
    pub sendmail_binary: String,
}

impl Settings {
    /// Load and resolve the config file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = ConfigFile::load(path)?;
        Self::resolve(file, path)
    }

    /// Validate a parsed config file and compile its patterns
    pub fn resolve(file: ConfigFile, path: &Path) -> Result<Self, ConfigError> {
        if file.default_notify.trim().is_empty() {
            return Err(ConfigError::Empty("default_notify"));
        }
        if file.from_addr.trim().is_empty() {
            return Err(ConfigError::Empty("from_addr"));
        }

        let mut recipients = Vec::with_capacity(file.notify_list.len());
        for entry in &file.notify_list {
            if entry.recipient.trim().is_empty() {
                return Err(ConfigError::Empty("notify_list recipient"));
            }

            let rule = RecipientRule::new(&entry.recipient, &entry.patterns).map_err(
                |(pattern, source)| ConfigError::InvalidPattern {
                    recipient: entry.recipient.clone(),
                    pattern,
                    source,
                },
            )?;
            recipients.push(rule);
        }

        Ok(Self {
            config_file: path.to_path_buf(),
            rules: NotifyRules::new(recipients, file.default_notify, file.from_addr),
            job: JobSettings {
                audio_types: ExtensionSet::new(&file.audio_types),
                video_types: ExtensionSet::new(&file.video_types),
                transcode_settings: file.transcode_settings,
                keep_original: false,
            },
            transcoder_binary: file.transcoder.binary,
            sendmail_binary: file.mailer.sendmail,
        })
    }
}
