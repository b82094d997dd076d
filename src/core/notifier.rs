//! Notification routing.
//!
//! Every recipient in `notify_list` is checked independently: a recipient is
//! notified once if any of its title patterns matches. Only when no
//! recipient matched at all does the default recipient get the message.

use std::path::Path;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::info;

use crate::adapters::{MailMessage, Mailer};
use crate::domain::STATUS_OK;

/// Errors delivering notifications
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to deliver notification to {recipient}: {reason}")]
    Delivery { recipient: String, reason: String },
}

/// One recipient and the title patterns it subscribes to
#[derive(Debug, Clone)]
pub struct RecipientRule {
    address: String,
    patterns: Vec<Regex>,
}

impl RecipientRule {
    /// Compile case-insensitive patterns for `address`.
    ///
    /// On failure returns the offending pattern with the regex error.
    pub fn new(address: &str, patterns: &[String]) -> Result<Self, (String, regex::Error)> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| (pattern.clone(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            address: address.to_string(),
            patterns,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether any pattern is found anywhere in `title`
    pub fn matches(&self, title: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(title))
    }
}

/// Immutable routing table, built once from configuration
#[derive(Debug, Clone)]
pub struct NotifyRules {
    recipients: Vec<RecipientRule>,
    default_recipient: String,
    from_addr: String,
}

impl NotifyRules {
    pub fn new(
        recipients: Vec<RecipientRule>,
        default_recipient: impl Into<String>,
        from_addr: impl Into<String>,
    ) -> Self {
        Self {
            recipients,
            default_recipient: default_recipient.into(),
            from_addr: from_addr.into(),
        }
    }

    pub fn recipients(&self) -> &[RecipientRule] {
        &self.recipients
    }

    pub fn default_recipient(&self) -> &str {
        &self.default_recipient
    }

    pub fn from_addr(&self) -> &str {
        &self.from_addr
    }

    /// Recipients for a title, in configured order; never empty
    pub fn route(&self, title: &str) -> Vec<&str> {
        let matched: Vec<&str> = self
            .recipients
            .iter()
            .filter(|rule| rule.matches(title))
            .map(RecipientRule::address)
            .collect();

        if matched.is_empty() {
            vec![self.default_recipient.as_str()]
        } else {
            matched
        }
    }
}

/// What a notification is about
#[derive(Debug, Clone, Copy)]
pub struct Notice<'a> {
    pub title: &'a str,
    pub channel: &'a str,
    pub fname: &'a str,
    pub path: &'a Path,
    /// Where the transcoded file ended up, if a transcode produced one
    pub output_path: Option<&'a Path>,
    pub status: &'a str,
}

/// The three message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Recording OK and transcoded
    Success,
    /// Recording OK but the transcode did not succeed
    TranscodeFailure,
    /// Upstream recording failed
    RecordingError,
}

impl Template {
    pub fn select(status: &str, transcode_done: bool) -> Self {
        match (status == STATUS_OK, transcode_done) {
            (true, true) => Self::Success,
            (true, false) => Self::TranscodeFailure,
            (false, _) => Self::RecordingError,
        }
    }
}

/// Render subject and body for a notice
pub fn render(notice: &Notice<'_>, transcode_done: bool) -> (String, String) {
    match Template::select(notice.status, transcode_done) {
        Template::Success => {
            let full_path = notice.output_path.unwrap_or(notice.path);
            let filename = full_path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| notice.fname.to_string());

            (
                format!("New Recording: {}", notice.title),
                format!(
                    "A new recording is available:\n\nTitle: {}\nChannel: {}\nFilename: {}\nFull Path: {}\n",
                    notice.title,
                    notice.channel,
                    filename,
                    full_path.display()
                ),
            )
        }
        Template::TranscodeFailure => (
            format!("Transcode Failure: {}", notice.title),
            format!(
                "A failure occurred trying to transcode the video. See system logs.\n\nTitle: {}\nChannel: {}\nPath: {}\n",
                notice.title,
                notice.channel,
                notice.path.display()
            ),
        ),
        Template::RecordingError => (
            format!("Recording Error: {}", notice.title),
            format!(
                "Error recording program:\n\nTitle: {}\nChannel: {}\nError: {}\n",
                notice.title, notice.channel, notice.status
            ),
        ),
    }
}

/// Routes notices to recipients and hands them to the mailer
#[derive(Clone)]
pub struct NotificationRouter {
    rules: NotifyRules,
    mailer: Arc<dyn Mailer>,
}

impl NotificationRouter {
    pub fn new(rules: NotifyRules, mailer: Arc<dyn Mailer>) -> Self {
        Self { rules, mailer }
    }

    pub fn rules(&self) -> &NotifyRules {
        &self.rules
    }

    /// Send one message per matched (or default) recipient.
    ///
    /// Returns the recipients notified. The first delivery failure aborts the
    /// remaining sends and is returned to the caller.
    pub async fn route_and_send(
        &self,
        notice: &Notice<'_>,
        transcode_done: bool,
    ) -> Result<Vec<String>, NotifyError> {
        let (subject, body) = render(notice, transcode_done);
        let mut sent = Vec::new();

        for recipient in self.rules.route(notice.title) {
            let message = MailMessage {
                from: self.rules.from_addr().to_string(),
                to: recipient.to_string(),
                subject: subject.clone(),
                body: body.clone(),
            };

            self.mailer
                .send(&message)
                .await
                .map_err(|e| NotifyError::Delivery {
                    recipient: recipient.to_string(),
                    reason: format!("{:#}", e),
                })?;

            info!(recipient, title = notice.title, "Email sent to '{}' for programme '{}'", recipient, notice.title);
            sent.push(recipient.to_string());
        }

        Ok(sent)
    }
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<MailMessage>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl Mailer for Outbox {
        async fn send(&self, message: &MailMessage) -> Result<()> {
            if self.fail_for.as_deref() == Some(message.to.as_str()) {
                anyhow::bail!("relay refused");
            }
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn rule(address: &str, patterns: &[&str]) -> RecipientRule {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        RecipientRule::new(address, &patterns).unwrap()
    }

    fn rules() -> NotifyRules {
        NotifyRules::new(
            vec![rule("ops@example.com", &["News.*"])],
            "fallback@example.com",
            "tvheadend@example.com",
        )
    }

    fn notice<'a>(title: &'a str, status: &'a str) -> Notice<'a> {
        Notice {
            title,
            channel: "BBC One",
            fname: "rec.ts",
            path: Path::new("/rec/rec.ts"),
            output_path: Some(Path::new("/rec/out.mkv")),
            status,
        }
    }

    #[test]
    fn test_routes_matching_title() {
        assert_eq!(rules().route("Evening News"), vec!["ops@example.com"]);
    }

    #[test]
    fn test_falls_back_to_default() {
        assert_eq!(rules().route("Weather"), vec!["fallback@example.com"]);
    }

    #[test]
    fn test_match_is_case_insensitive_substring() {
        let rules = rules();
        assert_eq!(rules.route("the late NEWS review"), vec!["ops@example.com"]);
    }

    #[test]
    fn test_every_matching_recipient_is_routed_in_order() {
        let rules = NotifyRules::new(
            vec![
                rule("a@example.com", &["news", "weather"]),
                rule("b@example.com", &["sport"]),
                rule("c@example.com", &["evening"]),
            ],
            "fallback@example.com",
            "tvheadend@example.com",
        );

        // a matches twice but is listed once
        assert_eq!(
            rules.route("Evening News and Weather"),
            vec!["a@example.com", "c@example.com"]
        );
    }

    #[test]
    fn test_template_selection() {
        assert_eq!(Template::select("OK", true), Template::Success);
        assert_eq!(Template::select("OK", false), Template::TranscodeFailure);
        assert_eq!(Template::select("Disk full", true), Template::RecordingError);
        assert_eq!(Template::select("Disk full", false), Template::RecordingError);
    }

    #[test]
    fn test_render_templates() {
        let (subject, body) = render(&notice("Evening News", "OK"), true);
        assert_eq!(subject, "New Recording: Evening News");
        assert!(body.contains("Filename: out.mkv\n"));
        assert!(body.contains("Full Path: /rec/out.mkv\n"));

        let (subject, body) = render(&notice("Evening News", "OK"), false);
        assert_eq!(subject, "Transcode Failure: Evening News");
        assert!(body.contains("See system logs."));
        assert!(body.contains("Path: /rec/rec.ts\n"));

        let (subject, body) = render(&notice("Evening News", "No input detected"), false);
        assert_eq!(subject, "Recording Error: Evening News");
        assert!(body.contains("Error: No input detected\n"));
        assert!(body.contains("Channel: BBC One\n"));
    }

    #[tokio::test]
    async fn test_route_and_send() {
        let outbox = Arc::new(Outbox::default());
        let router = NotificationRouter::new(rules(), outbox.clone());

        let sent = router
            .route_and_send(&notice("Weather", "OK"), true)
            .await
            .unwrap();
        assert_eq!(sent, vec!["fallback@example.com"]);

        let messages = outbox.sent.lock().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from, "tvheadend@example.com");
        assert_eq!(messages[0].to, "fallback@example.com");
        assert_eq!(messages[0].subject, "New Recording: Weather");
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let outbox = Arc::new(Outbox {
            fail_for: Some("ops@example.com".to_string()),
            ..Default::default()
        });
        let router = NotificationRouter::new(rules(), outbox);

        let result = router
            .route_and_send(&notice("Evening News", "OK"), true)
            .await;
        assert!(matches!(
            result,
            Err(NotifyError::Delivery { ref recipient, .. }) if recipient == "ops@example.com"
        ));
    }
}
