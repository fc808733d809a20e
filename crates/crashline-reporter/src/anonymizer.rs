//! PII stripping for structured crash logs
//!
//! Replaces the home directory, the login name and (optionally) file names
//! with placeholders before a log leaves the process.

use crashline_core::config::AnonymizeConfig;
use crashline_core::domain::StructuredLog;

/// Anonymizes crash text based on the provided configuration.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    strip_paths: bool,
    strip_usernames: bool,
    strip_filenames: bool,
    home_dir: String,
    username: String,
}

impl Anonymizer {
    /// Creates an `Anonymizer` for the current user.
    pub fn new(config: &AnonymizeConfig) -> Self {
        let home_dir = dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_default();

        Self::with_identity(config, home_dir, username)
    }

    /// Creates an `Anonymizer` for an explicit home directory and login name.
    pub fn with_identity(
        config: &AnonymizeConfig,
        home_dir: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            strip_paths: config.strip_paths,
            strip_usernames: config.strip_usernames,
            strip_filenames: config.strip_filenames,
            home_dir: home_dir.into(),
            username: username.into(),
        }
    }

    /// Anonymize the given text by applying configured replacements.
    pub fn anonymize(&self, text: &str) -> String {
        let mut result = text.to_string();

        // Paths first: the home directory usually contains the login name.
        if self.strip_paths && !self.home_dir.is_empty() {
            result = result.replace(&self.home_dir, "<HOME>");
        }

        if self.strip_usernames && !self.username.is_empty() {
            result = result.replace(&self.username, "<USER>");
        }

        if self.strip_filenames {
            result = anonymize_filenames(&result);
        }

        result
    }

    /// Anonymizes every free-text field of a crash log in place.
    pub fn anonymize_log(&self, log: &mut StructuredLog) {
        log.reason = self.anonymize(&log.reason);
        if let Some(location) = log.location.as_mut() {
            *location = self.anonymize(location);
        }
        if let Some(trace) = log.stack_trace.as_mut() {
            *trace = self.anonymize(trace);
        }
    }
}

/// Replaces the last component of `/dir/name.ext` paths with `<FILE>.ext`.
///
/// Rust source locations (`*.rs`) are kept since they identify code, not user data.
fn anonymize_filenames(text: &str) -> String {
    let is_boundary = |c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ':' | '(' | ')');

    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(|c: char| !is_boundary(c)) {
        result.push_str(&rest[..start]);
        rest = &rest[start..];
        let end = rest.find(is_boundary).unwrap_or(rest.len());
        let token = &rest[..end];
        result.push_str(&anonymize_token(token));
        rest = &rest[end..];
    }
    result.push_str(rest);
    result
}

fn anonymize_token(token: &str) -> String {
    let Some(slash) = token.rfind('/') else {
        return token.to_string();
    };
    let (dir, name) = token.split_at(slash + 1);
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot < name.len() - 1 && &name[dot..] != ".rs" => {
            format!("{dir}<FILE>{}", &name[dot..])
        }
        _ => token.to_string(),
    }
}
