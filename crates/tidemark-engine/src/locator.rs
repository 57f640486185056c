//! Object-store location resolution.
//!
//! A stage task names its source with a key template such as
//! `log_data/{year}/{month}/`. An [`ObjectLocator`] renders the template for
//! the run's logical key and turns it into a URI the warehouse can copy from.

use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tidemark_types::run::LogicalKey;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("valid placeholder regex"));

/// Why a source location could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    #[error("malformed source template '{template}': {reason}")]
    Malformed { template: String, reason: String },

    #[error("source template '{template}' needs a date, but logical key '{key}' is not one")]
    NotADate { template: String, key: String },

    #[error("source location '{0}' does not exist")]
    NotFound(String),
}

/// Resolves source templates to concrete object-store URIs.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn ObjectLocator>`.
pub trait ObjectLocator: Send + Sync {
    /// Resolve `template` for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError`] if the template is malformed or the resolved
    /// location is unusable.
    fn locate(&self, template: &str, key: &LogicalKey) -> Result<String, LocateError>;

    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Placeholder {
    Key,
    Ds,
    DsNodash,
    Year,
    Month,
    Day,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "key" => Some(Self::Key),
            "ds" => Some(Self::Ds),
            "ds_nodash" => Some(Self::DsNodash),
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    fn render(self, key: &LogicalKey, date: Option<NaiveDate>) -> Option<String> {
        let text = match self {
            Self::Key => key.as_str().to_string(),
            Self::Ds => date?.format("%Y-%m-%d").to_string(),
            Self::DsNodash => date?.format("%Y%m%d").to_string(),
            Self::Year => format!("{:04}", date?.year()),
            Self::Month => format!("{:02}", date?.month()),
            Self::Day => format!("{:02}", date?.day()),
        };
        Some(text)
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(Placeholder),
}

fn malformed(template: &str, reason: impl Into<String>) -> LocateError {
    LocateError::Malformed {
        template: template.to_string(),
        reason: reason.into(),
    }
}

fn push_literal<'a>(
    template: &str,
    segments: &mut Vec<Segment<'a>>,
    text: &'a str,
) -> Result<(), LocateError> {
    if text.contains(['{', '}']) {
        return Err(malformed(template, "unbalanced brace"));
    }
    if !text.is_empty() {
        segments.push(Segment::Literal(text));
    }
    Ok(())
}

fn parse_template(template: &str) -> Result<Vec<Segment<'_>>, LocateError> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        push_literal(template, &mut segments, &template[cursor..whole.start()])?;
        let name = &caps[1];
        let placeholder = Placeholder::parse(name)
            .ok_or_else(|| malformed(template, format!("unknown placeholder {{{name}}}")))?;
        segments.push(Segment::Placeholder(placeholder));
        cursor = whole.end();
    }
    push_literal(template, &mut segments, &template[cursor..])?;
    Ok(segments)
}

/// Check template syntax without a logical key.
///
/// # Errors
///
/// Returns [`LocateError::Malformed`] for unknown placeholders or stray
/// braces.
pub fn validate_template(template: &str) -> Result<(), LocateError> {
    parse_template(template).map(|_| ())
}

/// Render `template` for `key`.
///
/// # Errors
///
/// Returns [`LocateError::Malformed`] for bad syntax and
/// [`LocateError::NotADate`] when a date placeholder is used with a key
/// that is not a date.
pub fn render_template(template: &str, key: &LogicalKey) -> Result<String, LocateError> {
    let segments = parse_template(template)?;
    let date = key.as_date();
    let mut rendered = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => rendered.push_str(text),
            Segment::Placeholder(placeholder) => {
                let value =
                    placeholder
                        .render(key, date)
                        .ok_or_else(|| LocateError::NotADate {
                            template: template.to_string(),
                            key: key.as_str().to_string(),
                        })?;
                rendered.push_str(&value);
            }
        }
    }
    Ok(rendered)
}

// ---------------------------------------------------------------------------
// Locators
// ---------------------------------------------------------------------------

/// Resolves to `s3://<bucket>/<rendered key>` without touching the network.
#[derive(Debug, Clone)]
pub struct S3Locator {
    bucket: String,
}

impl S3Locator {
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

impl ObjectLocator for S3Locator {
    fn locate(&self, template: &str, key: &LogicalKey) -> Result<String, LocateError> {
        let rendered = render_template(template, key)?;
        Ok(format!(
            "s3://{}/{}",
            self.bucket.trim_end_matches('/'),
            rendered.trim_start_matches('/')
        ))
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}

/// Resolves under a local directory and requires the result to exist.
#[derive(Debug, Clone)]
pub struct LocalLocator {
    root: PathBuf,
}

impl LocalLocator {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectLocator for LocalLocator {
    fn locate(&self, template: &str, key: &LogicalKey) -> Result<String, LocateError> {
        let rendered = render_template(template, key)?;
        let path = self.root.join(rendered.trim_start_matches('/'));
        let shown = path.display().to_string();
        if !path.exists() {
            return Err(LocateError::NotFound(shown));
        }
        Ok(shown)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nov_2018() -> LogicalKey {
        LogicalKey::new("2018-11-05")
    }

    #[test]
    fn renders_date_placeholders() {
        let rendered =
            render_template("log_data/{year}/{month}/{ds_nodash}-{day}.json", &nov_2018()).unwrap();
        assert_eq!(rendered, "log_data/2018/11/20181105-05.json");
        assert_eq!(
            render_template("dt={ds}/", &nov_2018()).unwrap(),
            "dt=2018-11-05/"
        );
    }

    #[test]
    fn key_placeholder_works_for_any_key() {
        let key = LogicalKey::new("backfill-7");
        assert_eq!(render_template("runs/{key}/", &key).unwrap(), "runs/backfill-7/");
    }

    #[test]
    fn template_without_placeholders_is_verbatim() {
        assert_eq!(
            render_template("song_data/", &nov_2018()).unwrap(),
            "song_data/"
        );
    }

    #[test]
    fn date_placeholder_with_non_date_key_fails() {
        let err = render_template("log_data/{year}/", &LogicalKey::new("latest")).unwrap_err();
        assert!(matches!(err, LocateError::NotADate { .. }));
    }

    #[test]
    fn unknown_placeholder_is_malformed() {
        let err = validate_template("log_data/{hour}/").unwrap_err();
        assert!(err.to_string().contains("unknown placeholder {hour}"));
    }

    #[test]
    fn stray_braces_are_malformed() {
        assert!(validate_template("log_data/{year/").is_err());
        assert!(validate_template("log_data/year}/").is_err());
        assert!(validate_template("log_data/{{year}}/").is_err());
    }

    #[test]
    fn s3_locator_joins_bucket_and_key() {
        let locator = S3Locator::new("udacity-dend");
        let uri = locator
            .locate("/log_data/{year}/{month}/", &nov_2018())
            .unwrap();
        assert_eq!(uri, "s3://udacity-dend/log_data/2018/11/");
    }

    #[test]
    fn local_locator_requires_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("log_data/2018/11")).unwrap();
        let locator = LocalLocator::new(dir.path());

        let found = locator.locate("log_data/{year}/{month}/", &nov_2018()).unwrap();
        assert!(found.ends_with("log_data/2018/11/"));

        let err = locator
            .locate("log_data/{year}/12/", &nov_2018())
            .unwrap_err();
        assert!(matches!(err, LocateError::NotFound(_)));
    }
}
