//! Bulk-copy command shape.
//!
//! [`CopyCommand`] renders the Redshift-style `COPY ... FROM '<uri>'`
//! statement the stage loader hands to a connector. Credentials are passed
//! through untouched and never appear in [`CopyCommand::to_redacted_sql`]
//! or `Debug` output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sql::{quote_literal, quote_qualified};

const REDACTED: &str = "'***'";

/// Object-store access credentials, opaque to the loader.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    AccessKey {
        access_key_id: String,
        secret_access_key: String,
    },
    IamRole {
        iam_role: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessKey { .. } => f
                .debug_struct("AccessKey")
                .field("access_key_id", &"***")
                .field("secret_access_key", &"***")
                .finish(),
            Self::IamRole { .. } => f.debug_struct("IamRole").field("iam_role", &"***").finish(),
        }
    }
}

fn default_json_paths() -> String {
    "auto".to_string()
}

fn default_time_format() -> String {
    "epochmillisecs".to_string()
}

/// Source-format options for the copy; configuration, not hardcoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOptions {
    /// `auto` or the URI of a JSONPaths file.
    #[serde(default = "default_json_paths")]
    pub json_paths: String,
    /// Timestamp parsing convention, epoch milliseconds by default.
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default)]
    pub region: Option<String>,
    /// When `false` the command carries `COMPUPDATE OFF`.
    #[serde(default)]
    pub compupdate: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            json_paths: default_json_paths(),
            time_format: default_time_format(),
            region: None,
            compupdate: false,
        }
    }
}

/// A single bulk copy from `location` into `table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCommand {
    pub table: String,
    pub location: String,
    pub credentials: Option<Credentials>,
    pub options: CopyOptions,
}

impl CopyCommand {
    /// Full statement text, including credentials.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.render(false)
    }

    /// Statement text with every credential value masked.
    #[must_use]
    pub fn to_redacted_sql(&self) -> String {
        self.render(true)
    }

    fn render(&self, redact: bool) -> String {
        let secret = |value: &str| {
            if redact {
                REDACTED.to_string()
            } else {
                quote_literal(value)
            }
        };

        let mut lines = vec![
            format!("COPY {}", quote_qualified(&self.table)),
            format!("FROM {}", quote_literal(&self.location)),
        ];
        match &self.credentials {
            Some(Credentials::AccessKey {
                access_key_id,
                secret_access_key,
            }) => {
                lines.push(format!("ACCESS_KEY_ID {}", secret(access_key_id)));
                lines.push(format!("SECRET_ACCESS_KEY {}", secret(secret_access_key)));
            }
            Some(Credentials::IamRole { iam_role }) => {
                lines.push(format!("IAM_ROLE {}", secret(iam_role)));
            }
            None => {}
        }
        lines.push(format!(
            "FORMAT AS JSON {}",
            quote_literal(&self.options.json_paths)
        ));
        lines.push(format!(
            "TIMEFORMAT AS {}",
            quote_literal(&self.options.time_format)
        ));
        if let Some(region) = &self.options.region {
            lines.push(format!("REGION {}", quote_literal(region)));
        }
        if !self.options.compupdate {
            lines.push("COMPUPDATE OFF".to_string());
        }
        lines.join("\n")
    }
}
