//! Request and response shapes of the `/emails` routes.
//! Incoming data is parsed into validated types here, every problem is reported as a `Violation`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;
use validator::ValidateEmail;

use crate::{config::ListingConfig, database::Signup};

const EMAIL_MAX_GRAPHEMES: usize = 256;

// ###################################
// ->   VIOLATIONS
// ###################################
/// A single problem with the received input, pointing at the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: Vec<String>,
    pub code: ViolationCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    InvalidJson,
    InvalidType,
    InvalidString,
    TooLong,
    TooSmall,
    TooBig,
}

impl Violation {
    pub fn new(field: Option<&str>, code: ViolationCode, message: impl Into<String>) -> Self {
        Violation {
            path: field.into_iter().map(str::to_string).collect(),
            code,
            message: message.into(),
        }
    }

    /// The body couldn't be read as JSON at all.
    pub fn invalid_json(reason: impl Into<String>) -> Self {
        Self::new(None, ViolationCode::InvalidJson, reason)
    }

    /// The query string couldn't be deserialized.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::new(None, ViolationCode::InvalidType, reason)
    }

    fn wrong_type(field: Option<&str>, expected: &str, received: &Value) -> Self {
        Self::new(
            field,
            ViolationCode::InvalidType,
            format!("Expected {expected}, received {}", json_type_name(received)),
        )
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ###################################
// ->   SIGNUP INTAKE
// ###################################
/// A validated `POST /emails` payload.
#[derive(Debug, Clone)]
pub struct NewSignup {
    pub email: ValidEmail,
    pub source: Option<String>,
}

impl NewSignup {
    /// Validates a JSON body. All violations are collected, not only the first one.
    pub fn parse(body: &Value) -> Result<Self, Vec<Violation>> {
        let Value::Object(fields) = body else {
            return Err(vec![Violation::wrong_type(None, "object", body)]);
        };

        let mut violations = Vec::new();

        let email = match fields.get("email") {
            None => {
                violations.push(Violation::new(
                    Some("email"),
                    ViolationCode::InvalidType,
                    "Required",
                ));
                None
            }
            Some(Value::String(email)) => ValidEmail::parse(email)
                .map_err(|violation| violations.push(violation))
                .ok(),
            Some(other) => {
                violations.push(Violation::wrong_type(Some("email"), "string", other));
                None
            }
        };

        // Optional, but when present it has to be a string. `null` included.
        let source = match fields.get("source") {
            None => None,
            Some(Value::String(source)) => Some(source.clone()),
            Some(other) => {
                violations.push(Violation::wrong_type(Some("source"), "string", other));
                None
            }
        };

        match email {
            Some(email) if violations.is_empty() => Ok(NewSignup { email, source }),
            _ => Err(violations),
        }
    }
}

/// Validated email address, kept exactly as received.
/// `Debug` never prints the address, use `as_ref` to get to it.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidEmail(String);

impl AsRef<str> for ValidEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ValidEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ValidEmail").field(&self.redacted()).finish()
    }
}

impl ValidEmail {
    pub fn parse<S>(value: S) -> Result<Self, Violation>
    where
        S: AsRef<str>,
    {
        let value = value.as_ref();

        if value.graphemes(true).count() > EMAIL_MAX_GRAPHEMES {
            return Err(Violation::new(
                Some("email"),
                ViolationCode::TooLong,
                format!("Email must contain at most {EMAIL_MAX_GRAPHEMES} character(s)"),
            ));
        }

        if value.validate_email() && has_dotted_domain(value) {
            Ok(ValidEmail(value.to_owned()))
        } else {
            Err(Violation::new(
                Some("email"),
                ViolationCode::InvalidString,
                "Invalid email",
            ))
        }
    }

    /// Masked form safe for logs: first character of the local part and the domain.
    pub fn redacted(&self) -> String {
        redact_email(&self.0)
    }
}

/// Host names only: at least two labels and an alphabetic top level domain,
/// so `localhost` and IP literals are out.
fn has_dotted_domain(email: &str) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };

    match domain.rsplit_once('.') {
        Some((rest, tld)) => {
            !rest.is_empty() && tld.chars().count() >= 2 && tld.chars().all(char::is_alphabetic)
        }
        None => false,
    }
}

pub fn redact_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            let first = local.graphemes(true).next().unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

// ###################################
// ->   LISTING
// ###################################
/// Raw `GET /emails` query. `limit` stays a string so bad values produce a structured violation.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
}

/// Number of rows to list, within `1..=max_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Deref)]
pub struct ListLimit(u32);

impl ListLimit {
    pub fn parse(raw: Option<&str>, listing: &ListingConfig) -> Result<Self, Violation> {
        let Some(raw) = raw else {
            return Ok(ListLimit(listing.default_limit));
        };

        let not_an_integer = || {
            Violation::new(
                Some("limit"),
                ViolationCode::InvalidType,
                "Expected a positive integer",
            )
        };

        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(not_an_integer());
        }

        // Digits only, so a parse failure can only mean overflow.
        let limit = raw.parse::<u64>().unwrap_or(u64::MAX);

        if limit < 1 {
            return Err(Violation::new(
                Some("limit"),
                ViolationCode::TooSmall,
                "Limit must be greater than or equal to 1",
            ));
        }
        if limit > u64::from(listing.max_limit) {
            return Err(Violation::new(
                Some("limit"),
                ViolationCode::TooBig,
                format!(
                    "Limit must be less than or equal to {}",
                    listing.max_limit
                ),
            ));
        }

        Ok(ListLimit(limit as u32))
    }
}

/// Body of a successful `GET /emails`.
#[derive(Debug, Serialize)]
pub struct SignupList {
    /// Number of returned rows, not the size of the table.
    pub count: usize,
    pub emails: Vec<Signup>,
}

impl From<Vec<Signup>> for SignupList {
    fn from(emails: Vec<Signup>) -> Self {
        SignupList {
            count: emails.len(),
            emails,
        }
    }
}
