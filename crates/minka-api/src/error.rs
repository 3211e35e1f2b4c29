//! Error types for the Minka API client

use std::fmt;

/// One field that failed coercion or was missing while decoding a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the offending field (e.g. `photos[0].large_url`)
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors from the Minka client
///
/// A fetch never yields a partial result: the first error on any page
/// aborts the whole operation.
#[derive(Debug)]
pub enum MinkaError {
    /// A filter value failed local validation; no request was issued
    InvalidFilter(String),
    /// The API answered with a non-2xx status
    Request { status: u16, page: u32 },
    /// One page item failed record validation; lists every bad field
    Decode {
        page: u32,
        item: usize,
        errors: Vec<FieldError>,
    },
    /// The transport timed out waiting for a page
    Timeout { page: u32 },
    /// Any other transport failure
    Http(reqwest::Error),
    /// The taxon tree CSV could not be read
    Csv(csv::Error),
}

impl fmt::Display for MinkaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter(msg) => write!(f, "Invalid filter: {}", msg),
            Self::Request { status, page } => {
                write!(f, "Minka API returned status {} on page {}", status, page)
            }
            Self::Decode { page, item, errors } => {
                let fields: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(
                    f,
                    "Failed to decode item {} on page {}: {}",
                    item,
                    page,
                    fields.join("; ")
                )
            }
            Self::Timeout { page } => write!(f, "Request timed out on page {}", page),
            Self::Http(e) => write!(f, "HTTP error: {}", e),
            Self::Csv(e) => write!(f, "Taxon tree CSV error: {}", e),
        }
    }
}

impl std::error::Error for MinkaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<csv::Error> for MinkaError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub type Result<T> = std::result::Result<T, MinkaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_display() {
        let err = MinkaError::InvalidFilter("'dragons' is not a recognized iconic taxon".into());
        assert_eq!(
            format!("{}", err),
            "Invalid filter: 'dragons' is not a recognized iconic taxon"
        );
    }

    #[test]
    fn test_request_error_display() {
        let err = MinkaError::Request {
            status: 404,
            page: 3,
        };
        assert_eq!(format!("{}", err), "Minka API returned status 404 on page 3");
    }

    #[test]
    fn test_decode_error_lists_every_field() {
        let err = MinkaError::Decode {
            page: 2,
            item: 17,
            errors: vec![
                FieldError::new("id", "missing required field"),
                FieldError::new("latitude", "expected a number"),
            ],
        };
        let rendered = format!("{}", err);
        assert!(rendered.contains("item 17 on page 2"));
        assert!(rendered.contains("id: missing required field"));
        assert!(rendered.contains("latitude: expected a number"));
    }

    #[test]
    fn test_timeout_display() {
        let err = MinkaError::Timeout { page: 1 };
        assert_eq!(format!("{}", err), "Request timed out on page 1");
    }
}
