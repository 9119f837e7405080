//! Resumable upload header vocabulary (draft-ietf-httpbis-resumable-upload-05).
//!
//! Headers are parsed once per request into [`UploadHeaders`] and handed to the
//! engine as typed values. Nothing downstream looks at raw header text again.

use crate::error::{Error, Result};

/// The only interop version this server speaks.
pub const INTEROP_VERSION: &str = "6";

pub const HEADER_INTEROP_VERSION: &str = "upload-draft-interop-version";
pub const HEADER_UPLOAD_COMPLETE: &str = "upload-complete";
pub const HEADER_UPLOAD_OFFSET: &str = "upload-offset";
pub const HEADER_UPLOAD_LENGTH: &str = "upload-length";

/// Media type carried by appends to an existing upload.
pub const PARTIAL_UPLOAD_MEDIA_TYPE: &str = "application/partial-upload";

/// Media type for problem detail bodies (RFC 9457).
pub const PROBLEM_JSON_MEDIA_TYPE: &str = "application/problem+json";

/// Problem type returned when appending to an upload that is already complete.
pub const PROBLEM_COMPLETED_UPLOAD: &str =
    "https://iana.org/assignments/http-problem-types#completed-upload";

/// Problem type returned when the client's offset does not match the server's.
pub const PROBLEM_MISMATCHING_OFFSET: &str =
    "https://iana.org/assignments/http-problem-types#mismatching-upload-offset";

/// Value of the `Upload-Complete` header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UploadComplete {
    True,
    False,
    /// Missing, empty, or not one of `1`/`0`.
    #[default]
    Absent,
}

impl UploadComplete {
    /// Parse a raw header value.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("1") => Self::True,
            Some("0") => Self::False,
            _ => Self::Absent,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Whether this request finishes the upload. Absent counts as not complete.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    /// Wire representation for responses.
    pub fn as_header_value(complete: bool) -> &'static str {
        if complete { "1" } else { "0" }
    }
}

/// A non-negative integer header such as `Upload-Offset` or `Content-Length`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NumericHeader {
    #[default]
    Absent,
    Value(u64),
    /// Present but not a decimal that fits in a u64.
    Malformed,
}

impl NumericHeader {
    /// Parse a raw header value.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim) else {
            return Self::Absent;
        };
        if raw.is_empty() {
            return Self::Absent;
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Malformed;
        }
        raw.parse::<u64>().map_or(Self::Malformed, Self::Value)
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// The parsed value, failing if the header was present but malformed.
    pub fn value(&self, name: &'static str) -> Result<Option<u64>> {
        match self {
            Self::Absent => Ok(None),
            Self::Value(v) => Ok(Some(*v)),
            Self::Malformed => Err(Error::InvalidHeader {
                name,
                reason: "expected a non-negative decimal integer".to_string(),
            }),
        }
    }
}

/// Every header the upload engine looks at, parsed once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadHeaders {
    pub interop_version: Option<String>,
    pub complete: UploadComplete,
    pub upload_offset: NumericHeader,
    pub upload_length: NumericHeader,
    pub content_length: NumericHeader,
    pub content_type: Option<String>,
}

impl UploadHeaders {
    /// Build from a case-insensitive header lookup.
    ///
    /// `lookup` receives lower-case header names and returns the value if it is
    /// present and valid ASCII.
    pub fn from_lookup<'a, F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        Self {
            interop_version: lookup(HEADER_INTEROP_VERSION).map(|v| v.trim().to_string()),
            complete: UploadComplete::parse(lookup(HEADER_UPLOAD_COMPLETE)),
            upload_offset: NumericHeader::parse(lookup(HEADER_UPLOAD_OFFSET)),
            upload_length: NumericHeader::parse(lookup(HEADER_UPLOAD_LENGTH)),
            content_length: NumericHeader::parse(lookup("content-length")),
            content_type: lookup("content-type").map(|v| v.to_string()),
        }
    }

    /// Whether the client speaks our interop version.
    pub fn is_supported_version(&self) -> bool {
        self.interop_version.as_deref() == Some(INTEROP_VERSION)
    }

    /// Whether the body is declared as a partial upload payload.
    pub fn is_partial_upload(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PARTIAL_UPLOAD_MEDIA_TYPE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn headers(pairs: &[(&str, &str)]) -> UploadHeaders {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        UploadHeaders::from_lookup(|name| map.get(name).map(String::as_str))
    }

    #[test]
    fn test_upload_complete_parse() {
        assert_eq!(UploadComplete::parse(Some("1")), UploadComplete::True);
        assert_eq!(UploadComplete::parse(Some("0")), UploadComplete::False);
        assert_eq!(UploadComplete::parse(Some("?1")), UploadComplete::Absent);
        assert_eq!(UploadComplete::parse(Some("")), UploadComplete::Absent);
        assert_eq!(UploadComplete::parse(None), UploadComplete::Absent);
    }

    #[test]
    fn test_numeric_header_parse() {
        assert_eq!(NumericHeader::parse(None), NumericHeader::Absent);
        assert_eq!(NumericHeader::parse(Some("")), NumericHeader::Absent);
        assert_eq!(NumericHeader::parse(Some("0")), NumericHeader::Value(0));
        assert_eq!(NumericHeader::parse(Some(" 42 ")), NumericHeader::Value(42));
        assert_eq!(NumericHeader::parse(Some("-1")), NumericHeader::Malformed);
        assert_eq!(NumericHeader::parse(Some("+1")), NumericHeader::Malformed);
        assert_eq!(NumericHeader::parse(Some("12abc")), NumericHeader::Malformed);
        // u64::MAX + 1
        assert_eq!(
            NumericHeader::parse(Some("18446744073709551616")),
            NumericHeader::Malformed
        );
    }

    #[test]
    fn test_malformed_numeric_counts_as_present() {
        let h = NumericHeader::Malformed;
        assert!(h.is_present());
        assert!(matches!(
            h.value(HEADER_UPLOAD_OFFSET),
            Err(Error::InvalidHeader { name: "upload-offset", .. })
        ));
    }

    #[test]
    fn test_from_lookup() {
        let h = headers(&[
            ("Upload-Draft-Interop-Version", "6"),
            ("Upload-Complete", "0"),
            ("Upload-Offset", "100"),
            ("Content-Type", "application/partial-upload"),
        ]);
        assert!(h.is_supported_version());
        assert_eq!(h.complete, UploadComplete::False);
        assert_eq!(h.upload_offset, NumericHeader::Value(100));
        assert_eq!(h.upload_length, NumericHeader::Absent);
        assert!(h.is_partial_upload());
    }

    #[test]
    fn test_version_gate() {
        assert!(!headers(&[]).is_supported_version());
        assert!(!headers(&[("Upload-Draft-Interop-Version", "5")]).is_supported_version());
        assert!(headers(&[("Upload-Draft-Interop-Version", "6")]).is_supported_version());
    }

    #[test]
    fn test_partial_upload_media_type() {
        let parsed = headers(&[("Content-Type", "Application/Partial-Upload; x=1")]);
        assert!(parsed.is_partial_upload());
        assert!(!headers(&[("Content-Type", "application/octet-stream")]).is_partial_upload());
        assert!(!headers(&[]).is_partial_upload());
    }
}
