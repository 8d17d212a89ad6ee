// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Timestamps in the encodings used by Google and Firebase REST APIs.
//!
//! The encoding is a property of the schema, not of the value. Each field
//! names its format with `#[serde(with = ...)]`:
//!
//! ```
//! # use gcloud_kit_types::wire_time;
//! # use time::OffsetDateTime;
//! #[derive(serde::Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct UserRecord {
//!     #[serde(with = "wire_time::rfc3339")]
//!     last_refresh_time: OffsetDateTime,
//!     #[serde(with = "wire_time::string_millis")]
//!     created_at: OffsetDateTime,
//!     #[serde(default, with = "wire_time::string_seconds::option")]
//!     valid_since: Option<OffsetDateTime>,
//! }
//! ```

use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

const NANOS_PER_MILLI: i128 = 1_000_000;

/// The encodings of a timestamp on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimeFormat {
    /// An RFC 3339 string in UTC, e.g. `"2025-01-02T03:04:05.678Z"`.
    Rfc3339,
    /// Milliseconds since the Unix epoch, as a decimal string.
    StringMillis,
    /// Seconds since the Unix epoch, as a decimal string.
    StringSeconds,
}

impl std::fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rfc3339 => "RFC 3339",
            Self::StringMillis => "milliseconds since epoch",
            Self::StringSeconds => "seconds since epoch",
        };
        f.write_str(name)
    }
}

impl TimeFormat {
    /// Formats `value` in this encoding.
    pub fn format(&self, value: OffsetDateTime) -> Result<String, Error> {
        match self {
            Self::Rfc3339 => value
                .to_offset(UtcOffset::UTC)
                .format(&Rfc3339)
                .map_err(|e| Error::format(*self, e)),
            Self::StringMillis => Ok(value
                .unix_timestamp_nanos()
                .div_euclid(NANOS_PER_MILLI)
                .to_string()),
            Self::StringSeconds => Ok(value.unix_timestamp().to_string()),
        }
    }

    /// Parses `value` in this encoding.
    pub fn parse(&self, value: &str) -> Result<OffsetDateTime, Error> {
        let parsed = match self {
            Self::Rfc3339 => OffsetDateTime::parse(value, &Rfc3339).map_err(BoxError::from),
            Self::StringMillis => value
                .parse::<i64>()
                .map_err(BoxError::from)
                .and_then(|ms| {
                    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * NANOS_PER_MILLI)
                        .map_err(BoxError::from)
                }),
            Self::StringSeconds => value
                .parse::<i64>()
                .map_err(BoxError::from)
                .and_then(|s| OffsetDateTime::from_unix_timestamp(s).map_err(BoxError::from)),
        };
        parsed.map_err(|e| Error::parse(*self, value, e))
    }
}

/// The error type for [TimeFormat] conversions.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// The value could not be parsed.
    pub fn is_parse(&self) -> bool {
        matches!(self.0, ErrorKind::Parse { .. })
    }

    /// The value cannot be represented in the format.
    pub fn is_format(&self) -> bool {
        matches!(self.0, ErrorKind::Format { .. })
    }

    fn parse<T: Into<BoxError>>(format: TimeFormat, value: &str, source: T) -> Self {
        Self(ErrorKind::Parse {
            format,
            value: value.to_string(),
            source: source.into(),
        })
    }

    fn format<T: Into<BoxError>>(format: TimeFormat, source: T) -> Self {
        Self(ErrorKind::Format {
            format,
            source: source.into(),
        })
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("cannot parse `{value}` as {format}: {source}")]
    Parse {
        format: TimeFormat,
        value: String,
        #[source]
        source: BoxError,
    },
    #[error("cannot format timestamp as {format}: {source}")]
    Format {
        format: TimeFormat,
        #[source]
        source: BoxError,
    },
}

fn serialize<S>(format: TimeFormat, value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::Error as _;
    let value = format.format(*value).map_err(S::Error::custom)?;
    serializer.serialize_str(&value)
}

fn deserialize<'de, D>(format: TimeFormat, deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize as _;
    use serde::de::Error as _;
    let value = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
    format.parse(&value).map_err(D::Error::custom)
}

macro_rules! wire_format {
    ($(#[$attr:meta])* $name:ident, $format:expr) => {
        $(#[$attr])*
        pub mod $name {
            use super::TimeFormat;
            use time::OffsetDateTime;

            pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                super::serialize($format, value, serializer)
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                super::deserialize($format, deserializer)
            }

            /// The same encoding, for optional fields. `None` is `null`.
            pub mod option {
                use super::TimeFormat;
                use serde::Deserialize as _;
                use time::OffsetDateTime;

                #[derive(serde::Deserialize)]
                #[serde(transparent)]
                struct Wrapper(#[serde(deserialize_with = "super::deserialize")] OffsetDateTime);

                pub fn serialize<S>(
                    value: &Option<OffsetDateTime>,
                    serializer: S,
                ) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    match value {
                        Some(v) => super::super::serialize($format, v, serializer),
                        None => serializer.serialize_none(),
                    }
                }

                pub fn deserialize<'de, D>(
                    deserializer: D,
                ) -> Result<Option<OffsetDateTime>, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
                }
            }
        }
    };
}

wire_format!(
    /// RFC 3339 strings, see [TimeFormat::Rfc3339].
    rfc3339,
    TimeFormat::Rfc3339
);
wire_format!(
    /// Milliseconds since the epoch as a string, see [TimeFormat::StringMillis].
    string_millis,
    TimeFormat::StringMillis
);
wire_format!(
    /// Seconds since the epoch as a string, see [TimeFormat::StringSeconds].
    string_seconds,
    TimeFormat::StringSeconds
);
