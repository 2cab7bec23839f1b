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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The outcome of a single RPC attempt.
///
/// Each [Status] contains three pieces of data: error code, error message,
/// and error details. A successful attempt is represented by [Status::ok],
/// which carries neither a message nor details.
///
/// You can find out more about this error model in the
/// [API Design Guide](https://cloud.google.com/apis/design/errors).
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct Status {
    /// The status code.
    pub code: Code,

    /// A developer-facing error message, which should be in English.
    pub message: String,

    /// A list of messages that carry the error details.
    pub details: Vec<StatusDetails>,
}

impl Status {
    /// The status for a successful attempt.
    pub fn ok() -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
            details: Vec::new(),
        }
    }

    /// Returns true if this is the status of a successful attempt.
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Sets the value for [code][Status::code].
    pub fn set_code<T: Into<Code>>(mut self, v: T) -> Self {
        self.code = v.into();
        self
    }

    /// Sets the value for [message][Status::message].
    pub fn set_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }

    /// Sets the value for [details][Status::details].
    pub fn set_details<T, I>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<StatusDetails>,
    {
        self.details = v.into_iter().map(|v| v.into()).collect();
        self
    }
}

/// The canonical error codes for APIs.
///
/// Sometimes multiple error codes may apply. Services should return the most
/// specific error code that applies.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Code {
    /// Not an error; returned on success.
    Ok = 0,

    /// The operation was cancelled, typically by the caller.
    Cancelled = 1,

    /// Unknown error.
    #[default]
    Unknown = 2,

    /// The client specified an invalid argument.
    InvalidArgument = 3,

    /// The deadline expired before the operation could complete.
    DeadlineExceeded = 4,

    /// Some requested entity was not found.
    NotFound = 5,

    /// The entity that a client attempted to create already exists.
    AlreadyExists = 6,

    /// The caller does not have permission to execute the operation.
    PermissionDenied = 7,

    /// Some resource has been exhausted, such as a per-user quota.
    ResourceExhausted = 8,

    /// The system is not in a state required for the operation's execution.
    FailedPrecondition = 9,

    /// The operation was aborted, typically due to a concurrency issue.
    Aborted = 10,

    /// The operation was attempted past the valid range.
    OutOfRange = 11,

    /// The operation is not implemented or is not supported in this service.
    Unimplemented = 12,

    /// Internal errors, some invariants of the underlying system are broken.
    Internal = 13,

    /// The service is currently unavailable.
    ///
    /// This is most likely a transient condition, which can be corrected by
    /// retrying with a backoff. Note that it is not always safe to retry
    /// non-idempotent operations.
    Unavailable = 14,

    /// Unrecoverable data loss or corruption.
    DataLoss = 15,

    /// The request does not have valid authentication credentials.
    Unauthenticated = 16,
}

impl Code {
    pub fn name(&self) -> &str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl std::convert::From<i32> for Code {
    fn from(value: i32) -> Self {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::default(),
        }
    }
}

impl std::convert::From<Code> for i32 {
    fn from(value: Code) -> i32 {
        value as i32
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::convert::TryFrom<&str> for Code {
    type Error = String;
    fn try_from(value: &str) -> std::result::Result<Code, Self::Error> {
        match value {
            "OK" => Ok(Code::Ok),
            "CANCELLED" => Ok(Code::Cancelled),
            "UNKNOWN" => Ok(Code::Unknown),
            "INVALID_ARGUMENT" => Ok(Code::InvalidArgument),
            "DEADLINE_EXCEEDED" => Ok(Code::DeadlineExceeded),
            "NOT_FOUND" => Ok(Code::NotFound),
            "ALREADY_EXISTS" => Ok(Code::AlreadyExists),
            "PERMISSION_DENIED" => Ok(Code::PermissionDenied),
            "RESOURCE_EXHAUSTED" => Ok(Code::ResourceExhausted),
            "FAILED_PRECONDITION" => Ok(Code::FailedPrecondition),
            "ABORTED" => Ok(Code::Aborted),
            "OUT_OF_RANGE" => Ok(Code::OutOfRange),
            "UNIMPLEMENTED" => Ok(Code::Unimplemented),
            "INTERNAL" => Ok(Code::Internal),
            "UNAVAILABLE" => Ok(Code::Unavailable),
            "DATA_LOSS" => Ok(Code::DataLoss),
            "UNAUTHENTICATED" => Ok(Code::Unauthenticated),
            _ => Err(format!("unknown status code value {value}")),
        }
    }
}

impl Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(*self as i32)
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Services send the numeric value over gRPC and (sometimes) the name
        // in JSON payloads.
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Code::from)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid status code {n}"))),
            serde_json::Value::String(s) => {
                Code::try_from(s.as_str()).map_err(serde::de::Error::custom)
            }
            v => Err(serde::de::Error::custom(format!(
                "expected a number or a string for the status code, got {v}"
            ))),
        }
    }
}

/// Describes the cause of the error with structured details.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct ErrorInfo {
    /// The reason of the error, a constant value that identifies the cause.
    pub reason: String,
    /// The logical grouping to which the `reason` belongs.
    pub domain: String,
    /// Additional structured details about this error.
    pub metadata: BTreeMap<String, String>,
}

impl ErrorInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reason<T: Into<String>>(mut self, v: T) -> Self {
        self.reason = v.into();
        self
    }

    pub fn set_domain<T: Into<String>>(mut self, v: T) -> Self {
        self.domain = v.into();
        self
    }

    pub fn set_metadata<K, V, I>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata = v.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }
}

/// Debugging information provided by the server.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct DebugInfo {
    /// The stack trace entries indicating where the error occurred.
    pub stack_entries: Vec<String>,
    /// Additional debugging information provided by the server.
    pub detail: String,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_detail<T: Into<String>>(mut self, v: T) -> Self {
        self.detail = v.into();
        self
    }

    pub fn set_stack_entries<T, I>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<String>,
    {
        self.stack_entries = v.into_iter().map(|v| v.into()).collect();
        self
    }
}

/// A localized error message that is safe to return to the user.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct LocalizedMessage {
    /// The locale used, following the specification defined in BCP 47.
    pub locale: String,
    /// The localized error message in the above locale.
    pub message: String,
}

impl LocalizedMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_locale<T: Into<String>>(mut self, v: T) -> Self {
        self.locale = v.into();
        self
    }

    pub fn set_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }
}

const ERROR_INFO_TYPE: &str = "type.googleapis.com/google.rpc.ErrorInfo";
const DEBUG_INFO_TYPE: &str = "type.googleapis.com/google.rpc.DebugInfo";
const LOCALIZED_MESSAGE_TYPE: &str = "type.googleapis.com/google.rpc.LocalizedMessage";

/// The details attached to a [Status].
///
/// Details of unknown types are preserved as JSON values.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum StatusDetails {
    ErrorInfo(ErrorInfo),
    DebugInfo(DebugInfo),
    LocalizedMessage(LocalizedMessage),
    Other(serde_json::Value),
}

impl From<ErrorInfo> for StatusDetails {
    fn from(value: ErrorInfo) -> Self {
        Self::ErrorInfo(value)
    }
}

impl From<DebugInfo> for StatusDetails {
    fn from(value: DebugInfo) -> Self {
        Self::DebugInfo(value)
    }
}

impl From<LocalizedMessage> for StatusDetails {
    fn from(value: LocalizedMessage) -> Self {
        Self::LocalizedMessage(value)
    }
}

impl From<serde_json::Value> for StatusDetails {
    fn from(value: serde_json::Value) -> Self {
        Self::Other(value)
    }
}

impl std::fmt::Display for StatusDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ErrorInfo(i) => {
                write!(f, "ErrorInfo(reason={}, domain={}", i.reason, i.domain)?;
                if !i.metadata.is_empty() {
                    let metadata = i
                        .metadata
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, ", metadata={{{metadata}}}")?;
                }
                f.write_str(")")
            }
            Self::DebugInfo(i) => write!(f, "DebugInfo(detail={})", i.detail),
            Self::LocalizedMessage(m) => {
                write!(f, "LocalizedMessage(locale={}, message={})", m.locale, m.message)
            }
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for StatusDetails {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::Error as _;
        let (type_url, value) = match self {
            Self::ErrorInfo(v) => (ERROR_INFO_TYPE, serde_json::to_value(v)),
            Self::DebugInfo(v) => (DEBUG_INFO_TYPE, serde_json::to_value(v)),
            Self::LocalizedMessage(v) => (LOCALIZED_MESSAGE_TYPE, serde_json::to_value(v)),
            Self::Other(v) => return v.serialize(serializer),
        };
        let mut value = value.map_err(S::Error::custom)?;
        if let Some(map) = value.as_object_mut() {
            map.insert("@type".to_string(), type_url.into());
        }
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StatusDetails {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;
        let value = serde_json::Value::deserialize(deserializer)?;
        let type_url = value.get("@type").and_then(|t| t.as_str());
        let details = match type_url {
            Some(ERROR_INFO_TYPE) => {
                Self::ErrorInfo(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            Some(DEBUG_INFO_TYPE) => {
                Self::DebugInfo(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            Some(LOCALIZED_MESSAGE_TYPE) => {
                Self::LocalizedMessage(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            _ => Self::Other(value),
        };
        Ok(details)
    }
}
