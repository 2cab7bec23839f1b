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

use super::rpc::{Code, Status};
use std::error::Error as StdError;

type BoxError = Box<dyn StdError + Send + Sync>;

/// The core error returned by the retry loop and the paginator.
///
/// The retry core reports errors from multiple sources. The service may return
/// an error, the transport may be unable to complete a request, an attempt
/// may exceed its timeout, the caller may cancel the operation, or the retry
/// policy may be exhausted.
///
/// Most applications will just return the error or log it. Applications that
/// need to interrogate the error can use the predicates in this type, the
/// [status][Error::status] accessor, or the error [source][StdError::source].
///
/// # Example
/// ```
/// use cloud_rpc_retry::error::Error;
/// match example_function() {
///     Err(e) if e.status().is_some() => {
///         println!("service error {e}, debug using {:?}", e.status().unwrap());
///     },
///     Err(e) if e.is_exhausted() => { println!("gave up {e}"); },
///     Err(e) => { println!("some other error {e}"); },
///     Ok(_) => { println!("success, how boring"); },
/// }
///
/// fn example_function() -> Result<String, Error> {
///     # use cloud_rpc_retry::error::rpc::{Code, Status};
///     # Err(Error::service(Status::default().set_code(Code::NotFound).set_message("NOT FOUND")))
/// }
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    operation: Option<String>,
    source: Option<BoxError>,
}

impl Error {
    /// Creates an error with the status returned by the service.
    ///
    /// Errors never carry an `OK` status, such a status is reported as
    /// `UNKNOWN`.
    ///
    /// # Example
    /// ```
    /// use cloud_rpc_retry::error::Error;
    /// use cloud_rpc_retry::error::rpc::{Code, Status};
    /// let status = Status::default().set_code(Code::NotFound).set_message("NOT FOUND");
    /// let error = Error::service(status.clone());
    /// assert_eq!(error.status(), Some(&status));
    /// ```
    pub fn service(status: Status) -> Self {
        let status = if status.is_ok() {
            status.set_code(Code::Unknown)
        } else {
            status
        };
        Self::new(ErrorKind::Service(Box::new(status)), None)
    }

    /// The [Status] returned by the service, if any.
    ///
    /// For errors created when the retry policy is exhausted, this returns
    /// the status of the last attempt.
    pub fn status(&self) -> Option<&Status> {
        match &self.kind {
            ErrorKind::Service(s) => Some(s.as_ref()),
            ErrorKind::Exhausted => self.last_error().and_then(Error::status),
            _ => None,
        }
    }

    /// Creates an error representing an exhausted retry policy.
    ///
    /// The `source` is the error from the last attempt.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use cloud_rpc_retry::error::Error;
    /// let error = Error::exhausted(Error::transport("connection reset"));
    /// assert!(error.is_exhausted());
    /// assert!(error.source().is_some());
    /// ```
    pub fn exhausted<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Exhausted, Some(source.into()))
    }

    /// The request could not complete before the retry policy was exhausted.
    ///
    /// This is always a client-side generated error, but it may be the result
    /// of multiple errors received from the service.
    ///
    /// # Troubleshooting
    ///
    /// The most common cause of this problem is a transient problem that lasts
    /// longer than your retry policy. If your application can tolerate longer
    /// recovery times then extend the retry policy.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::Exhausted)
    }

    /// Creates an error representing an attempt timeout.
    pub fn timeout<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Timeout, Some(source.into()))
    }

    /// An attempt could not be completed before its deadline.
    ///
    /// The request may or may not have started, and it may or may not
    /// complete in the service.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Creates an error representing a cancelled operation.
    pub fn cancelled<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Cancelled, Some(source.into()))
    }

    /// The caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Creates an error representing a problem in the transport layer.
    ///
    /// Use this error when the attempt did not produce a response, for
    /// example, because the connection could not be established or it was
    /// reset before the response was received.
    pub fn transport<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Transport, Some(source.into()))
    }

    /// The attempt failed in the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport)
    }

    /// Creates an error representing a failure to obtain credentials.
    pub fn authentication<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Authentication, Some(source.into()))
    }

    /// The attempt could not create the authentication headers.
    ///
    /// The request never left the client.
    pub fn is_authentication(&self) -> bool {
        matches!(self.kind, ErrorKind::Authentication)
    }

    /// The label of the operation that failed, if any.
    ///
    /// The invoker and the paginator attach this label to every terminal
    /// error, see [report][crate::error::report::report].
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub(crate) fn set_operation<T: Into<String>>(mut self, v: T) -> Self {
        self.operation = Some(v.into());
        self
    }

    /// The error from the last attempt, for exhausted errors.
    pub fn last_error(&self) -> Option<&Error> {
        match &self.kind {
            ErrorKind::Exhausted => self
                .source
                .as_ref()
                .and_then(|e| e.downcast_ref::<Error>()),
            _ => None,
        }
    }

    fn new(kind: ErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            operation: None,
            source,
        }
    }

    fn display_kind(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.source) {
            (ErrorKind::Service(s), _) => write!(
                f,
                "the service reports an error with code {} described as: {}",
                s.code, s.message
            ),
            (ErrorKind::Exhausted, Some(e)) => {
                write!(f, "the retry policy is exhausted, the last error was: {e}")
            }
            (ErrorKind::Timeout, Some(e)) => {
                write!(f, "the attempt exceeded its deadline {e}")
            }
            (ErrorKind::Cancelled, Some(e)) => write!(f, "the operation was cancelled {e}"),
            (ErrorKind::Transport, Some(e)) => {
                write!(f, "the transport reports an error: {e}")
            }
            (ErrorKind::Authentication, Some(e)) => {
                write!(f, "cannot create the authentication headers {e}")
            }
            (_, None) => unreachable!("no constructor allows this"),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.operation {
            None => self.display_kind(f),
            Some(operation) => {
                let status = Status::from(self);
                write!(f, "{}: ", super::report::describe(operation, &status))?;
                self.display_kind(f)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Maps any error to the canonical status reported for it.
///
/// Service errors map to their own status, exhausted errors to the status of
/// the last attempt. Errors detected in the client map to the closest
/// canonical code.
impl std::convert::From<&Error> for Status {
    fn from(value: &Error) -> Self {
        match &value.kind {
            ErrorKind::Service(s) => s.as_ref().clone(),
            ErrorKind::Exhausted => value
                .last_error()
                .map(Status::from)
                .unwrap_or_else(|| client_status(Code::Unknown, value)),
            ErrorKind::Timeout => client_status(Code::DeadlineExceeded, value),
            ErrorKind::Cancelled => client_status(Code::Cancelled, value),
            ErrorKind::Transport => client_status(Code::Unavailable, value),
            ErrorKind::Authentication => client_status(Code::Unauthenticated, value),
        }
    }
}

fn client_status(code: Code, error: &Error) -> Status {
    let message = error
        .source
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_default();
    Status::default().set_code(code).set_message(message)
}

/// The type of error held by an [Error] instance.
#[derive(Debug)]
enum ErrorKind {
    Service(Box<Status>),
    Exhausted,
    Timeout,
    Cancelled,
    Transport,
    Authentication,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::rpc::{DebugInfo, StatusDetails};
    use std::error::Error as _;

    #[test]
    fn service() {
        let status = Status::default()
            .set_code(Code::NotFound)
            .set_message("NOT FOUND");
        let error = Error::service(status.clone());
        assert_eq!(error.status(), Some(&status));
        assert!(error.source().is_none(), "{error:?}");
        assert!(!error.is_exhausted(), "{error:?}");
        let got = error.to_string();
        assert!(got.contains("NOT_FOUND"), "{got}");
        assert!(got.contains("NOT FOUND"), "{got}");
    }

    #[test]
    fn service_never_ok() {
        let error = Error::service(Status::ok().set_message("uh?"));
        assert_eq!(error.status().map(|s| s.code), Some(Code::Unknown));
    }

    #[test]
    fn exhausted() {
        let status = Status::default()
            .set_code(Code::Unavailable)
            .set_message("try-again")
            .set_details([DebugInfo::new().set_detail("count=3")]);
        let error = Error::exhausted(Error::service(status.clone()));
        assert!(error.is_exhausted(), "{error:?}");
        assert_eq!(error.status(), Some(&status));
        assert!(
            matches!(error.last_error(), Some(e) if e.status() == Some(&status)),
            "{error:?}"
        );
        let got = error
            .source()
            .and_then(|e| e.downcast_ref::<Error>())
            .and_then(|e| e.status());
        assert_eq!(got, Some(&status));
        let details = Status::from(&error).details;
        assert!(
            matches!(details.first(), Some(StatusDetails::DebugInfo(d)) if d.detail == "count=3"),
            "{error:?}"
        );
    }

    #[test]
    fn client_side() {
        let error = Error::timeout("simulated");
        assert!(error.is_timeout(), "{error:?}");
        assert!(error.status().is_none(), "{error:?}");
        assert_eq!(Status::from(&error).code, Code::DeadlineExceeded);

        let error = Error::cancelled("simulated");
        assert!(error.is_cancelled(), "{error:?}");
        assert_eq!(Status::from(&error).code, Code::Cancelled);

        let error = Error::transport("connection reset");
        assert!(error.is_transport(), "{error:?}");
        let status = Status::from(&error);
        assert_eq!(status.code, Code::Unavailable);
        assert_eq!(status.message, "connection reset");

        let error = Error::authentication("no credentials");
        assert!(error.is_authentication(), "{error:?}");
        assert_eq!(Status::from(&error).code, Code::Unauthenticated);

        let error = Error::exhausted("no last error");
        assert_eq!(Status::from(&error).code, Code::Unknown);
    }

    #[test]
    fn operation() {
        let error = Error::transport("connection reset");
        assert!(error.operation().is_none(), "{error:?}");
        let error = error.set_operation("ListTables");
        assert_eq!(error.operation(), Some("ListTables"));
        let got = error.to_string();
        assert!(got.starts_with("ListTables: "), "{got}");
        assert!(got.contains("UNAVAILABLE"), "{got}");
        assert!(got.contains("connection reset"), "{got}");
    }
}
