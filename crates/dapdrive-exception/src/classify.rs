//! Root-cause classification and the hint tables.

use serde::Serialize;

/// Closed set of root-cause categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionCategory {
    /// Sockets, HTTP, DNS.
    Network,
    /// SQL and other database drivers.
    Database,
    /// Credentials and access control.
    Authentication,
    /// Malformed or rejected input data.
    Validation,
    /// Deadlines and cancellations.
    Timeout,
    /// Files, directories and streams.
    FileSystem,
    /// Missing or inconsistent configuration.
    Configuration,
    /// Null dereferences.
    NullReference,
    /// Bad call arguments.
    Argument,
    /// Everything else.
    Unknown,
}

/// The closed classification table, checked in order. The first column is
/// matched against the type's last dotted segment: exact first, then a
/// suffix match so vendor-prefixed names (`MySqlException`) land in the
/// same family.
const CATEGORY_TABLE: &[(&str, ExceptionCategory)] = &[
    ("SocketException", ExceptionCategory::Network),
    ("HttpRequestException", ExceptionCategory::Network),
    ("WebException", ExceptionCategory::Network),
    ("PingException", ExceptionCategory::Network),
    ("DbConnectionException", ExceptionCategory::Database),
    ("SqlException", ExceptionCategory::Database),
    ("DbUpdateException", ExceptionCategory::Database),
    ("DbException", ExceptionCategory::Database),
    ("NpgsqlException", ExceptionCategory::Database),
    ("SqliteException", ExceptionCategory::Database),
    ("OracleException", ExceptionCategory::Database),
    ("AuthenticationException", ExceptionCategory::Authentication),
    ("UnauthorizedAccessException", ExceptionCategory::Authentication),
    ("SecurityException", ExceptionCategory::Authentication),
    ("InvalidCredentialException", ExceptionCategory::Authentication),
    ("ValidationException", ExceptionCategory::Validation),
    ("FormatException", ExceptionCategory::Validation),
    ("JsonException", ExceptionCategory::Validation),
    ("XmlException", ExceptionCategory::Validation),
    ("SerializationException", ExceptionCategory::Validation),
    ("InvalidDataException", ExceptionCategory::Validation),
    ("TimeoutException", ExceptionCategory::Timeout),
    ("TaskCanceledException", ExceptionCategory::Timeout),
    ("OperationCanceledException", ExceptionCategory::Timeout),
    ("FileNotFoundException", ExceptionCategory::FileSystem),
    ("DirectoryNotFoundException", ExceptionCategory::FileSystem),
    ("PathTooLongException", ExceptionCategory::FileSystem),
    ("DriveNotFoundException", ExceptionCategory::FileSystem),
    ("FileLoadException", ExceptionCategory::FileSystem),
    ("EndOfStreamException", ExceptionCategory::FileSystem),
    ("IOException", ExceptionCategory::FileSystem),
    ("ConfigurationErrorsException", ExceptionCategory::Configuration),
    ("ConfigurationException", ExceptionCategory::Configuration),
    ("OptionsValidationException", ExceptionCategory::Configuration),
    ("KeyNotFoundException", ExceptionCategory::Configuration),
    ("NullReferenceException", ExceptionCategory::NullReference),
    ("NullPointerException", ExceptionCategory::NullReference),
    ("ArgumentNullException", ExceptionCategory::Argument),
    ("ArgumentOutOfRangeException", ExceptionCategory::Argument),
    ("ArgumentException", ExceptionCategory::Argument),
    ("IndexOutOfRangeException", ExceptionCategory::Argument),
];

/// Hints keyed by (last-segment type, extracted error code).
const CODE_HINTS: &[(&str, &str, &str)] = &[
    ("SqlException", "18456", "Login failed for the SQL user. Verify the connection string credentials."),
    ("SqlException", "4060", "Cannot open the requested database. Verify the database name and the user's access."),
    ("SqlException", "2", "SQL Server was not reachable. Verify the server address and that it accepts remote connections."),
    ("SqlException", "53", "SQL Server was not reachable. Verify the server address and that it accepts remote connections."),
    ("SqlException", "208", "Invalid object name. Verify the table or view exists and migrations have been applied."),
    ("SqlException", "547", "A constraint was violated. Verify foreign key references before inserting or deleting."),
    ("SqlException", "2627", "A unique key was violated. The row being inserted already exists."),
    ("SqlException", "2601", "A unique index was violated. The row being inserted already exists."),
    ("SocketException", "10061", "Connection refused. Verify the target service is listening on the expected host and port."),
    ("SocketException", "10060", "Connection timed out. Verify network reachability and firewall rules."),
    ("SocketException", "10054", "Connection reset by peer. The remote service closed the connection unexpectedly."),
    ("SocketException", "11001", "Host not found. Verify the hostname and DNS configuration."),
    ("HttpRequestException", "401", "The server rejected the credentials. Verify the authentication token or API key."),
    ("HttpRequestException", "403", "Access is forbidden for this principal. Verify the account's permissions."),
    ("HttpRequestException", "404", "The requested resource was not found. Verify the URL path and route."),
    ("HttpRequestException", "429", "The server is rate limiting requests. Back off and retry later."),
    ("HttpRequestException", "500", "The remote server failed internally. Check the remote service logs."),
    ("HttpRequestException", "503", "The remote service is unavailable. Check its health and any load balancer state."),
];

/// Hints keyed by last-segment type alone.
const TYPE_HINTS: &[(&str, &str)] = &[
    ("NullReferenceException", "An object reference was null when dereferenced. Inspect the member chain at the throw site."),
    ("ArgumentNullException", "A required argument was null. Check the reported parameter name at the call site."),
    ("ArgumentOutOfRangeException", "An argument was outside its valid range. Check the reported parameter name and bounds."),
    ("IndexOutOfRangeException", "An index was outside the bounds of the collection. Check the index arithmetic."),
    ("FileNotFoundException", "A required file is missing. Verify the path and the process working directory."),
    ("DirectoryNotFoundException", "A required directory is missing. Verify the path and the process working directory."),
    ("KeyNotFoundException", "A lookup key was missing. Verify configuration keys and dictionary contents."),
    ("TimeoutException", "The operation exceeded its time limit. Check downstream latency or raise the timeout."),
    ("TaskCanceledException", "The task was cancelled, commonly by an expired timeout. Check cancellation sources."),
    ("UnauthorizedAccessException", "Access was denied by the operating system. Verify file permissions and the process identity."),
    ("FormatException", "Input text did not match the expected format. Validate the value before parsing."),
    ("InvalidOperationException", "The object was not in a valid state for the call. Check the required setup order."),
];

/// Generic hints per category.
const CATEGORY_HINTS: &[(ExceptionCategory, &str)] = &[
    (ExceptionCategory::Network, "A network operation failed. Verify connectivity, DNS and that the remote endpoint is up."),
    (ExceptionCategory::Database, "A database operation failed. Verify the connection string, schema and server availability."),
    (ExceptionCategory::Authentication, "Authentication failed. Verify credentials, token expiry and the account's permissions."),
    (ExceptionCategory::Validation, "Input data was rejected. Validate the offending value against the expected schema."),
    (ExceptionCategory::Timeout, "An operation timed out. Check downstream latency and configured deadlines."),
    (ExceptionCategory::FileSystem, "A file system operation failed. Verify paths, permissions and available disk space."),
    (ExceptionCategory::Configuration, "Configuration is missing or inconsistent. Verify the relevant settings source."),
    (ExceptionCategory::NullReference, "A null value was dereferenced. Inspect the member chain at the throw site."),
    (ExceptionCategory::Argument, "A call received an invalid argument. Check the reported parameter at the call site."),
];

/// The type's last dotted segment, with generic arguments stripped.
fn last_segment(exception_type: &str) -> &str {
    let base = exception_type.split('<').next().unwrap_or(exception_type);
    base.rsplit('.').next().unwrap_or(base).trim()
}

/// Classifies an exception type name. Deterministic: exact last-segment
/// match first, then the first suffix match in table order.
pub fn classify_type(exception_type: &str) -> ExceptionCategory {
    let segment = last_segment(exception_type);
    for (name, category) in CATEGORY_TABLE {
        if segment == *name {
            return *category;
        }
    }
    for (name, category) in CATEGORY_TABLE {
        if segment.ends_with(name) {
            return *category;
        }
    }
    ExceptionCategory::Unknown
}

/// Looks up the actionable hint: composite type+code key first, then the
/// type alone, then the category fallback.
pub fn hint_for(
    exception_type: &str,
    error_code: Option<&str>,
    category: ExceptionCategory,
) -> Option<String> {
    let segment = last_segment(exception_type);

    if let Some(code) = error_code {
        for (name, hint_code, hint) in CODE_HINTS {
            if segment == *name && code == *hint_code {
                return Some((*hint).to_string());
            }
        }
    }
    for (name, hint) in TYPE_HINTS {
        if segment == *name {
            return Some((*hint).to_string());
        }
    }
    CATEGORY_HINTS
        .iter()
        .find(|(cat, _)| *cat == category)
        .map(|(_, hint)| (*hint).to_string())
}
