use thiserror::Error;

/// Application-wide error types.
///
/// One enum covers every layer of adsync: the store, the remote Megaphone
/// client, per-record reconciliation failures and request validation. It uses
/// `thiserror` for `Display` and for the automatic conversions below.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use adsync_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps every SQLx error: connection failures, query errors and
    /// constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Storage backend failed for a reason that is not an SQLx error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP request to the remote API failed before a response arrived.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// The remote API answered with a non-success status.
    ///
    /// `body` holds the response body, parsed as JSON when possible and as a
    /// JSON string otherwise.
    #[error("Remote API rejected the request with HTTP {status}")]
    RemoteRejected {
        status: u16,
        body: serde_json::Value,
    },

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A remote record could not be mapped onto the local model.
    #[error("Invalid {kind} record: {reason}")]
    InvalidRecord { kind: &'static str, reason: String },

    /// A campaign's nested advertiser failed to sync, so the campaign cannot
    /// reference it.
    #[error("Campaign {campaign} references advertiser {advertiser} which failed to sync")]
    UnresolvedAdvertiser {
        campaign: String,
        advertiser: String,
    },

    /// Request input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local advertiser referenced by a request does not exist.
    #[error("Advertiser not found")]
    AdvertiserNotFound,

    /// Local campaign does not exist.
    #[error("Campaign not found")]
    CampaignNotFound,

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded on the remote side (HTTP 429 after retries).
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Builds an [`AppError::InvalidRecord`] for the given entity kind.
    pub fn invalid_record(kind: &'static str, reason: impl Into<String>) -> Self {
        AppError::InvalidRecord {
            kind,
            reason: reason.into(),
        }
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check DATABASE_URL."
                        .to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. Megaphone may be slow or unreachable.\n   Try again later."
                        .to_string()
                } else if msg.contains("connect") {
                    format!(
                        "Cannot connect to Megaphone: {}\n   Check MEGAPHONE_BASE_URL and your connection.",
                        msg
                    )
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::RemoteRejected { status, body } => match status {
                401 | 403 => "Megaphone rejected the credentials.\n   Check MEGAPHONE_API_TOKEN and MEGAPHONE_ORG_ID.".to_string(),
                404 => format!("Megaphone resource not found: {}", body),
                _ => format!("Megaphone returned HTTP {}: {}", status, body),
            },
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use adsync_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::CampaignNotFound;
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::ClientError(_) => true,
            AppError::RemoteRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
