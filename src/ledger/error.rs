use thiserror::Error;

/// Kind of integrity constraint a write tripped over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Unique,
    ForeignKey,
    Check,
    Other,
}

impl ViolationKind {
    /// Map a PostgreSQL SQLSTATE code (class 23) to a violation kind
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            "23505" => Some(Self::Unique),
            "23503" => Some(Self::ForeignKey),
            "23514" => Some(Self::Check),
            c if c.starts_with("23") => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unique => "unique_violation",
            Self::ForeignKey => "foreign_key_violation",
            Self::Check => "check_violation",
            Self::Other => "integrity_constraint_violation",
        }
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation ({}): {message}", kind.as_str())]
    ConstraintViolation { kind: ViolationKind, message: String },

    #[error("Source and destination accounts are the same")]
    SameAccount,

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Store error: {0}")]
    Backend(String),

    #[error("tx err: {source}, rb err: {rollback}")]
    Rollback {
        #[source]
        source: Box<LedgerError>,
        rollback: Box<LedgerError>,
    },
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound)
    }

    /// Constraint kind, if this error (or the error a failed rollback wraps) is a violation
    pub fn violation_kind(&self) -> Option<ViolationKind> {
        match self {
            LedgerError::ConstraintViolation { kind, .. } => Some(*kind),
            LedgerError::Rollback { source, .. } => source.violation_kind(),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        if matches!(e, sqlx::Error::RowNotFound) {
            return LedgerError::NotFound;
        }

        let violation = e.as_database_error().and_then(|db_err| {
            let kind = db_err.code().as_deref().and_then(ViolationKind::from_sqlstate)?;
            Some((kind, db_err.message().to_string()))
        });

        match violation {
            Some((kind, message)) => LedgerError::ConstraintViolation { kind, message },
            None => LedgerError::Database(e),
        }
    }
}
