//! Classification of `sqlx` errors.

use oxide_apply::{DriverError, DriverErrorKind};

/// Primary result code of `SQLITE_CONSTRAINT`; extended codes keep it in
/// the low byte.
const SQLITE_CONSTRAINT: i32 = 19;

/// Wraps a `sqlx` error, classifying it for the executor.
#[must_use]
pub fn driver_error(err: sqlx::Error) -> DriverError {
    DriverError::with_source(classify(&err), err)
}

fn classify(err: &sqlx::Error) -> DriverErrorKind {
    match err {
        sqlx::Error::Database(db) => match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation
            | sqlx::error::ErrorKind::ForeignKeyViolation
            | sqlx::error::ErrorKind::NotNullViolation
            | sqlx::error::ErrorKind::CheckViolation => DriverErrorKind::Constraint,
            _ if is_constraint_code(db.code().as_deref()) => DriverErrorKind::Constraint,
            _ => DriverErrorKind::Other,
        },
        sqlx::Error::Io(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => DriverErrorKind::ConnectionLost,
        _ => DriverErrorKind::Other,
    }
}

fn is_constraint_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .is_some_and(|c| c & 0xff == SQLITE_CONSTRAINT)
}
