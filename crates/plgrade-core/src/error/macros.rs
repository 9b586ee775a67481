//! Error macros for plgrade

/// Return early with an invalid input error
#[macro_export]
macro_rules! bail_invalid {
    ($context:expr, $value:expr $(,)?) => {
        return Err($crate::error::GradeError::invalid_input($context, $value))
    };
}

/// Return early with a not found error
#[macro_export]
macro_rules! bail_not_found {
    ($context:expr, $value:expr $(,)?) => {
        return Err($crate::error::GradeError::not_found($context, $value))
    };
}

/// Macro for mapping database errors
#[macro_export]
macro_rules! map_db_err {
    ($op:expr, $error:expr $(,)?) => {
        $crate::error::GradeError::db_operation($op, $error)
    };
}
