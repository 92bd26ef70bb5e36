use thiserror::Error;

pub type CoreResult<T> = Result<T, FsError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FsError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Infeasible region: {what} has a negative value {value}")]
    Infeasible { what: &'static str, value: f64 },
}
