//! Configuration validation support.

use crate::error::ValidationError;

/// Checks run against a configuration value before it is published.
///
/// A value that fails validation is never swapped in; the previous
/// configuration stays live.
///
/// # Examples
///
/// ```rust
/// use hotswap_handlers::core::Validate;
/// use hotswap_handlers::error::ValidationError;
///
/// struct Limits {
///     workers: usize,
/// }
///
/// impl Validate for Limits {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.workers == 0 {
///             return Err(ValidationError::invalid_field("workers", "must be >= 1"));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(Limits { workers: 0 }.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
