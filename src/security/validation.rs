use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Required(String),
    TooShort { field: String, min: usize, actual: usize },
    TooLong { field: String, max: usize, actual: usize },
    InvalidRange { field: String, min: String, max: String },
    InvalidValue { field: String, message: String },
    InvalidEmail { field: String, value: String },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            Self::Required(field) => field,
            Self::TooShort { field, .. }
            | Self::TooLong { field, .. }
            | Self::InvalidRange { field, .. }
            | Self::InvalidValue { field, .. }
            | Self::InvalidEmail { field, .. } => field,
        }
    }

    /// Message without the field name, as rendered in `errors[].message`.
    pub fn message(&self) -> String {
        match self {
            Self::Required(_) => "is required".to_string(),
            Self::TooShort { min, actual, .. } => {
                format!("is too short: {} < {} chars", actual, min)
            }
            Self::TooLong { max, actual, .. } => {
                format!("is too long: {} > {} chars", actual, max)
            }
            Self::InvalidRange { min, max, .. } => format!("must be between {} and {}", min, max),
            Self::InvalidValue { message, .. } => message.clone(),
            Self::InvalidEmail { value, .. } => format!("'{}' is not a valid email address", value),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field '{}' {}", self.field(), self.message())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("Invalid email regex")
});

pub fn validate_string_required(value: &str, field_name: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Required(field_name.to_string()))
    } else {
        Ok(())
    }
}

pub fn validate_length(
    value: &str,
    field_name: &str,
    min: Option<usize>,
    max: Option<usize>,
) -> Result<(), ValidationError> {
    let len = value.chars().count();

    if let Some(min_len) = min {
        if len < min_len {
            return Err(ValidationError::TooShort {
                field: field_name.to_string(),
                min: min_len,
                actual: len,
            });
        }
    }

    if let Some(max_len) = max {
        if len > max_len {
            return Err(ValidationError::TooLong {
                field: field_name.to_string(),
                max: max_len,
                actual: len,
            });
        }
    }

    Ok(())
}

pub fn validate_email(email: &str, field_name: &str) -> Result<(), ValidationError> {
    if email.len() <= 254 && EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail {
            field: field_name.to_string(),
            value: email.to_string(),
        })
    }
}

pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    field_name: &str,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), ValidationError> {
    let below = min.as_ref().is_some_and(|m| value < *m);
    let above = max.as_ref().is_some_and(|m| value > *m);

    if below || above {
        return Err(ValidationError::InvalidRange {
            field: field_name.to_string(),
            min: min.map(|m| m.to_string()).unwrap_or_else(|| "-∞".to_string()),
            max: max.map(|m| m.to_string()).unwrap_or_else(|| "∞".to_string()),
        });
    }

    Ok(())
}

/// Parses a closed-set value, reporting the allowed values on failure.
pub fn parse_choice<T>(value: &str, field_name: &str) -> Result<T, ValidationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ValidationError::InvalidValue {
        field: field_name.to_string(),
        message: e.to_string(),
    })
}

pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    validate_length(password, "password", Some(8), Some(128))
}

pub struct Validator {
    result: ValidationResult,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            result: ValidationResult::new(),
        }
    }

    fn push(mut self, outcome: Result<(), ValidationError>) -> Self {
        if let Err(e) = outcome {
            self.result.add_error(e);
        }
        self
    }

    pub fn string_required(self, value: &str, field_name: &str) -> Self {
        self.push(validate_string_required(value, field_name))
    }

    pub fn max_length(self, value: Option<&str>, field_name: &str, max: usize) -> Self {
        match value {
            Some(v) => self.push(validate_length(v, field_name, None, Some(max))),
            None => self,
        }
    }

    /// Blank optional emails are accepted and treated as absent.
    pub fn optional_email(self, value: Option<&str>, field_name: &str) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.push(validate_email(v, field_name)),
            None => self,
        }
    }

    pub fn email(self, value: &str, field_name: &str) -> Self {
        self.push(validate_email(value.trim(), field_name))
    }

    pub fn range<T: PartialOrd + std::fmt::Display>(
        self,
        value: Option<T>,
        field_name: &str,
        min: Option<T>,
        max: Option<T>,
    ) -> Self {
        match value {
            Some(v) => self.push(validate_range(v, field_name, min, max)),
            None => self,
        }
    }

    pub fn password(self, value: &str) -> Self {
        self.push(validate_password_strength(value))
    }

    pub fn custom<F>(mut self, validation_fn: F) -> Self
    where
        F: FnOnce() -> Option<ValidationError>,
    {
        if let Some(error) = validation_fn() {
            self.result.add_error(error);
        }
        self
    }

    pub fn add(mut self, error: ValidationError) -> Self {
        self.result.add_error(error);
        self
    }

    pub fn validate(self) -> Result<(), ValidationResult> {
        if self.result.is_valid() {
            Ok(())
        } else {
            Err(self.result)
        }
    }

    /// Like [`Validator::validate`], but hands back the required values.
    /// `value` is absent exactly when an earlier `Required` check failed.
    pub fn validate_with<T>(self, value: Option<T>) -> Result<T, ValidationResult> {
        match value {
            Some(value) if self.result.is_valid() => Ok(value),
            _ => Err(self.result),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_length_counts_chars() {
        assert!(validate_length("São Paulo", "city", Some(1), Some(9)).is_ok());
        assert!(validate_length("hi", "field", Some(3), None).is_err());
        assert!(validate_length("hello world", "field", None, Some(5)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("emma@example.com", "email").is_ok());
        assert!(validate_email("user.name+tag@domain.co.uk", "email").is_ok());
        assert!(validate_email("invalid", "email").is_err());
        assert!(validate_email("@domain.com", "email").is_err());
    }

    #[test]
    fn test_validate_range_message() {
        let err = validate_range(120, "score", Some(0), Some(100)).unwrap_err();
        assert_eq!(err.field(), "score");
        assert_eq!(err.message(), "must be between 0 and 100");
        assert!(validate_range(-1.0, "price", Some(0.0), None).is_err());
    }

    #[test]
    fn test_parse_choice_reports_field() {
        let err = parse_choice::<u8>("abc", "limit").unwrap_err();
        assert_eq!(err.field(), "limit");
        assert_eq!(parse_choice::<u8>("7", "limit").unwrap(), 7);
    }

    #[test]
    fn test_validator_collects_every_error() {
        let result = Validator::new()
            .string_required("", "name")
            .optional_email(Some("nope"), "email")
            .optional_email(Some("   "), "altEmail")
            .range(Some(101), "score", Some(0), Some(100))
            .validate();

        let errors = result.unwrap_err().into_errors();
        let fields: Vec<&str> = errors.iter().map(|e| e.field()).collect();
        assert_eq!(fields, vec!["name", "email", "score"]);
    }

    #[test]
    fn test_validate_with_yields_present_values() {
        let lead: Option<u32> = Some(7);
        let property: Option<u32> = None;

        let errors = Validator::new()
            .custom(|| lead.is_none().then(|| ValidationError::Required("leadId".into())))
            .custom(|| property.is_none().then(|| ValidationError::Required("propertyId".into())))
            .validate_with(lead.zip(property))
            .unwrap_err()
            .into_errors();
        assert_eq!(errors, vec![ValidationError::Required("propertyId".to_string())]);

        let pair = Validator::new().validate_with(lead.zip(Some(9))).unwrap();
        assert_eq!(pair, (7, 9));

        let blocked = Validator::new()
            .range(Some(-1), "score", Some(0), None)
            .validate_with(Some(1));
        assert!(blocked.is_err());
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("correct horse").is_ok());
        assert!(validate_password_strength("short").is_err());
    }

    #[test]
    fn test_display_mentions_field() {
        let err = ValidationError::Required("title".to_string());
        assert_eq!(err.to_string(), "Field 'title' is required");
    }
}
