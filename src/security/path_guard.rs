use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathGuardError {
    PathTraversal,
    AbsolutePath,
    EmptyPath,
    InvalidComponent,
    PathTooLong,
    NullByte,
}

impl std::fmt::Display for PathGuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PathTraversal => write!(f, "Path traversal attempt detected"),
            Self::AbsolutePath => write!(f, "Absolute paths are not allowed"),
            Self::EmptyPath => write!(f, "Empty path segments are not allowed"),
            Self::InvalidComponent => write!(f, "Invalid path component"),
            Self::PathTooLong => write!(f, "Path exceeds maximum length"),
            Self::NullByte => write!(f, "Path contains null byte"),
        }
    }
}

impl std::error::Error for PathGuardError {}

const MAX_PATH_LENGTH: usize = 1024;

/// Turns an object key such as `uploads/abc.jpg` into a relative path that
/// cannot leave the storage root.
pub fn sanitize_object_key(key: &str) -> Result<PathBuf, PathGuardError> {
    if key.len() > MAX_PATH_LENGTH {
        return Err(PathGuardError::PathTooLong);
    }
    if key.contains('\0') {
        return Err(PathGuardError::NullByte);
    }
    if key.starts_with('/') || key.starts_with('\\') || key.contains(':') {
        return Err(PathGuardError::AbsolutePath);
    }

    let mut path = PathBuf::new();
    for segment in key.split('/') {
        match segment {
            "" => return Err(PathGuardError::EmptyPath),
            "." | ".." => return Err(PathGuardError::PathTraversal),
            s if s.contains('\\') => return Err(PathGuardError::InvalidComponent),
            s => path.push(s),
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_keys_pass() {
        assert_eq!(
            sanitize_object_key("uploads/1234").unwrap(),
            PathBuf::from("uploads").join("1234")
        );
    }

    #[test]
    fn test_hostile_keys_rejected() {
        assert_eq!(sanitize_object_key("../etc/passwd"), Err(PathGuardError::PathTraversal));
        assert_eq!(sanitize_object_key("uploads/../../x"), Err(PathGuardError::PathTraversal));
        assert_eq!(sanitize_object_key("/etc/passwd"), Err(PathGuardError::AbsolutePath));
        assert_eq!(sanitize_object_key("C:/windows"), Err(PathGuardError::AbsolutePath));
        assert_eq!(sanitize_object_key("uploads//x"), Err(PathGuardError::EmptyPath));
        assert_eq!(sanitize_object_key(""), Err(PathGuardError::EmptyPath));
        assert_eq!(sanitize_object_key("a\\..\\b"), Err(PathGuardError::InvalidComponent));
        assert_eq!(sanitize_object_key("a\0b"), Err(PathGuardError::NullByte));
    }
}
