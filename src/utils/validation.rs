use std::path::Path;

/// Extensions accepted for media uploads
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Returns the file's extension if it is on the image allow-list.
pub fn validate_image_extension(filename: &str) -> Result<String, ValidationError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    if ALLOWED_IMAGE_EXTENSIONS.contains(&ext) {
        return Ok(ext.to_string());
    }

    Err(ValidationError {
        code: "INVALID_EXTENSION",
        message: "extension is not acceptable".to_string(),
    })
}

/// Validates file size against the per-file limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "file size must less than {} MiB",
                (max_size as f64 / MIB).ceil() as u64
            ),
        });
    }
    Ok(())
}

/// Rejects destinations that could escape the bucket prefix.
pub fn validate_destination(destination: &str) -> Result<(), ValidationError> {
    let invalid = destination.starts_with('/')
        || destination.split('/').any(|segment| segment == "..")
        || destination.contains('\\')
        || destination.chars().any(|c| c.is_control());

    if invalid {
        return Err(ValidationError {
            code: "INVALID_DESTINATION",
            message: format!("destination '{}' is not acceptable", destination),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_image_extension() {
        assert_eq!(validate_image_extension("cat.png").unwrap(), "png");
        assert_eq!(validate_image_extension("cat.jpg").unwrap(), "jpg");
        assert_eq!(validate_image_extension("a.b.jpeg").unwrap(), "jpeg");

        assert!(validate_image_extension("cat.gif").is_err());
        assert!(validate_image_extension("cat.PNG").is_err());
        assert!(validate_image_extension("cat").is_err());
        assert!(validate_image_extension("script.php").is_err());
    }

    #[test]
    fn test_validate_file_size() {
        let limit = 2 * 1024 * 1024;
        assert!(validate_file_size(limit, limit).is_ok());
        let err = validate_file_size(limit + 1, limit).unwrap_err();
        assert_eq!(err.code, "FILE_TOO_LARGE");
        assert_eq!(err.message, "file size must less than 2 MiB");

        // Rounded up to whole MiB
        let err = validate_file_size(2_000_000, 1_500_000).unwrap_err();
        assert_eq!(err.message, "file size must less than 2 MiB");
    }

    #[test]
    fn test_validate_destination() {
        assert!(validate_destination("images/test/").is_ok());
        assert!(validate_destination("").is_ok());
        assert!(validate_destination("/etc/").is_err());
        assert!(validate_destination("images/../../secret/").is_err());
        assert!(validate_destination("images\\x").is_err());
    }
}
