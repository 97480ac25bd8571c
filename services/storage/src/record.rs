use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Public prefix under which stored images are served.
pub const STATIC_PREFIX: &str = "/im";

/// Stored image metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ImageRecord {
    /// Unique image ID (`img_` prefixed)
    pub id: String,
    /// Submitting user's ID
    pub owner_id: String,
    /// Upload filename or URL basename
    pub display_name: String,
    /// `id` plus extension; names the original and every rendition
    pub storage_path: String,
    /// Bytes written for the original
    pub size_bytes: i64,
    /// User-supplied description
    pub description: String,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Canonical detail path for this image.
    pub fn show_route(&self) -> String {
        format!("/image/{}", self.id)
    }

    /// Static path of the original.
    pub fn static_route(&self) -> String {
        format!("{}/{}", STATIC_PREFIX, self.storage_path)
    }

    /// Static path of a named rendition.
    pub fn rendition_route(&self, rendition: &str) -> String {
        format!("{}/{}/{}", STATIC_PREFIX, rendition, self.storage_path)
    }

    pub fn thumbnail_route(&self) -> String {
        self.rendition_route("thumbnail")
    }

    pub fn preview_route(&self) -> String {
        self.rendition_route("preview")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ImageRecord {
        ImageRecord {
            id: "img_AbCdEf1234".to_string(),
            owner_id: "usr_0123456789".to_string(),
            display_name: "sunset.jpg".to_string(),
            storage_path: "img_AbCdEf1234.jpg".to_string(),
            size_bytes: 2048,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_routes() {
        let record = sample();
        assert_eq!(record.show_route(), "/image/img_AbCdEf1234");
        assert_eq!(record.static_route(), "/im/img_AbCdEf1234.jpg");
        assert_eq!(record.thumbnail_route(), "/im/thumbnail/img_AbCdEf1234.jpg");
        assert_eq!(record.preview_route(), "/im/preview/img_AbCdEf1234.jpg");
        assert_eq!(record.rendition_route("square"), "/im/square/img_AbCdEf1234.jpg");
    }
}
