use std::fmt;

use crate::domain::errors::PublishError;

/// Stream key announced on publish; masked whenever displayed
#[derive(Clone, PartialEq, Eq)]
pub struct StreamKey(String);

impl StreamKey {
    pub fn new(key: impl Into<String>) -> Result<Self, PublishError> {
        let key = key.into();
        if key.is_empty() || key.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(PublishError::InvalidStreamKey);
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        let visible: String = self.0.chars().take(4).collect();
        format!("{}****", visible)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamKey({})", self.masked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_malformed_keys() {
        assert_eq!(StreamKey::new(""), Err(PublishError::InvalidStreamKey));
        assert_eq!(StreamKey::new("a b"), Err(PublishError::InvalidStreamKey));
        assert_eq!(StreamKey::new("a/b"), Err(PublishError::InvalidStreamKey));
    }

    #[test]
    fn test_display_is_masked() {
        let key = StreamKey::new("live_123456789").unwrap();
        assert_eq!(key.to_string(), "live****");
        assert!(!format!("{:?}", key).contains("123456789"));
        assert_eq!(key.expose(), "live_123456789");
    }
}
