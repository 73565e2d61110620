use crate::error::{ModelError, Result};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier, rejecting blank input.
            pub fn parse(raw: impl Into<String>) -> Result<Self> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(ModelError::InvalidId(format!(
                        "{} must not be empty",
                        stringify!($name)
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }
    };
}

string_id!(
    /// Opaque watch-session identifier issued by the tracking backend.
    WatchId
);

string_id!(
    /// Identifier of the video being watched (YouTube id or backend id).
    VideoId
);

string_id!(ClassroomId);

string_id!(
    /// Identifier of the classroom stream post the video is embedded in.
    StreamItemId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_whitespace() {
        let id = WatchId::parse("  w-123 ").unwrap();
        assert_eq!(id.as_str(), "w-123");
        assert_eq!(id.to_string(), "w-123");
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(matches!(
            ClassroomId::parse("   "),
            Err(ModelError::InvalidId(_))
        ));
        assert!("".parse::<StreamItemId>().is_err());
    }
}
