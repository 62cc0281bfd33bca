use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(SubjectId);
string_id!(ItemId);

/// A followed account that may own moments.  Older servers send `_id`,
/// `username` and `profilePic`, so those are accepted as well.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(alias = "_id")]
    pub id: SubjectId,
    #[serde(rename = "displayName", alias = "username")]
    pub display_name: Arc<str>,
    #[serde(rename = "avatarUrl", alias = "profilePic", default)]
    pub avatar_url: Option<Arc<str>>,
}

impl Subject {
    /// Relative path of the avatar, if the subject has a non-empty one.
    pub fn avatar(&self) -> Option<&str> {
        self.avatar_url.as_deref().filter(|path| !path.is_empty())
    }
}

/// One moment: an image with a caption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(alias = "_id")]
    pub id: ItemId,
    #[serde(rename = "subjectId", alias = "user")]
    pub subject_id: SubjectId,
    /// Server-relative path, see `Config::media_url`.
    #[serde(rename = "imageUrl", alias = "image")]
    pub image_url: Arc<str>,
    #[serde(default)]
    pub caption: String,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Payload of a moment creation request, already validated as an image.
#[derive(Clone, Debug)]
pub struct NewItem {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
    pub caption: String,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn decodes_canonical_and_legacy_subjects() {
        let canonical: Subject = serde_json::from_str(
            r#"{"id":"u1","displayName":"ana","avatarUrl":"/uploads/ana.png"}"#,
        )
        .unwrap();
        let legacy: Subject =
            serde_json::from_str(r#"{"_id":"u1","username":"ana","profilePic":""}"#).unwrap();

        assert_eq!(canonical.id, legacy.id);
        assert_eq!(canonical.display_name, legacy.display_name);
        assert_eq!(canonical.avatar(), Some("/uploads/ana.png"));
        assert_eq!(legacy.avatar(), None);
    }

    #[test]
    fn decodes_legacy_moment_with_missing_caption() {
        let item: MediaItem = serde_json::from_str(
            r#"{
                "_id": "m1",
                "user": "u1",
                "image": "/uploads/moments/1.png",
                "createdAt": "2024-03-01T10:15:00.250Z",
                "__v": 0
            }"#,
        )
        .unwrap();

        assert_eq!(item.id.as_str(), "m1");
        assert_eq!(item.subject_id, SubjectId::from("u1"));
        assert_eq!(&*item.image_url, "/uploads/moments/1.png");
        assert_eq!(item.caption, "");
        assert_eq!(item.created_at, datetime!(2024-03-01 10:15:00.250 UTC));
    }
}
