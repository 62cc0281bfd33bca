mod client;
mod multipart;

use std::sync::Arc;

use crate::{
    error::Error,
    model::{MediaItem, NewItem, Subject, SubjectId},
};

pub use self::client::WebApi;

/// The remote content service.  Every call is blocking and is expected to
/// fail with `Error::Unauthorized` without any I/O when no credential is
/// available.
pub trait ContentService: Send + Sync {
    /// Followed subjects, in subscription order.
    fn subjects(&self) -> Result<Vec<Subject>, Error>;

    /// Moments of one subject, in no particular order.
    fn items(&self, subject: &SubjectId) -> Result<Vec<MediaItem>, Error>;

    fn create_item(&self, item: &NewItem) -> Result<MediaItem, Error>;

    /// Profile of the signed-in subject.
    fn me(&self) -> Result<Subject, Error>;
}

pub type ContentServiceHandle = Arc<dyn ContentService>;
