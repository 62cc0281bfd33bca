use std::{fs, path::Path, sync::Arc};

use crate::{
    error::Error,
    model::{MediaItem, NewItem, Subject},
    session::SessionService,
    store::ContentStore,
    webapi::ContentService,
};

#[derive(Clone, Debug)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: &'static str,
    pub bytes: Arc<[u8]>,
}

/// Form state of the "add a moment" flow for the signed-in subject.
pub struct UploadSession {
    author: Subject,
    file: Option<SelectedFile>,
    caption: String,
}

impl UploadSession {
    pub fn new(author: Subject) -> Self {
        Self {
            author,
            file: None,
            caption: String::new(),
        }
    }

    pub fn author(&self) -> &Subject {
        &self.author
    }

    /// Select a file to upload.  Anything that does not sniff as an image is
    /// rejected and clears the previous selection.
    pub fn select_file(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), Error> {
        match infer::get(&bytes) {
            Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {
                log::debug!("selected {} ({})", name, kind.mime_type());
                self.file = Some(SelectedFile {
                    name: name.to_string(),
                    mime_type: kind.mime_type(),
                    bytes: bytes.into(),
                });
                Ok(())
            }
            _ => {
                self.file = None;
                Err(Error::InvalidFile(format!(
                    "{} is not an image, please select an image file",
                    name
                )))
            }
        }
    }

    pub fn select_path(&mut self, path: &Path) -> Result<(), Error> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.select_file(&name, bytes)
    }

    pub fn set_caption(&mut self, caption: &str) {
        self.caption = caption.to_string();
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// The selected file, for showing a preview.
    pub fn preview(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn reset(&mut self) {
        self.file = None;
        self.caption.clear();
    }

    /// Send the moment.  On success the new item is put in front of the
    /// author's cached list and the form is cleared; on failure the form is
    /// left as it was so the user can retry.
    pub fn submit(
        &mut self,
        service: &dyn ContentService,
        store: &ContentStore,
        session: &SessionService,
    ) -> Result<MediaItem, Error> {
        if !session.is_authorized() {
            log::warn!("no credential, upload aborted");
            return Err(Error::Unauthorized);
        }
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::InvalidFile("please select an image to upload".into()))?;
        let item = service.create_item(&NewItem {
            file_name: file.name.clone(),
            mime_type: file.mime_type.to_string(),
            bytes: Arc::clone(&file.bytes),
            caption: self.caption.clone(),
        })?;
        log::info!("uploaded moment {}", item.id);
        store.prepend_item(&self.author.id, item.clone());
        self.reset();
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use time::OffsetDateTime;

    use super::*;
    use crate::model::{ItemId, SubjectId};

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[derive(Default)]
    struct Recorder {
        fail: bool,
        created: Mutex<Vec<NewItem>>,
    }

    impl ContentService for Recorder {
        fn subjects(&self) -> Result<Vec<Subject>, Error> {
            Ok(Vec::new())
        }

        fn items(&self, _subject: &SubjectId) -> Result<Vec<MediaItem>, Error> {
            Ok(Vec::new())
        }

        fn create_item(&self, item: &NewItem) -> Result<MediaItem, Error> {
            self.created.lock().push(item.clone());
            if self.fail {
                return Err(Error::UnexpectedResponse { status: 500 });
            }
            Ok(MediaItem {
                id: ItemId::from("new"),
                subject_id: SubjectId::from("me"),
                image_url: "/uploads/moments/new.png".into(),
                caption: item.caption.clone(),
                created_at: OffsetDateTime::now_utc(),
            })
        }

        fn me(&self) -> Result<Subject, Error> {
            Ok(me())
        }
    }

    fn me() -> Subject {
        Subject {
            id: SubjectId::from("me"),
            display_name: "me".into(),
            avatar_url: None,
        }
    }

    #[test]
    fn rejects_non_images_without_a_request() {
        let service = Recorder::default();
        let mut upload = UploadSession::new(me());
        upload.select_file("a.png", PNG.to_vec()).unwrap();

        let err = upload
            .select_file("notes.txt", b"just text".to_vec())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFile(_)));
        assert!(upload.preview().is_none());

        let err = upload
            .submit(&service, &ContentStore::default(), &SessionService::with_token("t"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFile(_)));
        assert!(service.created.lock().is_empty());
    }

    #[test]
    fn successful_upload_prepends_and_resets() {
        let service = Recorder::default();
        let store = ContentStore::default();
        let mut upload = UploadSession::new(me());
        upload.select_file("sun.png", PNG.to_vec()).unwrap();
        upload.set_caption("sunny");

        let item = upload
            .submit(&service, &store, &SessionService::with_token("t"))
            .unwrap();

        assert_eq!(item.caption, "sunny");
        assert_eq!(service.created.lock()[0].mime_type, "image/png");
        assert_eq!(store.items(&SubjectId::from("me")).unwrap()[0], item);
        assert!(upload.preview().is_none());
        assert_eq!(upload.caption(), "");
    }

    #[test]
    fn failed_upload_keeps_the_form() {
        let service = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let store = ContentStore::default();
        let mut upload = UploadSession::new(me());
        upload.select_file("sun.png", PNG.to_vec()).unwrap();
        upload.set_caption("sunny");

        assert!(upload
            .submit(&service, &store, &SessionService::with_token("t"))
            .is_err());
        assert_eq!(upload.preview().unwrap().name, "sun.png");
        assert_eq!(upload.caption(), "sunny");
        assert!(store.items(&SubjectId::from("me")).is_none());
    }

    #[test]
    fn missing_credential_aborts_before_the_request() {
        let service = Recorder::default();
        let mut upload = UploadSession::new(me());
        upload.select_file("sun.png", PNG.to_vec()).unwrap();

        let err = upload
            .submit(&service, &ContentStore::default(), &SessionService::empty())
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(service.created.lock().is_empty());
        assert!(upload.preview().is_some());
    }
}
