use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{
    error::Error,
    model::{MediaItem, Subject, SubjectId},
    webapi::ContentService,
};

pub type ContentStoreHandle = Arc<ContentStore>;

/// Cache of the subject list and of each subject's moments.  Readers always
/// get a shared snapshot; writers swap whole lists, so a half-updated list is
/// never observable.
#[derive(Default)]
pub struct ContentStore {
    subjects: RwLock<Arc<Vec<Subject>>>,
    items: RwLock<HashMap<SubjectId, CachedItems>>,
}

/// `revision` counts local insertions, so a load can tell whether the list
/// changed underneath it.
#[derive(Default)]
struct CachedItems {
    items: Arc<Vec<MediaItem>>,
    revision: u64,
}

impl ContentStore {
    pub fn new() -> ContentStoreHandle {
        Arc::new(Self::default())
    }

    pub fn load_subjects(&self, service: &dyn ContentService) -> Result<Arc<Vec<Subject>>, Error> {
        let subjects = Arc::new(service.subjects()?);
        log::info!("loaded {} subjects", subjects.len());
        *self.subjects.write() = Arc::clone(&subjects);
        Ok(subjects)
    }

    pub fn load_items(
        &self,
        service: &dyn ContentService,
        subject: &SubjectId,
    ) -> Result<Arc<Vec<MediaItem>>, Error> {
        let seen = self.items.read().get(subject).map_or(0, |cached| cached.revision);
        let mut items = service.items(subject)?;
        log::debug!("loaded {} items for {}", items.len(), subject);

        let mut cache = self.items.write();
        let cached = cache.entry(subject.clone()).or_default();
        if cached.revision != seen {
            log::debug!("items for {} changed while loading, merging", subject);
            for local in cached.items.iter() {
                if !items.iter().any(|item| item.id == local.id) {
                    items.push(local.clone());
                }
            }
        }
        sort_newest_first(&mut items);
        let items = Arc::new(items);
        cached.items = Arc::clone(&items);
        Ok(items)
    }

    /// Put a freshly created item in front of the subject's cached list.
    pub fn prepend_item(&self, subject: &SubjectId, item: MediaItem) {
        let mut cache = self.items.write();
        let cached = cache.entry(subject.clone()).or_default();
        let mut items = Vec::with_capacity(cached.items.len() + 1);
        items.push(item);
        items.extend(cached.items.iter().cloned());
        cached.items = Arc::new(items);
        cached.revision += 1;
    }

    pub fn subjects(&self) -> Arc<Vec<Subject>> {
        self.subjects.read().clone()
    }

    pub fn subject(&self, index: usize) -> Option<Subject> {
        self.subjects.read().get(index).cloned()
    }

    pub fn subject_index(&self, subject: &SubjectId) -> Option<usize> {
        self.subjects.read().iter().position(|s| &s.id == subject)
    }

    pub fn items(&self, subject: &SubjectId) -> Option<Arc<Vec<MediaItem>>> {
        self.items
            .read()
            .get(subject)
            .map(|cached| Arc::clone(&cached.items))
    }

    pub fn clear(&self) {
        *self.subjects.write() = Arc::default();
        self.items.write().clear();
    }
}

/// Order moments by creation time, newest first.  The sort is stable, so
/// items created at the same instant keep their retrieval order.
pub fn sort_newest_first(items: &mut [MediaItem]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crossbeam_channel::{bounded, Receiver, Sender};
    use time::{macros::datetime, OffsetDateTime};

    use super::*;
    use crate::model::{ItemId, NewItem};

    fn item(id: &str, created_at: OffsetDateTime) -> MediaItem {
        MediaItem {
            id: ItemId::from(id),
            subject_id: SubjectId::from("u1"),
            image_url: format!("/uploads/{id}.png").into(),
            caption: String::new(),
            created_at,
        }
    }

    struct Fixed(Vec<MediaItem>);

    impl ContentService for Fixed {
        fn subjects(&self) -> Result<Vec<Subject>, Error> {
            Ok(vec![Subject {
                id: SubjectId::from("u1"),
                display_name: "ana".into(),
                avatar_url: None,
            }])
        }

        fn items(&self, _subject: &SubjectId) -> Result<Vec<MediaItem>, Error> {
            Ok(self.0.clone())
        }

        fn create_item(&self, _item: &NewItem) -> Result<MediaItem, Error> {
            Err(Error::Unauthorized)
        }

        fn me(&self) -> Result<Subject, Error> {
            Err(Error::Unauthorized)
        }
    }

    #[test]
    fn items_are_cached_newest_first() {
        let service = Fixed(vec![
            item("old", datetime!(2024-01-01 00:00 UTC)),
            item("new", datetime!(2024-01-03 00:00 UTC)),
            item("mid", datetime!(2024-01-02 00:00 UTC)),
        ]);
        let store = ContentStore::new();
        let subject = SubjectId::from("u1");

        let loaded = store.load_items(&service, &subject).unwrap();
        let ids: Vec<_> = loaded.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
        assert_eq!(store.items(&subject), Some(loaded));
    }

    #[test]
    fn empty_subject_is_an_empty_list() {
        let store = ContentStore::new();
        let loaded = store
            .load_items(&Fixed(Vec::new()), &SubjectId::from("u1"))
            .unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn prepend_keeps_earlier_snapshots_intact() {
        let service = Fixed(vec![item("a", datetime!(2024-01-01 00:00 UTC))]);
        let store = ContentStore::new();
        let subject = SubjectId::from("u1");
        let before = store.load_items(&service, &subject).unwrap();

        store.prepend_item(&subject, item("b", datetime!(2024-02-01 00:00 UTC)));

        let after = store.items(&subject).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].id.as_str(), "b");

        store.prepend_item(&SubjectId::from("fresh"), item("c", datetime!(2024-02-02 00:00 UTC)));
        assert_eq!(store.items(&SubjectId::from("fresh")).unwrap().len(), 1);
    }

    /// Blocks inside `items` until released, to interleave a prepend.
    struct Gated {
        started: Sender<()>,
        release: Receiver<()>,
        items: Vec<MediaItem>,
    }

    impl ContentService for Gated {
        fn subjects(&self) -> Result<Vec<Subject>, Error> {
            Ok(Vec::new())
        }

        fn items(&self, _subject: &SubjectId) -> Result<Vec<MediaItem>, Error> {
            let _ = self.started.send(());
            let _ = self.release.recv();
            Ok(self.items.clone())
        }

        fn create_item(&self, _item: &NewItem) -> Result<MediaItem, Error> {
            Err(Error::Unauthorized)
        }

        fn me(&self) -> Result<Subject, Error> {
            Err(Error::Unauthorized)
        }
    }

    #[test]
    fn prepend_during_a_load_is_not_lost() {
        let (started_send, started) = bounded(1);
        let (release, release_recv) = bounded(1);
        let service = Gated {
            started: started_send,
            release: release_recv,
            items: vec![item("a", datetime!(2024-01-01 00:00 UTC))],
        };
        let store = ContentStore::new();
        let subject = SubjectId::from("u1");

        let loading = thread::spawn({
            let store = store.clone();
            let subject = subject.clone();
            move || store.load_items(&service, &subject)
        });
        started.recv().unwrap();
        store.prepend_item(&subject, item("b", datetime!(2024-02-01 00:00 UTC)));
        release.send(()).unwrap();

        let loaded = loading.join().unwrap().unwrap();
        let ids: Vec<_> = loaded.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(store.items(&subject), Some(loaded));
    }

    #[test]
    fn subjects_are_replaced_and_indexed() {
        let store = ContentStore::new();
        assert!(store.subjects().is_empty());
        store.load_subjects(&Fixed(Vec::new())).unwrap();
        assert_eq!(store.subject_index(&SubjectId::from("u1")), Some(0));
        assert_eq!(&*store.subject(0).unwrap().display_name, "ana");
        store.clear();
        assert!(store.subject(0).is_none());
    }
}
