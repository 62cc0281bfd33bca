pub mod timer;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;

use crate::{
    actor::{Act, Actor},
    error::Error,
    fetch::{run_with_timeout, FetchCoordinator, Fetched, GenerationCounter},
    model::{MediaItem, Subject, SubjectId},
    resolver::{self, Resolution},
    session::SessionService,
    store::ContentStoreHandle,
    webapi::ContentServiceHandle,
};

use self::timer::AdvanceTimer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackConfig {
    pub advance_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            advance_interval: Duration::from_millis(3000),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FetchKey {
    Subjects,
    Items(SubjectId),
    Resolve,
}

#[derive(Debug)]
pub enum PlaybackCommand {
    /// Begin a session: load the subject list and play the first subject.
    Start,
    Select {
        subject: SubjectId,
    },
    Stop,
    /// A new item for `subject` was put into the store.
    ItemAdded {
        subject: SubjectId,
    },
    Shutdown,
}

#[derive(Debug)]
pub enum PlaybackEvent {
    Command(PlaybackCommand),
    SubjectsLoaded(Fetched<FetchKey, Arc<Vec<Subject>>>),
    ItemsLoaded(Fetched<FetchKey, Arc<Vec<MediaItem>>>),
    Resolved(Fetched<FetchKey, Resolution>),
    /// The advancement timer expired.  Only ever produced for the timer that
    /// is currently armed.
    TimerFired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Playing,
    Resolving,
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdleNotice {
    None,
    AwaitingSubjects,
    NoSubjects,
    LoadFailed(String),
    Unauthorized,
}

/// Notifications for whoever renders the playback.  Exactly one is sent per
/// state transition or advancement.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackUpdate {
    Idle {
        notice: IdleNotice,
    },
    Loading {
        subject: Subject,
    },
    Playing {
        subject: Subject,
        index: usize,
        count: usize,
        item: MediaItem,
    },
    Resolving {
        from: Subject,
    },
    /// Nothing to show anywhere, `subject` is displayed without content.
    Empty {
        subject: Subject,
    },
    /// A request was refused locally because there is no credential.
    Unauthorized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    AutoStart,
    Explicit,
}

enum PlaybackState {
    Idle {
        notice: IdleNotice,
    },
    Loading {
        subject: usize,
        origin: Origin,
    },
    Playing {
        subject: usize,
        items: Arc<Vec<MediaItem>>,
        item: usize,
        timer: AdvanceTimer,
    },
    Resolving {
        from: usize,
    },
    Empty {
        subject: usize,
    },
}

pub struct Scheduler {
    state: PlaybackState,
    config: PlaybackConfig,
    session: SessionService,
    service: ContentServiceHandle,
    store: ContentStoreHandle,
    fetches: FetchCoordinator<FetchKey, PlaybackEvent>,
    generation: GenerationCounter,
    /// Subject most recently shown in `Playing` or `Empty`, kept across a
    /// plain `Stop`.
    last_shown: Option<SubjectId>,
    updates: Option<Sender<PlaybackUpdate>>,
}

impl Scheduler {
    /// `sender` must feed back into whatever calls `handle`, fetch results
    /// are delivered through it.
    pub fn new(
        config: PlaybackConfig,
        session: SessionService,
        service: ContentServiceHandle,
        store: ContentStoreHandle,
        sender: Sender<PlaybackEvent>,
    ) -> Self {
        Self {
            fetches: FetchCoordinator::new(sender, config.fetch_timeout),
            state: PlaybackState::Idle {
                notice: IdleNotice::None,
            },
            config,
            session,
            service,
            store,
            generation: GenerationCounter::new(),
            last_shown: None,
            updates: None,
        }
    }

    pub fn with_observer(mut self, updates: Sender<PlaybackUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn handle(&mut self, event: PlaybackEvent) {
        self.dispatch(event);
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            PlaybackState::Idle { .. } => Phase::Idle,
            PlaybackState::Loading { .. } => Phase::Loading,
            PlaybackState::Playing { .. } => Phase::Playing,
            PlaybackState::Resolving { .. } => Phase::Resolving,
            PlaybackState::Empty { .. } => Phase::Empty,
        }
    }

    pub fn notice(&self) -> Option<&IdleNotice> {
        match &self.state {
            PlaybackState::Idle { notice } => Some(notice),
            _ => None,
        }
    }

    pub fn subject_index(&self) -> Option<usize> {
        match self.state {
            PlaybackState::Loading { subject, .. }
            | PlaybackState::Playing { subject, .. }
            | PlaybackState::Empty { subject } => Some(subject),
            PlaybackState::Resolving { from } => Some(from),
            PlaybackState::Idle { .. } => None,
        }
    }

    pub fn item_index(&self) -> Option<usize> {
        match self.state {
            PlaybackState::Playing { item, .. } => Some(item),
            _ => None,
        }
    }

    pub fn current_item(&self) -> Option<&MediaItem> {
        match &self.state {
            PlaybackState::Playing { items, item, .. } => items.get(*item),
            _ => None,
        }
    }

    pub fn has_timer(&self) -> bool {
        self.deadline().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            PlaybackState::Playing { timer, .. } => Some(timer.deadline()),
            _ => None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    pub fn pending_fetches(&self) -> usize {
        self.fetches.in_flight()
    }

    /// Returns `false` once the scheduler should stop.
    fn dispatch(&mut self, event: PlaybackEvent) -> bool {
        match event {
            PlaybackEvent::Command(cmd) => {
                return self.handle_command(cmd);
            }
            PlaybackEvent::SubjectsLoaded(fetched) => {
                self.handle_subjects_loaded(fetched);
            }
            PlaybackEvent::ItemsLoaded(fetched) => {
                self.handle_items_loaded(fetched);
            }
            PlaybackEvent::Resolved(fetched) => {
                self.handle_resolved(fetched);
            }
            PlaybackEvent::TimerFired => {
                self.handle_timer();
            }
        }
        true
    }

    fn handle_command(&mut self, cmd: PlaybackCommand) -> bool {
        match cmd {
            PlaybackCommand::Start => self.start(),
            PlaybackCommand::Select { subject } => self.select(&subject),
            PlaybackCommand::Stop => self.enter_idle(IdleNotice::None),
            PlaybackCommand::ItemAdded { subject } => self.item_added(&subject),
            PlaybackCommand::Shutdown => {
                self.enter_idle(IdleNotice::None);
                return false;
            }
        }
        true
    }

    fn start(&mut self) {
        if !self.authorized() {
            return;
        }
        self.enter_idle(IdleNotice::AwaitingSubjects);
        self.last_shown = None;
        let store = self.store.clone();
        let service = self.service.clone();
        self.fetches.fetch(
            FetchKey::Subjects,
            self.generation.current(),
            move || store.load_subjects(&*service),
            PlaybackEvent::SubjectsLoaded,
        );
    }

    fn select(&mut self, subject: &SubjectId) {
        if !self.authorized() {
            return;
        }
        let Some(index) = self.store.subject_index(subject) else {
            log::warn!("unknown subject {}, ignoring selection", subject);
            return;
        };
        self.enter_idle(IdleNotice::None);
        self.begin_loading(index, Origin::Explicit);
    }

    fn item_added(&mut self, subject: &SubjectId) {
        let Some(index) = self.store.subject_index(subject) else {
            return;
        };
        let shown = match self.state {
            PlaybackState::Playing { subject, .. } | PlaybackState::Empty { subject } => {
                subject == index
            }
            // Stopped for the upload flow, pick the same subject back up.
            PlaybackState::Idle {
                notice: IdleNotice::None,
            } => self.last_shown.as_ref() == Some(subject),
            _ => false,
        };
        if !shown {
            return;
        }
        match self.store.items(subject) {
            Some(items) if !items.is_empty() => {
                log::info!("refreshing displayed subject with the new item");
                self.generation.advance();
                self.start_playing(index, items);
            }
            _ => {}
        }
    }

    fn handle_subjects_loaded(&mut self, fetched: Fetched<FetchKey, Arc<Vec<Subject>>>) {
        if !self.accept(&fetched.key, fetched.ticket, fetched.generation) {
            return;
        }
        match fetched.result {
            Ok(subjects) if subjects.is_empty() => {
                log::info!("not following anyone");
                self.enter_idle(IdleNotice::NoSubjects);
            }
            Ok(_) => {
                self.begin_loading(0, Origin::AutoStart);
            }
            Err(err) => {
                log::error!("failed to load subjects: {}", err);
                self.fail(err);
            }
        }
    }

    fn handle_items_loaded(&mut self, fetched: Fetched<FetchKey, Arc<Vec<MediaItem>>>) {
        if !self.accept(&fetched.key, fetched.ticket, fetched.generation) {
            return;
        }
        let (subject, origin) = match self.state {
            PlaybackState::Loading { subject, origin } => (subject, origin),
            _ => {
                log::warn!("items arrived while not loading, ignoring");
                return;
            }
        };
        match fetched.result {
            Ok(items) if !items.is_empty() => {
                self.start_playing(subject, items);
            }
            Ok(_) => {
                log::info!("subject {} has no moments", subject);
                self.begin_resolving(subject);
            }
            Err(err) if err.is_unauthorized() => {
                self.fail(err);
            }
            Err(err) => match origin {
                Origin::Explicit => {
                    log::error!("failed to load moments: {}", err);
                    self.fail(err);
                }
                Origin::AutoStart => {
                    log::warn!("failed to load moments, moving on: {}", err);
                    self.begin_resolving(subject);
                }
            },
        }
    }

    fn handle_resolved(&mut self, fetched: Fetched<FetchKey, Resolution>) {
        if !self.accept(&fetched.key, fetched.ticket, fetched.generation) {
            return;
        }
        if !matches!(self.state, PlaybackState::Resolving { .. }) {
            log::warn!("resolution arrived while not resolving, ignoring");
            return;
        }
        match fetched.result {
            Ok(Resolution::Found {
                index,
                items,
                attempts,
            }) => {
                log::info!("resolved subject {} after {} attempts", index, attempts);
                self.generation.advance();
                self.start_playing(index, items);
            }
            Ok(Resolution::Exhausted { fallback, .. }) => {
                self.enter_empty(fallback);
            }
            Ok(Resolution::Unauthorized { .. }) => {
                self.fail(Error::Unauthorized);
            }
            Ok(Resolution::NoSubjects) => {
                self.enter_idle(IdleNotice::NoSubjects);
            }
            Ok(Resolution::Cancelled { .. }) => {
                // Cancellation only happens after a generation change, which
                // `accept` already filters out.
                log::warn!("resolving cancelled under the current generation");
                self.enter_idle(IdleNotice::None);
            }
            Err(err) => {
                log::error!("resolving failed: {}", err);
                self.enter_empty(resolver::FALLBACK_INDEX);
            }
        }
    }

    fn handle_timer(&mut self) {
        let exhausted = match &mut self.state {
            PlaybackState::Playing {
                subject,
                items,
                item,
                timer,
            } => {
                if *item + 1 < items.len() {
                    *item += 1;
                    timer.restart();
                    None
                } else {
                    Some(*subject)
                }
            }
            _ => {
                log::info!("timer fired without active playback, ignoring");
                return;
            }
        };
        match exhausted {
            Some(subject) => self.begin_resolving(subject),
            None => self.notify_playing(),
        }
    }

    fn begin_loading(&mut self, index: usize, origin: Origin) {
        let Some(subject) = self.store.subject(index) else {
            self.enter_idle(IdleNotice::NoSubjects);
            return;
        };
        let generation = self.generation.advance();
        self.state = PlaybackState::Loading {
            subject: index,
            origin,
        };
        self.notify(PlaybackUpdate::Loading {
            subject: subject.clone(),
        });

        let store = self.store.clone();
        let service = self.service.clone();
        let id = subject.id;
        self.fetches.fetch(
            FetchKey::Items(id.clone()),
            generation,
            move || store.load_items(&*service, &id),
            PlaybackEvent::ItemsLoaded,
        );
    }

    fn begin_resolving(&mut self, from: usize) {
        let subjects = self.store.subjects();
        let Some(from_subject) = subjects.get(from).cloned() else {
            self.enter_idle(IdleNotice::NoSubjects);
            return;
        };
        let generation = self.generation.advance();
        self.state = PlaybackState::Resolving { from };
        self.notify(PlaybackUpdate::Resolving { from: from_subject });

        let store = self.store.clone();
        let service = self.service.clone();
        let current = self.generation.clone();
        let timeout = self.fetches.timeout();
        self.fetches.run(
            FetchKey::Resolve,
            generation,
            move || {
                let resolution = resolver::resolve(
                    from,
                    subjects.len(),
                    |index| {
                        let store = store.clone();
                        let service = service.clone();
                        let id = subjects[index].id.clone();
                        run_with_timeout(timeout, move || store.load_items(&*service, &id))
                    },
                    || !current.is_current(generation),
                );
                Ok(resolution)
            },
            PlaybackEvent::Resolved,
        );
    }

    fn start_playing(&mut self, subject: usize, items: Arc<Vec<MediaItem>>) {
        debug_assert!(!items.is_empty());
        self.last_shown = self.store.subject(subject).map(|shown| shown.id);
        self.state = PlaybackState::Playing {
            subject,
            items,
            item: 0,
            timer: AdvanceTimer::start(self.config.advance_interval),
        };
        self.notify_playing();
    }

    fn enter_empty(&mut self, subject: usize) {
        self.generation.advance();
        self.state = PlaybackState::Empty { subject };
        if let Some(subject) = self.store.subject(subject) {
            self.last_shown = Some(subject.id.clone());
            self.notify(PlaybackUpdate::Empty { subject });
        }
    }

    /// Drop the timer and any outstanding work, then settle in `Idle`.
    fn enter_idle(&mut self, notice: IdleNotice) {
        self.generation.advance();
        self.fetches.cancel_all();
        self.state = PlaybackState::Idle {
            notice: notice.clone(),
        };
        self.notify(PlaybackUpdate::Idle { notice });
    }

    fn fail(&mut self, err: Error) {
        if err.is_unauthorized() {
            self.enter_idle(IdleNotice::Unauthorized);
        } else {
            self.enter_idle(IdleNotice::LoadFailed(err.to_string()));
        }
    }

    fn authorized(&mut self) -> bool {
        if self.session.is_authorized() {
            true
        } else {
            log::warn!("no credential, request aborted");
            self.notify(PlaybackUpdate::Unauthorized);
            false
        }
    }

    /// Check a returned fetch against both the latest ticket for its key and
    /// the current generation.
    fn accept(&mut self, key: &FetchKey, ticket: u64, generation: u64) -> bool {
        if !self.fetches.complete(key, ticket) {
            log::info!("superseded fetch result received, ignoring");
            return false;
        }
        if !self.generation.is_current(generation) {
            log::info!("stale fetch result received, ignoring");
            return false;
        }
        true
    }

    fn notify_playing(&self) {
        if let PlaybackState::Playing {
            subject,
            items,
            item,
            ..
        } = &self.state
        {
            if let (Some(subject), Some(current)) = (self.store.subject(*subject), items.get(*item))
            {
                self.notify(PlaybackUpdate::Playing {
                    subject,
                    index: *item,
                    count: items.len(),
                    item: current.clone(),
                });
            }
        }
    }

    fn notify(&self, update: PlaybackUpdate) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(update);
        }
    }
}

impl Actor for Scheduler {
    type Message = PlaybackEvent;
    type Error = Error;

    fn handle(&mut self, msg: PlaybackEvent) -> Result<Act<Self>, Error> {
        if !self.dispatch(msg) {
            return Ok(Act::Shutdown);
        }
        Ok(match self.deadline() {
            Some(deadline) => Act::WaitUntil {
                deadline,
                timeout_msg: PlaybackEvent::TimerFired,
            },
            None => Act::Continue,
        })
    }

    fn stopped(&mut self) {
        self.generation.advance();
        self.fetches.cancel_all();
        self.state = PlaybackState::Idle {
            notice: IdleNotice::None,
        };
    }
}
