use glimpse_core::{
    actor::Actor,
    config::Config,
    error::Error,
    model::Subject,
    playback::{IdleNotice, PlaybackCommand, PlaybackEvent, PlaybackUpdate, Scheduler},
    session::SessionService,
    store::{ContentStore, ContentStoreHandle},
    upload::UploadSession,
    webapi::{ContentService, ContentServiceHandle, WebApi},
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::{io, io::BufRead, path::Path, process, sync::Arc, thread};

fn main() {
    env_logger::init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            log::error!("failed to load config: {}", err);
            process::exit(1);
        }
    };
    if let Err(err) = start(config) {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn start(config: Config) -> Result<(), Error> {
    let session = match &config.token {
        Some(token) => SessionService::with_token(token),
        None => {
            log::warn!("no token configured, set GLIMPSE_TOKEN to sign in");
            SessionService::empty()
        }
    };
    let service: ContentServiceHandle = Arc::new(WebApi::new(session.clone(), &config)?);
    let store = ContentStore::new();

    let upload = match service.me() {
        Ok(me) => Some(UploadSession::new(me)),
        Err(err) => {
            log::warn!("failed to load own profile, uploads disabled: {}", err);
            None
        }
    };

    let (update_send, update_recv) = unbounded();
    let scheduler = Scheduler::spawn_default({
        let playback = config.playback();
        let session = session.clone();
        let service = service.clone();
        let store = store.clone();
        move |sender| {
            Scheduler::new(playback, session, service, store, sender).with_observer(update_send)
        }
    });

    let printer = thread::spawn(move || print_updates(&config, update_recv));

    let sender = scheduler.sender();
    command(&sender, PlaybackCommand::Start);
    read_commands(&sender, &session, &service, &store, upload);

    command(&sender, PlaybackCommand::Shutdown);
    drop(sender);
    scheduler.join();
    let _ = printer.join();
    store.clear();

    Ok(())
}

fn command(sender: &Sender<PlaybackEvent>, cmd: PlaybackCommand) {
    if sender.send(PlaybackEvent::Command(cmd)).is_err() {
        log::error!("playback has stopped");
    }
}

fn read_commands(
    sender: &Sender<PlaybackEvent>,
    session: &SessionService,
    service: &ContentServiceHandle,
    store: &ContentStoreHandle,
    mut upload: Option<UploadSession>,
) {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::error!("failed to read input: {}", err);
                break;
            }
        };
        let line = line.trim();
        match line {
            "q" => break,
            "s" => command(sender, PlaybackCommand::Stop),
            "r" => command(sender, PlaybackCommand::Start),
            "l" => list_subjects(store),
            _ if line.starts_with("u ") => {
                let Some(upload) = upload.as_mut() else {
                    log::warn!("uploads are disabled");
                    continue;
                };
                command(sender, PlaybackCommand::Stop);
                let mut args = line[2..].trim().splitn(2, char::is_whitespace);
                let path = args.next().unwrap_or_default();
                let caption = args.next().unwrap_or_default().trim();
                match submit(upload, &**service, store, session, Path::new(path), caption) {
                    Ok(()) => command(
                        sender,
                        PlaybackCommand::ItemAdded {
                            subject: upload.author().id.clone(),
                        },
                    ),
                    Err(err) => println!("upload failed: {}", err),
                }
            }
            _ => match line.parse::<usize>().ok().and_then(|n| store.subject(n)) {
                Some(subject) => command(sender, PlaybackCommand::Select { subject: subject.id }),
                None => log::warn!("unknown command"),
            },
        }
    }
}

fn submit(
    upload: &mut UploadSession,
    service: &dyn ContentService,
    store: &ContentStore,
    session: &SessionService,
    path: &Path,
    caption: &str,
) -> Result<(), Error> {
    upload.select_path(path)?;
    if let Some(file) = upload.preview() {
        println!("selected {} ({})", file.name, file.mime_type);
    }
    upload.set_caption(caption);
    let item = upload.submit(service, store, session)?;
    println!("shared moment {}", item.id);
    Ok(())
}

fn list_subjects(store: &ContentStore) {
    for (index, subject) in store.subjects().iter().enumerate() {
        println!("{:>3}  {}", index, subject.display_name);
    }
}

fn print_updates(config: &Config, updates: Receiver<PlaybackUpdate>) {
    for update in updates {
        match update {
            PlaybackUpdate::Idle { notice } => match notice {
                IdleNotice::None => println!("stopped"),
                IdleNotice::AwaitingSubjects => println!("loading subscriptions..."),
                IdleNotice::NoSubjects => println!("you are not following anyone yet"),
                IdleNotice::LoadFailed(reason) => println!("failed to load moments: {}", reason),
                IdleNotice::Unauthorized => println!("not signed in"),
            },
            PlaybackUpdate::Loading { subject } => {
                println!("{}: loading...", subject.display_name);
            }
            PlaybackUpdate::Playing {
                subject,
                index,
                count,
                item,
            } => {
                let image = config
                    .media_url(&item.image_url)
                    .map(|url| url.to_string())
                    .unwrap_or_else(|_| item.image_url.to_string());
                println!(
                    "{} [{}/{}] {} {}",
                    header(&subject),
                    index + 1,
                    count,
                    image,
                    item.caption
                );
            }
            PlaybackUpdate::Resolving { from } => {
                log::debug!("looking for moments after {}", from.display_name);
            }
            PlaybackUpdate::Empty { subject } => {
                println!("{}: no moments to show", header(&subject));
            }
            PlaybackUpdate::Unauthorized => println!("not signed in, request aborted"),
        }
    }
}

fn header(subject: &Subject) -> String {
    match subject.avatar() {
        Some(avatar) => format!("{} ({})", subject.display_name, avatar),
        None => subject.display_name.to_string(),
    }
}
