use serde::{de::DeserializeOwned, Deserialize};
use ureq::{http::Response, Agent, Body};
use url::Url;

use crate::{
    config::Config,
    error::Error,
    model::{MediaItem, NewItem, Subject, SubjectId},
    session::SessionService,
    util::default_ureq_agent_builder,
};

use super::{multipart::Multipart, ContentService};

const IMAGE_FIELD: &str = "momentImage";
const CAPTION_FIELD: &str = "caption";

/// Blocking HTTP client for the moments service.
pub struct WebApi {
    session: SessionService,
    agent: Agent,
    base: Url,
}

impl WebApi {
    pub fn new(session: SessionService, config: &Config) -> Result<Self, Error> {
        let base = config.base_url()?;
        if base.cannot_be_a_base() {
            return Err(Error::ConfigError(format!("{} cannot be a base URL", base)));
        }
        Ok(Self {
            session,
            agent: default_ureq_agent_builder(config.fetch_timeout())
                .build()
                .into(),
            base,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: &Url) -> Result<Response<Body>, Error> {
        // Fail before any I/O if there is no credential.
        let token = self.session.bearer()?;
        log::debug!("GET {}", url);
        Ok(self
            .agent
            .get(url.as_str())
            .header("Authorization", &token)
            .call()?)
    }

    /// Send a GET request and return the deserialized JSON body.
    fn load<T: DeserializeOwned>(&self, url: &Url) -> Result<T, Error> {
        let mut response = self.get(url)?;
        response
            .body_mut()
            .read_json()
            .map_err(|err| Error::JsonError(Box::new(err)))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubjectList {
    Bare(Vec<Subject>),
    Following { following: Vec<Subject> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedItem {
    Bare(MediaItem),
    Moment { moment: MediaItem },
}

impl ContentService for WebApi {
    fn subjects(&self) -> Result<Vec<Subject>, Error> {
        let list: SubjectList = self.load(&self.endpoint(&["subjects"]))?;
        Ok(match list {
            SubjectList::Bare(subjects) | SubjectList::Following { following: subjects } => {
                subjects
            }
        })
    }

    fn items(&self, subject: &SubjectId) -> Result<Vec<MediaItem>, Error> {
        let url = self.endpoint(&["subjects", subject.as_str(), "items"]);
        self.load(&url).map_err(|err| match err {
            Error::NotFound(_) => Error::NotFound(format!("subject {}", subject)),
            other => other,
        })
    }

    fn create_item(&self, item: &NewItem) -> Result<MediaItem, Error> {
        let token = self.session.bearer()?;
        let url = self.endpoint(&["items"]);
        let form = Multipart::new()
            .file(IMAGE_FIELD, &item.file_name, &item.mime_type, &item.bytes)
            .text(CAPTION_FIELD, &item.caption);
        let content_type = form.content_type();
        let body = form.finish();

        log::debug!("POST {} ({} bytes)", url, body.len());
        let mut response = self
            .agent
            .post(url.as_str())
            .header("Authorization", &token)
            .header("Content-Type", &content_type)
            .send(&body[..])?;
        let created: CreatedItem = response
            .body_mut()
            .read_json()
            .map_err(|err| Error::JsonError(Box::new(err)))?;
        Ok(match created {
            CreatedItem::Bare(item) | CreatedItem::Moment { moment: item } => item,
        })
    }

    fn me(&self) -> Result<Subject, Error> {
        self.load(&self.endpoint(&["me"]))
    }
}
