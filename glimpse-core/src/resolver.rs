//! Search for the next subject that has something to show.
//!
//! Starting after the current subject, subjects are tried in subscription
//! order, wrapping around, for at most one full pass.  A subject counts as
//! having content only if its lookup succeeds with a non-empty list; empty
//! lists, missing subjects and network failures are all skipped alike.  If
//! the pass turns up nothing, the search falls back to the first subject.

use std::sync::Arc;

use crate::{error::Error, model::MediaItem};

/// Index displayed when no subject has any content.
pub const FALLBACK_INDEX: usize = 0;

#[derive(Debug)]
pub enum Resolution {
    Found {
        index: usize,
        items: Arc<Vec<MediaItem>>,
        attempts: usize,
    },
    /// One full pass without content.  `fallback` is always `FALLBACK_INDEX`.
    Exhausted { fallback: usize, attempts: usize },
    /// A lookup had no credential to work with, the search stopped there.
    Unauthorized { attempts: usize },
    /// The caller moved on while we were searching.
    Cancelled { attempts: usize },
    NoSubjects,
}

impl Resolution {
    pub fn attempts(&self) -> usize {
        match self {
            Self::Found { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Unauthorized { attempts }
            | Self::Cancelled { attempts } => *attempts,
            Self::NoSubjects => 0,
        }
    }
}

/// Find the first subject after `current` (out of `len`) whose lookup yields
/// content.  `is_cancelled` is consulted before every lookup.  Performs at
/// most `len` lookups.
pub fn resolve<P, C>(current: usize, len: usize, mut lookup: P, is_cancelled: C) -> Resolution
where
    P: FnMut(usize) -> Result<Arc<Vec<MediaItem>>, Error>,
    C: Fn() -> bool,
{
    if len == 0 {
        return Resolution::NoSubjects;
    }
    let mut index = current % len;
    let mut attempts = 0;
    while attempts < len {
        if is_cancelled() {
            log::info!("resolving cancelled after {} attempts", attempts);
            return Resolution::Cancelled { attempts };
        }
        let next = (index + 1) % len;
        attempts += 1;
        match lookup(next) {
            Ok(items) if !items.is_empty() => {
                return Resolution::Found {
                    index: next,
                    items,
                    attempts,
                };
            }
            Ok(_) => {
                log::debug!("subject {} has no moments, skipping", next);
            }
            Err(Error::Unauthorized) => {
                log::warn!("not authorized, giving up on resolving");
                return Resolution::Unauthorized { attempts };
            }
            Err(err) if err.is_network() => {
                log::warn!("skipping subject {}, failed to load: {}", next, err);
            }
            Err(err) => {
                log::info!("skipping subject {}: {}", next, err);
            }
        }
        index = next;
    }
    log::info!("no moments anywhere after {} attempts", attempts);
    Resolution::Exhausted {
        fallback: FALLBACK_INDEX,
        attempts,
    }
}
