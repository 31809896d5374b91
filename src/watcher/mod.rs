use crossbeam_channel::Receiver;
use std::time::Duration;

use crate::errors::ElectionError;
use crate::store::{CoordinationStore, Revision, WatchEventType, WatchStream};

/// The election key was observed absent.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Display)]
#[display(fmt = "Key {} vacant at revision {}", key, revision)]
pub struct VacancyEvent {
    pub key: String,
    pub revision: Revision,
}

#[derive(Clone, Debug, Eq, PartialEq, Display)]
pub enum VacancyOutcome {
    Vacant(VacancyEvent),
    Shutdown,
}

enum WatchOutcome {
    Deleted(VacancyEvent),
    Shutdown,
    Terminated,
    Silent,
}

/// Blocks a follower until the election key is deleted.
#[derive(Clone, Debug)]
pub struct VacancyWatcher<S: CoordinationStore> {
    store: S,
    key: String,
    recheck_interval: Duration,
}

impl<S: CoordinationStore> VacancyWatcher<S> {
    /// `recheck_interval` bounds how long a silent watch is trusted before the key is re-read.
    pub fn new(store: S, key: String, recheck_interval: Duration) -> VacancyWatcher<S> {
        VacancyWatcher {
            store,
            key,
            recheck_interval,
        }
    }

    /// Returns once the key is absent or shutdown was requested. Store failures are returned
    /// to the caller; a terminated watch is re-established here.
    pub fn wait_for_vacancy(&self, shutdown_rx: &Receiver<()>) -> Result<VacancyOutcome, ElectionError> {
        loop {
            let read = self.store.get(&self.key)?;
            let current = match read.kv {
                None => {
                    debug!("Key {} already vacant at revision {}", self.key, read.revision);
                    return Ok(VacancyOutcome::Vacant(VacancyEvent {
                        key: self.key.clone(),
                        revision: read.revision,
                    }));
                }
                Some(kv) => kv,
            };

            debug!("Waiting for vacancy, current holder: {}", current);

            // Events after the read cannot be missed: the watch replays from the next revision.
            let stream = self.store.watch(&self.key, read.revision + 1)?;
            match self.await_delete(&stream, shutdown_rx) {
                WatchOutcome::Deleted(event) => return Ok(VacancyOutcome::Vacant(event)),
                WatchOutcome::Shutdown => {
                    stream.cancel();
                    return Ok(VacancyOutcome::Shutdown);
                }
                WatchOutcome::Terminated => {
                    warn!("Watch on {} terminated, re-checking the key", self.key);
                }
                WatchOutcome::Silent => {
                    debug!(
                        "No events on {} for {:?}, re-checking the key",
                        self.key, self.recheck_interval
                    );
                }
            }
        }
    }

    fn await_delete(&self, stream: &WatchStream, shutdown_rx: &Receiver<()>) -> WatchOutcome {
        // One deadline per watch: unrelated events must not postpone the re-read.
        let recheck = crossbeam_channel::after(self.recheck_interval);
        loop {
            select!(
                recv(shutdown_rx) -> _ => return WatchOutcome::Shutdown,
                recv(stream.events_rx()) -> event_result => {
                    let event = match event_result {
                        Ok(event) => event,
                        Err(_) => return WatchOutcome::Terminated,
                    };
                    if event.event_type == WatchEventType::Delete && event.key == self.key {
                        info!("Key {} deleted at revision {}", event.key, event.revision);
                        return WatchOutcome::Deleted(VacancyEvent {
                            key: event.key,
                            revision: event.revision,
                        });
                    }
                    trace!("Ignoring watch event: {}", event);
                },
                recv(recheck) -> _ => return WatchOutcome::Silent,
            );
        }
    }
}
