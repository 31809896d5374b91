use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, EventType, LeaseKeepAliveStream, LeaseKeeper,
    PutOptions, Txn, TxnOp, WatchOptions,
};
use lease_election::{
    CoordinationStore, ElectionError, ErrorKind, KeyValue, LeaseGrant, LeaseId, ReadResult,
    Revision, WatchEvent, WatchEventType, WatchStream,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

/// etcd v3 adapter. Requests run on a private tokio runtime so the election threads
/// can stay blocking.
#[derive(Clone)]
pub struct EtcdStore {
    endpoints: Vec<String>,
    client: Client,
    runtime: Arc<Runtime>,
    keepers: Arc<KeepAliveChannels<(LeaseKeeper, LeaseKeepAliveStream)>>,
}

/// Open keep-alive channels, one per lease. A channel is checked out for the duration of
/// a renewal and returned only if the renewal succeeded.
struct KeepAliveChannels<C> {
    channels: Mutex<HashMap<LeaseId, C>>,
}

impl<C> KeepAliveChannels<C> {
    fn new() -> KeepAliveChannels<C> {
        KeepAliveChannels {
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn take(&self, lease_id: LeaseId) -> Option<C> {
        self.channels.lock().remove(&lease_id)
    }

    fn restore(&self, lease_id: LeaseId, channel: C) {
        self.channels.lock().insert(lease_id, channel);
    }

    fn forget(&self, lease_id: LeaseId) -> bool {
        self.channels.lock().remove(&lease_id).is_some()
    }

    fn len(&self) -> usize {
        self.channels.lock().len()
    }
}

impl EtcdStore {
    /// Connects to the cluster. `request_timeout` bounds every request, including connection.
    pub fn connect(endpoints: Vec<String>, request_timeout: Duration) -> Result<EtcdStore, ElectionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("etcd-store")
            .enable_all()
            .build()
            .map_err(|err| {
                ElectionError::new(
                    ErrorKind::StoreUnavailable,
                    "Cannot start etcd runtime".to_string(),
                    err.to_string(),
                )
            })?;

        let options = ConnectOptions::new()
            .with_connect_timeout(request_timeout)
            .with_timeout(request_timeout);
        let client = runtime
            .block_on(Client::connect(endpoints.clone(), Some(options)))
            .map_err(|err| unavailable(format!("Cannot connect to {:?}", endpoints), err))?;

        info!("Connected to etcd at {:?}", endpoints);

        Ok(EtcdStore {
            endpoints,
            client,
            runtime: Arc::new(runtime),
            keepers: Arc::new(KeepAliveChannels::new()),
        })
    }
}

impl CoordinationStore for EtcdStore {
    fn grant_lease(&self, ttl: Duration) -> Result<LeaseGrant, ElectionError> {
        let mut client = self.client.clone();
        let ttl_secs = ttl_to_secs(ttl);

        let response = self
            .runtime
            .block_on(client.lease_grant(ttl_secs, None))
            .map_err(|err| unavailable("Cannot grant lease".to_string(), err))?;

        Ok(LeaseGrant {
            id: response.id(),
            ttl: secs_to_ttl(response.ttl()),
        })
    }

    fn keep_alive(&self, lease_id: LeaseId) -> Result<Duration, ElectionError> {
        let mut client = self.client.clone();
        let channel = self.keepers.take(lease_id);

        let (ttl_secs, channel) = self
            .runtime
            .block_on(async move {
                let (mut keeper, mut stream) = match channel {
                    Some(channel) => channel,
                    None => {
                        debug!("Opening keep-alive stream for lease {:x}", lease_id);
                        client.lease_keep_alive(lease_id).await?
                    }
                };
                keeper.keep_alive().await?;

                let ttl_secs = match stream.message().await? {
                    Some(response) => response.ttl(),
                    None => 0,
                };
                Ok::<_, etcd_client::Error>((ttl_secs, (keeper, stream)))
            })
            .map_err(|err| unavailable(format!("Cannot keep lease {:x} alive", lease_id), err))?;

        // A failed or closed stream is dropped here and reopened by the next renewal.
        if ttl_secs > 0 {
            self.keepers.restore(lease_id, channel);
        }

        Ok(secs_to_ttl(ttl_secs))
    }

    fn revoke_lease(&self, lease_id: LeaseId) -> Result<(), ElectionError> {
        let mut client = self.client.clone();
        if self.keepers.forget(lease_id) {
            trace!("Closed keep-alive stream for lease {:x}", lease_id);
        }

        match self.runtime.block_on(client.lease_revoke(lease_id)) {
            Ok(_) => Ok(()),
            Err(etcd_client::Error::GRpcStatus(status)) if status.message().contains("not found") => {
                debug!("Lease {:x} was already gone", lease_id);
                Ok(())
            }
            Err(err) => Err(unavailable(format!("Cannot revoke lease {:x}", lease_id), err)),
        }
    }

    fn put_if_absent(&self, key: &str, value: &str, lease_id: LeaseId) -> Result<bool, ElectionError> {
        let mut client = self.client.clone();

        let txn = Txn::new()
            .when(vec![Compare::version(key, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(
                key,
                value,
                Some(PutOptions::new().with_lease(lease_id)),
            )]);

        let response = self
            .runtime
            .block_on(client.txn(txn))
            .map_err(|err| unavailable(format!("Cannot claim {}", key), err))?;

        Ok(response.succeeded())
    }

    fn get(&self, key: &str) -> Result<ReadResult, ElectionError> {
        let mut client = self.client.clone();

        let response = self
            .runtime
            .block_on(client.get(key, None))
            .map_err(|err| unavailable(format!("Cannot read {}", key), err))?;

        let revision = response.header().map(|header| header.revision()).unwrap_or(0);
        let kv = match response.kvs().first() {
            Some(kv) => Some(KeyValue {
                key: kv.key_str().map_err(|err| unavailable("Invalid key".to_string(), err))?.to_string(),
                value: kv.value_str().map_err(|err| unavailable("Invalid value".to_string(), err))?.to_string(),
                lease: kv.lease(),
                version: kv.version(),
                mod_revision: kv.mod_revision(),
            }),
            None => None,
        };

        Ok(ReadResult { kv, revision })
    }

    fn watch(&self, key: &str, start_revision: Revision) -> Result<WatchStream, ElectionError> {
        let mut client = self.client.clone();

        let options = WatchOptions::new().with_start_revision(start_revision);
        let (mut watcher, mut stream) = self
            .runtime
            .block_on(client.watch(key, Some(options)))
            .map_err(|err| unavailable(format!("Cannot watch {}", key), err))?;

        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let watched_key = key.to_string();

        self.runtime.spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = &mut cancel_rx => None,
                    message = stream.message() => Some(message),
                };

                let response = match message {
                    None => {
                        if let Err(err) = watcher.cancel().await {
                            debug!("Cannot cancel watch on {}: {}", watched_key, err);
                        }
                        break;
                    }
                    Some(Ok(Some(response))) => response,
                    Some(Ok(None)) => {
                        debug!("Watch on {} closed by the server", watched_key);
                        break;
                    }
                    Some(Err(err)) => {
                        warn!("Watch on {} failed: {}", watched_key, err);
                        break;
                    }
                };

                if response.canceled() {
                    debug!("Watch on {} cancelled by the server", watched_key);
                    break;
                }

                let mut observer_gone = false;
                for event in response.events() {
                    let kv = match event.kv() {
                        Some(kv) => kv,
                        None => continue,
                    };
                    let event_type = match event.event_type() {
                        EventType::Put => WatchEventType::Put,
                        EventType::Delete => WatchEventType::Delete,
                    };

                    let watch_event = WatchEvent {
                        event_type,
                        key: watched_key.clone(),
                        value: kv.value_str().unwrap_or_default().to_string(),
                        revision: kv.mod_revision(),
                    };
                    if events_tx.send(watch_event).is_err() {
                        observer_gone = true;
                        break;
                    }
                }

                if observer_gone {
                    let _ = watcher.cancel().await;
                    break;
                }
            }
        });

        Ok(WatchStream::new(events_rx, move || {
            let _ = cancel_tx.send(());
        }))
    }
}

impl fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EtcdStore")
            .field("endpoints", &self.endpoints)
            .field("keep_alive_streams", &self.keepers.len())
            .finish()
    }
}

fn unavailable(text: String, err: etcd_client::Error) -> ElectionError {
    ElectionError::new(ErrorKind::StoreUnavailable, text, err.to_string())
}

/// etcd TTLs are whole seconds; round up, minimum one.
fn ttl_to_secs(ttl: Duration) -> i64 {
    let millis = ttl.as_millis();

    (((millis + 999) / 1000).max(1)) as i64
}

fn secs_to_ttl(ttl_secs: i64) -> Duration {
    if ttl_secs <= 0 {
        Duration::from_secs(0)
    } else {
        Duration::from_secs(ttl_secs as u64)
    }
}
