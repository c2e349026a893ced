//! Reactive configuration stream.
//!
//! Each connection-relevant input (database name, host, port, headers) lives
//! in its own observable cell; [`ConfigCells::combine`] joins them with the
//! cache's id-set into a single [`WatcherConfig`] tuple, re-emitted whenever
//! any input changes. Emission is filtered against the previously emitted
//! tuple, so an input mutation that leaves the effective tuple unchanged
//! causes no downstream reconnect.

use std::collections::HashMap;

use tokio::sync::watch;

/// Header name/value pairs attached to every outgoing request.
pub type Headers = HashMap<String, String>;

/// The combined parameters that drive the change-feed subscription and all
/// request URL construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Ordered set of all ids currently present in the cache.
    pub ids: Vec<String>,
    pub database: String,
    pub host: String,
    pub headers: Headers,
    pub port: u16,
}

/// Observable cells for each configuration input.
#[derive(Debug)]
pub struct ConfigCells {
    database: watch::Sender<String>,
    host: watch::Sender<String>,
    port: watch::Sender<u16>,
    headers: watch::Sender<Headers>,
}

impl ConfigCells {
    pub fn new(host: impl Into<String>, database: impl Into<String>, headers: Headers, port: u16) -> Self {
        Self {
            database: watch::channel(database.into()).0,
            host: watch::channel(host.into()).0,
            port: watch::channel(port).0,
            headers: watch::channel(headers).0,
        }
    }

    pub fn set_database(&self, database: impl Into<String>) {
        Self::replace(&self.database, database.into());
    }

    pub fn set_host(&self, host: impl Into<String>) {
        Self::replace(&self.host, host.into());
    }

    pub fn set_port(&self, port: u16) {
        Self::replace(&self.port, port);
    }

    pub fn set_headers(&self, headers: Headers) {
        Self::replace(&self.headers, headers);
    }

    fn replace<T: PartialEq>(cell: &watch::Sender<T>, value: T) {
        cell.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Join the four cells with the cache's id-set into one live tuple.
    ///
    /// Spawns the combining loop on the current runtime. The returned
    /// receiver always holds the latest emitted tuple; the loop ends once
    /// any input's sender side is gone or every receiver of the output has
    /// been dropped.
    pub fn combine(&self, ids: watch::Receiver<Vec<String>>) -> watch::Receiver<WatcherConfig> {
        let mut ids = ids;
        let mut database = self.database.subscribe();
        let mut host = self.host.subscribe();
        let mut port = self.port.subscribe();
        let mut headers = self.headers.subscribe();

        let initial = WatcherConfig {
            ids: ids.borrow().clone(),
            database: database.borrow().clone(),
            host: host.borrow().clone(),
            headers: headers.borrow().clone(),
            port: *port.borrow(),
        };
        let (tx, rx) = watch::channel(initial.clone());

        tokio::spawn(async move {
            let mut last = initial;
            loop {
                tokio::select! {
                    changed = ids.changed() => if changed.is_err() { break },
                    changed = database.changed() => if changed.is_err() { break },
                    changed = host.changed() => if changed.is_err() { break },
                    changed = headers.changed() => if changed.is_err() { break },
                    changed = port.changed() => if changed.is_err() { break },
                }

                let next = WatcherConfig {
                    ids: ids.borrow_and_update().clone(),
                    database: database.borrow_and_update().clone(),
                    host: host.borrow_and_update().clone(),
                    headers: headers.borrow_and_update().clone(),
                    port: *port.borrow_and_update(),
                };

                if next != last {
                    last = next.clone();
                    if tx.send(next).is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("configuration stream closed");
        });

        rx
    }
}
