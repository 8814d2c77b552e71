//! User data stream: listen-key lifecycle and private event decoding.
//!
//! A listen key is created with `POST /api/v3/userDataStream`, renewed with
//! `PUT` on the configured interval and deleted on disconnect. The socket at
//! `/ws/<listenKey>` pushes `executionReport` and `outboundAccountPosition`
//! events without any subscribe call.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use tracing::{info, warn};

use super::convert;
use super::dto::{ListenKey, UserEvent};
use crate::adapter::outbound::shared::stream::StreamProtocol;
use crate::adapter::outbound::shared::{KeepAlive, RestClient, RestRequest, SessionSlot, SymbolMap};
use crate::domain::VenueId;
use crate::error::VenueError;
use crate::port::stream::StreamPayload;
use crate::port::{Channel, StreamEvent, Subscription, Topic};

const PATH: &str = "/api/v3/userDataStream";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

type SharedKey = Arc<RwLock<Option<String>>>;

pub struct UserProtocol {
    base_url: String,
    listen_key: SharedKey,
    symbols: SymbolMap,
}

impl StreamProtocol for UserProtocol {
    fn url(&self) -> String {
        let key = self.listen_key.read().clone().unwrap_or_default();
        format!("{}/ws/{key}", self.base_url)
    }

    fn subscribe_messages(&mut self, _topics: &[Topic]) -> Result<Vec<String>, VenueError> {
        Ok(Vec::new())
    }

    fn unsubscribe_messages(&mut self, _topics: &[Topic]) -> Result<Vec<String>, VenueError> {
        Ok(Vec::new())
    }

    fn decode(&mut self, frame: &str) -> Result<Vec<(Topic, StreamEvent)>, VenueError> {
        match serde_json::from_str::<UserEvent>(frame)? {
            UserEvent::Execution(report) => {
                let order = convert::execution_report(&report, &self.symbols)?;
                Ok(vec![(Topic::account(Channel::Orders), StreamEvent::Order(order))])
            }
            UserEvent::AccountPosition(position) => Ok(convert::account_position(&position)?
                .into_iter()
                .map(|b| (Topic::account(Channel::Balances), StreamEvent::Balance(b)))
                .collect()),
            UserEvent::Other => Ok(Vec::new()),
        }
    }
}

pub struct UserStream {
    rest: Arc<RestClient>,
    api_key: String,
    ws_url: String,
    symbols: SymbolMap,
    interval: Duration,
    listen_key: SharedKey,
    keepalive: Mutex<Option<KeepAlive>>,
    session: SessionSlot,
}

impl UserStream {
    #[must_use]
    pub fn new(
        rest: Arc<RestClient>,
        api_key: String,
        ws_url: String,
        symbols: SymbolMap,
        interval: Duration,
        session: SessionSlot,
    ) -> Self {
        Self {
            rest,
            api_key,
            ws_url,
            symbols,
            interval,
            listen_key: Arc::new(RwLock::new(None)),
            keepalive: Mutex::new(None),
            session,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.listen_key.read().is_some()
    }

    /// Create a listen key and start renewing it.
    pub async fn start(&self) -> Result<(), VenueError> {
        let key = create_key(&self.rest, &self.api_key).await?;
        *self.listen_key.write() = Some(key);
        info!(venue = %VenueId::Binance, "User data stream started");

        let rest = Arc::clone(&self.rest);
        let api_key = self.api_key.clone();
        let shared = Arc::clone(&self.listen_key);
        let keepalive = KeepAlive::spawn(VenueId::Binance, "listen_key", self.interval, move || {
            let rest = Arc::clone(&rest);
            let api_key = api_key.clone();
            let shared = Arc::clone(&shared);
            async move {
                let Some(key) = shared.read().clone() else {
                    return Ok(());
                };
                match renew_key(&rest, &api_key, &key).await {
                    Ok(()) => Ok(()),
                    // An expired key cannot be renewed; issue a fresh one so
                    // the next reconnect uses it.
                    Err(VenueError::Rejected { .. }) => {
                        let fresh = create_key(&rest, &api_key).await?;
                        *shared.write() = Some(fresh);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        });
        *self.keepalive.lock() = Some(keepalive);
        Ok(())
    }

    /// Stop renewal, close the socket and delete the key.
    pub async fn stop(&self) {
        if let Some(keepalive) = self.keepalive.lock().take() {
            keepalive.stop();
        }
        self.session.shutdown().await;
        let key = self.listen_key.write().take();
        if let Some(key) = key {
            if let Err(err) = delete_key(&self.rest, &self.api_key, &key).await {
                warn!(venue = %VenueId::Binance, error = %err, "Failed to delete listen key");
            }
        }
    }

    pub fn subscribe<T: StreamPayload>(&self, channel: Channel) -> Result<Subscription<T>, VenueError> {
        if !self.is_active() {
            return Err(VenueError::NotConnected);
        }
        self.session.subscribe(Topic::account(channel), || UserProtocol {
            base_url: self.ws_url.clone(),
            listen_key: Arc::clone(&self.listen_key),
            symbols: self.symbols.clone(),
        })
    }

    pub fn unsubscribe(&self, channel: Channel) {
        self.session.unsubscribe(Topic::account(channel));
    }
}

async fn create_key(rest: &RestClient, api_key: &str) -> Result<String, VenueError> {
    let response: ListenKey = rest
        .send("create_listen_key", || {
            Ok(RestRequest::post(PATH).header(API_KEY_HEADER, api_key))
        })
        .await?;
    Ok(response.listen_key)
}

async fn renew_key(rest: &RestClient, api_key: &str, key: &str) -> Result<(), VenueError> {
    let _: serde_json::Value = rest
        .send("renew_listen_key", || {
            Ok(RestRequest::new(Method::PUT, PATH)
                .query(format!("listenKey={key}"))
                .header(API_KEY_HEADER, api_key))
        })
        .await?;
    Ok(())
}

async fn delete_key(rest: &RestClient, api_key: &str, key: &str) -> Result<(), VenueError> {
    let _: serde_json::Value = rest
        .send("delete_listen_key", || {
            Ok(RestRequest::delete(PATH)
                .query(format!("listenKey={key}"))
                .header(API_KEY_HEADER, api_key))
        })
        .await?;
    Ok(())
}
