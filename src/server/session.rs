//! Per-request PREP session: configure, send, trigger.
//!
//! `send` is the response-streaming state machine. On success it takes over
//! the response: a spawned pump task writes the representation part and the
//! digest prologue, then stays parked on the subscription's event channel,
//! framing live notifications into the open digest until the connection
//! closes, the duration elapses, or a terminal event arrives. Exactly one of
//! those paths runs, and each ends with the one-shot unsubscribe.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use super::config::PrepConfig;
use super::event_id::EventIdStore;
use super::middleware::PrepState;
use super::subscriptions::{GenerateNotification, Subscription, SubscriptionHandle, SubscriptionIndex};
use crate::protocol::constants::{
    headers, BOUNDARY_LEN, ELIGIBLE_STATUSES, PROTOCOL_NAME, QUIRK_PAD_LINES,
};
use crate::protocol::negotiate;
use crate::protocol::template::{self, Rfc822Fields};
use crate::protocol::fields;
use crate::types::events::EventsHeader;
use crate::types::fields::{params_get, params_remove, FieldParams, FieldValue};
use crate::types::profile::EventProfile;

/// Representation body handed to [`PrepSession::send`].
pub enum SendBody {
    /// In-memory body.
    Full(Bytes),
    /// Streamed body. Its end does not terminate the response; the digest
    /// prologue follows.
    Stream(BoxStream<'static, Result<Bytes, std::io::Error>>),
}

impl From<Bytes> for SendBody {
    fn from(bytes: Bytes) -> Self {
        SendBody::Full(bytes)
    }
}

impl From<String> for SendBody {
    fn from(body: String) -> Self {
        SendBody::Full(Bytes::from(body))
    }
}

impl From<&'static str> for SendBody {
    fn from(body: &'static str) -> Self {
        SendBody::Full(Bytes::from_static(body.as_bytes()))
    }
}

/// Application hooks consulted during `send`.
#[derive(Default)]
pub struct Modifiers {
    /// Inspect or replace the negotiated profile before it is cleaned into
    /// the subscription key. Returning `None` forces a 406. The profile's
    /// items still carry the request's extra parameter alternatives here.
    pub negotiate_events: Option<Box<dyn FnOnce(EventProfile) -> Option<EventProfile> + Send>>,

    /// Contribute additional entries to the `Events` response dictionary.
    pub modify_events_header: Option<Box<dyn FnOnce(&EventProfile) -> FieldParams + Send>>,
}

/// Arguments to [`PrepSession::send`].
pub struct SendArgs {
    /// Response status the handler would otherwise answer with.
    pub status: u16,
    /// Headers of the representation part.
    pub headers: Vec<(String, String)>,
    /// Representation body, if any.
    pub body: Option<SendBody>,
    /// Request-side PREP parameters. Defaults to the params of the `prep`
    /// item in the parsed `Accept-Events` request header.
    pub params: Option<FieldParams>,
    pub modifiers: Modifiers,
}

impl Default for SendArgs {
    fn default() -> Self {
        SendArgs {
            status: 200,
            headers: Vec::new(),
            body: None,
            params: None,
            modifiers: Modifiers::default(),
        }
    }
}

/// Result of [`PrepSession::send`].
pub enum SendOutcome {
    /// The middleware took over the response; return it as-is.
    Stream(Response),
    /// Streaming was declined. The dictionary carries the PREP status; the
    /// caller serializes it into an `Events` header on its own response.
    Declined(EventsHeader),
}

impl SendOutcome {
    /// The declined dictionary, if streaming was declined.
    #[must_use]
    pub fn declined(&self) -> Option<&EventsHeader> {
        match self {
            SendOutcome::Declined(events) => Some(events),
            SendOutcome::Stream(_) => None,
        }
    }
}

/// Arguments to [`PrepSession::trigger`].
#[derive(Default)]
pub struct TriggerArgs {
    /// Path to notify. Defaults to the request path.
    pub path: Option<String>,
    /// Per-profile notification generator. Defaults to the default
    /// notification.
    pub generate_notification: Option<GenerateNotification>,
    /// Whether this is the terminal event for the path. Defaults to true for
    /// a `DELETE` of the request path.
    pub last_event: Option<bool>,
}

/// Overrides for [`PrepSession::default_notification`].
#[derive(Debug, Clone, Default)]
pub struct NotificationArgs {
    pub date: Option<String>,
    pub method: Option<String>,
    pub etag: Option<String>,
    pub event_id: Option<String>,
    pub location: Option<String>,
    pub delta: Option<String>,
}

#[derive(Default)]
struct SessionInner {
    /// Offer params parsed by `configure`.
    offer: Option<FieldParams>,
    /// Full `Accept-Events` item value staged for the response.
    offer_value: Option<String>,
    /// Event id assigned during this request via `set_event_id`.
    event_id: Option<String>,
}

/// Per-request handle to the PREP middleware, extracted by handlers as
/// `Extension<Arc<PrepSession>>`.
pub struct PrepSession {
    state: PrepState,
    config: PrepConfig,
    subscriptions: Arc<SubscriptionIndex>,
    event_ids: Arc<EventIdStore>,
    inner: Mutex<SessionInner>,
}

impl PrepSession {
    pub(crate) fn new(
        state: PrepState,
        config: PrepConfig,
        subscriptions: Arc<SubscriptionIndex>,
        event_ids: Arc<EventIdStore>,
    ) -> Self {
        PrepSession {
            state,
            config,
            subscriptions,
            event_ids,
            inner: Mutex::new(SessionInner::default()),
        }
    }

    /// The request state this session was built from.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &PrepState {
        &self.state
    }

    /// Declare the PREP offer for this resource.
    ///
    /// Builds the `Accept-Events` item `"prep";<config>`, where `<config>`
    /// defaults to the configured `accept=(...)` offer. The layer appends the
    /// item to the outgoing `Accept-Events` header after the handler runs.
    /// An unparsable offer is a server configuration fault and comes back as
    /// a status-500 dictionary.
    pub fn configure(&self, config: Option<&str>) -> Result<(), EventsHeader> {
        let fragment = match config {
            Some(fragment) => fragment.to_string(),
            None => self.config.default_offer(),
        };
        let candidate = format!("\"{PROTOCOL_NAME}\";{fragment}");
        match fields::parse_list(&candidate) {
            Ok(items) if !items.is_empty() => {
                let mut inner = self.inner.lock();
                inner.offer = Some(items[0].params.clone());
                inner.offer_value = Some(candidate);
                Ok(())
            }
            Ok(_) => {
                tracing::error!(offer = %candidate, "Accept-Events offer parsed to nothing");
                Err(EventsHeader::with_status(500))
            }
            Err(e) => {
                tracing::error!(offer = %candidate, error = %e, "invalid Accept-Events offer");
                Err(EventsHeader::with_status(500))
            }
        }
    }

    /// The staged `Accept-Events` value, once `configure` has run.
    #[must_use]
    pub fn accept_events_offer(&self) -> Option<String> {
        self.inner.lock().offer_value.clone()
    }

    /// Negotiate and, on success, take over the response as a live event
    /// stream.
    pub fn send(&self, args: SendArgs) -> SendOutcome {
        if !ELIGIBLE_STATUSES.contains(&args.status) {
            return SendOutcome::Declined(EventsHeader::with_status(412));
        }
        let offer = match self.inner.lock().offer.clone() {
            Some(offer) => offer,
            None => {
                tracing::error!("send without a configured offer");
                return SendOutcome::Declined(EventsHeader::with_status(500));
            }
        };
        if params_get(&offer, "accept").is_none() {
            tracing::error!("configured offer has no accept field");
            return SendOutcome::Declined(EventsHeader::with_status(500));
        }

        // Quality is a request-side concern; it never reaches the profile.
        let mut params = match args.params {
            Some(params) => params,
            None => self.request_prep_params(),
        };
        params_remove(&mut params, "q");

        let negotiated = match negotiate::negotiate_content(&params, &offer) {
            Some(profile) => profile,
            None => return SendOutcome::Declined(EventsHeader::with_status(406)),
        };
        let negotiated = match args.modifiers.negotiate_events {
            Some(hook) => match hook(negotiated) {
                Some(profile) => profile,
                None => return SendOutcome::Declined(EventsHeader::with_status(406)),
            },
            None => negotiated,
        };
        let profile = negotiated.cleanup();

        let requested_duration = params_get(&params, "duration").and_then(FieldValue::as_integer);
        let duration = self.config.clamp_duration(requested_duration);
        let expires_at = Utc::now() + chrono::Duration::seconds(duration as i64);

        let mut events = EventsHeader::with_status(200);
        events.set("expires", FieldValue::String(http_date(&expires_at)));
        if let Some(hook) = args.modifiers.modify_events_header {
            events.merge(hook(&profile));
        }
        let events_value = match events.to_header_value() {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Events dictionary failed to serialize");
                return SendOutcome::Declined(EventsHeader::with_status(500));
            }
        };

        let should_skip_body = args.body.is_some()
            && match self.state.last_event_id.as_deref() {
                Some("*") => true,
                Some(id) => self.event_ids.get(&self.state.path).as_deref() == Some(id),
                None => false,
            };
        let vary = if self.state.last_event_id.is_some() {
            "Accept-Events, Last-Event-ID"
        } else {
            "Accept-Events"
        };

        let mixed_boundary = generate_boundary();
        let digest_boundary = generate_boundary();

        let (body_tx, mut body_rx) = mpsc::channel::<Bytes>(64);
        let (conn_tx, conn_rx) = mpsc::unbounded_channel::<ConnEvent>();

        let notify_tx = conn_tx.clone();
        let handle = self.subscriptions.subscribe(Subscription {
            path: self.state.path.clone(),
            profile: profile.clone(),
            write_notification: Box::new(move |notification, last| {
                // Failure means the pump already shut down; nothing to do.
                let _ = notify_tx.send(ConnEvent::Notification(notification.to_string(), last));
            }),
            write_end: Box::new(move || {
                let _ = conn_tx.send(ConnEvent::End);
            }),
        });
        tracing::info!(
            path = %self.state.path,
            profile = %profile,
            duration,
            "event stream opened"
        );

        let pump = ConnectionPump {
            part_headers: args.headers,
            body: if should_skip_body { None } else { args.body },
            header_block: template::part_header_block(&profile),
            mixed_boundary: mixed_boundary.clone(),
            digest_boundary,
            quirk: self.state.is_quirk_mode,
            duration,
            handle,
            body_tx,
            conn_rx,
        };
        tokio::spawn(pump.run());

        let stream = async_stream::stream! {
            while let Some(chunk) = body_rx.recv().await {
                yield Ok::<_, std::io::Error>(chunk);
            }
        };

        let response = Response::builder()
            .status(StatusCode::from_u16(args.status).unwrap_or(StatusCode::OK))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/mixed; boundary=\"{mixed_boundary}\""),
            )
            .header(header::VARY, vary)
            .header(headers::EVENTS, events_value)
            .header(headers::KEEP_ALIVE, format!("timeout={}", duration + 1))
            .body(Body::from_stream(stream));

        match response {
            Ok(response) => SendOutcome::Stream(response),
            Err(e) => {
                tracing::error!(error = %e, "streaming response failed to build");
                SendOutcome::Declined(EventsHeader::with_status(500))
            }
        }
    }

    /// Notify subscribers of a mutation on `path`.
    ///
    /// Fan-out is deferred to the next scheduler tick so the caller's own
    /// response settles first; this never blocks.
    pub fn trigger(&self, args: TriggerArgs) {
        let path = args.path.unwrap_or_else(|| self.state.path.clone());
        let last_event = args
            .last_event
            .unwrap_or_else(|| path == self.state.path && self.state.method == "DELETE");
        let generate = args
            .generate_notification
            .unwrap_or_else(|| self.default_generator());
        let index = Arc::clone(&self.subscriptions);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            index.notify(&path, &*generate, last_event);
        });
    }

    /// Render the default notification for this request, prefixed with the
    /// blank line that separates a digest boundary from its rfc822 body.
    #[must_use]
    pub fn default_notification(&self, args: NotificationArgs) -> String {
        let body = template::rfc822(&Rfc822Fields {
            method: args.method.unwrap_or_else(|| self.state.method.clone()),
            date: args.date.unwrap_or_else(http_date_now),
            event_id: args.event_id.or_else(|| self.inner.lock().event_id.clone()),
            etag: args.etag,
            location: args.location,
            delta: args.delta,
        });
        format!("\r\n{body}")
    }

    /// Assign a fresh event id to `path` (default: the request path).
    pub fn set_event_id(&self, path: Option<&str>) -> String {
        let path = path.unwrap_or(&self.state.path);
        let id = self.event_ids.set(path);
        if path == self.state.path {
            self.inner.lock().event_id = Some(id.clone());
        }
        id
    }

    /// The last event id stored for `path` (default: the request path).
    #[must_use]
    pub fn last_event_id(&self, path: Option<&str>) -> Option<String> {
        self.event_ids.get(path.unwrap_or(&self.state.path))
    }

    fn default_generator(&self) -> GenerateNotification {
        let method = self.state.method.clone();
        let event_id = self.inner.lock().event_id.clone();
        Arc::new(move |_profile| {
            Some(format!(
                "\r\n{}",
                template::rfc822(&Rfc822Fields {
                    method: method.clone(),
                    date: http_date_now(),
                    event_id: event_id.clone(),
                    ..Default::default()
                })
            ))
        })
    }

    /// Params of the `prep` item in the request's `Accept-Events` header.
    fn request_prep_params(&self) -> FieldParams {
        self.state
            .accept_events
            .as_ref()
            .and_then(|items| items.iter().find(|item| item.value_eq(PROTOCOL_NAME)))
            .map(|item| item.params.clone())
            .unwrap_or_default()
    }
}

enum ConnEvent {
    Notification(String, bool),
    End,
}

/// Owns one streaming connection after `send` has handed it over.
struct ConnectionPump {
    part_headers: Vec<(String, String)>,
    body: Option<SendBody>,
    header_block: String,
    mixed_boundary: String,
    digest_boundary: String,
    quirk: bool,
    duration: u64,
    handle: SubscriptionHandle,
    body_tx: mpsc::Sender<Bytes>,
    conn_rx: mpsc::UnboundedReceiver<ConnEvent>,
}

impl ConnectionPump {
    async fn run(self) {
        let ConnectionPump {
            part_headers,
            body,
            header_block,
            mixed_boundary,
            digest_boundary,
            quirk,
            duration,
            handle,
            body_tx,
            mut conn_rx,
        } = self;

        let connected = write_prologue(
            &body_tx,
            &part_headers,
            body,
            &mixed_boundary,
            &digest_boundary,
        )
        .await;

        if connected {
            let deadline = Instant::now() + Duration::from_secs(duration);
            let timeout = tokio::time::sleep_until(deadline);
            tokio::pin!(timeout);

            loop {
                tokio::select! {
                    event = conn_rx.recv() => match event {
                        Some(ConnEvent::Notification(text, last)) => {
                            let frame =
                                notification_frame(&header_block, &text, &digest_boundary, last, quirk);
                            if body_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Some(ConnEvent::End) => {
                            let closing = format!("\r\n--{mixed_boundary}--\r\n");
                            let _ = body_tx.send(Bytes::from(closing)).await;
                            tracing::debug!("event stream ended by terminal event");
                            break;
                        }
                        None => break,
                    },
                    () = &mut timeout => {
                        let closing =
                            format!("\r\n--{digest_boundary}--\r\n--{mixed_boundary}--\r\n");
                        let _ = body_tx.send(Bytes::from(closing)).await;
                        tracing::debug!("event stream duration elapsed");
                        break;
                    }
                    () = body_tx.closed() => {
                        tracing::debug!("client disconnected");
                        break;
                    }
                }
            }
        }

        handle.unsubscribe();
    }
}

/// Representation part and digest prologue. Returns whether the client is
/// still connected.
async fn write_prologue(
    body_tx: &mpsc::Sender<Bytes>,
    part_headers: &[(String, String)],
    body: Option<SendBody>,
    mixed_boundary: &str,
    digest_boundary: &str,
) -> bool {
    let digest_open = format!(
        "--{mixed_boundary}\r\nContent-Type: multipart/digest; boundary=\"{digest_boundary}\"\r\n\r\n--{digest_boundary}\r\n"
    );

    let Some(body) = body else {
        // Representation skipped: the digest is the envelope's only part.
        return body_tx.send(Bytes::from(digest_open)).await.is_ok();
    };

    let mut opener = BytesMut::new();
    opener.extend_from_slice(format!("--{mixed_boundary}\r\n").as_bytes());
    for (name, value) in part_headers {
        opener.extend_from_slice(name.as_bytes());
        opener.extend_from_slice(b": ");
        opener.extend_from_slice(value.as_bytes());
        opener.extend_from_slice(b"\r\n");
    }
    opener.extend_from_slice(b"\r\n");
    if body_tx.send(opener.freeze()).await.is_err() {
        return false;
    }

    match body {
        SendBody::Full(bytes) => {
            if body_tx.send(bytes).await.is_err() {
                return false;
            }
        }
        SendBody::Stream(mut stream) => {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        if body_tx.send(bytes).await.is_err() {
                            return false;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "representation stream failed");
                        break;
                    }
                }
            }
        }
    }

    body_tx
        .send(Bytes::from(format!("\r\n{digest_open}")))
        .await
        .is_ok()
}

fn notification_frame(
    header_block: &str,
    notification: &str,
    digest_boundary: &str,
    last: bool,
    quirk: bool,
) -> Bytes {
    let mut frame = BytesMut::new();
    frame.extend_from_slice(header_block.as_bytes());
    frame.extend_from_slice(notification.as_bytes());
    frame.extend_from_slice(b"\r\n--");
    frame.extend_from_slice(digest_boundary.as_bytes());
    if last {
        frame.extend_from_slice(b"--");
    } else {
        frame.extend_from_slice(b"\r\n");
    }
    if quirk {
        frame.extend_from_slice("\r\n".repeat(QUIRK_PAD_LINES).as_bytes());
    }
    frame.freeze()
}

/// Random URL-safe boundary, 20 characters.
fn generate_boundary() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use rand::Rng;
    let bytes: [u8; 15] = rand::rng().random();
    let boundary = URL_SAFE_NO_PAD.encode(bytes);
    debug_assert_eq!(boundary.len(), BOUNDARY_LEN);
    boundary
}

fn http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn http_date_now() -> String {
    http_date(&Utc::now())
}
