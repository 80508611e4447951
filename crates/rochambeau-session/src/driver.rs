//! The driver task behind a [`Session`](crate::Session).
//!
//! One task per `connect()`. It dials, announces the identity, pumps
//! frames both ways, and on failure asks the reconnect policy whether to
//! try again. Everything it does is fenced by the generation it was
//! spawned for.

use std::io;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use rochambeau_protocol::{Codec, Discriminator, Envelope, JsonCodec, Tagged};
use rochambeau_transport::{
    CloseReason, Connection, Connector, Incoming, NORMAL_CLOSURE, TransportError,
};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::reconnect::Closure;
use crate::session::{Shared, encode_request};
use crate::{ConnectionState, SessionConfig, SessionError};

/// Reason sent with the close frame of a user-initiated close.
const CLOSE_REASON: &str = "User closed socket";

/// Handle → driver messages for the open connection.
pub(crate) enum Command {
    /// An encoded envelope to write.
    Send(Vec<u8>),
    /// Close gracefully; `generation` is the one `close()` created.
    Close { generation: u64 },
}

enum Dial<T> {
    Open(T),
    Failed(SessionError),
    Superseded,
}

enum Ended {
    /// The user closed the session; state already settled.
    Shutdown,
    /// Server-side normal closure.
    Clean(CloseReason),
    /// Error or abnormal closure; retry.
    Lost(SessionError),
    /// A newer generation owns the session.
    Superseded,
}

pub(crate) struct Driver<C, RQ, RS, O, M> {
    pub(crate) url: String,
    pub(crate) generation: u64,
    pub(crate) connector: Arc<C>,
    pub(crate) config: SessionConfig,
    pub(crate) codec: JsonCodec,
    pub(crate) shared: Arc<Shared>,
    pub(crate) on_open: O,
    pub(crate) on_message: M,
    pub(crate) _catalog: PhantomData<fn(RQ) -> RS>,
}

impl<C, RQ, RS, O, M> Driver<C, RQ, RS, O, M>
where
    C: Connector,
    RQ: Tagged + Serialize + Send + 'static,
    RS: Tagged + DeserializeOwned + Send + 'static,
    O: Fn() -> Option<RQ> + Send + 'static,
    M: FnMut(RS) + Send + 'static,
{
    pub(crate) async fn run(mut self) {
        // Consecutive failures since the last successful open.
        let mut attempt: u32 = 0;

        loop {
            match self.dial().await {
                Dial::Superseded => return,
                Dial::Failed(err) => self.fail(err),
                Dial::Open(conn) => {
                    attempt = 0;
                    let ended = self.serve(conn).await;
                    self.shared.retire(self.generation);
                    match ended {
                        Ended::Shutdown | Ended::Superseded => return,
                        Ended::Clean(reason) => {
                            info!(url = %self.url, %reason, "server closed the session");
                            self.shared
                                .set_state_if(self.generation, ConnectionState::Off);
                            return;
                        }
                        Ended::Lost(err) => self.fail(err),
                    }
                }
            }

            let Some(delay) = self.config.reconnect.delay_for(attempt) else {
                if self.shared.is_current(self.generation) {
                    warn!(url = %self.url, attempts = attempt, "giving up reconnecting");
                    self.shared
                        .record(SessionError::RetriesExhausted { attempts: attempt });
                }
                return;
            };
            attempt += 1;
            info!(
                url = %self.url,
                attempt,
                max_attempts = self.config.reconnect.max_attempts,
                ?delay,
                "reconnect scheduled"
            );

            if !self.backoff(delay).await {
                return;
            }
            if !self
                .shared
                .set_state_if(self.generation, ConnectionState::Connecting)
            {
                return;
            }
        }
    }

    /// Records a failure and moves to Failed, if still current.
    fn fail(&self, err: SessionError) {
        if self.shared.set_state_if(self.generation, ConnectionState::Failed) {
            warn!(url = %self.url, generation = self.generation, %err, "connection failed");
            self.shared.record(err);
        }
    }

    async fn dial(&mut self) -> Dial<C::Connection> {
        let mut generations = self.shared.generation.subscribe();
        debug!(url = %self.url, generation = self.generation, "dialing");

        tokio::select! {
            biased;
            _ = superseded(&mut generations, self.generation) => Dial::Superseded,
            result = time::timeout(self.config.dial_timeout, self.connector.connect(&self.url)) => {
                match result {
                    Ok(Ok(conn)) => Dial::Open(conn),
                    Ok(Err(err)) => Dial::Failed(err.into()),
                    Err(_) => Dial::Failed(
                        TransportError::ConnectFailed {
                            url: self.url.clone(),
                            source: io::Error::new(io::ErrorKind::TimedOut, "dial timed out"),
                        }
                        .into(),
                    ),
                }
            }
        }
    }

    /// Sleeps before a retry. `false` if the session moved on meanwhile.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let mut generations = self.shared.generation.subscribe();
        tokio::select! {
            biased;
            _ = superseded(&mut generations, self.generation) => {
                debug!(url = %self.url, "pending reconnect cancelled");
                false
            }
            _ = time::sleep(delay) => self.shared.is_current(self.generation),
        }
    }

    async fn serve(&mut self, mut conn: C::Connection) -> Ended {
        let id = conn.id();

        let hello = match self
            .codec
            .encode(&Envelope::announce(self.shared.identity.get()))
        {
            Ok(frame) => frame,
            Err(err) => return Ended::Lost(err.into()),
        };
        if let Err(err) = conn.send(&hello).await {
            return Ended::Lost(err.into());
        }

        let (commands, mut inbox) = mpsc::unbounded_channel();
        if !self.shared.open(self.generation, commands) {
            debug!(%id, "superseded during handshake");
            let _ = conn.close(NORMAL_CLOSURE, CLOSE_REASON).await;
            return Ended::Superseded;
        }
        info!(%id, url = %self.url, generation = self.generation, "session connected");

        if let Some(request) = (self.on_open)() {
            debug!(%id, tag = request.tag(), "sending on-open request");
            let frame = encode_request(&self.codec, &self.shared.identity, &request);
            let sent = match frame {
                Ok(frame) => conn.send(&frame).await.map_err(SessionError::from),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = sent {
                return self.lost(err, &mut inbox);
            }
        }

        loop {
            tokio::select! {
                biased;
                command = inbox.recv() => match command {
                    Some(Command::Send(frame)) => {
                        if let Err(err) = conn.send(&frame).await {
                            return self.lost(err.into(), &mut inbox);
                        }
                    }
                    Some(Command::Close { generation }) => {
                        return self.shutdown(conn, generation).await;
                    }
                    None => {
                        let _ = conn.close(NORMAL_CLOSURE, CLOSE_REASON).await;
                        return Ended::Superseded;
                    }
                },
                incoming = conn.recv() => match incoming {
                    Ok(Incoming::Message(frame)) => {
                        if self.shared.is_current(self.generation) {
                            self.deliver(&frame);
                        } else {
                            trace!(%id, "dropping frame from superseded generation");
                        }
                    }
                    Ok(Incoming::Closed(reason)) => {
                        return match self.config.reconnect.classify(&reason) {
                            Closure::Clean => match pending_close(&mut inbox) {
                                Some(generation) => {
                                    self.shared.set_state_if(generation, ConnectionState::Off);
                                    Ended::Shutdown
                                }
                                None => Ended::Clean(reason),
                            },
                            Closure::Abnormal => {
                                self.lost(SessionError::AbnormalClosure(reason), &mut inbox)
                            }
                        };
                    }
                    Err(err) => return self.lost(err.into(), &mut inbox),
                },
            }
        }
    }

    /// The connection broke. A close that raced the failure still wins.
    fn lost(&self, err: SessionError, inbox: &mut mpsc::UnboundedReceiver<Command>) -> Ended {
        match pending_close(inbox) {
            Some(generation) => {
                debug!(url = %self.url, %err, "connection lost while closing");
                self.shared.set_state_if(generation, ConnectionState::Off);
                Ended::Shutdown
            }
            None => Ended::Lost(err),
        }
    }

    async fn shutdown(&mut self, mut conn: C::Connection, generation: u64) -> Ended {
        let id = conn.id();
        if let Err(err) = conn.close(NORMAL_CLOSURE, CLOSE_REASON).await {
            debug!(%id, %err, "close frame not sent");
        }

        let confirmation = time::timeout(self.config.close_timeout, async {
            loop {
                match conn.recv().await {
                    Ok(Incoming::Closed(reason)) => return Some(reason),
                    // Frames still in flight belong to a closed session.
                    Ok(Incoming::Message(_)) => continue,
                    Err(_) => return None,
                }
            }
        })
        .await;

        match confirmation {
            Ok(Some(reason)) => info!(%id, %reason, "session closed"),
            Ok(None) => debug!(%id, "transport failed while closing"),
            Err(_) => warn!(
                %id,
                timeout = ?self.config.close_timeout,
                "close not confirmed in time"
            ),
        }
        self.shared.set_state_if(generation, ConnectionState::Off);
        Ended::Shutdown
    }

    /// Decodes one inbound frame and hands the payload to `on_message`.
    ///
    /// Undecodable frames are logged and recorded; the connection stays up.
    fn deliver(&mut self, frame: &[u8]) {
        match self.codec.decode::<Envelope<RS>>(frame) {
            Ok(envelope) => {
                if let Some(id) = envelope.user_id {
                    self.shared.identity.learn(id);
                }
                let payload = envelope.payload;
                if payload.is_unknown() {
                    let tag = Discriminator::peek(&self.codec, frame);
                    warn!(
                        url = %self.url,
                        tag = tag.as_deref().unwrap_or("<missing>"),
                        "unrecognised message type"
                    );
                } else {
                    trace!(url = %self.url, tag = payload.tag(), "message received");
                }
                (self.on_message)(payload);
            }
            Err(err) => {
                // Identity-only frames (`"payload": null`) are not errors.
                if let Ok(envelope) = self
                    .codec
                    .decode::<Envelope<Option<IgnoredAny>>>(frame)
                {
                    if let Some(id) = envelope.user_id {
                        self.shared.identity.learn(id);
                    }
                    if envelope.payload.is_none() {
                        debug!(url = %self.url, "identity-only frame");
                        return;
                    }
                }
                warn!(url = %self.url, %err, "dropping undecodable frame");
                self.shared.record(err.into());
            }
        }
    }
}

/// Resolves once the session's generation differs from `generation`.
async fn superseded(generations: &mut watch::Receiver<u64>, generation: u64) {
    // Err means the sender is gone, which only happens once the session
    // itself is gone: treat it as superseded too.
    let _ = generations.wait_for(|current| *current != generation).await;
}

/// Pulls a pending `Close` out of the inbox, skipping unsent frames.
fn pending_close(inbox: &mut mpsc::UnboundedReceiver<Command>) -> Option<u64> {
    while let Ok(command) = inbox.try_recv() {
        if let Command::Close { generation } = command {
            return Some(generation);
        }
    }
    None
}
