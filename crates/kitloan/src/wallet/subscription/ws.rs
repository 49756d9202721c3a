use std::str::FromStr;

use futures::{SinkExt, StreamExt};
use kitloan_common::events::{LiveEvent, LiveTopic};
use kitloan_common::pub_sub::remote_consumer::{InternalRelay, StreamCtrl, SubscribeMessage};
use kitloan_common::pub_sub::Error as PubsubError;
use kitloan_common::ws::WsIncoming;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use super::{AccountChannel, LiveClient};

#[inline(always)]
pub(crate) async fn stream_client(
    client: &LiveClient,
    mut ctrl: mpsc::Receiver<StreamCtrl<AccountChannel>>,
    topics: Vec<SubscribeMessage<AccountChannel>>,
    reply_to: InternalRelay<AccountChannel>,
) -> Result<(), PubsubError> {
    let mut url = client.channel_url.clone();

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    if url.set_scheme(scheme).is_err() {
        return Err(PubsubError::InternalStr(format!(
            "Could not set scheme on {url}"
        )));
    }

    let request = url.to_string().into_client_request().map_err(|err| {
        tracing::error!("Failed to create client request: {:?}", err);
        PubsubError::NotSupported
    })?;

    tracing::debug!("Connecting to {}", url);
    let ws_stream = connect_async(request)
        .await
        .map(|(ws_stream, _)| ws_stream)
        .map_err(|err| {
            tracing::error!("Error connecting: {err:?}");
            PubsubError::Internal(Box::new(err))
        })?;

    tracing::debug!("Connected to {}", url);
    let (mut write, mut read) = ws_stream.split();

    for (name, topic) in topics {
        let req = if let Some(req) = client.subscribe_request(name, &topic) {
            req
        } else {
            continue;
        };

        let _ = write.send(Message::Text(req.into())).await;
    }

    loop {
        tokio::select! {
            Some(msg) = ctrl.recv() => {
                match msg {
                    StreamCtrl::Subscribe((name, topic)) => {
                        let req = if let Some(req) = client.subscribe_request(name, &topic) {
                            req
                        } else {
                            continue;
                        };
                        let _ = write.send(Message::Text(req.into())).await;
                    }
                    StreamCtrl::Unsubscribe(name) => {
                        let req = if let Some(req) = client.unsubscribe_request(name) {
                            req
                        } else {
                            continue;
                        };
                        let _ = write.send(Message::Text(req.into())).await;
                    }
                    StreamCtrl::Stop => {
                        if let Err(err) = write.send(Message::Close(None)).await {
                            tracing::error!("Closing error {err:?}");
                        }
                        break;
                    }
                };
            }
            Some(msg) = read.next() => {
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(_) => {
                        if let Err(err) = write.send(Message::Close(None)).await {
                            tracing::error!("Closing error {err:?}");
                        }
                        break;
                    }
                };
                let msg = match msg {
                    Message::Text(msg) => msg,
                    _ => continue,
                };
                let msg = match serde_json::from_str::<WsIncoming>(&msg) {
                    Ok(msg) => msg,
                    Err(_) => continue,
                };

                match msg {
                    WsIncoming::Event(envelope) => {
                        let topic = match LiveTopic::from_str(&envelope.topic) {
                            Ok(topic) => topic,
                            Err(err) => {
                                tracing::warn!("Dropping event on unknown topic: {err}");
                                continue;
                            }
                        };
                        // one undecodable payload must not kill the stream
                        match LiveEvent::from_wire(topic, envelope.event) {
                            Ok(event) => reply_to.send(event),
                            Err(err) => {
                                tracing::warn!("Dropping undecodable event: {err}");
                            }
                        }
                    }
                    WsIncoming::Ack(ack) => {
                        tracing::debug!("Received ack from server: {:?}", ack);
                    }
                    WsIncoming::Error(error) => {
                        tracing::debug!("Received an error from server: {:?}", error);
                        return Err(PubsubError::InternalStr(error.error));
                    }
                }
            }
        }
    }

    Ok(())
}
