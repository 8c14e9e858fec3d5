// =============================================================================
// WebSocket upgrade handler
// =============================================================================
//
// Same shape as the teacher's `api::ws::ws_handler`: validate a query-string
// token, upgrade, then run a recv loop. Unlike the teacher's single periodic
// push, outbound messages here arrive from an mpsc channel fed by WsRegistry
// broadcasts, so the connection task is a pure `select!` between the socket
// and the channel.
// =============================================================================

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::auth::validate_token;
use crate::api::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
    user_id: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!("WebSocket connection rejected: invalid token");
        return (axum::http::StatusCode::FORBIDDEN, "invalid or missing token").into_response();
    }

    let user_id = query.user_id.unwrap_or_else(Uuid::new_v4);
    info!(%user_id, "WebSocket connection accepted");
    ws.on_upgrade(move |socket| handle_connection(socket, state, user_id)).into_response()
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    let conn_id = Uuid::new_v4();
    state.ws_registry.connect(conn_id, user_id, tx);

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_client_message(&state, conn_id, &text) {
                            debug!(error = %e, "ignoring malformed client message");
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(%conn_id, "WebSocket close frame received");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%conn_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.ws_registry.disconnect(conn_id);
}

fn handle_client_message(state: &Arc<AppState>, conn_id: Uuid, text: &str) -> Result<(), serde_json::Error> {
    let (action, tickers) = parse_client_message(text)?;

    match action.as_str() {
        "subscribe" => state.ws_registry.subscribe(conn_id, &tickers),
        "unsubscribe" => state.ws_registry.unsubscribe(conn_id, &tickers),
        _ => debug!(action, "unrecognized WebSocket message action"),
    }
    Ok(())
}

/// Client→server frames are `{action: "subscribe"|"unsubscribe", tickers: [...]}`
/// per spec.
fn parse_client_message(text: &str) -> Result<(String, Vec<String>), serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let action = value.get("action").and_then(Value::as_str).unwrap_or_default().to_string();
    let tickers: Vec<String> = value
        .get("tickers")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    Ok((action, tickers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe_action_field() {
        let (action, tickers) = parse_client_message(r#"{"action":"subscribe","tickers":["AAPL","MSFT"]}"#).unwrap();
        assert_eq!(action, "subscribe");
        assert_eq!(tickers, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn parses_unsubscribe_action_field() {
        let (action, tickers) = parse_client_message(r#"{"action":"unsubscribe","tickers":["AAPL"]}"#).unwrap();
        assert_eq!(action, "unsubscribe");
        assert_eq!(tickers, vec!["AAPL".to_string()]);
    }
}
