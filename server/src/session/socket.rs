use async_trait::async_trait;
use axum::extract::ws;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_NO_STATUS: u16 = 1005;

/// One WebSocket message as the session sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn normal() -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: "closing".to_owned(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("peer closed the connection")]
    Closed(Option<CloseInfo>),
    #[error("websocket transport error: {0}")]
    Transport(String),
}

impl SocketError {
    /// Whether this is an orderly end of the connection rather than a fault.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, SocketError::Closed(_))
    }

    /// The close frame to hand the opposite peer: a real status is mirrored,
    /// everything else becomes a normal closure.
    pub fn close_reply(&self) -> CloseInfo {
        match self {
            SocketError::Closed(Some(info)) if info.code != CLOSE_NO_STATUS => info.clone(),
            _ => CloseInfo::normal(),
        }
    }
}

#[async_trait]
pub trait SocketReader: Send {
    /// The next text or binary frame. Pings and pongs are transparent.
    async fn next_frame(&mut self) -> Result<Frame, SocketError>;
}

#[async_trait]
pub trait SocketWriter: Send {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), SocketError>;
    async fn send_close(&mut self, close: CloseInfo) -> Result<(), SocketError>;
}

pub type TwitchSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn split_client(socket: ws::WebSocket) -> (ClientReader, ClientWriter) {
    let (sink, stream) = socket.split();
    (ClientReader(stream), ClientWriter(sink))
}

pub fn split_twitch(socket: TwitchSocket) -> (TwitchReader, TwitchWriter) {
    let (sink, stream) = socket.split();
    (TwitchReader(stream), TwitchWriter(sink))
}

pub struct ClientReader(SplitStream<ws::WebSocket>);
pub struct ClientWriter(SplitSink<ws::WebSocket, ws::Message>);
pub struct TwitchReader(SplitStream<TwitchSocket>);
pub struct TwitchWriter(SplitSink<TwitchSocket, tungstenite::Message>);

#[async_trait]
impl SocketReader for ClientReader {
    async fn next_frame(&mut self) -> Result<Frame, SocketError> {
        loop {
            match self.0.next().await {
                Some(Ok(ws::Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(ws::Message::Binary(data))) => return Ok(Frame::Binary(data.to_vec())),
                Some(Ok(ws::Message::Close(frame))) => {
                    return Err(SocketError::Closed(frame.map(|f| CloseInfo {
                        code: f.code,
                        reason: f.reason.to_string(),
                    })))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SocketError::Transport(e.to_string())),
                None => return Err(SocketError::Closed(None)),
            }
        }
    }
}

#[async_trait]
impl SocketWriter for ClientWriter {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), SocketError> {
        let message = match frame {
            Frame::Text(text) => ws::Message::Text(text.into()),
            Frame::Binary(data) => ws::Message::Binary(data.into()),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }

    async fn send_close(&mut self, close: CloseInfo) -> Result<(), SocketError> {
        let frame = ws::CloseFrame {
            code: close.code,
            reason: close.reason.into(),
        };
        self.0
            .send(ws::Message::Close(Some(frame)))
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }
}

#[async_trait]
impl SocketReader for TwitchReader {
    async fn next_frame(&mut self) -> Result<Frame, SocketError> {
        loop {
            match self.0.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Ok(Frame::Text(text.to_string()))
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Ok(Frame::Binary(data.to_vec()))
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    return Err(SocketError::Closed(frame.map(|f| CloseInfo {
                        code: f.code.into(),
                        reason: f.reason.to_string(),
                    })))
                }
                Some(Ok(_)) => continue,
                Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                )) => return Err(SocketError::Closed(None)),
                Some(Err(e)) => return Err(SocketError::Transport(e.to_string())),
                None => return Err(SocketError::Closed(None)),
            }
        }
    }
}

#[async_trait]
impl SocketWriter for TwitchWriter {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), SocketError> {
        let message = match frame {
            Frame::Text(text) => tungstenite::Message::Text(text.into()),
            Frame::Binary(data) => tungstenite::Message::Binary(data.into()),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }

    async fn send_close(&mut self, close: CloseInfo) -> Result<(), SocketError> {
        let frame = TungsteniteCloseFrame {
            code: CloseCode::from(close.code),
            reason: close.reason.into(),
        };
        self.0
            .send(tungstenite::Message::Close(Some(frame)))
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }
}
