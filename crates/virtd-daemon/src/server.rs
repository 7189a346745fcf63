//! TCP transport: accept loops and per-connection frame pumping.
//!
//! The transport is deliberately thin. It reassembles length-prefixed
//! frames, hands each complete request to the synchronous dispatcher and
//! drains the session's reply buffer; all protocol knowledge lives behind
//! [`dispatch`].

use std::io;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, info, warn};

use virtd_common::protocol::MESSAGE_MAX;
use virtd_common::types::AuthType;

use crate::config::DaemonConfig;
use crate::dispatch::{dispatch, DispatchAction, ServerEnv};
use crate::session::Session;

/// Splits the byte stream into protocol frames.
///
/// The wire length word covers itself, so a frame's body is `length - 4`
/// bytes. Lengths outside `[4, MESSAGE_MAX]` are unrecoverable: there is
/// no way to resynchronise the stream, so they fail the connection.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length < 4 || length > MESSAGE_MAX {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame length {length} out of range"),
            ));
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        src.advance(4);
        Ok(Some(src.split_to(length - 4).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    // Replies come out of the dispatcher already framed (length word
    // included); they are written through verbatim.
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Binds the configured listeners and serves until interrupted.
pub async fn run(config: DaemonConfig, env: Arc<ServerEnv>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening for read-write clients");

    let ro_listener = match config.readonly_listen_addr {
        Some(addr) => {
            let l = TcpListener::bind(addr).await?;
            info!(addr = %addr, "listening for read-only clients");
            Some(l)
        }
        None => None,
    };

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                spawn_client(stream, env.clone(), false);
            }
            accepted = accept_opt(&ro_listener) => {
                let (stream, _) = accepted?;
                spawn_client(stream, env.clone(), true);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn accept_opt(
    listener: &Option<TcpListener>,
) -> io::Result<(TcpStream, std::net::SocketAddr)> {
    match listener {
        Some(l) => l.accept().await,
        None => std::future::pending().await,
    }
}

fn spawn_client(stream: TcpStream, env: Arc<ServerEnv>, readonly: bool) {
    tokio::spawn(async move {
        if let Err(e) = serve_client(stream, env, readonly).await {
            debug!(error = %e, "client session ended");
        }
    });
}

/// Pumps one client connection: frame in, dispatch, reply out.
async fn serve_client(stream: TcpStream, env: Arc<ServerEnv>, readonly: bool) -> io::Result<()> {
    let local = stream.local_addr()?;
    let peer = stream.peer_addr()?;
    info!(%peer, readonly, "client connected");

    let mut session = Session::new(readonly, env.auth != AuthType::None, local, peer);
    let mut framed = Framed::new(stream, FrameCodec);

    while let Some(frame) = framed.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%peer, error = %e, "dropping client on framing error");
                break;
            }
        };

        match dispatch(&mut session, &env, &frame) {
            DispatchAction::Reply => {
                let reply = Bytes::copy_from_slice(session.tx_bytes());
                session.advance_tx(reply.len());
                framed.send(reply).await?;
                session.finish_tx();
            }
            DispatchAction::Teardown => {
                warn!(%peer, "tearing down client session");
                break;
            }
        }
    }

    info!(%peer, "client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn frame_roundtrip() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(&frame(b"hello")[..]);
        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&out[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more_data() {
        let mut codec = FrameCodec;
        let full = frame(b"abcdef");

        let mut buf = BytesMut::from(&full[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[3..7]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[7..]);
        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&out[..], b"abcdef");
    }

    #[test]
    fn two_frames_in_one_read() {
        let mut codec = FrameCodec;
        let mut bytes = frame(b"one");
        bytes.extend_from_slice(&frame(b"two"));
        let mut buf = BytesMut::from(&bytes[..]);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"one");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"two");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversize_frame_is_fatal() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((MESSAGE_MAX as u32) + 1).to_be_bytes());
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn undersize_length_is_fatal() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&3u32.to_be_bytes());
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn encoder_passes_framed_replies_through() {
        let mut codec = FrameCodec;
        let reply = Bytes::from_static(&[0, 0, 0, 8, 1, 2, 3, 4]);
        let mut dst = BytesMut::new();
        codec.encode(reply.clone(), &mut dst).unwrap();
        assert_eq!(&dst[..], &reply[..]);
    }
}
