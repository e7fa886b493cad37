//! Length-prefixed bincode framing for inter-node invocations.

use crate::{NetworkError, NetworkResult};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use vactor_core::{ActorId, NodeId, TypeName};

/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// One inter-node invocation or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Submission of a message to the remote node's launcher.
    Deliver {
        type_name: TypeName,
        id: ActorId,
        payload: Vec<u8>,
    },
    /// Asks whether the remote node hosts a live launcher.
    PresenceQuery,
    /// Answer to [`WireMessage::PresenceQuery`].
    PresenceReply { hosting: bool },
    /// A node introducing itself after observing this peer come up.
    Announce { node: NodeId },
}

/// Writes one frame: a big-endian u32 body length followed by the bincode
/// body.
pub async fn write_frame<W>(writer: &mut W, message: &WireMessage) -> NetworkResult<()>
where
    W: AsyncWrite + Unpin,
{
    let body = bincode::serialize(message).map_err(NetworkError::codec)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(NetworkError::FrameTooLarge(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame written by [`write_frame`].
pub async fn read_frame<R>(reader: &mut R) -> NetworkResult<WireMessage>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(NetworkError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    bincode::deserialize(&body).map_err(NetworkError::codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let sent = WireMessage::Deliver {
            type_name: TypeName::new("counter"),
            id: ActorId::new("a"),
            payload: b"inc".to_vec(),
        };
        write_frame(&mut client, &sent).await.unwrap();

        let received = read_frame(&mut server).await.unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn consecutive_frames_stay_separated() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, &WireMessage::PresenceQuery).await.unwrap();
        write_frame(&mut client, &WireMessage::PresenceReply { hosting: true })
            .await
            .unwrap();

        assert_eq!(read_frame(&mut server).await.unwrap(), WireMessage::PresenceQuery);
        assert_eq!(
            read_frame(&mut server).await.unwrap(),
            WireMessage::PresenceReply { hosting: true }
        );
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::io::AsyncWriteExt::write_all(&mut client, &u32::MAX.to_be_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, NetworkError::FrameTooLarge(_)));
    }
}
