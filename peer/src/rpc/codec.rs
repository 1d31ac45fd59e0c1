use bytes::BytesMut;
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::{RpcError, RpcRequest, RpcResponse};

/// Length-prefixed JSON framing, built on `tokio_util`'s length-delimited
/// codec the way `p2p::message::MessageCodec` hand-rolls a length prefix
/// around its own fixed binary layout. Our RPC payloads are variable-shaped
/// request/response envelopes (file sets, index maps) rather than a small
/// fixed wire format, so the frame body is JSON instead of hand-packed
/// fields.
struct FramedJson(LengthDelimitedCodec);

impl Default for FramedJson {
    fn default() -> Self {
        Self(LengthDelimitedCodec::new())
    }
}

impl FramedJson {
    fn encode_json<T: Serialize>(&mut self, item: &T, dst: &mut BytesMut) -> Result<(), RpcError> {
        let payload = serde_json::to_vec(item)?;
        self.0
            .encode(payload.into(), dst)
            .map_err(RpcError::Io)
    }

    fn decode_json<T: DeserializeOwned>(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<T>, RpcError> {
        match self.0.decode(src).map_err(RpcError::Io)? {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame)?)),
            None => Ok(None),
        }
    }
}

/// Server side of a connection: decodes requests, encodes responses.
#[derive(Default)]
pub struct ServerCodec(FramedJson);

impl Decoder for ServerCodec {
    type Item = RpcRequest;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.0.decode_json(src)
    }
}

impl Encoder<RpcResponse> for ServerCodec {
    type Error = RpcError;

    fn encode(&mut self, item: RpcResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.0.encode_json(&item, dst)
    }
}

/// Client side of a connection: encodes requests, decodes responses.
#[derive(Default)]
pub struct ClientCodec(FramedJson);

impl Decoder for ClientCodec {
    type Item = RpcResponse;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.0.decode_json(src)
    }
}

impl Encoder<RpcRequest> for ClientCodec {
    type Error = RpcError;

    fn encode(&mut self, item: RpcRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.0.encode_json(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;

    #[test]
    fn round_trips_a_request_through_client_then_server_codec() {
        let mut client = ClientCodec::default();
        let mut server = ServerCodec::default();
        let mut buf = BytesMut::new();

        let req = RpcRequest::RequestVote {
            candidate_endpoint: Endpoint::new("10.0.0.1:9000"),
            election_epoch: 4,
        };
        client.encode(req.clone(), &mut buf).unwrap();

        // Partial frame: decoder must return None rather than erroring.
        let mut partial = buf.split_to(buf.len() / 2);
        assert!(server.decode(&mut partial).unwrap().is_none());
        partial.unsplit(buf);

        let decoded = server.decode(&mut partial).unwrap().unwrap();
        match (req, decoded) {
            (
                RpcRequest::RequestVote {
                    candidate_endpoint: a,
                    election_epoch: ae,
                },
                RpcRequest::RequestVote {
                    candidate_endpoint: b,
                    election_epoch: be,
                },
            ) => {
                assert_eq!(a, b);
                assert_eq!(ae, be);
            }
            _ => panic!("decoded wrong variant"),
        }
    }
}
