use hickory_proto::{
    op::{Edns, Header, Message, MessageType, OpCode, ResponseCode},
    rr::{rdata::TXT, RData, Record, RecordType},
    serialize::binary::{BinDecodable, BinDecoder},
};

use super::{DnsError, DEFAULT_TTL, MAX_UDP_PAYLOAD};
use crate::store::ValidationStore;

/// Longest character-string a TXT record can hold.
const MAX_CHARACTER_STRING: usize = 255;

/// Transport a query arrived on; UDP replies are size-limited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

/// Answers DNS queries from a [`ValidationStore`].
#[derive(Clone, Debug)]
pub struct Resolver {
    store: ValidationStore,
    ttl: u32,
}

impl Resolver {
    pub fn new(store: ValidationStore) -> Self {
        Self {
            store,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn store(&self) -> &ValidationStore {
        &self.store
    }

    /// Build the response to `request`.
    ///
    /// Names with presented values answer NOERROR (with TXT records for TXT
    /// and ANY queries), every other name answers NXDOMAIN.
    pub fn resolve(&self, request: &Message) -> Message {
        if request.op_code() != OpCode::Query {
            return Message::error_msg(request.id(), request.op_code(), ResponseCode::NotImp);
        }
        let Some(query) = request.queries().first() else {
            return Message::error_msg(request.id(), request.op_code(), ResponseCode::FormErr);
        };

        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_authoritative(true)
            .set_recursion_desired(request.recursion_desired())
            .add_query(query.clone());

        let name = query.name().to_ascii();
        let values = self.store.lookup(&name);

        if values.is_empty() {
            tracing::debug!("NXDOMAIN for {} {}", name, query.query_type());
            response.set_response_code(ResponseCode::NXDomain);
            return response;
        }

        response.set_response_code(ResponseCode::NoError);
        if matches!(query.query_type(), RecordType::TXT | RecordType::ANY) {
            tracing::debug!("Answering {} with {} TXT record(s)", name, values.len());
            for value in &values {
                let mut chunks: Vec<&[u8]> = value.as_bytes().chunks(MAX_CHARACTER_STRING).collect();
                if chunks.is_empty() {
                    chunks.push(&[]);
                }
                let txt = TXT::from_bytes(chunks);
                response.add_answer(Record::from_rdata(
                    query.name().clone(),
                    self.ttl,
                    RData::TXT(txt),
                ));
            }
        }
        response
    }

    /// Decode a wire-format query, resolve it and encode the response.
    ///
    /// Returns `None` when the packet is too malformed to reply to or is
    /// itself a response. UDP replies larger than the requester's payload
    /// size (512 bytes without EDNS) are sent truncated, without answers,
    /// so the requester retries over TCP.
    pub fn handle_bytes(&self, packet: &[u8], transport: Transport) -> Option<Vec<u8>> {
        let request = match Message::from_vec(packet) {
            Ok(request) if request.message_type() == MessageType::Query => request,
            Ok(_) => {
                tracing::debug!("Dropping DNS response packet");
                return None;
            }
            Err(e) => {
                let header = Header::read(&mut BinDecoder::new(packet)).ok()?;
                if header.message_type() != MessageType::Query {
                    tracing::debug!("Dropping malformed DNS response packet {}", header.id());
                    return None;
                }
                tracing::debug!("Malformed DNS query {}: {}", header.id(), e);
                let response = Message::error_msg(header.id(), header.op_code(), ResponseCode::FormErr);
                return encode(&response);
            }
        };

        let mut response = self.resolve(&request);
        if request.extensions().is_some() {
            let mut edns = Edns::new();
            edns.set_max_payload(MAX_UDP_PAYLOAD);
            response.set_edns(edns);
        }

        let bytes = encode(&response)?;
        let limit = usize::from(request.max_payload());
        if transport == Transport::Tcp || bytes.len() <= limit {
            return Some(bytes);
        }

        tracing::debug!(
            "Truncating {} byte UDP reply to query {} (limit {})",
            bytes.len(),
            request.id(),
            limit
        );
        response.set_truncated(true);
        response.take_answers();
        response.take_additionals();
        encode(&response)
    }
}

fn encode(message: &Message) -> Option<Vec<u8>> {
    match to_wire(message) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!("Failed to encode DNS response: {}", e);
            None
        }
    }
}

fn to_wire(message: &Message) -> Result<Vec<u8>, DnsError> {
    Ok(message.to_vec()?)
}
