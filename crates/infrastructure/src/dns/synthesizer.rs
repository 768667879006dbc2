//! Locally built DNS replies.
//!
//! Every reply echoes the request's ID, opcode, RD flag and question section,
//! sets RA, and is encoded without name compression.

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record, RecordType};
use hickory_proto::error::ProtoResult;
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use intercept_dns_domain::DomainError;
use std::net::Ipv4Addr;
use tracing::debug;

pub const DEFAULT_INTERCEPT_TTL: u32 = 60;

#[derive(Debug, Clone, Copy)]
pub struct ResponseSynthesizer {
    ttl: u32,
}

impl ResponseSynthesizer {
    pub fn new(ttl: u32) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Authoritative answer redirecting the queried name to `target`.
    ///
    /// A and ANY get one A record; every other type gets NOERROR with an empty
    /// answer section. AAAA in particular is NODATA, never NXDOMAIN.
    pub fn intercept_response(
        &self,
        request: &Message,
        target: Ipv4Addr,
    ) -> Result<Vec<u8>, DomainError> {
        let mut response = Self::reply_to(request, ResponseCode::NoError);
        response.set_authoritative(true);

        if let Some(query) = request.queries().first() {
            match query.query_type() {
                RecordType::A | RecordType::ANY => {
                    response.add_answer(Record::from_rdata(
                        query.name().clone(),
                        self.ttl,
                        RData::A(A(target)),
                    ));
                }
                other => {
                    debug!(
                        domain = %query.name(),
                        record_type = ?other,
                        "Intercepted non-A query, answering NODATA"
                    );
                }
            }
        }

        encode_uncompressed(&response)
    }

    /// Non-authoritative reply carrying only `code` (SERVFAIL, NXDOMAIN, ...).
    pub fn error_response(
        &self,
        request: &Message,
        code: ResponseCode,
    ) -> Result<Vec<u8>, DomainError> {
        let response = Self::reply_to(request, code);
        encode_uncompressed(&response)
    }

    fn reply_to(request: &Message, code: ResponseCode) -> Message {
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(request.op_code())
            .set_recursion_desired(request.recursion_desired())
            .set_recursion_available(true)
            .set_response_code(code);
        response.add_queries(request.queries().iter().cloned());
        response
    }
}

impl Default for ResponseSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_INTERCEPT_TTL)
    }
}

/// Serializes `message` writing every owner and question name in full, with
/// the client's original letter case, instead of as a compression pointer.
pub fn encode_uncompressed(message: &Message) -> Result<Vec<u8>, DomainError> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);

    emit_uncompressed(message, &mut encoder).map_err(|e| {
        DomainError::InvalidDnsMessage(format!("failed to serialize DNS message: {}", e))
    })?;

    Ok(buf)
}

fn emit_uncompressed(message: &Message, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
    let mut header = *message.header();
    header
        .set_query_count(message.queries().len() as u16)
        .set_answer_count(message.answers().len() as u16)
        .set_name_server_count(message.name_servers().len() as u16)
        .set_additional_count(message.additionals().len() as u16);
    header.emit(encoder)?;

    for query in message.queries() {
        query.name().emit_as_canonical(encoder, true)?;
        query.query_type().emit(encoder)?;
        query.query_class().emit(encoder)?;
    }

    for record in message
        .answers()
        .iter()
        .chain(message.name_servers())
        .chain(message.additionals())
    {
        emit_record(record, encoder)?;
    }

    Ok(())
}

fn emit_record(record: &Record, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
    record.name().emit_as_canonical(encoder, true)?;
    record.record_type().emit(encoder)?;
    record.dns_class().emit(encoder)?;
    encoder.emit_u32(record.ttl())?;

    // RDATA goes through its own buffer so no pointer can target this message.
    let mut rdata = Vec::new();
    if let Some(data) = record.data() {
        let mut rdata_encoder = BinEncoder::new(&mut rdata);
        rdata_encoder.set_canonical_names(true);
        data.emit(&mut rdata_encoder)?;
    }
    encoder.emit_u16(rdata.len() as u16)?;
    encoder.emit_vec(&rdata)
}
