use super::pipeline;
use crate::core::Core;
use hickory_proto::op::{Header, Message, MessageType, OpCode};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::sync::Arc;
use tracing::{debug, warn};

/// hickory-server glue for the UDP/TCP listeners: rebuilds a plain proto
/// message from the request, runs the pipeline, and streams the result
/// back through the response handle.
pub struct DnsHandler {
    core: Arc<Core>,
}

impl DnsHandler {
    pub fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    fn to_message(request: &Request) -> Message {
        let mut message = Message::new(
            request.header().id(),
            MessageType::Query,
            OpCode::Query,
        );
        message.set_recursion_desired(request.header().recursion_desired());
        message.add_query(
            request
                .queries()
                .first()
                .expect("single query")
                .original()
                .clone(),
        );
        if let Some(edns) = request.edns() {
            *message.extensions_mut() = Some(edns.clone());
        }
        message
    }
}

#[async_trait::async_trait]
impl RequestHandler for DnsHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let src_ip = request.src().ip();
        let query = Self::to_message(request);

        let dropped_header = {
            let mut header = Header::response_from_request(request.header());
            header.set_response_code(hickory_proto::op::ResponseCode::ServFail);
            header
        };

        let Some(response) = pipeline::handle_query(&self.core, query, src_ip, None).await else {
            // Rate-limited: drop without answering.
            return ResponseInfo::from(dropped_header);
        };

        let mut header = Header::response_from_request(request.header());
        header.set_response_code(response.response_code());
        header.set_recursion_available(true);
        header.set_authoritative(false);

        let builder = MessageResponseBuilder::from_message_request(request);
        let message_response = builder.build(
            header,
            response.answers().iter(),
            response.name_servers().iter(),
            std::iter::empty(),
            response.additionals().iter(),
        );

        match response_handle.send_response(message_response).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Failed to send DNS response");
                debug!(src = %src_ip, "Response write failed");
                ResponseInfo::from(dropped_header)
            }
        }
    }
}
