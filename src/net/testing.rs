//! Recording transport for tests.
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use http::HeaderMap;

use crate::errors::{Result, StorageError};
use crate::net::{HttpTransport, Request, Response};

/// Records every request and answers from a queue of canned replies.
/// With an empty queue it answers `200 OK` with `{}`.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<Request>>,
    replies: Mutex<VecDeque<Result<(u16, &'static str, String)>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, status: u16, status_text: &'static str, body: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok((status, status_text, body.to_string())));
    }

    pub fn fail(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(StorageError::Network(message.to_string())));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        let reply = self.replies.lock().unwrap().pop_front();
        let (status, status_text, body) = reply.unwrap_or(Ok((200, "OK", "{}".to_string())))?;
        Ok(Response {
            url,
            status,
            status_text: status_text.to_string(),
            headers: HeaderMap::new(),
            body: body.into_bytes(),
        })
    }
}
