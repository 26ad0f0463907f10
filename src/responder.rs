use std::{convert::Infallible, fmt::Display};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, header::HeaderValue, Request, Response, StatusCode};

/// Identifier of the serving process, captured once at startup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProcessId(u32);

impl ProcessId {
    pub fn current() -> Self {
        ProcessId(std::process::id())
    }
}

impl From<u32> for ProcessId {
    fn from(value: u32) -> Self {
        ProcessId(value)
    }
}

impl Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

pub fn body_for(pid: ProcessId) -> String {
    format!("Hello from PID {pid}\n")
}

/// Answers every request the same way, whatever its method, path or body.
pub async fn respond<B>(
    pid: ProcessId,
    request: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    tracing::trace!(method = %request.method(), path = request.uri().path(), "Responding");
    let mut response = Response::new(Full::new(Bytes::from(body_for(pid))));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt as _;
    use hyper::Method;

    async fn body_of(response: Response<Full<Bytes>>) -> String {
        let collected = response.into_body().collect().await.unwrap();
        String::from_utf8(collected.to_bytes().to_vec()).unwrap()
    }

    #[test]
    fn body_format() {
        assert_eq!(body_for(ProcessId::from(100)), "Hello from PID 100\n");
    }

    #[test]
    fn current_matches_process() {
        assert_eq!(ProcessId::current().to_string(), std::process::id().to_string());
    }

    #[tokio::test]
    async fn same_answer_for_every_request() {
        let pid = ProcessId::from(4242);
        let requests = [
            (Method::GET, "/"),
            (Method::POST, "/submit"),
            (Method::DELETE, "/a/b/c?x=1"),
            (Method::PUT, "/"),
            (Method::OPTIONS, "*"),
        ];

        for (method, uri) in requests {
            let request = Request::builder()
                .method(method.clone())
                .uri(uri)
                .body("ignored")
                .unwrap();
            let response = respond(pid, request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{method} {uri}");
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "text/plain; charset=utf-8"
            );
            assert_eq!(body_of(response).await, "Hello from PID 4242\n");
        }
    }
}
