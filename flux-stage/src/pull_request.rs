//! Pull request creation and merging through the git hosting REST API.
//!
//! Request bodies are typed and serialized, so titles and bodies containing quotes or newlines
//! need no manual escaping. Responses are checked for a 2xx status as well as for the fields the
//! pipeline relies on.

use std::fmt;

use reqwest::{
    blocking::Client,
    header::{HeaderValue, ACCEPT},
    StatusCode,
};
use secrecy::{ExposeSecret, SecretString};

use crate::{version::VERSION, Result};

#[derive(Debug, serde::Serialize)]
pub struct CreatePullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

#[derive(Debug, serde::Serialize)]
pub struct MergePullRequest<'a> {
    /// The merge only goes through if the head of the pull request still matches.
    pub sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_title: Option<&'a str>,
}

/// The subset of the pull request object the pipeline reads back.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct PullRequest {
    /// API URL of the pull request, merges are issued against `<url>/merge`.
    pub url: String,
    pub html_url: String,
    pub number: u64,
    pub head: PullRequestHead,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct PullRequestHead {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct MergeResult {
    pub merged: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sha: Option<String>,
}

pub trait PullRequestApi {
    /// Opens a pull request on `repository` (`owner/name`) and returns the raw JSON response body.
    fn create(&self, repository: &str, request: &CreatePullRequest) -> Result<Vec<u8>>;

    /// Merges the pull request with API URL `pull_request_url`.
    fn merge(&self, pull_request_url: &str, request: &MergePullRequest) -> Result<MergeResult>;
}

/// A request that came back with a non-success status.
#[derive(Debug)]
pub struct ApiError {
    pub method: &'static str,
    pub url: String,
    pub status: StatusCode,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{method} {url} failed with status {status}: {message}",
            method = self.method,
            url = self.url,
            status = self.status,
            message = self.message
        )
    }
}

impl std::error::Error for ApiError {}

/// Extracts the human readable part of an error response.
fn error_message(body: &[u8]) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody { message }) => message,
        Err(_) => {
            const MAX_LEN: usize = 200;
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            match text.char_indices().nth(MAX_LEN) {
                Some((index, _)) => format!("{}...", &text[..index]),
                None if text.is_empty() => "empty response body".to_owned(),
                None => text.to_owned(),
            }
        }
    }
}

pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: SecretString,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: SecretString) -> Result<Self> {
        Ok(Self::with_client(Self::builder().build()?, api_url, token))
    }

    fn builder() -> reqwest::blocking::ClientBuilder {
        Client::builder().user_agent(format!("flux-stage/{VERSION}"))
    }

    fn with_client(client: Client, api_url: &str, token: SecretString) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_owned(),
            token,
        }
    }

    fn send(
        &self,
        method: &'static str,
        url: String,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<Vec<u8>> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .header(ACCEPT, HeaderValue::from_static("application/vnd.github+json"))
            .send()?;
        let status = response.status();
        let body = response.bytes()?.to_vec();

        if !status.is_success() {
            return Err(ApiError {
                method,
                url,
                status,
                message: error_message(&body),
            }
            .into());
        }

        Ok(body)
    }
}

impl PullRequestApi for GitHubClient {
    fn create(&self, repository: &str, request: &CreatePullRequest) -> Result<Vec<u8>> {
        let url = format!("{}/repos/{repository}/pulls", self.api_url);
        self.send("POST", url.clone(), self.client.post(&url).json(request))
    }

    fn merge(&self, pull_request_url: &str, request: &MergePullRequest) -> Result<MergeResult> {
        let url = format!("{}/merge", pull_request_url.trim_end_matches('/'));
        let body = self.send("PUT", url.clone(), self.client.put(&url).json(request))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        sync::mpsc,
        thread,
    };

    use super::*;

    /// A request as seen by [`ApiStub`]: request line, authorization header and body.
    #[derive(Debug)]
    pub(crate) struct Received {
        pub(crate) request_line: String,
        pub(crate) authorization: Option<String>,
        pub(crate) body: String,
    }

    /// Local HTTP server answering one connection per canned response, in order.
    pub(crate) struct ApiStub {
        pub(crate) url: String,
        received: mpsc::Receiver<Received>,
        handle: thread::JoinHandle<()>,
    }

    impl ApiStub {
        pub(crate) fn serve(responses: Vec<(u16, String)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let (sender, received) = mpsc::channel();

            let handle = thread::spawn(move || {
                for (status, body) in responses {
                    let (stream, _) = listener.accept().unwrap();
                    let mut reader = BufReader::new(stream);

                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).unwrap();
                    let mut content_length = 0;
                    let mut authorization = None;
                    loop {
                        let mut line = String::new();
                        reader.read_line(&mut line).unwrap();
                        let line = line.trim_end();
                        if line.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = line.split_once(':') {
                            if name.eq_ignore_ascii_case("content-length") {
                                content_length = value.trim().parse().unwrap();
                            } else if name.eq_ignore_ascii_case("authorization") {
                                authorization = Some(value.trim().to_owned());
                            }
                        }
                    }
                    let mut request_body = vec![0; content_length];
                    reader.read_exact(&mut request_body).unwrap();
                    sender
                        .send(Received {
                            request_line: request_line.trim_end().to_owned(),
                            authorization,
                            body: String::from_utf8(request_body).unwrap(),
                        })
                        .unwrap();

                    let mut stream = reader.into_inner();
                    write!(
                        stream,
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n{body}",
                        length = body.len()
                    )
                    .unwrap();
                    stream.flush().unwrap();
                }
            });

            Self {
                url,
                received,
                handle,
            }
        }

        /// A client for the stub that bypasses any proxy configured in the environment.
        pub(crate) fn client(&self) -> GitHubClient {
            GitHubClient::with_client(
                GitHubClient::builder().no_proxy().build().unwrap(),
                &self.url,
                SecretString::new("ghp_stubToken4Vw9".into()),
            )
        }

        /// Waits for every canned response to be served and returns the requests in order.
        pub(crate) fn finish(self) -> Vec<Received> {
            self.handle.join().unwrap();
            self.received.try_iter().collect()
        }
    }

    fn downcast(error: Box<dyn std::error::Error + Send + Sync>) -> ApiError {
        *error.downcast::<ApiError>().unwrap()
    }

    /// Trimmed response of `POST /repos/{owner}/{repo}/pulls`.
    pub(crate) const CREATED: &str = r#"{
        "url": "https://api.github.com/repos/acme/flux/pulls/42",
        "id": 1,
        "html_url": "https://github.com/acme/flux/pull/42",
        "number": 42,
        "state": "open",
        "title": "Release foo (test) abc1234",
        "head": {
            "label": "acme:release/dev/foo/abc1234",
            "ref": "release/dev/foo/abc1234",
            "sha": "6dcb09b5b57875f334f61aebed695e2e4193db5e"
        },
        "base": {
            "label": "acme:main",
            "ref": "main",
            "sha": "9fceb02d0ae598e95dc970b74767f19372d61af8"
        }
    }"#;

    #[test]
    fn create_request_escapes_text() {
        let request = CreatePullRequest {
            title: r#"Release "foo""#,
            body: "line one\nline \\two\t{\"json\": true}",
            head: "release/dev/foo/abc1234",
            base: "main",
        };
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(value["title"], r#"Release "foo""#);
        assert_eq!(value["body"], "line one\nline \\two\t{\"json\": true}");
        assert_eq!(value["head"], "release/dev/foo/abc1234");
        assert_eq!(value["base"], "main");
    }

    #[test]
    fn merge_request_omits_missing_title() {
        let request = MergePullRequest {
            sha: "6dcb09b5",
            commit_title: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"sha":"6dcb09b5"}"#
        );
    }

    #[test]
    fn created_response_is_read() {
        let pull_request: PullRequest = serde_json::from_str(CREATED).unwrap();
        assert_eq!(
            pull_request,
            PullRequest {
                url: "https://api.github.com/repos/acme/flux/pulls/42".to_owned(),
                html_url: "https://github.com/acme/flux/pull/42".to_owned(),
                number: 42,
                head: PullRequestHead {
                    sha: "6dcb09b5b57875f334f61aebed695e2e4193db5e".to_owned(),
                    ref_: "release/dev/foo/abc1234".to_owned(),
                },
            }
        );
    }

    #[test]
    fn error_shaped_response_is_not_a_pull_request() {
        let body = r#"{"message": "Validation Failed", "errors": [{"resource": "PullRequest", "code": "custom", "message": "A pull request already exists for acme:release/dev/foo/abc1234."}]}"#;
        assert!(serde_json::from_str::<PullRequest>(body).is_err());
        assert_eq!(error_message(body.as_bytes()), "Validation Failed");
    }

    #[test]
    fn error_message_falls_back_to_text() {
        assert_eq!(error_message(b"  Bad Gateway\n"), "Bad Gateway");
        assert_eq!(error_message(b""), "empty response body");
        let long = "x".repeat(500);
        assert_eq!(error_message(long.as_bytes()), format!("{}...", "x".repeat(200)));
    }

    #[test]
    fn api_error_display() {
        let error = ApiError {
            method: "PUT",
            url: "https://api.github.com/repos/acme/flux/pulls/42/merge".to_owned(),
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: "Pull Request is not mergeable".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "PUT https://api.github.com/repos/acme/flux/pulls/42/merge failed with status 405 Method Not Allowed: Pull Request is not mergeable"
        );
    }

    #[test]
    fn create_returns_the_raw_body() {
        let stub = ApiStub::serve(vec![(201, CREATED.to_owned())]);
        let client = stub.client();

        let body = client
            .create(
                "acme/flux",
                &CreatePullRequest {
                    title: "Release foo",
                    body: "body",
                    head: "release/dev/foo/abc1234",
                    base: "main",
                },
            )
            .unwrap();

        assert_eq!(body, CREATED.as_bytes());
        let received = stub.finish();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].request_line, "POST /repos/acme/flux/pulls HTTP/1.1");
        assert_eq!(
            received[0].authorization.as_deref(),
            Some("Bearer ghp_stubToken4Vw9")
        );
        let sent: serde_json::Value = serde_json::from_str(&received[0].body).unwrap();
        assert_eq!(sent["head"], "release/dev/foo/abc1234");
        assert_eq!(sent["base"], "main");
    }

    #[test]
    fn rejected_create_is_an_api_error() {
        let stub = ApiStub::serve(vec![(
            422,
            r#"{"message": "Validation Failed", "errors": [{"code": "custom"}]}"#.to_owned(),
        )]);
        let client = stub.client();

        let error = client
            .create(
                "acme/flux",
                &CreatePullRequest {
                    title: "Release foo",
                    body: "body",
                    head: "release/dev/foo/abc1234",
                    base: "main",
                },
            )
            .unwrap_err();

        let error = downcast(error);
        assert_eq!(error.method, "POST");
        assert_eq!(error.url, format!("{}/repos/acme/flux/pulls", stub.url));
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error.message, "Validation Failed");
        assert_eq!(stub.finish().len(), 1);
    }

    #[test]
    fn rejected_merge_is_an_api_error() {
        let stub = ApiStub::serve(vec![(
            405,
            r#"{"message": "Pull Request is not mergeable"}"#.to_owned(),
        )]);
        let client = stub.client();
        let pull_request_url = format!("{}/repos/acme/flux/pulls/42", stub.url);

        let error = client
            .merge(
                &pull_request_url,
                &MergePullRequest {
                    sha: "6dcb09b5b57875f334f61aebed695e2e4193db5e",
                    commit_title: None,
                },
            )
            .unwrap_err();

        let error = downcast(error);
        assert_eq!(error.method, "PUT");
        assert_eq!(error.url, format!("{pull_request_url}/merge"));
        assert_eq!(error.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(error.message, "Pull Request is not mergeable");
        let received = stub.finish();
        assert_eq!(received[0].request_line, "PUT /repos/acme/flux/pulls/42/merge HTTP/1.1");
    }

    #[test]
    fn merge_result_is_read() {
        let stub = ApiStub::serve(vec![(
            200,
            r#"{"sha": "6dcb09b5b57875f334f61aebed695e2e4193db5e", "merged": true, "message": "Pull Request successfully merged"}"#.to_owned(),
        )]);
        let client = stub.client();

        let result = client
            .merge(
                &format!("{}/repos/acme/flux/pulls/42/", stub.url),
                &MergePullRequest {
                    sha: "6dcb09b5b57875f334f61aebed695e2e4193db5e",
                    commit_title: None,
                },
            )
            .unwrap();

        assert!(result.merged);
        assert_eq!(
            result.sha.as_deref(),
            Some("6dcb09b5b57875f334f61aebed695e2e4193db5e")
        );
        let received = stub.finish();
        assert_eq!(received[0].request_line, "PUT /repos/acme/flux/pulls/42/merge HTTP/1.1");
        assert_eq!(
            received[0].body,
            r#"{"sha":"6dcb09b5b57875f334f61aebed695e2e4193db5e"}"#
        );
    }
}
