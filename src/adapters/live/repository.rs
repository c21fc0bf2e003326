//! Live adapter for the `TaskRepository` port over the repository REST API.

use reqwest::header::{HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::connection::ConnectionDescriptor;
use crate::error::Error;
use crate::ports::{About, AuthRejected, PortError, ReloadTask, RepoFuture, TaskRepository};

const XRFKEY_HEADER: &str = "x-qlik-xrfkey";
const USER_HEADER: &str = "x-qlik-user";

/// The virtual proxy only offers integrated authentication to Windows clients.
const PROXY_USER_AGENT: &str = "Windows";
const DIRECT_USER_AGENT: &str = concat!("reload-retries/", env!("CARGO_PKG_VERSION"));

/// Live repository client built from a [`ConnectionDescriptor`].
pub struct LiveRepository {
    client: Client,
    base: Url,
    xrfkey: String,
}

/// Body of the update call.
#[derive(Serialize)]
struct UpdateRequest<'a> {
    task: &'a ReloadTask,
}

impl LiveRepository {
    /// Builds a client for the descriptor: credentials, headers and, for
    /// direct connections, the trust material. Issues no request.
    ///
    /// # Errors
    ///
    /// Returns a usage-class error when the trust material cannot be loaded,
    /// the user cannot be expressed as a header, or the client cannot be built.
    pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Self, Error> {
        let base = descriptor.api_base()?;
        let xrfkey = new_xrfkey();

        let mut headers = HeaderMap::new();
        headers.insert(
            XRFKEY_HEADER,
            HeaderValue::from_str(&xrfkey).map_err(|e| Error::Client(e.to_string()))?,
        );

        let builder = match descriptor {
            ConnectionDescriptor::ProxyDelegated { .. } => {
                tracing::debug!(%base, "using proxy-delegated authentication");
                Client::builder().user_agent(PROXY_USER_AGENT)
            }
            ConnectionDescriptor::Direct { user_directory, user_id, trust, .. } => {
                tracing::debug!(%base, %user_directory, %user_id, "using direct authentication");
                let user = format!("UserDirectory={user_directory}; UserId={user_id}");
                headers.insert(
                    USER_HEADER,
                    HeaderValue::from_str(&user)
                        .map_err(|_| Error::Usage(format!("Invalid user for header: {user:?}")))?,
                );
                let builder = Client::builder().user_agent(DIRECT_USER_AGENT);
                match trust.load()? {
                    // PEM identities (PKCS#1, PKCS#8 or SEC1 keys) need the rustls backend.
                    Some(material) => builder
                        .use_rustls_tls()
                        .add_root_certificate(material.root)
                        .identity(material.identity),
                    None => builder,
                }
            }
        };

        let client =
            builder.default_headers(headers).build().map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self { client, base, xrfkey })
    }

    /// The API root every call is made against.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, PortError> {
        let mut url = self.base.join(path)?;
        url.query_pairs_mut().append_pair("xrfkey", &self.xrfkey);
        Ok(url)
    }

    async fn call<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, PortError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        tracing::debug!(%method, %url, "repository request");

        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| -> PortError { format!("Repository API request failed: {e}").into() })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Box::new(AuthRejected { offered: offered_schemes(response.headers()) }));
        }
        let text = response.text().await.map_err(|e| -> PortError {
            format!("Failed to read repository API response: {e}").into()
        })?;

        if !status.is_success() {
            let detail = if text.is_empty() { status.to_string() } else { text };
            return Err(format!(
                "Repository API error ({}) on {method} {path}: {detail}",
                status.as_u16()
            )
            .into());
        }

        serde_json::from_str(&text).map_err(|e| -> PortError {
            format!("Failed to parse repository API response for {method} {path}: {e}").into()
        })
    }
}

impl TaskRepository for LiveRepository {
    fn about(&self) -> RepoFuture<'_, About> {
        Box::pin(self.call(Method::GET, "about", None::<&()>))
    }

    fn list_reload_tasks(&self) -> RepoFuture<'_, Vec<ReloadTask>> {
        Box::pin(self.call(Method::GET, "reloadtask/full", None::<&()>))
    }

    fn get_reload_task<'a>(&'a self, id: &'a str) -> RepoFuture<'a, ReloadTask> {
        Box::pin(async move {
            let path = format!("reloadtask/{id}");
            self.call(Method::GET, &path, None::<&()>).await
        })
    }

    fn update_reload_task<'a>(&'a self, task: &'a ReloadTask) -> RepoFuture<'a, ReloadTask> {
        Box::pin(async move {
            let body = UpdateRequest { task };
            self.call(Method::POST, "reloadtask/update", Some(&body)).await
        })
    }
}

/// Scheme names from every `WWW-Authenticate` challenge, e.g. `NTLM, Negotiate`.
fn offered_schemes(headers: &HeaderMap) -> String {
    let schemes: Vec<&str> = headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split_whitespace().next())
        .collect();
    if schemes.is_empty() {
        "no scheme".to_string()
    } else {
        schemes.join(", ")
    }
}

/// Cross-site request forgery key: 16 alphanumeric characters sent both as
/// the `xrfkey` query parameter and the matching header.
fn new_xrfkey() -> String {
    Uuid::new_v4().simple().to_string().chars().take(16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustSource;

    fn proxy(url: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::ProxyDelegated { url: Url::parse(url).unwrap() }
    }

    #[test]
    fn xrfkey_is_sixteen_alphanumerics() {
        let key = new_xrfkey();
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, new_xrfkey());
    }

    #[test]
    fn endpoints_carry_the_xrfkey() {
        let repo = LiveRepository::connect(&proxy("https://qs.example.com/hdr")).unwrap();
        let url = repo.endpoint("reloadtask/full").unwrap();
        assert_eq!(url.path(), "/hdr/qrs/reloadtask/full");
        assert_eq!(url.query(), Some(format!("xrfkey={}", repo.xrfkey).as_str()));
    }

    #[test]
    fn direct_connect_reports_missing_cert_directory() {
        let descriptor = ConnectionDescriptor::Direct {
            url: Url::parse("https://qs").unwrap(),
            port: 4242,
            user_directory: "INTERNAL".into(),
            user_id: "sa_repository".into(),
            trust: TrustSource::Directory("/nonexistent/reload_retries/certs".into()),
        };
        let Err(err) = LiveRepository::connect(&descriptor) else {
            panic!("expected a trust error");
        };
        assert!(err.is_usage());
        assert!(err.to_string().contains("Certificate directory not found"));
    }

    #[test]
    fn direct_connect_with_system_store_targets_service_port() {
        let descriptor = ConnectionDescriptor::Direct {
            url: Url::parse("https://qs").unwrap(),
            port: 4242,
            user_directory: "INTERNAL".into(),
            user_id: "sa_repository".into(),
            trust: TrustSource::SystemStore,
        };
        let repo = LiveRepository::connect(&descriptor).unwrap();
        assert_eq!(repo.base().as_str(), "https://qs:4242/qrs/");
    }

    #[test]
    fn direct_connect_with_certificate_directory_builds_a_client() {
        let dir = tempfile::tempdir().unwrap();
        crate::trust::fixtures::write_dir(dir.path(), crate::trust::fixtures::KEY_PKCS1);
        let descriptor = ConnectionDescriptor::Direct {
            url: Url::parse("https://qs").unwrap(),
            port: 4242,
            user_directory: "INTERNAL".into(),
            user_id: "sa_repository".into(),
            trust: TrustSource::Directory(dir.path().to_path_buf()),
        };
        let repo = LiveRepository::connect(&descriptor).unwrap();
        assert_eq!(repo.base().as_str(), "https://qs:4242/qrs/");
    }

    #[test]
    fn challenge_schemes_are_listed_in_order() {
        let mut headers = HeaderMap::new();
        headers.append(WWW_AUTHENTICATE, HeaderValue::from_static("NTLM"));
        headers.append(WWW_AUTHENTICATE, HeaderValue::from_static("Negotiate abc=="));
        assert_eq!(offered_schemes(&headers), "NTLM, Negotiate");
        assert_eq!(offered_schemes(&HeaderMap::new()), "no scheme");
    }

    /// Serves a single canned HTTP response on loopback and returns its URL.
    fn serve_once(response: &'static str) -> String {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn proxy_challenge_is_reported_as_unauthorized() {
        let url = serve_once(
            "HTTP/1.1 401 Unauthorized\r\n\
             WWW-Authenticate: NTLM\r\n\
             WWW-Authenticate: Negotiate\r\n\
             Content-Length: 0\r\n\
             Connection: close\r\n\r\n",
        );
        let repo = LiveRepository::connect(&proxy(&url)).unwrap();

        let err = crate::connection::verify(&repo, repo.base().as_str()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Unauthorized { ref offered, .. } if offered == "NTLM, Negotiate"
        ));
        assert!(!err.is_usage());
    }

    #[tokio::test]
    async fn server_errors_carry_status_and_body() {
        let url = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\n\
             Content-Length: 4\r\n\
             Connection: close\r\n\r\nboom",
        );
        let repo = LiveRepository::connect(&proxy(&url)).unwrap();

        let err = repo.about().await.unwrap_err();
        assert_eq!(err.to_string(), "Repository API error (500) on GET about: boom");
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let repo = LiveRepository::connect(&proxy("http://127.0.0.1:1")).unwrap();
        assert!(repo.about().await.is_err());
    }
}
