use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::common::{CallRequest, Message};
use crate::error::{RelayError, RelayResult};

use super::session::{Session, SessionStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Chat-notification endpoints of the backend the relay depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn unread_count(&self) -> RelayResult<u64>;

    async fn mark_all_read(&self) -> RelayResult<()>;

    /// Tells the backend a message was written so it can count it as unread.
    async fn notify_message(&self, message: &Message) -> RelayResult<()>;

    async fn notify_video_call(&self, request: &CallRequest) -> RelayResult<()>;
}

#[derive(Debug, Deserialize)]
struct UnreadCountResponse {
    #[serde(alias = "unreadCount")]
    count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSummary {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(default)]
    user: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageNotification<'a> {
    message_id: &'a str,
    user_id: Option<&'a str>,
    sender_id: &'a str,
    sender_role: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoCallNotification<'a> {
    request_id: &'a str,
    user_id: &'a str,
    user_name: &'a str,
    room_id: &'a str,
}

/// REST client for the wellness backend. Every call carries the persisted
/// bearer token; a 401/403 clears the session.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl HttpBackend {
    pub fn new(base_url: &str, session: Arc<SessionStore>) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RelayResult<RequestBuilder> {
        let token = self.session.token().ok_or(RelayError::NotLoggedIn)?;
        Ok(request.bearer_auth(token))
    }

    async fn check(&self, response: Response) -> RelayResult<Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            log::warn!("Backend answered {status} for {}; forcing logout", response.url());
            self.session.clear();
            return Err(RelayError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    pub async fn login(&self, email: &str, password: &str) -> RelayResult<Session> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&Credentials { email, password })
            .send()
            .await?;
        let login: LoginResponse = self.check(response).await?.json().await?;

        let session = Session {
            token: login.token,
            user_id: login.user.as_ref().map(|user| user.id.clone()),
            user_name: login.user.and_then(|user| user.name),
        };
        self.session.save(session.clone())?;
        log::info!("Logged in as {email}");
        Ok(session)
    }

    pub async fn register(&self, registration: &Registration) -> RelayResult<()> {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(registration)
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    /// Confirms the stored token is still accepted.
    pub async fn verify(&self) -> RelayResult<UserSummary> {
        let request = self.authorized(self.http.get(self.url("/auth/verify")))?;
        let response = self.check(request.send().await?).await?;
        #[derive(Deserialize)]
        struct VerifyResponse {
            user: UserSummary,
        }
        Ok(response.json::<VerifyResponse>().await?.user)
    }

    pub fn logout(&self) {
        self.session.clear();
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn unread_count(&self) -> RelayResult<u64> {
        let request = self.authorized(self.http.get(self.url("/chat/unread-count")))?;
        let response = self.check(request.send().await?).await?;
        Ok(response.json::<UnreadCountResponse>().await?.count)
    }

    async fn mark_all_read(&self) -> RelayResult<()> {
        let request = self.authorized(self.http.post(self.url("/chat/mark-all-read")))?;
        self.check(request.send().await?).await?;
        Ok(())
    }

    async fn notify_message(&self, message: &Message) -> RelayResult<()> {
        let body = MessageNotification {
            message_id: &message.id,
            user_id: message.user_id.as_deref(),
            sender_id: &message.sender_id,
            sender_role: message.sender_role.as_str(),
            text: &message.text,
        };
        let request = self.authorized(self.http.post(self.url("/chat/send-message")))?;
        self.check(request.json(&body).send().await?).await?;
        Ok(())
    }

    async fn notify_video_call(&self, request: &CallRequest) -> RelayResult<()> {
        let body = VideoCallNotification {
            request_id: &request.id,
            user_id: &request.user_id,
            user_name: &request.user_name,
            room_id: &request.room_id,
        };
        let http_request =
            self.authorized(self.http.post(self.url("/chat/video-call-request")))?;
        self.check(http_request.json(&body).send().await?).await?;
        Ok(())
    }
}
